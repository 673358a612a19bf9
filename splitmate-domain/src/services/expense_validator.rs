use crate::{
    error::ExpenseValidationError,
    model::{ExpenseRecord, Money, SplitMode},
    services::reconciliation::SettlementContext,
};
use rust_decimal::Decimal;

/// Pre-save checks for a single expense record.
///
/// The balance fold tolerates records that fail these checks; callers use the
/// validator when they want to reject such records before storing them.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExpenseValidator {
    context: SettlementContext,
}

impl ExpenseValidator {
    pub fn new(context: SettlementContext) -> Self {
        Self { context }
    }

    pub fn validate(&self, expense: &ExpenseRecord) -> Result<(), ExpenseValidationError> {
        if !expense.amount.is_positive() {
            return Err(ExpenseValidationError::NonPositiveAmount(expense.amount));
        }
        if expense.participants.is_empty() {
            return Err(ExpenseValidationError::NoParticipants);
        }

        match expense.split_mode {
            SplitMode::Equal => Ok(()),
            SplitMode::Unequal | SplitMode::Percentage => {
                if expense.splits.is_empty() {
                    return Err(ExpenseValidationError::MissingSplits(expense.split_mode));
                }
                if let Some(split) = expense.splits.iter().find(|s| s.value.is_sign_negative()) {
                    return Err(ExpenseValidationError::NegativeSplit {
                        member: split.member.clone(),
                        value: split.value,
                    });
                }

                let total = expense
                    .splits
                    .iter()
                    .try_fold(Decimal::ZERO, |acc, split| acc.checked_add(split.value))
                    .ok_or(ExpenseValidationError::SplitOverflow)?;
                if expense.split_mode == SplitMode::Unequal {
                    let actual = Money::from_decimal(total);
                    if (actual - expense.amount).abs().as_decimal() > self.context.tolerance {
                        return Err(ExpenseValidationError::UnequalSplitMismatch {
                            expected: expense.amount,
                            actual,
                        });
                    }
                } else if (total - Decimal::ONE_HUNDRED).abs() > self.context.tolerance {
                    return Err(ExpenseValidationError::PercentageSplitMismatch(total));
                }
                Ok(())
            }
        }
    }
}
