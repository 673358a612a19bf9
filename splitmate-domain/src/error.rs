use crate::model::{ExpenseId, MemberId, Money, SplitMode};
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

/// A record the balance fold cannot divide. The record is skipped.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InvalidExpenseError {
    #[error("expense {expense} is split equally among zero participants")]
    NoParticipants { expense: ExpenseId },
    #[error("expense {expense} uses {mode} split without any split entries")]
    MissingSplits { expense: ExpenseId, mode: SplitMode },
    #[error("expense {expense} overflows the representable amount range")]
    AmountOverflow { expense: ExpenseId },
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ExpenseValidationError {
    #[error("amount must be positive (found {0})")]
    NonPositiveAmount(Money),
    #[error("at least one participant is required")]
    NoParticipants,
    #[error("{0} split requires split entries")]
    MissingSplits(SplitMode),
    #[error("split value for {member} is negative ({value})")]
    NegativeSplit { member: MemberId, value: Decimal },
    #[error("unequal split amounts must equal the total (total {expected}, splits {actual})")]
    UnequalSplitMismatch { expected: Money, actual: Money },
    #[error("percentages must add up to 100 (found {0})")]
    PercentageSplitMismatch(Decimal),
    #[error("split values overflow the representable amount range")]
    SplitOverflow,
}

/// Shares of an expense did not add up to its amount beyond tolerance.
///
/// The residual has already been folded into `adjusted_member`'s share.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconciliationWarning {
    pub expense: ExpenseId,
    pub amount: Money,
    pub shares_total: Money,
    pub adjusted_member: MemberId,
}

impl ReconciliationWarning {
    pub fn residual(&self) -> Money {
        self.amount - self.shares_total
    }
}

/// An expense referenced a member outside the group's member list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownMemberWarning {
    pub expense: ExpenseId,
    pub member: MemberId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BalanceWarning {
    Reconciliation(ReconciliationWarning),
    UnknownMember(UnknownMemberWarning),
}

impl fmt::Display for BalanceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalanceWarning::Reconciliation(warning) => write!(
                f,
                "expense {}: shares total {} but amount is {}; {} absorbed by {}",
                warning.expense,
                warning.shares_total,
                warning.amount,
                warning.residual(),
                warning.adjusted_member
            ),
            BalanceWarning::UnknownMember(warning) => write!(
                f,
                "expense {}: member {} is not part of the group",
                warning.expense, warning.member
            ),
        }
    }
}

/// Errors that can occur during balance quantization.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SettlementRoundingError {
    /// The total sum of balances exceeds the epsilon tolerance.
    #[error("sum of balances must be zero (found {0})")]
    ImbalancedTotal(Money),
    #[error("sum of balances is out of range")]
    TotalOverflow,
    #[error("adjustment count could not be represented")]
    InvalidAdjustmentCount,
    /// Quantized units could not be represented as integral values.
    #[error("quantized value is not integral")]
    NonIntegral,
    #[error("quantized balances failed to restore zero-sum")]
    ZeroSumInvariantViolation,
    #[error("scale {scale} is not supported (max {max_supported})")]
    UnsupportedScale { scale: u32, max_supported: u32 },
}
