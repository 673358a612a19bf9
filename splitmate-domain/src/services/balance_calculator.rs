use crate::{
    error::{BalanceWarning, InvalidExpenseError, ReconciliationWarning, UnknownMemberWarning},
    model::{Balance, ExpenseId, ExpenseRecord, MemberBalances, MemberId, Money, SplitMode},
    services::reconciliation::{SettlementContext, quantize_balances, reconcile_shares},
};
use fxhash::FxHashSet;
use indexmap::IndexMap;
use rust_decimal::Decimal;

/// Result of folding a batch of expenses.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BalanceReport {
    /// One entry per distinct group member, in member-list order.
    pub balances: Vec<Balance>,
    pub warnings: Vec<BalanceWarning>,
    /// Records excluded from the fold.
    pub skipped: Vec<InvalidExpenseError>,
}

/// Balance calculation service
#[derive(Clone, Copy, Debug, Default)]
pub struct BalanceCalculator {
    context: SettlementContext,
}

impl BalanceCalculator {
    pub fn new(context: SettlementContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> SettlementContext {
        self.context
    }

    /// Folds `expenses` into net balances for `members`.
    ///
    /// Never fails: records that cannot be divided, or whose amounts leave the
    /// `Decimal` range, are skipped and reported. Discrepancies and unknown
    /// members are reported as warnings.
    pub fn calculate(&self, expenses: &[ExpenseRecord], members: &[MemberId]) -> BalanceReport {
        tracing::debug!(
            expense_count = expenses.len(),
            member_count = members.len(),
            scale = self.context.scale,
            "Balance calculation started"
        );

        let mut accumulator = BalanceAccumulator::new(members, self.context);
        for expense in expenses {
            accumulator.apply(expense);
        }
        accumulator.into_report()
    }
}

/// Running totals for one calculation. Lives only for the duration of a fold.
pub struct BalanceAccumulator<'a> {
    balances: MemberBalances,
    known: FxHashSet<&'a MemberId>,
    reported_unknown: FxHashSet<MemberId>,
    context: SettlementContext,
    warnings: Vec<BalanceWarning>,
    skipped: Vec<InvalidExpenseError>,
}

impl<'a> BalanceAccumulator<'a> {
    pub fn new(members: &'a [MemberId], context: SettlementContext) -> Self {
        let balances: MemberBalances = members
            .iter()
            .cloned()
            .map(|member| (member, Money::ZERO))
            .collect();
        let known = members.iter().collect();

        Self {
            balances,
            known,
            reported_unknown: FxHashSet::default(),
            context,
            warnings: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Posts one record. A record that cannot be divided, or whose postings
    /// leave the `Decimal` range, is skipped as a whole.
    pub fn apply(&mut self, expense: &ExpenseRecord) {
        let posting = match self.stage(expense) {
            Ok(posting) => posting,
            Err(err) => {
                tracing::warn!(
                    expense_id = %expense.id,
                    split_mode = %expense.split_mode,
                    error = %err,
                    "Skipping expense that cannot be posted"
                );
                self.skipped.push(err);
                return;
            }
        };

        if posting.residual.abs().as_decimal() > self.context.tolerance {
            tracing::warn!(
                expense_id = %expense.id,
                amount = %expense.amount,
                residual = %posting.residual,
                adjusted_member = %posting.absorbed_by,
                "Expense shares do not reconcile with amount"
            );
            self.warnings
                .push(BalanceWarning::Reconciliation(ReconciliationWarning {
                    expense: expense.id.clone(),
                    amount: expense.amount,
                    shares_total: expense.amount - posting.residual,
                    adjusted_member: posting.absorbed_by.clone(),
                }));
        }

        for (member, balance) in posting.balances {
            self.post(&expense.id, member, balance);
        }
    }

    /// Computes the balances a record would leave behind without touching
    /// the accumulator.
    fn stage<'e>(
        &self,
        expense: &'e ExpenseRecord,
    ) -> Result<Posting<'e>, InvalidExpenseError> {
        let overflow = || InvalidExpenseError::AmountOverflow {
            expense: expense.id.clone(),
        };

        let (members, mut shares) = split_shares(expense)?;
        let residual = reconcile_shares(&mut shares, expense.amount).ok_or_else(overflow)?;
        let absorbed_by = members[0];

        let mut deltas: IndexMap<&MemberId, Money> = IndexMap::new();
        deltas.insert(&expense.payer, expense.amount);
        for (member, share) in members.into_iter().zip(shares) {
            let delta = deltas.entry(member).or_insert(Money::ZERO);
            *delta = delta.checked_sub(share).ok_or_else(overflow)?;
        }

        let balances = deltas
            .into_iter()
            .map(|(member, delta)| {
                let current = self.balances.get(member).copied().unwrap_or(Money::ZERO);
                current
                    .checked_add(delta)
                    .map(|balance| (member, balance))
                    .ok_or_else(overflow)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Posting {
            balances,
            residual,
            absorbed_by,
        })
    }

    /// Quantizes the running totals and keeps only the group's members.
    pub fn into_report(self) -> BalanceReport {
        let rounded = match quantize_balances(&self.balances, self.context) {
            Ok(rounded) => rounded,
            Err(err) => {
                tracing::error!(
                    error = %err,
                    member_count = self.balances.len(),
                    "Falling back to per-member rounding"
                );
                let (members, mut amounts): (Vec<MemberId>, Vec<Money>) = self
                    .balances
                    .iter()
                    .map(|(member, amount)| (member.clone(), self.context.round(*amount)))
                    .unzip();
                // Rounded amounts may drift off zero-sum; the first member absorbs it.
                if reconcile_shares(&mut amounts, Money::ZERO).is_none() {
                    tracing::error!(
                        member_count = members.len(),
                        "Rounded balances could not be reconciled to zero"
                    );
                }
                members.into_iter().zip(amounts).collect::<MemberBalances>()
            }
        };

        // Group members were inserted first, so they lead the map in member-list order.
        let balances = rounded
            .into_iter()
            .take(self.known.len())
            .map(|(member, net_amount)| Balance { member, net_amount })
            .collect();

        BalanceReport {
            balances,
            warnings: self.warnings,
            skipped: self.skipped,
        }
    }

    fn post(&mut self, expense: &ExpenseId, member: &MemberId, balance: Money) {
        if !self.known.contains(member) && self.reported_unknown.insert(member.clone()) {
            tracing::warn!(
                expense_id = %expense,
                member = %member,
                "Expense references a member outside the group"
            );
            self.warnings
                .push(BalanceWarning::UnknownMember(UnknownMemberWarning {
                    expense: expense.clone(),
                    member: member.clone(),
                }));
        }
        self.balances.insert(member.clone(), balance);
    }
}

/// Balances one record leaves behind, plus its reconciliation residual.
struct Posting<'e> {
    balances: Vec<(&'e MemberId, Money)>,
    residual: Money,
    absorbed_by: &'e MemberId,
}

/// Computes raw shares before reconciliation. The first entry is the one
/// that absorbs any residual.
fn split_shares(
    expense: &ExpenseRecord,
) -> Result<(Vec<&MemberId>, Vec<Money>), InvalidExpenseError> {
    match expense.split_mode {
        SplitMode::Equal => {
            if expense.participants.is_empty() {
                return Err(InvalidExpenseError::NoParticipants {
                    expense: expense.id.clone(),
                });
            }
            let share = expense.amount / Decimal::from(expense.participants.len());
            Ok((
                expense.participants.iter().collect(),
                vec![share; expense.participants.len()],
            ))
        }
        SplitMode::Unequal | SplitMode::Percentage if expense.splits.is_empty() => {
            Err(InvalidExpenseError::MissingSplits {
                expense: expense.id.clone(),
                mode: expense.split_mode,
            })
        }
        SplitMode::Unequal => Ok(expense
            .splits
            .iter()
            .map(|split| (&split.member, Money::from_decimal(split.value)))
            .unzip()),
        SplitMode::Percentage => expense
            .splits
            .iter()
            .map(|split| {
                expense
                    .amount
                    .checked_mul(split.value / Decimal::ONE_HUNDRED)
                    .map(|share| (&split.member, share))
                    .ok_or_else(|| InvalidExpenseError::AmountOverflow {
                        expense: expense.id.clone(),
                    })
            })
            .collect::<Result<Vec<_>, InvalidExpenseError>>()
            .map(|pairs| pairs.into_iter().unzip()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use rust_decimal_macros::dec;

    #[fixture]
    fn calculator() -> BalanceCalculator {
        BalanceCalculator::default()
    }

    fn members(ids: &[&str]) -> Vec<MemberId> {
        ids.iter().map(|id| MemberId::from(*id)).collect()
    }

    fn nets(report: &BalanceReport) -> Vec<(&str, Decimal)> {
        report
            .balances
            .iter()
            .map(|balance| (balance.member.as_str(), balance.net_amount.as_decimal()))
            .collect()
    }

    #[rstest]
    #[case::equal_split(
        vec![ExpenseRecord::equal("e1", "A", Money::from_i64(90), ["A", "B", "C"])],
        &["A", "B", "C"],
        vec![("A", dec!(60)), ("B", dec!(-30)), ("C", dec!(-30))]
    )]
    #[case::unequal_split(
        vec![ExpenseRecord::with_splits(
            "e1", "A", Money::from_i64(100), SplitMode::Unequal,
            [("A", dec!(20)), ("B", dec!(80))],
        )],
        &["A", "B"],
        vec![("A", dec!(80)), ("B", dec!(-80))]
    )]
    #[case::percentage_split(
        vec![ExpenseRecord::with_splits(
            "e1", "A", Money::from_i64(200), SplitMode::Percentage,
            [("A", dec!(50)), ("B", dec!(50))],
        )],
        &["A", "B"],
        vec![("A", dec!(100)), ("B", dec!(-100))]
    )]
    #[case::payer_not_participating(
        vec![ExpenseRecord::equal("e1", "A", Money::from_i64(50), ["B"])],
        &["A", "B"],
        vec![("A", dec!(50)), ("B", dec!(-50))]
    )]
    #[case::multiple_expenses(
        vec![
            ExpenseRecord::equal("e1", "A", Money::from_i64(90), ["A", "B", "C"]),
            ExpenseRecord::equal("e2", "B", Money::from_i64(30), ["B", "C"]),
        ],
        &["A", "B", "C"],
        vec![("A", dec!(60)), ("B", dec!(-15)), ("C", dec!(-45))]
    )]
    #[case::cents(
        vec![ExpenseRecord::equal("e1", "B", Money::new(1250, 2), ["A", "B"])],
        &["A", "B"],
        vec![("A", dec!(-6.25)), ("B", dec!(6.25))]
    )]
    #[case::zero_amount(
        vec![ExpenseRecord::equal("e1", "A", Money::ZERO, ["A", "B"])],
        &["A", "B"],
        vec![("A", dec!(0)), ("B", dec!(0))]
    )]
    #[case::no_expenses(vec![], &["A", "B", "C"], vec![("A", dec!(0)), ("B", dec!(0)), ("C", dec!(0))])]
    #[case::duplicate_members(
        vec![ExpenseRecord::equal("e1", "A", Money::from_i64(10), ["A", "B"])],
        &["A", "B", "A"],
        vec![("A", dec!(5)), ("B", dec!(-5))]
    )]
    fn calculates_balances(
        calculator: BalanceCalculator,
        #[case] expenses: Vec<ExpenseRecord>,
        #[case] member_ids: &[&str],
        #[case] expected: Vec<(&str, Decimal)>,
    ) {
        let report = calculator.calculate(&expenses, &members(member_ids));

        assert_eq!(nets(&report), expected);
        assert!(report.warnings.is_empty());
        assert!(report.skipped.is_empty());
    }

    #[rstest]
    fn thirds_stay_zero_sum_at_cent_precision(calculator: BalanceCalculator) {
        let expenses = [ExpenseRecord::equal(
            "e1",
            "A",
            Money::from_i64(100),
            ["A", "B", "C"],
        )];

        let report = calculator.calculate(&expenses, &members(&["A", "B", "C"]));

        let total: Money = report.balances.iter().map(|b| b.net_amount).sum();
        assert_eq!(total, Money::ZERO);
        for balance in &report.balances {
            assert_eq!(balance.net_amount, calculator.context().round(balance.net_amount));
        }
        assert!(report.warnings.is_empty());
    }

    #[rstest]
    fn unknown_member_is_accumulated_but_not_emitted(calculator: BalanceCalculator) {
        let expenses = [
            ExpenseRecord::equal("e1", "A", Money::from_i64(30), ["A", "B", "X"]),
            ExpenseRecord::equal("e2", "A", Money::from_i64(30), ["A", "B", "X"]),
        ];

        let report = calculator.calculate(&expenses, &members(&["A", "B"]));

        assert_eq!(nets(&report), vec![("A", dec!(40)), ("B", dec!(-20))]);
        assert_eq!(
            report.warnings,
            vec![BalanceWarning::UnknownMember(UnknownMemberWarning {
                expense: ExpenseId::from("e1"),
                member: MemberId::from("X"),
            })]
        );
    }

    #[rstest]
    fn unknown_payer_is_reported(calculator: BalanceCalculator) {
        let expenses = [ExpenseRecord::equal("e1", "Z", Money::from_i64(20), ["A", "B"])];

        let report = calculator.calculate(&expenses, &members(&["A", "B"]));

        assert_eq!(nets(&report), vec![("A", dec!(-10)), ("B", dec!(-10))]);
        assert!(matches!(
            report.warnings.as_slice(),
            [BalanceWarning::UnknownMember(warning)] if warning.member.as_str() == "Z"
        ));
    }

    #[rstest]
    #[case::no_participants(
        ExpenseRecord::equal("bad", "A", Money::from_i64(30), Vec::<&str>::new()),
        InvalidExpenseError::NoParticipants { expense: ExpenseId::from("bad") }
    )]
    #[case::unequal_without_splits(
        ExpenseRecord::with_splits("bad", "A", Money::from_i64(30), SplitMode::Unequal, Vec::<(&str, Decimal)>::new()),
        InvalidExpenseError::MissingSplits { expense: ExpenseId::from("bad"), mode: SplitMode::Unequal }
    )]
    #[case::percentage_without_splits(
        ExpenseRecord::with_splits("bad", "A", Money::from_i64(30), SplitMode::Percentage, Vec::<(&str, Decimal)>::new()),
        InvalidExpenseError::MissingSplits { expense: ExpenseId::from("bad"), mode: SplitMode::Percentage }
    )]
    #[case::unequal_shares_overflow(
        ExpenseRecord::with_splits("bad", "A", Money::from_i64(30), SplitMode::Unequal, [("A", Decimal::MAX), ("B", dec!(1))]),
        InvalidExpenseError::AmountOverflow { expense: ExpenseId::from("bad") }
    )]
    #[case::percentage_share_overflow(
        ExpenseRecord::with_splits("bad", "A", Money::from_decimal(Decimal::MAX), SplitMode::Percentage, [("A", dec!(150)), ("B", dec!(-50))]),
        InvalidExpenseError::AmountOverflow { expense: ExpenseId::from("bad") }
    )]
    #[case::balance_overflow(
        ExpenseRecord::equal("bad", "B", Money::from_decimal(Decimal::MAX), ["A"]),
        InvalidExpenseError::AmountOverflow { expense: ExpenseId::from("bad") }
    )]
    fn skips_indivisible_expense(
        calculator: BalanceCalculator,
        #[case] bad: ExpenseRecord,
        #[case] expected: InvalidExpenseError,
    ) {
        let expenses = [
            ExpenseRecord::equal("ok", "B", Money::from_i64(10), ["A", "B"]),
            bad,
        ];

        let report = calculator.calculate(&expenses, &members(&["A", "B"]));

        assert_eq!(nets(&report), vec![("A", dec!(-5)), ("B", dec!(5))]);
        assert_eq!(report.skipped, vec![expected]);
    }

    #[rstest]
    #[case::unequal_short(
        ExpenseRecord::with_splits(
            "e1", "A", Money::from_i64(100), SplitMode::Unequal,
            [("B", dec!(20)), ("A", dec!(70))],
        ),
        dec!(90),
        vec![("A", dec!(30)), ("B", dec!(-30))]
    )]
    #[case::percentage_short(
        ExpenseRecord::with_splits(
            "e1", "A", Money::from_i64(100), SplitMode::Percentage,
            [("B", dec!(30)), ("A", dec!(60))],
        ),
        dec!(90),
        vec![("A", dec!(40)), ("B", dec!(-40))]
    )]
    fn absorbs_and_reports_discrepancy(
        calculator: BalanceCalculator,
        #[case] expense: ExpenseRecord,
        #[case] shares_total: Decimal,
        #[case] expected: Vec<(&str, Decimal)>,
    ) {
        let report = calculator.calculate(&[expense], &members(&["A", "B"]));

        assert_eq!(nets(&report), expected);
        let [BalanceWarning::Reconciliation(warning)] = report.warnings.as_slice() else {
            panic!("expected a single reconciliation warning, got {:?}", report.warnings);
        };
        assert_eq!(warning.shares_total, Money::from_decimal(shares_total));
        assert_eq!(warning.adjusted_member, MemberId::from("B"));
        assert_eq!(warning.residual(), Money::from_i64(10));
    }

    #[rstest]
    fn discrepancy_within_tolerance_is_silent(calculator: BalanceCalculator) {
        let expense = ExpenseRecord::with_splits(
            "e1",
            "A",
            Money::from_i64(100),
            SplitMode::Unequal,
            [("A", dec!(50)), ("B", dec!(49.996))],
        );

        let report = calculator.calculate(&[expense], &members(&["A", "B"]));

        assert!(report.warnings.is_empty());
        let total: Money = report.balances.iter().map(|b| b.net_amount).sum();
        assert_eq!(total, Money::ZERO);
    }

    #[rstest]
    fn large_percentage_amount_is_exact(calculator: BalanceCalculator) {
        let expense = ExpenseRecord::with_splits(
            "e1",
            "A",
            Money::from_decimal(dec!(2000000000000000000000000000)),
            SplitMode::Percentage,
            [("A", dec!(50)), ("B", dec!(50))],
        );

        let report = calculator.calculate(&[expense], &members(&["A", "B"]));

        assert_eq!(
            nets(&report),
            vec![
                ("A", dec!(1000000000000000000000000000)),
                ("B", dec!(-1000000000000000000000000000)),
            ]
        );
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn rounding_fallback_stays_zero_sum() {
        // Scales above the quantization limit take the per-member rounding path.
        let calculator = BalanceCalculator::new(SettlementContext::for_scale(30));
        let expenses = [ExpenseRecord::equal(
            "e1",
            "A",
            Money::from_i64(100),
            ["A", "B", "C"],
        )];

        let report = calculator.calculate(&expenses, &members(&["A", "B", "C"]));

        let share = Money::from_i64(100) / Decimal::from(3);
        assert_eq!(report.balances[1].net_amount, -share);
        assert_eq!(report.balances[2].net_amount, -share);
        let total: Money = report.balances.iter().map(|b| b.net_amount).sum();
        assert_eq!(total, Money::ZERO);
    }

    #[rstest]
    fn calculation_is_idempotent(calculator: BalanceCalculator) {
        let expenses = [
            ExpenseRecord::equal("e1", "A", Money::new(1001, 2), ["A", "B", "C"]),
            ExpenseRecord::with_splits(
                "e2",
                "C",
                Money::from_i64(75),
                SplitMode::Percentage,
                [("A", dec!(33.3)), ("B", dec!(33.3)), ("C", dec!(33.4))],
            ),
        ];
        let group = members(&["A", "B", "C"]);

        assert_eq!(
            calculator.calculate(&expenses, &group),
            calculator.calculate(&expenses, &group)
        );
    }
}
