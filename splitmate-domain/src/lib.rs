#![warn(clippy::uninlined_format_args)]

pub mod error;
pub mod model;
pub mod services;

pub use error::{
    BalanceWarning, ExpenseValidationError, InvalidExpenseError, ReconciliationWarning,
    SettlementRoundingError, UnknownMemberWarning,
};
pub use model::{
    Balance, ExpenseId, ExpenseRecord, GroupId, MemberBalances, MemberId, Money, Settlement,
    Split, SplitMode,
};
pub use services::{
    BalanceCalculator, BalanceReport, ExpenseValidator, GroupLedger, LedgerSummary, RoundingMode,
    SettlementContext, SettlementPlanner, apply_settlements,
};

/// Net balance per member using two-decimal currency precision.
///
/// Skipped records and warnings are logged; use [`BalanceCalculator`] to
/// inspect them.
pub fn compute_balances(expenses: &[ExpenseRecord], members: &[MemberId]) -> Vec<Balance> {
    BalanceCalculator::default()
        .calculate(expenses, members)
        .balances
}

/// Greedy settlement plan using two-decimal currency precision.
pub fn plan_settlements(balances: &[Balance]) -> Vec<Settlement> {
    SettlementPlanner::default().plan(balances)
}
