use crate::{
    error::{BalanceWarning, InvalidExpenseError},
    model::{Balance, ExpenseRecord, MemberId, Settlement},
    services::{BalanceCalculator, SettlementContext, SettlementPlanner},
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerSummary {
    pub balances: Vec<Balance>,
    pub settlements: Vec<Settlement>,
    pub warnings: Vec<BalanceWarning>,
    pub skipped: Vec<InvalidExpenseError>,
}

/// Runs the balance fold and the settlement plan with one shared context.
#[derive(Clone, Copy, Debug, Default)]
pub struct GroupLedger {
    calculator: BalanceCalculator,
    planner: SettlementPlanner,
}

impl GroupLedger {
    pub fn new(context: SettlementContext) -> Self {
        Self {
            calculator: BalanceCalculator::new(context),
            planner: SettlementPlanner::new(context),
        }
    }

    pub fn summarize(&self, expenses: &[ExpenseRecord], members: &[MemberId]) -> LedgerSummary {
        let report = self.calculator.calculate(expenses, members);
        let settlements = self.planner.plan(&report.balances);

        tracing::debug!(
            member_count = report.balances.len(),
            settlement_count = settlements.len(),
            warning_count = report.warnings.len(),
            skipped_count = report.skipped.len(),
            "Group summary computed"
        );

        LedgerSummary {
            balances: report.balances,
            settlements,
            warnings: report.warnings,
            skipped: report.skipped,
        }
    }
}
