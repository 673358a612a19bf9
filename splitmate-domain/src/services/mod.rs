pub mod balance_calculator;
pub mod expense_validator;
pub mod group_ledger;
pub mod reconciliation;
pub mod settlement_planner;

pub use balance_calculator::{BalanceAccumulator, BalanceCalculator, BalanceReport};
pub use expense_validator::ExpenseValidator;
pub use group_ledger::{GroupLedger, LedgerSummary};
pub use reconciliation::{
    MAX_SETTLEMENT_SCALE, RoundingMode, SettlementContext, quantize_balances, reconcile_shares,
};
pub use settlement_planner::{SettlementPlanner, apply_settlements};
