use crate::{
    model::{Balance, MemberId, Money, Settlement},
    services::reconciliation::SettlementContext,
};
use indexmap::IndexMap;

/// Settlement planning service
///
/// Greedy largest-creditor/largest-debtor matching. Every emitted transfer
/// settles at least one side completely, so `k` non-zero balances need at
/// most `k - 1` transfers.
#[derive(Clone, Copy, Debug, Default)]
pub struct SettlementPlanner {
    context: SettlementContext,
}

struct Position<'a> {
    member: &'a MemberId,
    remaining: Money,
}

impl SettlementPlanner {
    pub fn new(context: SettlementContext) -> Self {
        Self { context }
    }

    /// Plans the transfers that bring every balance back to zero.
    ///
    /// # Arguments
    /// * `balances` - Net positions (positive: owed money, negative: owes money)
    ///
    /// # Returns
    /// Transfers in emission order. Empty when everything is already settled.
    pub fn plan(&self, balances: &[Balance]) -> Vec<Settlement> {
        let mut creditors: Vec<Position> = Vec::new();
        let mut debtors: Vec<Position> = Vec::new();
        for balance in balances {
            if self.context.is_negligible(balance.net_amount) {
                continue;
            }
            let position = Position {
                member: &balance.member,
                remaining: balance.net_amount.abs(),
            };
            if balance.net_amount.is_positive() {
                creditors.push(position);
            } else {
                debtors.push(position);
            }
        }

        // Stable sorts: equal amounts keep their input order.
        creditors.sort_by(|a, b| b.remaining.cmp(&a.remaining));
        debtors.sort_by(|a, b| b.remaining.cmp(&a.remaining));

        tracing::debug!(
            creditor_count = creditors.len(),
            debtor_count = debtors.len(),
            "Settlement planning started"
        );

        let mut settlements = Vec::with_capacity(creditors.len() + debtors.len());
        let mut creditor_idx = 0;
        let mut debtor_idx = 0;

        while creditor_idx < creditors.len() && debtor_idx < debtors.len() {
            let creditor = &mut creditors[creditor_idx];
            let debtor = &mut debtors[debtor_idx];

            let amount = creditor.remaining.min(debtor.remaining);
            creditor.remaining -= amount;
            debtor.remaining -= amount;

            settlements.push(Settlement {
                from: debtor.member.clone(),
                to: creditor.member.clone(),
                amount: self.context.round(amount),
            });

            if self.context.is_negligible(creditor.remaining) {
                creditor_idx += 1;
            }
            if self.context.is_negligible(debtor.remaining) {
                debtor_idx += 1;
            }
        }

        if creditor_idx < creditors.len() || debtor_idx < debtors.len() {
            let residual = creditors[creditor_idx..]
                .iter()
                .map(|position| position.remaining)
                .chain(debtors[debtor_idx..].iter().map(|position| -position.remaining))
                .try_fold(Money::ZERO, Money::checked_add);
            tracing::warn!(
                residual = ?residual,
                unsettled_creditors = creditors.len() - creditor_idx,
                unsettled_debtors = debtors.len() - debtor_idx,
                "Balances do not sum to zero; residual left unsettled"
            );
        }

        settlements
    }
}

/// Applies `settlements` to `balances` as if each had been paid.
///
/// A payment cancels part of the debtor's debt and part of the creditor's
/// credit. Settlements naming members outside `balances` are ignored for
/// that member.
pub fn apply_settlements(balances: &[Balance], settlements: &[Settlement]) -> Vec<Balance> {
    let mut working: IndexMap<&MemberId, Money> = balances
        .iter()
        .map(|balance| (&balance.member, balance.net_amount))
        .collect();

    for settlement in settlements {
        if let Some(balance) = working.get_mut(&settlement.from) {
            *balance += settlement.amount;
        }
        if let Some(balance) = working.get_mut(&settlement.to) {
            *balance -= settlement.amount;
        }
    }

    working
        .into_iter()
        .map(|(member, net_amount)| Balance {
            member: member.clone(),
            net_amount,
        })
        .collect()
}
