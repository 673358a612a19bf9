use splitmate_domain::{LedgerSummary, Money};
use std::fmt::Write as _;

/// Plain-text rendering of a group summary.
pub fn render_summary(summary: &LedgerSummary, scale: u32) -> String {
    let mut out = String::new();
    let width = summary
        .balances
        .iter()
        .map(|balance| balance.member.as_str().len())
        .chain(
            summary
                .settlements
                .iter()
                .map(|s| s.from.as_str().len().max(s.to.as_str().len())),
        )
        .max()
        .unwrap_or(0);

    out.push_str("Balances\n");
    for balance in &summary.balances {
        let sign = if balance.net_amount.is_negative() {
            ""
        } else {
            "+"
        };
        let _ = writeln!(
            out,
            "  {:<width$}  {sign}{}",
            balance.member,
            format_money(balance.net_amount, scale),
        );
    }

    out.push_str("Settlements\n");
    if summary.settlements.is_empty() {
        out.push_str("  (all settled)\n");
    }
    for settlement in &summary.settlements {
        let _ = writeln!(
            out,
            "  {:<width$} -> {:<width$}  {}",
            settlement.from,
            settlement.to,
            format_money(settlement.amount, scale),
        );
    }

    if !summary.warnings.is_empty() || !summary.skipped.is_empty() {
        out.push_str("Warnings\n");
        for warning in &summary.warnings {
            let _ = writeln!(out, "  {warning}");
        }
        for skipped in &summary.skipped {
            let _ = writeln!(out, "  skipped: {skipped}");
        }
    }

    out
}

fn format_money(amount: Money, scale: u32) -> String {
    let precision = scale as usize;
    format!("{:.precision$}", amount.as_decimal())
}

#[cfg(test)]
mod tests {
    use super::*;
    use splitmate_domain::{Balance, ExpenseId, InvalidExpenseError, MemberId, Settlement};

    fn balance(member: &str, cents: i64) -> Balance {
        Balance {
            member: MemberId::from(member),
            net_amount: Money::new(cents, 2),
        }
    }

    #[test]
    fn renders_balances_and_settlements() {
        let summary = LedgerSummary {
            balances: vec![balance("alice", 6000), balance("bob", -3000), balance("cy", -3000)],
            settlements: vec![
                Settlement {
                    from: MemberId::from("bob"),
                    to: MemberId::from("alice"),
                    amount: Money::from_i64(30),
                },
                Settlement {
                    from: MemberId::from("cy"),
                    to: MemberId::from("alice"),
                    amount: Money::from_i64(30),
                },
            ],
            ..LedgerSummary::default()
        };

        let expected = "\
Balances
  alice  +60.00
  bob    -30.00
  cy     -30.00
Settlements
  bob   -> alice  30.00
  cy    -> alice  30.00
";
        assert_eq!(render_summary(&summary, 2), expected);
    }

    #[test]
    fn renders_settled_group_and_skipped_records() {
        let summary = LedgerSummary {
            balances: vec![balance("a", 0)],
            skipped: vec![InvalidExpenseError::NoParticipants {
                expense: ExpenseId::from("e9"),
            }],
            ..LedgerSummary::default()
        };

        let expected = "\
Balances
  a  +0.00
Settlements
  (all settled)
Warnings
  skipped: expense e9 is split equally among zero participants
";
        assert_eq!(render_summary(&summary, 2), expected);
    }

    #[test]
    fn pads_to_requested_scale() {
        assert_eq!(format_money(Money::from_i64(5), 0), "5");
        assert_eq!(format_money(Money::new(5, 1), 3), "0.500");
    }
}
