//! Rounding and tolerance helpers shared by the balance fold and the
//! settlement planner.
//!
//! Finalized balances are quantized to the atomic unit of the currency
//! (0.01 for a two-decimal currency) in a single pass. Independent rounding
//! can leave the rounded balances a few units away from zero-sum, so
//! [`quantize_balances`] applies the smallest number of one-unit adjustments
//! that restores an exact zero total:
//! 1. Balances are rounded to the atomic unit
//! 2. `V_int = Σ q_i` (the rounded total in atomic units) is computed
//! 3. `|V_int|` members receive a one-unit adjustment, preferring those who
//!    gained most from rounding, ties resolved by accumulator order

use crate::{
    error::SettlementRoundingError,
    model::{MemberBalances, Money},
};
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};

const EPSILON_OP_COUNT_BUDGET: i64 = 1_000_000;
const EPSILON_SAFETY_FACTOR: i64 = 100;
pub const MAX_SETTLEMENT_SCALE: u32 = 22;

/// Rounding mode for currency quantization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RoundingMode {
    /// Round half away from zero (e.g., 0.005 -> 0.01, -0.005 -> -0.01).
    #[default]
    HalfUp,
    /// Round half to nearest even number (banker's rounding).
    HalfEven,
}

impl RoundingMode {
    fn strategy(self) -> RoundingStrategy {
        match self {
            RoundingMode::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            RoundingMode::HalfEven => RoundingStrategy::MidpointNearestEven,
        }
    }
}

/// Currency precision and tolerance used by every computation stage.
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use splitmate_domain::services::{RoundingMode, SettlementContext};
///
/// let ctx = SettlementContext::for_scale(2);
/// assert_eq!(ctx.rounding_mode, RoundingMode::HalfUp);
/// assert_eq!(ctx.tolerance, Decimal::new(5, 3));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SettlementContext {
    /// Number of decimal places of the atomic unit (2 for cents).
    pub scale: u32,
    pub rounding_mode: RoundingMode,
    /// Magnitudes at or below this are treated as zero.
    pub tolerance: Decimal,
}

impl SettlementContext {
    /// Context whose tolerance is half an atomic unit of `scale`.
    pub fn for_scale(scale: u32) -> Self {
        Self {
            scale,
            rounding_mode: RoundingMode::HalfUp,
            tolerance: Decimal::new(5, scale.min(MAX_SETTLEMENT_SCALE) + 1),
        }
    }

    /// Two-decimal currency, half-up rounding, 0.005 tolerance.
    pub fn cents_default() -> Self {
        Self::for_scale(2)
    }

    pub fn atomic_unit(self) -> Decimal {
        Decimal::new(1, self.scale.min(MAX_SETTLEMENT_SCALE))
    }

    /// Rounds `amount` to the context scale.
    pub fn round(self, amount: Money) -> Money {
        Money::from_decimal(
            amount
                .as_decimal()
                .round_dp_with_strategy(self.scale, self.rounding_mode.strategy()),
        )
    }

    pub fn is_negligible(self, amount: Money) -> bool {
        amount.as_decimal().abs() <= self.tolerance
    }
}

impl Default for SettlementContext {
    fn default() -> Self {
        Self::cents_default()
    }
}

/// Folds `total - Σ shares` into the first share so the shares add up to
/// `total` exactly. Returns the residual that was folded in, or `None`
/// (shares untouched) when the arithmetic leaves the `Decimal` range.
pub fn reconcile_shares(shares: &mut [Money], total: Money) -> Option<Money> {
    let shares_total = checked_total(shares.iter().copied())?;
    let residual = total.checked_sub(shares_total)?;
    if !residual.is_zero() {
        if let Some(first) = shares.first_mut() {
            *first = first.checked_add(residual)?;
        }
    }
    Some(residual)
}

fn checked_total(amounts: impl IntoIterator<Item = Money>) -> Option<Money> {
    amounts
        .into_iter()
        .try_fold(Money::ZERO, |acc, amount| acc.checked_add(amount))
}

/// Quantizes member balances to the atomic unit with zero-sum constraint.
///
/// # Returns
/// * `Ok(MemberBalances)` - Quantized balances that sum to exactly zero, in
///   the input order
/// * `Err(SettlementRoundingError)` - If the input is not zero-sum or the
///   scale is unsupported
pub fn quantize_balances(
    balances: &MemberBalances,
    context: SettlementContext,
) -> Result<MemberBalances, SettlementRoundingError> {
    validate_scale(context.scale)?;
    let atomic_unit = context.atomic_unit();
    let epsilon = settlement_epsilon(context.scale);
    let Some(original_sum) = checked_total(balances.values().copied()) else {
        tracing::error!(
            reject_reason = "total_overflow",
            member_count = balances.len(),
            "Balance quantization rejected due to out-of-range total"
        );
        return Err(SettlementRoundingError::TotalOverflow);
    };
    if original_sum.abs().as_decimal() > epsilon {
        tracing::error!(
            reject_reason = "input_imbalance",
            member_count = balances.len(),
            atomic_unit = %atomic_unit,
            epsilon = %epsilon,
            sum_original = %original_sum,
            "Balance quantization rejected due to input imbalance"
        );
        return Err(SettlementRoundingError::ImbalancedTotal(original_sum));
    }

    let strategy = context.rounding_mode.strategy();

    // (original, q_i, rounded, diff)
    let mut entries: Vec<(Decimal, i128, Decimal, Decimal)> = balances
        .values()
        .map(|money| {
            let original = money.as_decimal();
            let q_i = quantize_to_int(original, atomic_unit, strategy)?;
            let rounded = Decimal::from(q_i) * atomic_unit;
            Ok((original, q_i, rounded, rounded - original))
        })
        .collect::<Result<Vec<_>, SettlementRoundingError>>()?;

    let v_int = entries.iter().try_fold(0_i128, |acc, (_, q_i, _, _)| {
        acc.checked_add(*q_i)
            .ok_or(SettlementRoundingError::InvalidAdjustmentCount)
    })?;

    if v_int != 0 {
        let adjustment_count = v_int
            .checked_abs()
            .and_then(|count| usize::try_from(count).ok())
            .ok_or(SettlementRoundingError::InvalidAdjustmentCount)?;

        if adjustment_count > entries.len() {
            tracing::error!(
                reject_reason = "k_gt_n",
                v_int,
                adjustment_count,
                member_count = entries.len(),
                sum_original = %original_sum,
                "Adjustment count exceeds member count during balance quantization"
            );
            return Err(SettlementRoundingError::InvalidAdjustmentCount);
        }

        let score_sign = if v_int > 0 {
            Decimal::ONE
        } else {
            Decimal::NEGATIVE_ONE
        };

        // V_int > 0: take a unit back from those who gained most from rounding.
        // V_int < 0: give a unit to those who lost most.
        let mut ranked: Vec<(usize, Decimal)> = entries
            .iter()
            .enumerate()
            .map(|(idx, (_, _, _, diff))| (idx, *diff * score_sign))
            .collect();
        ranked.sort_by(|(idx_a, score_a), (idx_b, score_b)| {
            score_b.cmp(score_a).then_with(|| idx_a.cmp(idx_b))
        });

        let adjustment = if v_int > 0 { -atomic_unit } else { atomic_unit };
        let selected: Vec<usize> = ranked
            .iter()
            .take(adjustment_count)
            .map(|(idx, _)| *idx)
            .collect();

        tracing::debug!(
            v_int,
            adjustment_count,
            selected = ?selected,
            member_count = entries.len(),
            sum_original = %original_sum,
            "Balance quantization zero-sum repair"
        );

        for idx in &selected {
            entries[*idx].2 += adjustment;
        }

        let repaired = checked_total(
            entries
                .iter()
                .map(|(_, _, rounded, _)| Money::from_decimal(*rounded)),
        );
        if repaired != Some(Money::ZERO) {
            tracing::error!(
                reject_reason = "zero_sum_invariant_violation",
                member_count = entries.len(),
                repaired_sum = ?repaired,
                "Balance quantization failed zero-sum invariant check"
            );
            return Err(SettlementRoundingError::ZeroSumInvariantViolation);
        }
    }

    Ok(balances
        .keys()
        .cloned()
        .zip(
            entries
                .into_iter()
                .map(|(_, _, rounded, _)| Money::from_decimal(rounded)),
        )
        .collect())
}

fn settlement_epsilon(scale: u32) -> Decimal {
    let baseline = Decimal::new(1, (scale + 6).min(28));
    let epsilon_min = Decimal::from(EPSILON_SAFETY_FACTOR * EPSILON_OP_COUNT_BUDGET)
        * Decimal::from_i128_with_scale(1, 28);
    baseline.max(epsilon_min)
}

fn validate_scale(scale: u32) -> Result<(), SettlementRoundingError> {
    if scale <= MAX_SETTLEMENT_SCALE {
        return Ok(());
    }
    Err(SettlementRoundingError::UnsupportedScale {
        scale,
        max_supported: MAX_SETTLEMENT_SCALE,
    })
}

fn quantize_to_int(
    original: Decimal,
    atomic_unit: Decimal,
    strategy: RoundingStrategy,
) -> Result<i128, SettlementRoundingError> {
    let q_i = original
        .checked_div(atomic_unit)
        .map(|units| units.round_dp_with_strategy(0, strategy))
        .and_then(|units| units.to_i128());
    let Some(q_i) = q_i else {
        tracing::warn!(
            reject_reason = "quantize_failure",
            original = %original,
            atomic_unit = %atomic_unit,
            "Quantization unit conversion failed"
        );
        return Err(SettlementRoundingError::NonIntegral);
    };
    Ok(q_i)
}
