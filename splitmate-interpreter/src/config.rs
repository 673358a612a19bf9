use splitmate_domain::{RoundingMode, SettlementContext, services::MAX_SETTLEMENT_SCALE};
use std::{borrow::Cow, env};

const SCALE_VAR: &str = "SPLITMATE_SCALE";
const ROUNDING_VAR: &str = "SPLITMATE_ROUNDING";
const DEFAULT_SCALE: u32 = 2;

/// Interpreter configuration, read from the environment (and `.env`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpreterConfig {
    pub context: SettlementContext,
}

impl InterpreterConfig {
    pub fn from_env() -> Result<Self, Cow<'static, str>> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, Cow<'static, str>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let scale = match lookup(SCALE_VAR) {
            Some(raw) => parse_scale(&raw)?,
            None => DEFAULT_SCALE,
        };
        let rounding_mode = match lookup(ROUNDING_VAR) {
            Some(raw) => parse_rounding_mode(&raw)?,
            None => RoundingMode::default(),
        };

        let context = SettlementContext {
            rounding_mode,
            ..SettlementContext::for_scale(scale)
        };
        tracing::debug!(
            scale = context.scale,
            rounding_mode = ?context.rounding_mode,
            tolerance = %context.tolerance,
            "Interpreter configuration loaded"
        );

        Ok(Self { context })
    }
}

fn parse_scale(raw: &str) -> Result<u32, Cow<'static, str>> {
    let scale: u32 = raw
        .trim()
        .parse()
        .map_err(|_| format!("{SCALE_VAR} must be a non-negative integer (found '{raw}')"))?;
    if scale > MAX_SETTLEMENT_SCALE {
        return Err(
            format!("{SCALE_VAR} must be at most {MAX_SETTLEMENT_SCALE} (found {scale})").into(),
        );
    }
    Ok(scale)
}

fn parse_rounding_mode(raw: &str) -> Result<RoundingMode, Cow<'static, str>> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "half_up" => Ok(RoundingMode::HalfUp),
        "half_even" => Ok(RoundingMode::HalfEven),
        _ => Err(
            format!("{ROUNDING_VAR} must be 'half_up' or 'half_even' (found '{raw}')").into(),
        ),
    }
}
