use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeeError {
    #[error("amount must be greater than zero")]
    InvalidAmount,
    #[error("amount does not fit in minor units")]
    AmountOutOfRange,
}

/// Split of a gross amount between the platform and the bar owner,
/// in major currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    pub platform_fee: Decimal,
    pub owner_amount: Decimal,
}

/// Compute the platform fee and owner payout for a gross amount.
///
/// The fee is rounded in major units to the nearest whole currency unit,
/// half away from zero, before any conversion to minor units. Fee and gross
/// are converted to cents independently and exactly once each, so
/// `platform_fee + owner_amount == amount` holds exactly.
pub fn compute_split(amount: Decimal, rate: Decimal) -> Result<FeeSplit, FeeError> {
    if amount <= Decimal::ZERO {
        return Err(FeeError::InvalidAmount);
    }

    let platform_fee =
        (amount * rate).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let owner_amount = amount - platform_fee;

    Ok(FeeSplit {
        platform_fee,
        owner_amount,
    })
}

/// Convert a major-unit amount to minor units (cents), rounding half away
/// from zero. Callers must convert each value exactly once.
pub fn to_minor_units(amount: Decimal) -> Result<i64, FeeError> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or(FeeError::AmountOutOfRange)
}
