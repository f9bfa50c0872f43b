//! Conversions between whole-unit decimals and on-chain integer units

use super::{WalletError, WalletResult};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Largest scale a `Decimal` can carry
const MAX_DECIMALS: u32 = 28;

/// 10^decimals as a Decimal
fn pow10(decimals: u32) -> WalletResult<Decimal> {
    if decimals > MAX_DECIMALS {
        return Err(WalletError::Unsupported(format!(
            "{} decimals exceeds the supported precision",
            decimals
        )));
    }
    Ok(Decimal::from_i128_with_scale(10i128.pow(decimals), 0))
}

/// Whole units to integer base units, truncating sub-unit dust
pub fn to_base_units(amount: Decimal, decimals: u32) -> WalletResult<u128> {
    if amount.is_sign_negative() {
        return Err(WalletError::Validation("amount must be positive".to_string()));
    }
    amount
        .checked_mul(pow10(decimals)?)
        .map(|scaled| scaled.trunc())
        .and_then(|scaled| scaled.to_u128())
        .ok_or_else(|| WalletError::Validation(format!("amount {} is too large", amount)))
}

/// Integer base units to whole units
pub fn from_base_units(raw: u128, decimals: u32) -> WalletResult<Decimal> {
    if decimals > MAX_DECIMALS {
        return Err(WalletError::Unsupported(format!(
            "{} decimals exceeds the supported precision",
            decimals
        )));
    }
    let out_of_range =
        || WalletError::OutOfRange(format!("{} base units at {} decimals", raw, decimals));
    let raw = i128::try_from(raw).map_err(|_| out_of_range())?;
    Decimal::try_from_i128_with_scale(raw, decimals)
        .map(|value| value.normalize())
        .map_err(|_| out_of_range())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn converts_to_base_units() {
        assert_eq!(to_base_units(dec("1.5"), 9).unwrap(), 1_500_000_000);
        assert_eq!(to_base_units(dec("10"), 6).unwrap(), 10_000_000);
        assert_eq!(to_base_units(dec("0.01"), 18).unwrap(), 10_000_000_000_000_000);
    }

    #[test]
    fn truncates_dust_below_precision() {
        assert_eq!(to_base_units(dec("0.1234567"), 6).unwrap(), 123_456);
    }

    #[test]
    fn converts_from_base_units() {
        assert_eq!(from_base_units(5_000_000, 6).unwrap(), dec("5"));
        assert_eq!(from_base_units(1_500_000_000, 9).unwrap(), dec("1.5"));
        assert_eq!(from_base_units(0, 18).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(to_base_units(dec("-1"), 6).is_err());
        assert!(to_base_units(dec("1"), 29).is_err());
        assert!(matches!(
            from_base_units(u128::MAX, 18),
            Err(WalletError::OutOfRange(_))
        ));
    }
}
