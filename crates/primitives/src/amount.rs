use alloy_primitives::{
    U256,
    utils::{ParseUnits, format_units, parse_units},
};
use eyre::{Result, WrapErr, bail};

/// Format a raw token amount with `decimals` fractional digits, dropping
/// trailing zeros (`1500000000000000000` with 18 decimals is `"1.5"`).
pub fn format_amount(raw: U256, decimals: u8) -> String {
    match format_units(raw, decimals) {
        Ok(formatted) => trim_fraction(formatted),
        Err(_) => raw.to_string(),
    }
}

/// Parse a whole-token decimal string (e.g. `"1000"` or `"0.5"`) into the
/// token's smallest unit.
pub fn parse_amount(value: &str, decimals: u8) -> Result<U256> {
    let parsed = parse_units(value.trim(), decimals)
        .wrap_err_with(|| format!("invalid token amount `{value}`"))?;
    match parsed {
        ParseUnits::U256(amount) => Ok(amount),
        ParseUnits::I256(_) => bail!("token amount `{value}` must not be negative"),
    }
}

fn trim_fraction(mut formatted: String) -> String {
    if formatted.contains('.') {
        let trimmed = formatted.trim_end_matches('0').trim_end_matches('.').len();
        formatted.truncate(trimmed);
    }
    formatted
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;

    #[test]
    fn formats_fractional_amounts() {
        assert_eq!(format_amount(U256::from(ONE_TOKEN + ONE_TOKEN / 2), 18), "1.5");
        assert_eq!(format_amount(U256::from(1), 18), "0.000000000000000001");
    }

    #[test]
    fn formats_whole_amounts_without_fraction() {
        assert_eq!(format_amount(U256::from(2 * ONE_TOKEN), 18), "2");
        assert_eq!(format_amount(U256::from(42), 0), "42");
        assert_eq!(format_amount(U256::ZERO, 6), "0");
    }

    #[test]
    fn keeps_precision_beyond_u128() {
        let raw = U256::from(u128::MAX) * U256::from(10);
        let formatted = format_amount(raw, 0);
        assert_eq!(formatted, raw.to_string());
    }

    #[test]
    fn parses_thresholds() {
        assert_eq!(parse_amount("1000", 18).unwrap(), U256::from(1000 * ONE_TOKEN));
        assert_eq!(parse_amount("0.5", 6).unwrap(), U256::from(500_000));
        assert_eq!(parse_amount(" 0 ", 18).unwrap(), U256::ZERO);
    }

    #[test]
    fn rejects_invalid_thresholds() {
        assert!(parse_amount("abc", 18).is_err());
        assert!(parse_amount("-5", 18).is_err());
    }
}
