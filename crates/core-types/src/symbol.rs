/// Strips the settlement-currency marker from a unified market symbol.
///
/// Derivative markets are named `BASE/QUOTE:SETTLE`, optionally followed by a
/// `-YYMMDD` expiry for delivery contracts. The settle part is dropped so that
/// spot and derivative naming converge on one key, while the expiry is kept
/// because two delivery contracts on the same pair are different instruments.
///
/// ```
/// use core_types::normalize_symbol;
///
/// assert_eq!(normalize_symbol("BTC/USDT:USDT"), "BTC/USDT");
/// assert_eq!(normalize_symbol("BTC/USDT:USDT-240628"), "BTC/USDT-240628");
/// assert_eq!(normalize_symbol("ETH/USDT"), "ETH/USDT");
/// ```
pub fn normalize_symbol(symbol: &str) -> String {
    match symbol.split_once(':') {
        Some((pair, settle)) => match settle.split_once('-') {
            Some((_, expiry)) => format!("{pair}-{expiry}"),
            None => pair.to_string(),
        },
        None => symbol.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::normalize_symbol;

    #[test]
    fn strips_linear_settlement_suffix() {
        assert_eq!(normalize_symbol("BTC/USDT:USDT"), "BTC/USDT");
        assert_eq!(normalize_symbol("ETH/USDC:USDC"), "ETH/USDC");
    }

    #[test]
    fn leaves_unsuffixed_symbols_alone() {
        assert_eq!(normalize_symbol("BTC/USDT"), "BTC/USDT");
        assert_eq!(normalize_symbol("BTCUSDT"), "BTCUSDT");
    }

    #[test]
    fn keeps_delivery_expiry() {
        assert_eq!(normalize_symbol("BTC/USDT:USDT-250926"), "BTC/USDT-250926");
    }
}
