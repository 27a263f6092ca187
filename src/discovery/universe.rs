use crate::api::{MarketData, Ticker24h};
use crate::models::Trade;

/// Used when the 24h ticker cannot be fetched
pub const TOP_PAIRS: [&str; 20] = [
    "BTCUSDT", "ETHUSDT", "BNBUSDT", "SOLUSDT", "XRPUSDT", "ADAUSDT", "AVAXUSDT", "DOGEUSDT",
    "DOTUSDT", "TRXUSDT", "LINKUSDT", "MATICUSDT", "LTCUSDT", "BCHUSDT", "ATOMUSDT", "XLMUSDT",
    "UNIUSDT", "FILUSDT", "HBARUSDT", "NEARUSDT",
];

/// Stablecoins, fiat and pegged assets: nothing for RSI to trade
const EXCLUDED_BASES: &[&str] = &[
    "USDC", "FDUSD", "TUSD", "BUSD", "DAI", "USDP", "USDD", "PYUSD", "USDE", "EUR", "GBP", "AEUR",
    "EURI", "TRY", "BRL", "PAXG", "WBTC", "WBETH",
];

const LEVERAGED_SUFFIXES: &[&str] = &["UP", "DOWN", "BULL", "BEAR"];

/// Why a ticker is not scanned, `None` if it is eligible
///
/// Checks, in order:
/// 1. USDT quote
/// 2. Stablecoin / fiat / pegged base
/// 3. Leveraged token
/// 4. Minimum 24h quote volume
pub fn exclusion_reason(ticker: &Ticker24h, min_quote_volume: f64) -> Option<String> {
    let Some(base) = ticker.symbol.strip_suffix("USDT") else {
        return Some("NotUsdtQuoted".to_string());
    };

    if base.is_empty() || EXCLUDED_BASES.contains(&base) {
        return Some(format!("Blacklisted: {}", base));
    }

    if LEVERAGED_SUFFIXES
        .iter()
        .any(|suffix| base.len() > suffix.len() && base.ends_with(suffix))
    {
        return Some(format!("LeveragedToken: {}", base));
    }

    if !ticker.quote_volume.is_finite() || ticker.quote_volume < min_quote_volume {
        return Some(format!("LowVolume: ${:.0}/24h", ticker.quote_volume));
    }

    None
}

/// Top `size` eligible symbols by 24h quote volume
pub fn select_universe(tickers: &[Ticker24h], size: usize, min_quote_volume: f64) -> Vec<String> {
    let mut eligible: Vec<&Ticker24h> = tickers
        .iter()
        .filter(|t| exclusion_reason(t, min_quote_volume).is_none())
        .collect();

    eligible.sort_by(|a, b| b.quote_volume.total_cmp(&a.quote_volume));

    eligible
        .into_iter()
        .take(size)
        .map(|t| t.symbol.clone())
        .collect()
}

/// Append symbols with open trades so they keep being monitored for exit
pub fn with_open_symbols(mut symbols: Vec<String>, open: &[Trade]) -> Vec<String> {
    for trade in open {
        if !symbols.iter().any(|s| s == &trade.symbol) {
            symbols.push(trade.symbol.clone());
        }
    }
    symbols
}

/// Symbols to scan this cycle
pub async fn build_universe(
    market: &dyn MarketData,
    size: usize,
    min_quote_volume: f64,
    open: &[Trade],
) -> Vec<String> {
    let symbols = match market.tickers_24h().await {
        Ok(tickers) => {
            let selected = select_universe(&tickers, size, min_quote_volume);
            if selected.is_empty() {
                tracing::warn!("No ticker passed the universe filters, using top pairs");
                top_pairs(size)
            } else {
                selected
            }
        }
        Err(e) => {
            tracing::warn!("24h ticker unavailable ({}), using top pairs", e);
            top_pairs(size)
        }
    };

    with_open_symbols(symbols, open)
}

fn top_pairs(size: usize) -> Vec<String> {
    TOP_PAIRS.iter().take(size).map(|s| s.to_string()).collect()
}
