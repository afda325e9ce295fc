//! # Symbol groups
//! Static symbol sets used to filter article queries, plus the generic
//! fallback tags given to headlines that are not yet tied to a ticker.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Tag for general market headlines awaiting a more specific symbol.
pub const MARKET_SYMBOL: &str = "MARKET";
/// Older fallback tag, still present on some stored rows.
pub const GENERAL_SYMBOL: &str = "GENERAL";
/// Category stored with general headlines.
pub const GENERAL_CATEGORY: &str = "General";

pub const FALLBACK_SYMBOLS: &[&str] = &[MARKET_SYMBOL, GENERAL_SYMBOL];

pub const INDEX_FUND_CATEGORY: &str = "Index Fund";
pub const MEGA_CAP_CATEGORY: &str = "Mega Cap";

/// True if `symbol` is a placeholder tag rather than a real ticker.
pub fn is_fallback_symbol(symbol: &str) -> bool {
    FALLBACK_SYMBOLS
        .iter()
        .any(|s| s.eq_ignore_ascii_case(symbol.trim()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SymbolGroup {
    IndexFunds,
    MegaCap,
}

impl SymbolGroup {
    pub const ALL: [SymbolGroup; 2] = [SymbolGroup::IndexFunds, SymbolGroup::MegaCap];

    pub fn symbols(self) -> &'static [&'static str] {
        match self {
            SymbolGroup::IndexFunds => &["SPY", "QQQ", "DIA"],
            SymbolGroup::MegaCap => &["AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "TSLA"],
        }
    }

    pub fn category(self) -> &'static str {
        match self {
            SymbolGroup::IndexFunds => INDEX_FUND_CATEGORY,
            SymbolGroup::MegaCap => MEGA_CAP_CATEGORY,
        }
    }

    /// Group that contains `symbol`, if any.
    pub fn of(symbol: &str) -> Option<SymbolGroup> {
        Self::ALL.into_iter().find(|g| {
            g.symbols()
                .iter()
                .any(|s| s.eq_ignore_ascii_case(symbol.trim()))
        })
    }
}

impl fmt::Display for SymbolGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolGroup::IndexFunds => f.write_str("index-funds"),
            SymbolGroup::MegaCap => f.write_str("mega-cap"),
        }
    }
}

impl FromStr for SymbolGroup {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match norm.as_str() {
            "index" | "indexfund" | "indexfunds" | "etf" | "etfs" => Ok(SymbolGroup::IndexFunds),
            "megacap" | "megacaps" | "bigtech" => Ok(SymbolGroup::MegaCap),
            _ => anyhow::bail!("unknown symbol group: {s}"),
        }
    }
}

/// Uppercase and trim a ticker as supplied by callers.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_parse_from_loose_names() {
        assert_eq!("index".parse::<SymbolGroup>().unwrap(), SymbolGroup::IndexFunds);
        assert_eq!("Index Funds".parse::<SymbolGroup>().unwrap(), SymbolGroup::IndexFunds);
        assert_eq!("mega-cap".parse::<SymbolGroup>().unwrap(), SymbolGroup::MegaCap);
        assert!("smallcaps".parse::<SymbolGroup>().is_err());
    }

    #[test]
    fn fallback_symbols_are_case_insensitive() {
        assert!(is_fallback_symbol("market"));
        assert!(is_fallback_symbol(" GENERAL "));
        assert!(!is_fallback_symbol("SPY"));
    }

    #[test]
    fn membership_lookup() {
        assert_eq!(SymbolGroup::of("dia"), Some(SymbolGroup::IndexFunds));
        assert_eq!(SymbolGroup::of("NVDA"), Some(SymbolGroup::MegaCap));
        assert_eq!(SymbolGroup::of("IBM"), None);
    }
}
