use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    BtcUsd,
    EthUsd,
    SolUsd,
}

impl Market {
    pub const ALL: [Market; 3] = [Market::BtcUsd, Market::EthUsd, Market::SolUsd];

    pub fn as_str(&self) -> &'static str {
        match self {
            Market::BtcUsd => "btc",
            Market::EthUsd => "eth",
            Market::SolUsd => "sol",
        }
    }

    /// Base asset ticker.
    pub fn symbol(&self) -> &'static str {
        match self {
            Market::BtcUsd => "BTC",
            Market::EthUsd => "ETH",
            Market::SolUsd => "SOL",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Market::BtcUsd => "BTC/USD",
            Market::EthUsd => "ETH/USD",
            Market::SolUsd => "SOL/USD",
        }
    }

    /// Pyth price feed id, canonical form (lowercase, no `0x`).
    pub fn pyth_feed_id(&self) -> &'static str {
        match self {
            Market::BtcUsd => "e62df6c8b4a85fe1a67db44dc12de5db330f7ac66b72dc658afedf0f4a415b43",
            Market::EthUsd => "ff61491a931112ddf1bd8147cd1b641375f79f5825126d665480874634fd0ace",
            Market::SolUsd => "ef0d8b6fda2ceba41da15d4095d1da392a0d2f8ed0c6c7bc0f4cfac8c280b56d",
        }
    }

    pub fn from_feed_id(feed_id: &str) -> Option<Self> {
        let canon = canon_feed_id(feed_id);
        Self::ALL.into_iter().find(|m| m.pyth_feed_id() == canon)
    }

    /// Key under which leaderboard series for this market are persisted.
    pub fn series_key(&self) -> String {
        format!("lb-pnl-{}", self.as_str())
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Market {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "btc" | "btcusd" | "btc/usd" | "btc_usd" => Ok(Market::BtcUsd),
            "eth" | "ethusd" | "eth/usd" | "eth_usd" => Ok(Market::EthUsd),
            "sol" | "solusd" | "sol/usd" | "sol_usd" => Ok(Market::SolUsd),
            other => Err(anyhow!("unknown market: {}", other)),
        }
    }
}

/// Lowercase and strip a leading `0x`.
pub fn canon_feed_id(id: &str) -> String {
    let lower = id.trim().to_ascii_lowercase();
    lower
        .strip_prefix("0x")
        .map(str::to_string)
        .unwrap_or(lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_id_lookup_accepts_prefixed_ids() {
        let id = "0xE62DF6C8B4A85FE1A67DB44DC12DE5DB330F7AC66B72DC658AFEDF0F4A415B43";
        assert_eq!(Market::from_feed_id(id), Some(Market::BtcUsd));
        assert_eq!(Market::from_feed_id("0xdeadbeef"), None);
    }

    #[test]
    fn test_parse_market_names() {
        assert_eq!("ETH/USD".parse::<Market>().unwrap(), Market::EthUsd);
        assert_eq!("sol".parse::<Market>().unwrap(), Market::SolUsd);
        assert!("doge".parse::<Market>().is_err());
        assert_eq!(Market::BtcUsd.series_key(), "lb-pnl-btc");
    }

    #[test]
    fn test_symbol_and_display_name() {
        assert_eq!(Market::EthUsd.symbol(), "ETH");
        assert_eq!(Market::SolUsd.display_name(), "SOL/USD");
        assert_eq!(Market::BtcUsd.to_string(), "BTC/USD");
    }
}
