//! The enumerated market universe: feed sources, trading pairs, query
//! periods, metrics and data modes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{
    MarketflowError, INVALID_METRIC, INVALID_MODE, INVALID_PAIR, INVALID_PERIOD, INVALID_SOURCE,
};

/// Feed identities, plus the cross-source `All` aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    Source1,
    Source2,
    Source3,
    All,
}

impl Source {
    /// Concrete feeds, excluding `All`
    pub const FEEDS: [Source; 3] = [Source::Source1, Source::Source2, Source::Source3];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Source1 => "Source1",
            Source::Source2 => "Source2",
            Source::Source3 => "Source3",
            Source::All => crate::aggregate::ALL_SOURCES,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Source::All)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Source {
    type Err = MarketflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Source1" => Ok(Source::Source1),
            "Source2" => Ok(Source::Source2),
            "Source3" => Ok(Source::Source3),
            "All" => Ok(Source::All),
            _ => Err(MarketflowError::validation(INVALID_SOURCE)),
        }
    }
}

/// Supported trading pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pair {
    #[serde(rename = "BTCUSDT")]
    BtcUsdt,
    #[serde(rename = "DOGEUSDT")]
    DogeUsdt,
    #[serde(rename = "TONUSDT")]
    TonUsdt,
    #[serde(rename = "SOLUSDT")]
    SolUsdt,
    #[serde(rename = "ETHUSDT")]
    EthUsdt,
}

impl Pair {
    pub const ALL: [Pair; 5] = [
        Pair::BtcUsdt,
        Pair::DogeUsdt,
        Pair::TonUsdt,
        Pair::SolUsdt,
        Pair::EthUsdt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Pair::BtcUsdt => "BTCUSDT",
            Pair::DogeUsdt => "DOGEUSDT",
            Pair::TonUsdt => "TONUSDT",
            Pair::SolUsdt => "SOLUSDT",
            Pair::EthUsdt => "ETHUSDT",
        }
    }

    /// Reference price the synthetic generator fluctuates around
    pub fn base_price(&self) -> f64 {
        match self {
            Pair::BtcUsdt => 60000.0,
            Pair::DogeUsdt => 0.15,
            Pair::TonUsdt => 5.0,
            Pair::SolUsdt => 150.0,
            Pair::EthUsdt => 3000.0,
        }
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Pair {
    type Err = MarketflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pair::ALL
            .into_iter()
            .find(|pair| pair.as_str() == s)
            .ok_or_else(|| MarketflowError::validation(INVALID_PAIR))
    }
}

/// Lookback window for range queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "1s")]
    OneSecond,
    #[serde(rename = "3s")]
    ThreeSeconds,
    #[serde(rename = "5s")]
    FiveSeconds,
    #[serde(rename = "10s")]
    TenSeconds,
    #[serde(rename = "30s")]
    ThirtySeconds,
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "3m")]
    ThreeMinutes,
    #[serde(rename = "5m")]
    FiveMinutes,
}

impl Period {
    pub const ALL: [Period; 8] = [
        Period::OneSecond,
        Period::ThreeSeconds,
        Period::FiveSeconds,
        Period::TenSeconds,
        Period::ThirtySeconds,
        Period::OneMinute,
        Period::ThreeMinutes,
        Period::FiveMinutes,
    ];

    /// Get the duration for this period
    pub fn duration(&self) -> Duration {
        match self {
            Period::OneSecond => Duration::from_secs(1),
            Period::ThreeSeconds => Duration::from_secs(3),
            Period::FiveSeconds => Duration::from_secs(5),
            Period::TenSeconds => Duration::from_secs(10),
            Period::ThirtySeconds => Duration::from_secs(30),
            Period::OneMinute => Duration::from_secs(60),
            Period::ThreeMinutes => Duration::from_secs(180),
            Period::FiveMinutes => Duration::from_secs(300),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::OneSecond => "1s",
            Period::ThreeSeconds => "3s",
            Period::FiveSeconds => "5s",
            Period::TenSeconds => "10s",
            Period::ThirtySeconds => "30s",
            Period::OneMinute => "1m",
            Period::ThreeMinutes => "3m",
            Period::FiveMinutes => "5m",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Period {
    type Err = MarketflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Period::ALL
            .into_iter()
            .find(|period| period.as_str() == s)
            .ok_or_else(|| MarketflowError::validation(INVALID_PERIOD))
    }
}

/// Price metric requested over HTTP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Highest,
    Lowest,
    Average,
    Latest,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Highest => "highest",
            Metric::Lowest => "lowest",
            Metric::Average => "average",
            Metric::Latest => "latest",
        }
    }
}

impl FromStr for Metric {
    type Err = MarketflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "highest" => Ok(Metric::Highest),
            "lowest" => Ok(Metric::Lowest),
            "average" => Ok(Metric::Average),
            "latest" => Ok(Metric::Latest),
            _ => Err(MarketflowError::validation(INVALID_METRIC)),
        }
    }
}

/// Which side of the price range an extreme query asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extreme {
    Highest,
    Lowest,
}

impl Extreme {
    /// Pick the more extreme of two prices
    pub fn pick(&self, a: f64, b: f64) -> f64 {
        match self {
            Extreme::Highest => a.max(b),
            Extreme::Lowest => a.min(b),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Extreme::Highest => "highest",
            Extreme::Lowest => "lowest",
        }
    }
}

impl fmt::Display for Extreme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Active data source implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// TCP feeds
    Live,
    /// Synthetic generator
    Test,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Live => "live",
            Mode::Test => "test",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Mode {
    type Err = MarketflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "live" => Ok(Mode::Live),
            "test" => Ok(Mode::Test),
            _ => Err(MarketflowError::validation(INVALID_MODE)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_parsing() {
        assert_eq!("Source2".parse::<Source>().unwrap(), Source::Source2);
        assert_eq!("All".parse::<Source>().unwrap(), Source::All);

        let err = "Source9".parse::<Source>().unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), INVALID_SOURCE);
    }

    #[test]
    fn test_pair_parsing() {
        assert_eq!("ETHUSDT".parse::<Pair>().unwrap(), Pair::EthUsdt);
        assert!("FAKECOIN".parse::<Pair>().unwrap_err().is_validation());
    }

    #[test]
    fn test_period_parsing() {
        assert_eq!("3m".parse::<Period>().unwrap(), Period::ThreeMinutes);
        assert_eq!(
            "10s".parse::<Period>().unwrap().duration(),
            Duration::from_secs(10)
        );
        assert!("7m".parse::<Period>().unwrap_err().is_validation());
    }

    #[test]
    fn test_period_tokens_are_case_sensitive() {
        assert!("1M".parse::<Period>().unwrap_err().is_validation());
        assert!("5S".parse::<Period>().unwrap_err().is_validation());
        assert!(" 1m".parse::<Period>().is_err());
    }

    #[test]
    fn test_period_serde_names() {
        let json = serde_json::to_string(&Period::FiveMinutes).unwrap();
        assert_eq!(json, "\"5m\"");
    }

    #[test]
    fn test_mode_and_metric_parsing() {
        assert_eq!("live".parse::<Mode>().unwrap(), Mode::Live);
        assert_eq!("TEST".parse::<Mode>().unwrap(), Mode::Test);
        assert!("replay".parse::<Mode>().is_err());
        assert_eq!("average".parse::<Metric>().unwrap(), Metric::Average);
        assert!("median".parse::<Metric>().is_err());
    }

    #[test]
    fn test_extreme_pick() {
        assert_eq!(Extreme::Highest.pick(1.0, 2.0), 2.0);
        assert_eq!(Extreme::Lowest.pick(1.0, 2.0), 1.0);
    }
}
