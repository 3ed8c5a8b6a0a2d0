use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// A named instrument and its latest synthetic price.
///
/// Serialised with the item attribute names used by the price table, so a
/// stored row reads `{"TickerName": "Index_1", "Price": 101.25}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    #[serde(rename = "TickerName")]
    pub id: String,
    #[serde(rename = "Price")]
    pub price: f64,
}

impl Ticker {
    pub fn new(id: impl Into<String>, price: f64) -> Self {
        Self {
            id: id.into(),
            price,
        }
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {:.4}", self.id, self.price)
    }
}

/// Builds `count` tickers named `{prefix}{n}` (1-based) with opening prices
/// drawn from `80.0..150.0`.
pub fn default_tickers<R: Rng + ?Sized>(prefix: &str, count: usize, rng: &mut R) -> Vec<Ticker> {
    (1..=count)
        .map(|n| Ticker::new(format!("{prefix}{n}"), rng.gen_range(80.0..150.0)))
        .collect()
}
