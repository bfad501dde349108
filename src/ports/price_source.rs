use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Price source error type
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("No quotes for {symbol} {month}")]
    NotFound { symbol: String, month: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Data parsing error: {0}")]
    Parse(String),
}

/// One settlement of an outright contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutrightQuote {
    pub date: NaiveDate,
    /// Contract code, e.g. "Mar25"
    pub contract: String,
    pub price: f64,
}

impl OutrightQuote {
    pub fn new(date: NaiveDate, contract: &str, price: f64) -> Self {
        Self {
            date,
            contract: contract.to_string(),
            price,
        }
    }
}

/// Historical outright data port
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Quotes for `symbol` from its `month` sheet (e.g. "Mar"), in any order.
    ///
    /// A sheet can hold several years of the same month; callers filter by
    /// contract code.
    async fn outright_quotes(&self, symbol: &str, month: &str)
        -> Result<Vec<OutrightQuote>, SourceError>;

    /// Exchange trading days, ascending
    async fn trading_calendar(&self) -> Result<Vec<NaiveDate>, SourceError>;
}
