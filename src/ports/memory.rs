//! In-memory price source, for tests and fixtures.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use super::price_source::{OutrightQuote, PriceSource, SourceError};

/// Price source backed by preloaded quotes that records every fetch
#[derive(Debug, Default, Clone)]
pub struct InMemorySource {
    quotes: HashMap<(String, String), Vec<OutrightQuote>>,
    calendar: Vec<NaiveDate>,
    failing: HashSet<(String, String)>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to add quotes for a (symbol, month sheet) pair
    pub fn with_quotes(mut self, symbol: &str, month: &str, quotes: Vec<OutrightQuote>) -> Self {
        self.quotes
            .entry((symbol.to_string(), month.to_string()))
            .or_default()
            .extend(quotes);
        self
    }

    pub fn with_calendar(mut self, mut calendar: Vec<NaiveDate>) -> Self {
        calendar.sort();
        calendar.dedup();
        self.calendar = calendar;
        self
    }

    /// Builder method to make a (symbol, month sheet) fetch fail with an I/O error
    pub fn with_failure(mut self, symbol: &str, month: &str) -> Self {
        self.failing.insert((symbol.to_string(), month.to_string()));
        self
    }

    /// Get all recorded quote fetches
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PriceSource for InMemorySource {
    async fn outright_quotes(
        &self,
        symbol: &str,
        month: &str,
    ) -> Result<Vec<OutrightQuote>, SourceError> {
        let key = (symbol.to_string(), month.to_string());
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(key.clone());

        if self.failing.contains(&key) {
            return Err(SourceError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("simulated failure for {symbol} {month}"),
            )));
        }
        self.quotes
            .get(&key)
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                symbol: symbol.to_string(),
                month: month.to_string(),
            })
    }

    async fn trading_calendar(&self) -> Result<Vec<NaiveDate>, SourceError> {
        Ok(self.calendar.clone())
    }
}
