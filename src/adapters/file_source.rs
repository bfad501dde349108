//! JSON File Price Source
//!
//! Reads outright sheets and the trading calendar from a directory:
//!
//! - `{dir}/{symbol}_{Mon}.json`: array of `{"date", "contract", "price"}`
//! - `{dir}/calendar.json`: array of ISO dates

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

use crate::ports::{OutrightQuote, PriceSource, SourceError};

pub const CALENDAR_FILE: &str = "calendar.json";

/// [`PriceSource`] over JSON files on disk
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    dir: PathBuf,
}

impl JsonFileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn sheet_path(&self, symbol: &str, month: &str) -> PathBuf {
        self.dir.join(format!("{}_{}.json", symbol, month))
    }

    async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, SourceError> {
        let content = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&content)
            .map_err(|e| SourceError::Parse(format!("{}: {}", path.display(), e)))
    }
}

#[async_trait]
impl PriceSource for JsonFileSource {
    async fn outright_quotes(
        &self,
        symbol: &str,
        month: &str,
    ) -> Result<Vec<OutrightQuote>, SourceError> {
        let path = self.sheet_path(symbol, month);
        if !tokio::fs::try_exists(&path).await? {
            return Err(SourceError::NotFound {
                symbol: symbol.to_string(),
                month: month.to_string(),
            });
        }
        let quotes: Vec<OutrightQuote> = Self::read_json(&path).await?;
        tracing::debug!("Loaded {} quotes from {}", quotes.len(), path.display());
        Ok(quotes)
    }

    async fn trading_calendar(&self) -> Result<Vec<NaiveDate>, SourceError> {
        let mut calendar: Vec<NaiveDate> = Self::read_json(&self.dir.join(CALENDAR_FILE)).await?;
        calendar.sort();
        calendar.dedup();
        Ok(calendar)
    }
}
