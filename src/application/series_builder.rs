//! Differential Series Builder
//!
//! Turns a [`DiffSpec`] and a list of front-month roots into one continuous
//! entry/exit [`PriceSeries`]:
//!
//! 1. Every (symbol, month sheet) the roots need is fetched once, in
//!    parallel, bounded by a semaphore, into a read-through cache.
//! 2. Roots are then assembled strictly newest-first: each leg is priced on
//!    its contract inside the root's trading window, legs are inner-joined
//!    by date and combined, and the two spread sides are differenced.
//! 3. Segments get a cumulative additive `norm_value` so the normalized
//!    track has no jump where consecutive roots meet.
//! 4. Segments are concatenated oldest-first. Where roots overlap on a date
//!    the entry side takes the newer root and the exit side the older one.
//!
//! A root with missing data for any leg is skipped with a warning.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;

use crate::domain::calendar::months_before;
use crate::domain::{
    ContractCode, ContractError, DiffSpec, PricePoint, PriceSeries, SeriesError, SpreadExpr,
};
use crate::ports::{OutrightQuote, PriceSource, SourceError};

/// Builder-level failures. Missing data is never one of these.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("No front-month roots configured")]
    NoRoots,

    #[error("max_concurrent_fetches must be at least 1")]
    NoConcurrency,

    #[error("Invalid contract offset: {0}")]
    Contract(#[from] ContractError),

    #[error("Assembled series rejected: {0}")]
    Series(#[from] SeriesError),
}

/// Builder configuration
#[derive(Debug, Clone, PartialEq)]
pub struct BuilderConfig {
    /// Front-month roots, any order
    pub roots: Vec<ContractCode>,
    /// Calendar months of history before each root's month
    pub lookback_months: u32,
    pub max_concurrent_fetches: usize,
}

impl BuilderConfig {
    pub fn new(roots: Vec<ContractCode>) -> Self {
        Self {
            roots,
            lookback_months: 3,
            max_concurrent_fetches: 4,
        }
    }

    pub fn with_lookback_months(mut self, months: u32) -> Self {
        self.lookback_months = months;
        self
    }

    pub fn with_max_concurrent_fetches(mut self, limit: usize) -> Self {
        self.max_concurrent_fetches = limit;
        self
    }
}

type SheetKey = (String, String);

/// Read-through cache of outright sheets keyed by (symbol, month label).
///
/// Concurrent fills of one key may race; the last write wins.
#[derive(Debug, Default, Clone)]
pub struct LegCache {
    sheets: Arc<RwLock<HashMap<SheetKey, Arc<Vec<OutrightQuote>>>>>,
}

impl LegCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, symbol: &str, month: &str) -> Option<Arc<Vec<OutrightQuote>>> {
        self.sheets
            .read()
            .await
            .get(&(symbol.to_string(), month.to_string()))
            .cloned()
    }

    /// Cached sheet, or fetch and store it
    pub async fn get_or_fetch<S>(
        &self,
        source: &S,
        symbol: &str,
        month: &str,
    ) -> Result<Arc<Vec<OutrightQuote>>, SourceError>
    where
        S: PriceSource + ?Sized,
    {
        if let Some(sheet) = self.get(symbol, month).await {
            return Ok(sheet);
        }
        let sheet = Arc::new(source.outright_quotes(symbol, month).await?);
        self.sheets
            .write()
            .await
            .insert((symbol.to_string(), month.to_string()), Arc::clone(&sheet));
        Ok(sheet)
    }

    pub async fn len(&self) -> usize {
        self.sheets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sheets.read().await.is_empty()
    }
}

/// Trading-day window `[start, end]` over which a root is sampled.
///
/// `calendar` must be ascending. Returns None when either end cannot be
/// placed on the calendar.
pub fn contract_window(
    calendar: &[NaiveDate],
    root: &ContractCode,
    lookback_months: u32,
) -> Option<(NaiveDate, NaiveDate)> {
    let first = root.first_day();
    let start = months_before(first, lookback_months)?;
    // last day of the month three months before the root
    let end = months_before(first, 2)?.pred_opt()?;

    let start_idx = calendar.iter().position(|d| *d >= start)?;
    let mut end_idx = calendar.iter().rposition(|d| *d <= end)?;

    let start_idx = start_idx.saturating_sub(2);
    if end_idx + 1 < calendar.len() {
        end_idx = end_idx.saturating_sub(1);
    }
    Some((calendar[start_idx], calendar[end_idx]))
}

/// One root's rows after combination
#[derive(Debug, Clone)]
struct Segment {
    root: ContractCode,
    contract: String,
    contract_month: String,
    /// (date, price), ascending
    prices: Vec<(NaiveDate, f64)>,
    norm_value: f64,
}

/// Builds differential series from a [`PriceSource`]
pub struct SeriesBuilder<S: PriceSource + ?Sized> {
    source: Arc<S>,
    cache: LegCache,
    config: BuilderConfig,
}

impl<S: PriceSource + ?Sized + 'static> SeriesBuilder<S> {
    pub fn new(source: Arc<S>, config: BuilderConfig) -> Self {
        Self {
            source,
            cache: LegCache::new(),
            config,
        }
    }

    /// Share an existing cache, e.g. across differentials with common legs
    pub fn with_cache(mut self, cache: LegCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &LegCache {
        &self.cache
    }

    /// Assemble the continuous series for `spec`
    pub async fn build(&self, spec: &DiffSpec) -> Result<PriceSeries, BuildError> {
        if self.config.roots.is_empty() {
            return Err(BuildError::NoRoots);
        }
        if self.config.max_concurrent_fetches == 0 {
            return Err(BuildError::NoConcurrency);
        }

        let mut roots = self.config.roots.clone();
        roots.sort_unstable_by(|a, b| b.cmp(a));
        roots.dedup();

        let mut plan = Vec::with_capacity(roots.len());
        for root in &roots {
            let (first, second) = spec.contracts_for(root)?;
            plan.push((*root, first, second));
        }

        let calendar = match self.source.trading_calendar().await {
            Ok(calendar) => calendar,
            Err(e) => {
                tracing::warn!("Trading calendar unavailable, no data for {}: {}", spec.name, e);
                return Ok(PriceSeries::empty());
            }
        };

        self.prefetch(spec, &plan).await;

        let mut segments = Vec::new();
        for (root, first, second) in &plan {
            match self.assemble(spec, &calendar, root, first, second).await {
                Some(segment) => segments.push(segment),
                None => tracing::warn!("Skipping root {} of {}: no data", root, spec.name),
            }
        }

        normalize(&mut segments);
        let series = stitch(segments)?;
        tracing::info!(
            "Built {} over {} roots: {} rows",
            spec.name,
            roots.len(),
            series.len()
        );
        Ok(series)
    }

    /// Fill the cache with every sheet the plan needs
    async fn prefetch(&self, spec: &DiffSpec, plan: &[(ContractCode, ContractCode, ContractCode)]) {
        let mut keys: Vec<SheetKey> = Vec::new();
        let mut seen = HashSet::new();
        for (_, first, second) in plan {
            for (expr, contract) in [(&spec.first, first), (&spec.second, second)] {
                for leg in expr.legs() {
                    let key = (leg.symbol.clone(), contract.month_label().to_string());
                    if seen.insert(key.clone()) {
                        keys.push(key);
                    }
                }
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_fetches));
        let mut tasks = JoinSet::new();
        for (symbol, month) in keys {
            let source = Arc::clone(&self.source);
            let cache = self.cache.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                if let Err(e) = cache.get_or_fetch(source.as_ref(), &symbol, &month).await {
                    tracing::warn!("Failed to fetch {} {}: {}", symbol, month, e);
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::warn!("Fetch task failed: {}", e);
            }
        }
    }

    async fn assemble(
        &self,
        spec: &DiffSpec,
        calendar: &[NaiveDate],
        root: &ContractCode,
        first: &ContractCode,
        second: &ContractCode,
    ) -> Option<Segment> {
        let window = contract_window(calendar, root, self.config.lookback_months)?;
        let first_prices = self.price_expression(&spec.first, first, window).await?;
        let second_prices = self.price_expression(&spec.second, second, window).await?;

        let prices: Vec<(NaiveDate, f64)> = first_prices
            .iter()
            .filter_map(|(date, p1)| second_prices.get(date).map(|p2| (*date, p1 - p2)))
            .collect();
        if prices.is_empty() {
            return None;
        }

        tracing::debug!(
            "Root {} of {}: {} rows {} to {}",
            root,
            spec.name,
            prices.len(),
            window.0,
            window.1
        );

        Some(Segment {
            root: *root,
            contract: format!("{first}-{second}"),
            contract_month: format!("{}-{}", first.month_label(), second.month_label()),
            prices,
            norm_value: 0.0,
        })
    }

    /// Combined price of one spread side on `contract`, dates inside `window`
    async fn price_expression(
        &self,
        expr: &SpreadExpr,
        contract: &ContractCode,
        window: (NaiveDate, NaiveDate),
    ) -> Option<BTreeMap<NaiveDate, f64>> {
        let code = contract.to_string();
        let mut legs: Vec<BTreeMap<NaiveDate, f64>> = Vec::with_capacity(expr.legs().len());

        for leg in expr.legs() {
            let sheet = self.cache.get(&leg.symbol, contract.month_label()).await?;
            let prices: BTreeMap<NaiveDate, f64> = sheet
                .iter()
                .filter(|q| q.contract == code && q.date >= window.0 && q.date <= window.1)
                .map(|q| (q.date, q.price))
                .collect();
            legs.push(prices);
        }

        let (head, rest) = legs.split_first()?;
        let combined: BTreeMap<NaiveDate, f64> = head
            .iter()
            .filter_map(|(date, price)| {
                let mut prices = Vec::with_capacity(legs.len());
                prices.push(*price);
                for other in rest {
                    prices.push(*other.get(date)?);
                }
                Some((*date, expr.combine(&prices)))
            })
            .collect();

        (!combined.is_empty()).then_some(combined)
    }
}

/// Assign cumulative offsets; `segments` must be newest-first
fn normalize(segments: &mut [Segment]) {
    let mut cumulative = 0.0;
    let mut newer_first_price: Option<f64> = None;

    for segment in segments.iter_mut() {
        let (Some(&(_, first_price)), Some(&(_, last_price))) =
            (segment.prices.first(), segment.prices.last())
        else {
            continue;
        };
        if let Some(newer) = newer_first_price {
            cumulative += last_price - newer;
        }
        segment.norm_value = cumulative;
        newer_first_price = Some(first_price);
    }
}

/// Concatenate oldest-first and split overlapping dates into entry/exit sides
fn stitch(segments: Vec<Segment>) -> Result<PriceSeries, SeriesError> {
    struct Observation<'a> {
        price: f64,
        norm_price: f64,
        segment: &'a Segment,
    }

    let mut entries: BTreeMap<NaiveDate, Observation<'_>> = BTreeMap::new();
    let mut exits: BTreeMap<NaiveDate, Observation<'_>> = BTreeMap::new();

    for segment in segments.iter().rev() {
        for &(date, price) in &segment.prices {
            let observation = || Observation {
                price,
                norm_price: price - segment.norm_value,
                segment,
            };
            // newest segment wins the entry side, oldest keeps the exit side
            entries.insert(date, observation());
            exits.entry(date).or_insert_with(observation);
        }
    }

    let points = entries
        .into_iter()
        .filter_map(|(date, entry)| {
            let exit = exits.remove(&date)?;
            Some(PricePoint {
                date,
                entry_price: entry.price,
                exit_price: exit.price,
                entry_norm_price: entry.norm_price,
                exit_norm_price: exit.norm_price,
                entry_contract: entry.segment.contract.clone(),
                exit_contract: exit.segment.contract.clone(),
                entry_contract_month: entry.segment.contract_month.clone(),
                exit_contract_month: exit.segment.contract_month.clone(),
            })
        })
        .collect();

    if let Some(oldest) = segments.last() {
        tracing::debug!("Oldest root in series: {}", oldest.root);
    }
    PriceSeries::new(points)
}
