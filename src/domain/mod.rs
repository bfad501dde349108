//! Domain Layer - Core types for differential mean reversion research
//!
//! Pure types and logic with no I/O. All data retrieval happens through
//! the ports layer.
//!
//! - `price`: validated differential series (entry/exit sides per date)
//! - `position`: open position state and sides
//! - `trade`: closed trade records and contract legs
//! - `contract`: futures contract month codes (M1..M4 resolution)
//! - `spread`: spread expressions and differential definitions
//! - `calendar`: business-day arithmetic

pub mod calendar;
pub mod contract;
pub mod position;
pub mod price;
pub mod spread;
pub mod trade;

pub use calendar::{business_days_between, is_business_day};
pub use contract::{roots_newest_first, ContractCode, ContractError};
pub use position::{Position, Side};
pub use price::{PricePoint, PriceSeries, PriceTrack, SeriesError};
pub use spread::{DiffSpec, Leg, Sign, SpreadError, SpreadExpr};
pub use trade::{ExitReason, LegFill, Trade};
