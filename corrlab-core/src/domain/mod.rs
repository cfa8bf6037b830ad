//! Domain types: series, windows, main securities, ranked entities.

pub mod security;
pub mod series;
pub mod window;

pub use security::{CorrelatedEntity, CorrelationMap, MainKind, MainSecurity};
pub use series::{PreparedSeries, SeriesError, TimeSeries};
pub use window::{default_windows, Window};
