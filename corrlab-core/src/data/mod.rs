//! Data access: stores, providers, universe and exclude list.

pub mod circuit_breaker;
pub mod exclude;
pub mod file_store;
pub mod frame;
pub mod provider;
pub mod store;
pub mod synthetic;
pub mod universe;
pub mod warehouse;
pub mod yahoo;

pub use circuit_breaker::CircuitBreaker;
pub use exclude::{
    load_exclude_list, ExcludeListSink, FileExcludeList, MemoryExcludeList, NullExcludeList,
};
pub use file_store::FileStore;
pub use frame::{RawColumn, RawFrame};
pub use provider::{DataError, DataProvider, RawBar};
pub use store::{MemoryStore, SeriesStore, SourceKind, UnknownSource};
pub use synthetic::{SyntheticMarket, SyntheticStore};
pub use universe::{Universe, UniverseError, DEBUG_SYMBOLS};
pub use warehouse::{WarehouseClient, WarehouseConfig};
pub use yahoo::YahooProvider;
