//! Client-side engine for the listing search page: shared filter state, paginated listing
//! fetches, facet evaluation and the map marker layer, wired together by [`ViewCoordinator`].

pub mod config;
pub mod coordinator;
pub mod error;
pub mod facets;
pub mod fetcher;
pub mod filter_store;
pub mod format;
pub mod map;
pub mod seed;
pub mod summary;

pub use config::{FacetThresholds, Settings, SettingsError};
pub use coordinator::{ListView, ViewCoordinator, ViewEvent, ViewStatus};
pub use error::{FetchError, MapInitError};
pub use facets::{FacetEvaluator, GateSet};
pub use fetcher::{Cursor, ListingPage, PageFetch, PaginatedFetcher, QueryScope};
pub use filter_store::{FilterChange, FilterSnapshot, FilterStore, SubscriptionId};
pub use format::PriceFormatter;
pub use map::{
    HeadlessSurface, MapSurface, MarkerReconciler, ReconcilerEffect, ReconcilerPhase,
    ViewportMode,
};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
