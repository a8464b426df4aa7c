//! axlens Inspect
//!
//! Accessibility inspection runtime for live pages.
//!
//! Features:
//! - Element-keyed snapshot cache with lazy TTL expiry
//! - In-flight fetch deduplication and cooperative cancellation
//! - Staleness detection (visibility, focus, wake, shadow DOM)
//! - Refresh coordination with uniform module lifecycle

pub mod cache;
pub mod coordinator;
pub mod staleness;

pub use cache::{
    AccessibilityCache, CacheStats, DebouncedUpdate, FetchResult, InflightFetch, PendingRequest,
    TimerHandle,
};
pub use coordinator::{Inspector, InspectorContext, InspectorState, MODULE_CACHE, MODULE_EVENTS};
pub use staleness::{RefreshTrigger, StalenessMonitor};
