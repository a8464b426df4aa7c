//! axlens Core
//!
//! Foundation of the axlens accessibility inspector runtime.
//!
//! Features:
//! - Host element handles with identity semantics and weak downgrade
//! - Accessibility snapshot value type and meaningful-data predicate
//! - Module registry with dependency ordering and retry semantics
//! - Collaborator seams (provider, focus source, notification channel)
//! - Configuration and cooperative cancellation

pub mod cancel;
pub mod channel;
pub mod config;
pub mod element;
pub mod info;
pub mod message;
pub mod registry;
pub mod traits;

pub use cancel::CancellationToken;
pub use channel::LocalChannel;
pub use config::InspectorConfig;
pub use element::{ElementKey, ElementRef, WeakElementRef};
pub use info::{AccessibilityInfo, NO_ACCESSIBLE_NAME, NO_ROLE};
pub use message::{InspectorMessage, TOPIC_INSPECTION, TOPIC_STATE};
pub use registry::{
    InitFn, ModuleInitError, ModuleLifecycle, ModuleRegistry, ModuleState, RegistryError,
};
pub use traits::{AccessibilityProvider, FocusSource, NotificationChannel};

/// Provider fetch failure.
///
/// `Clone` so one shared in-flight fetch can deliver the same failure to
/// every attached waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("provider fetch failed: {0}")]
    Provider(String),

    #[error("element is no longer attached to the document")]
    ElementGone,
}
