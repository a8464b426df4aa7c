//! Cross-Context Messages
//!
//! Typed payloads for the notification channel. The transport serializes
//! them when a message crosses a frame or context boundary.

use serde::{Deserialize, Serialize};

use crate::info::AccessibilityInfo;

/// Topic for inspector state fan-out.
pub const TOPIC_STATE: &str = "inspector/state";

/// Topic for inspection results.
pub const TOPIC_INSPECTION: &str = "inspector/inspection";

/// Message published on the notification channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InspectorMessage {
    /// Enabled/mini state changed; all contexts must follow.
    StateChanged { enabled: bool, mini: bool },

    /// Fresh accessibility data for the inspected element.
    InspectionUpdated {
        target: String,
        info: AccessibilityInfo,
    },

    /// A context asked for the current element to be re-inspected.
    RefreshRequested { reason: String },
}
