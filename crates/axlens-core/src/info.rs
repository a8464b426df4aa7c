//! Accessibility Snapshots
//!
//! The role/name/state payload fetched for an element, and the predicate
//! deciding whether a snapshot carries real data.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Sentinel role for an element the provider could not classify.
pub const NO_ROLE: &str = "(no role)";

/// Sentinel name for an element without an accessible name.
pub const NO_ACCESSIBLE_NAME: &str = "(no accessible name)";

/// Accessibility data for one element, as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessibilityInfo {
    pub role: String,
    pub name: String,
    #[serde(default)]
    pub states: HashMap<String, bool>,
    #[serde(default)]
    pub aria_properties: HashMap<String, String>,
}

impl AccessibilityInfo {
    /// Create a snapshot with a role and accessible name.
    pub fn new(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            name: name.into(),
            states: HashMap::new(),
            aria_properties: HashMap::new(),
        }
    }

    /// The not-yet-computed placeholder.
    pub fn placeholder() -> Self {
        Self::new(NO_ROLE, NO_ACCESSIBLE_NAME)
    }

    /// Whether this snapshot carries anything beyond the placeholder
    /// sentinels. Placeholders mean "not yet computed", not data, and must
    /// never be cached as if they were final.
    pub fn is_meaningful(&self) -> bool {
        self.role != NO_ROLE
            || self.name != NO_ACCESSIBLE_NAME
            || !self.states.is_empty()
            || !self.aria_properties.is_empty()
    }

    /// Record an ARIA state (e.g. `expanded`, `checked`).
    pub fn with_state(mut self, key: impl Into<String>, value: bool) -> Self {
        self.states.insert(key.into(), value);
        self
    }

    /// Record an ARIA property (e.g. `haspopup`).
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.aria_properties.insert(key.into(), value.into());
        self
    }
}

impl Default for AccessibilityInfo {
    fn default() -> Self {
        Self::placeholder()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_is_not_meaningful() {
        assert!(!AccessibilityInfo::placeholder().is_meaningful());
        assert!(!AccessibilityInfo::default().is_meaningful());
    }

    #[test]
    fn test_role_alone_is_meaningful() {
        assert!(AccessibilityInfo::new("button", NO_ACCESSIBLE_NAME).is_meaningful());
    }

    #[test]
    fn test_name_alone_is_meaningful() {
        assert!(AccessibilityInfo::new(NO_ROLE, "Submit").is_meaningful());
    }

    #[test]
    fn test_states_alone_are_meaningful() {
        let info = AccessibilityInfo::placeholder().with_state("expanded", false);
        assert!(info.is_meaningful());

        let info = AccessibilityInfo::placeholder().with_property("haspopup", "menu");
        assert!(info.is_meaningful());
    }
}
