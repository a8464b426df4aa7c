//! Collaborator Seams
//!
//! Traits the host environment implements: the accessibility-data provider,
//! the focus source, and the cross-context notification channel. The core
//! never touches a real DOM, debugger protocol, or extension transport.

use std::rc::Rc;

use futures::future::LocalBoxFuture;

use crate::element::ElementRef;
use crate::info::AccessibilityInfo;
use crate::message::InspectorMessage;
use crate::FetchError;

/// Asynchronous source of accessibility data.
pub trait AccessibilityProvider {
    /// Fetch role/name/state data for an element.
    ///
    /// May reject; must be safely callable concurrently for different
    /// elements.
    fn fetch(
        &self,
        element: &ElementRef,
    ) -> LocalBoxFuture<'static, Result<AccessibilityInfo, FetchError>>;
}

/// Where the user's attention currently is.
pub trait FocusSource {
    /// The element the inspector is currently tracking, if any.
    fn current_target(&self) -> Option<ElementRef>;

    /// Active element inside a shadow host, if the host exposes one.
    fn shadow_active_element(&self, host: &ElementRef) -> Option<ElementRef>;
}

/// Cross-context pub/sub for state and inspection coordination.
pub trait NotificationChannel {
    fn publish(&self, topic: &str, message: &InspectorMessage);

    fn subscribe(&self, topic: &str, handler: Rc<dyn Fn(&InspectorMessage)>);
}
