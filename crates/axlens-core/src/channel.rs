//! In-Process Notification Channel
//!
//! Topic-keyed pub/sub for contexts sharing one page. Cross-frame
//! transports implement [`NotificationChannel`] over the host's messaging
//! instead.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::message::InspectorMessage;
use crate::traits::NotificationChannel;

type Handler = Rc<dyn Fn(&InspectorMessage)>;

/// Same-process topic bus.
#[derive(Default)]
pub struct LocalChannel {
    handlers: RefCell<HashMap<String, Vec<Handler>>>,
}

impl LocalChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of subscribers on a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.handlers
            .borrow()
            .get(topic)
            .map_or(0, |handlers| handlers.len())
    }
}

impl NotificationChannel for LocalChannel {
    fn publish(&self, topic: &str, message: &InspectorMessage) {
        // Handlers may subscribe reentrantly; invoke outside the borrow.
        let handlers: Vec<Handler> = self
            .handlers
            .borrow()
            .get(topic)
            .map(|handlers| handlers.to_vec())
            .unwrap_or_default();

        for handler in handlers {
            handler(message);
        }
    }

    fn subscribe(&self, topic: &str, handler: Rc<dyn Fn(&InspectorMessage)>) {
        self.handlers
            .borrow_mut()
            .entry(topic.to_string())
            .or_default()
            .push(handler);
    }
}
