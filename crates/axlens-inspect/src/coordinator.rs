//! Inspector Coordination
//!
//! Owns the enabled/mini state, propagates it to every registered module,
//! drives the periodic sampling tick, and performs the forced-refresh
//! pipeline that all staleness triggers converge on. All shared state lives
//! in an explicit context owned here; there are no process-wide globals.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Instant;

use axlens_core::{
    AccessibilityProvider, ElementRef, FocusSource, InspectorConfig, InspectorMessage,
    ModuleLifecycle, ModuleRegistry, NotificationChannel, TOPIC_INSPECTION, TOPIC_STATE,
};

use crate::cache::{AccessibilityCache, PendingRequest, TimerHandle};
use crate::staleness::{RefreshTrigger, StalenessMonitor};

/// Name of the cache capability module.
pub const MODULE_CACHE: &str = "cache";

/// Name of the events capability module.
pub const MODULE_EVENTS: &str = "events";

/// Global inspector switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InspectorState {
    pub enabled: bool,
    pub mini: bool,
}

/// Everything the coordinator owns, made explicit.
pub struct InspectorContext {
    pub config: InspectorConfig,
    pub registry: ModuleRegistry,
    pub cache: Rc<AccessibilityCache>,
    pub focus: Rc<dyn FocusSource>,
    pub channel: Rc<dyn NotificationChannel>,
}

struct CacheModule {
    cache: Rc<AccessibilityCache>,
}

impl ModuleLifecycle for CacheModule {
    fn cleanup(&self) {
        self.cache.cleanup();
    }

    fn on_state_change(&self, enabled: bool) {
        self.cache.on_state_change(enabled);
    }
}

struct EventsModule {
    monitor: Rc<RefCell<StalenessMonitor>>,
}

impl ModuleLifecycle for EventsModule {
    fn cleanup(&self) {
        self.monitor.borrow_mut().cleanup_shadow_monitoring();
    }

    fn on_state_change(&self, enabled: bool) {
        if !enabled {
            self.monitor.borrow_mut().cleanup_shadow_monitoring();
        }
    }
}

/// Top-level refresh coordinator.
pub struct Inspector {
    ctx: InspectorContext,
    monitor: Rc<RefCell<StalenessMonitor>>,
    state: Cell<InspectorState>,
}

impl Inspector {
    pub fn new(
        config: InspectorConfig,
        provider: Rc<dyn AccessibilityProvider>,
        focus: Rc<dyn FocusSource>,
        channel: Rc<dyn NotificationChannel>,
    ) -> Self {
        let registry = ModuleRegistry::new(&config);
        let cache = Rc::new(AccessibilityCache::new(provider, &config));
        let monitor = Rc::new(RefCell::new(StalenessMonitor::new(&config)));

        let inspector = Self {
            ctx: InspectorContext {
                config,
                registry,
                cache,
                focus,
                channel,
            },
            monitor,
            state: Cell::new(InspectorState::default()),
        };
        inspector.register_core_modules();
        inspector
    }

    fn register_core_modules(&self) {
        let cache_module = Rc::new(CacheModule {
            cache: self.ctx.cache.clone(),
        });
        if let Err(err) =
            self.ctx
                .registry
                .register(MODULE_CACHE, &[], Box::new(|| Ok(())), cache_module)
        {
            tracing::error!("registering cache module: {}", err);
        }

        let events_module = Rc::new(EventsModule {
            monitor: self.monitor.clone(),
        });
        if let Err(err) = self.ctx.registry.register(
            MODULE_EVENTS,
            &[MODULE_CACHE],
            Box::new(|| Ok(())),
            events_module,
        ) {
            tracing::error!("registering events module: {}", err);
        }
    }

    pub fn state(&self) -> InspectorState {
        self.state.get()
    }

    /// Flip the global switches. The coordinator is the only writer; every
    /// registered module hears about an enabled transition, and all
    /// contexts are notified over the channel.
    pub fn set_state(&self, state: InspectorState) {
        let prev = self.state.get();
        if prev == state {
            return;
        }
        self.state.set(state);
        tracing::debug!("inspector state: enabled={} mini={}", state.enabled, state.mini);

        if prev.enabled != state.enabled {
            self.ctx.registry.broadcast_state_change(state.enabled);
        }
        self.ctx.channel.publish(
            TOPIC_STATE,
            &InspectorMessage::StateChanged {
                enabled: state.enabled,
                mini: state.mini,
            },
        );
    }

    pub fn set_enabled(&self, enabled: bool) {
        let mut state = self.state.get();
        state.enabled = enabled;
        self.set_state(state);
    }

    pub fn set_mini(&self, mini: bool) {
        let mut state = self.state.get();
        state.mini = mini;
        self.set_state(state);
    }

    /// Refresh whatever the focus source currently tracks; no-op when
    /// nothing is tracked.
    pub async fn refresh_current(&self, reason: RefreshTrigger) {
        let Some(target) = self.ctx.focus.current_target() else {
            tracing::debug!("{:?} fired with no tracked element", reason);
            return;
        };
        self.refresh_element(&target, reason).await;
    }

    /// Cache-bypassing refresh of one element, published unless a newer
    /// request supersedes it while in flight.
    pub async fn refresh_element(&self, element: &ElementRef, reason: RefreshTrigger) {
        if !self.state.get().enabled {
            return;
        }
        tracing::debug!("refreshing {} after {:?}", element, reason);

        let request = PendingRequest::new(element.clone());
        let token = request.token().clone();
        self.ctx.cache.set_pending_request(request);

        let result = self.ctx.cache.force_refresh(element).await;

        if token.is_cancelled() {
            // A newer request replaced this one while the fetch ran;
            // its result is the authoritative one.
            tracing::debug!("discarding superseded inspection of {}", element);
            return;
        }
        self.ctx.cache.clear_pending_request();

        match result {
            Ok(info) => {
                self.ctx.channel.publish(
                    TOPIC_INSPECTION,
                    &InspectorMessage::InspectionUpdated {
                        target: element.to_string(),
                        info,
                    },
                );
            }
            Err(err) => tracing::warn!("refresh of {} failed: {}", element, err),
        }
    }

    /// Periodic pump. Samples the staleness monitor, fires due refetch
    /// timers, and sweeps dead entries. Failures are isolated per trigger.
    pub async fn tick(&self, now: Instant) {
        if !self.state.get().enabled {
            return;
        }

        let triggers = {
            let focus = self.ctx.focus.clone();
            self.monitor.borrow_mut().tick(now, focus.as_ref())
        };
        for trigger in triggers {
            if let RefreshTrigger::ShadowFocusChanged { element, .. } = &trigger {
                let target = element.clone();
                self.refresh_element(&target, trigger).await;
            } else {
                self.refresh_current(trigger).await;
            }
        }

        for element in self.ctx.cache.take_due_timers(now) {
            self.refresh_element(&element, RefreshTrigger::RefetchDue).await;
        }

        self.ctx.cache.prune_dead();
    }

    /// Coalesce a refetch of an element behind the configured quiet window.
    pub fn schedule_refetch(&self, element: &ElementRef) {
        if !self.state.get().enabled {
            return;
        }
        self.ctx
            .cache
            .set_refetch_timer(element, TimerHandle::after(self.ctx.config.debounce()));
    }

    pub async fn handle_visibility_change(&self, visible: bool) {
        let trigger = self.monitor.borrow_mut().handle_visibility_change(visible);
        if let Some(trigger) = trigger {
            self.refresh_current(trigger).await;
        }
    }

    pub async fn handle_window_focus(&self, focused: bool) {
        let trigger = self.monitor.borrow_mut().handle_window_focus(focused);
        if let Some(trigger) = trigger {
            self.refresh_current(trigger).await;
        }
    }

    pub async fn handle_page_restored(&self) {
        let trigger = self.monitor.borrow_mut().handle_page_restored();
        if let Some(trigger) = trigger {
            self.refresh_current(trigger).await;
        }
    }

    pub fn handle_viewport_change(&self) {
        self.monitor.borrow_mut().handle_viewport_change();
    }

    pub fn monitor_shadow_active_element(&self, host: &ElementRef) {
        self.monitor.borrow_mut().monitor_shadow_active_element(host);
    }

    pub fn cleanup_shadow_monitoring(&self) {
        self.monitor.borrow_mut().cleanup_shadow_monitoring();
    }

    /// Full teardown: every module's cleanup plus the shadow watch.
    pub fn cleanup(&self) {
        self.ctx.registry.cleanup_all();
        self.monitor.borrow_mut().cleanup_shadow_monitoring();
    }

    pub fn cache(&self) -> &Rc<AccessibilityCache> {
        &self.ctx.cache
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.ctx.registry
    }

    pub fn config(&self) -> &InspectorConfig {
        &self.ctx.config
    }

    pub fn context(&self) -> &InspectorContext {
        &self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axlens_core::{AccessibilityInfo, FetchError};
    use futures::future::LocalBoxFuture;
    use futures::FutureExt;

    struct NullProvider;

    impl AccessibilityProvider for NullProvider {
        fn fetch(
            &self,
            _element: &ElementRef,
        ) -> LocalBoxFuture<'static, Result<AccessibilityInfo, FetchError>> {
            async { Ok(AccessibilityInfo::new("button", "Stub")) }.boxed_local()
        }
    }

    struct NullFocus;

    impl FocusSource for NullFocus {
        fn current_target(&self) -> Option<ElementRef> {
            None
        }

        fn shadow_active_element(&self, _host: &ElementRef) -> Option<ElementRef> {
            None
        }
    }

    struct RecordingChannel {
        messages: RefCell<Vec<(String, InspectorMessage)>>,
    }

    impl RecordingChannel {
        fn new() -> Rc<Self> {
            Rc::new(Self {
                messages: RefCell::new(Vec::new()),
            })
        }
    }

    impl NotificationChannel for RecordingChannel {
        fn publish(&self, topic: &str, message: &InspectorMessage) {
            self.messages
                .borrow_mut()
                .push((topic.to_string(), message.clone()));
        }

        fn subscribe(&self, _topic: &str, _handler: Rc<dyn Fn(&InspectorMessage)>) {}
    }

    fn inspector_with(channel: Rc<RecordingChannel>) -> Inspector {
        Inspector::new(
            InspectorConfig::default(),
            Rc::new(NullProvider),
            Rc::new(NullFocus),
            channel,
        )
    }

    #[test]
    fn test_core_modules_registered() {
        let inspector = inspector_with(RecordingChannel::new());

        let state = inspector.registry().module_state();
        assert!(state[MODULE_CACHE].initialized);
        assert!(state[MODULE_EVENTS].initialized);
        assert!(state[MODULE_EVENTS].missing_dependencies.is_empty());
    }

    #[test]
    fn test_state_change_publishes_and_propagates() {
        let channel = RecordingChannel::new();
        let inspector = inspector_with(channel.clone());

        inspector.set_enabled(true);
        inspector.set_enabled(true); // no-op, no duplicate publish

        let messages = channel.messages.borrow();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, TOPIC_STATE);
        assert_eq!(
            messages[0].1,
            InspectorMessage::StateChanged {
                enabled: true,
                mini: false
            }
        );
    }

    #[test]
    fn test_disable_cancels_pending_request() {
        let inspector = inspector_with(RecordingChannel::new());
        inspector.set_enabled(true);

        let el = ElementRef::new("button");
        let request = PendingRequest::new(el.clone());
        inspector.cache().set_pending_request(request.clone());

        inspector.set_enabled(false);
        assert!(request.is_cancelled());
        assert!(inspector.cache().pending_request().is_none());
    }

    #[test]
    fn test_refresh_without_target_is_noop() {
        let channel = RecordingChannel::new();
        let inspector = inspector_with(channel.clone());
        inspector.set_enabled(true);
        channel.messages.borrow_mut().clear();

        smol::block_on(inspector.refresh_current(RefreshTrigger::PageRestored));
        assert!(channel.messages.borrow().is_empty());
    }

    #[test]
    fn test_disabled_tick_is_noop() {
        let inspector = inspector_with(RecordingChannel::new());
        let el = ElementRef::new("button");
        inspector.cache().set_cached(
            &el,
            AccessibilityInfo::new("button", "Keep"),
        );

        smol::block_on(inspector.tick(Instant::now()));
        assert!(inspector.cache().has_cached(&el));
    }
}
