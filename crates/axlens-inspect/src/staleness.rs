//! Staleness Detection
//!
//! Decides when displayed accessibility data can no longer be trusted,
//! independent of TTL expiry: the page coming back into view, the window
//! regaining focus, a back/forward-cache restore, the viewport settling
//! after a resize, the host waking from sleep, or focus moving inside a
//! shadow tree. Every signal converges on one forced-refresh pipeline,
//! driven by the coordinator.

use std::time::{Duration, Instant};

use axlens_core::{ElementRef, FocusSource, InspectorConfig, WeakElementRef};

/// Why a forced refresh fired.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshTrigger {
    /// Page was hidden and became visible again.
    VisibilityRegained,
    /// Window or document regained focus.
    FocusRegained,
    /// Page restored from the back/forward cache.
    PageRestored,
    /// Viewport or orientation change settled.
    ViewportSettled,
    /// Heartbeat gap indicated the host slept and woke.
    WakeDetected,
    /// Active element changed inside a monitored shadow tree.
    ShadowFocusChanged {
        element: ElementRef,
        host: ElementRef,
    },
    /// A per-element refetch timer came due.
    RefetchDue,
}

struct ShadowWatch {
    host: WeakElementRef,
    last_active: Option<WeakElementRef>,
    last_processed: Option<WeakElementRef>,
    next_poll: Instant,
    primed: bool,
}

/// Samples host conditions that invalidate confidence in cached data.
pub struct StalenessMonitor {
    page_visible: bool,
    window_focused: bool,
    last_heartbeat: Option<Instant>,
    resize_deadline: Option<Instant>,
    shadow: Option<ShadowWatch>,
    wake_gap_threshold: Duration,
    shadow_poll_interval: Duration,
    resize_settle: Duration,
}

impl StalenessMonitor {
    pub fn new(config: &InspectorConfig) -> Self {
        Self {
            page_visible: true,
            window_focused: true,
            last_heartbeat: None,
            resize_deadline: None,
            shadow: None,
            wake_gap_threshold: config.wake_gap_threshold(),
            shadow_poll_interval: config.shadow_poll_interval(),
            resize_settle: config.resize_settle(),
        }
    }

    /// Page visibility changed; hidden-to-visible fires a refresh.
    pub fn handle_visibility_change(&mut self, visible: bool) -> Option<RefreshTrigger> {
        let regained = visible && !self.page_visible;
        self.page_visible = visible;
        if regained {
            tracing::debug!("page visible again; cached data suspect");
            Some(RefreshTrigger::VisibilityRegained)
        } else {
            None
        }
    }

    /// Window focus changed; regaining focus fires a refresh.
    pub fn handle_window_focus(&mut self, focused: bool) -> Option<RefreshTrigger> {
        let regained = focused && !self.window_focused;
        self.window_focused = focused;
        if regained {
            tracing::debug!("window focus regained; cached data suspect");
            Some(RefreshTrigger::FocusRegained)
        } else {
            None
        }
    }

    /// Page restored from the back/forward cache. Always fires: the
    /// restored snapshot predates whatever happened since.
    pub fn handle_page_restored(&mut self) -> Option<RefreshTrigger> {
        tracing::debug!("page restored from history cache");
        Some(RefreshTrigger::PageRestored)
    }

    /// Viewport or orientation changed. Arms (or extends) the settle
    /// window; rapid resize events coalesce into one refresh.
    pub fn handle_viewport_change(&mut self) {
        self.resize_deadline = Some(Instant::now() + self.resize_settle);
    }

    /// Start polling a shadow host's active element. Only one host is
    /// monitored at a time; a previous watch is torn down first.
    pub fn monitor_shadow_active_element(&mut self, host: &ElementRef) {
        if self.shadow.is_some() {
            tracing::debug!("replacing shadow watch with {}", host);
        }
        self.shadow = Some(ShadowWatch {
            host: host.downgrade(),
            last_active: None,
            last_processed: None,
            next_poll: Instant::now(),
            primed: false,
        });
    }

    /// Stop shadow polling.
    pub fn cleanup_shadow_monitoring(&mut self) {
        self.shadow = None;
    }

    pub fn is_monitoring_shadow(&self) -> bool {
        self.shadow.is_some()
    }

    /// Periodic sample: wake heuristic, settled viewport, shadow focus.
    ///
    /// The wake heuristic compares consecutive heartbeat times; a gap above
    /// the threshold means the host was suspended. A suspend shorter than
    /// the threshold is invisible to gap sampling; accepted limitation.
    pub fn tick(&mut self, now: Instant, focus: &dyn FocusSource) -> Vec<RefreshTrigger> {
        let mut triggers = Vec::new();

        if let Some(last) = self.last_heartbeat {
            if now.duration_since(last) > self.wake_gap_threshold {
                tracing::debug!("heartbeat gap {:?}; assuming sleep/wake", now.duration_since(last));
                triggers.push(RefreshTrigger::WakeDetected);
            }
        }
        self.last_heartbeat = Some(now);

        if let Some(deadline) = self.resize_deadline {
            if now >= deadline {
                self.resize_deadline = None;
                triggers.push(RefreshTrigger::ViewportSettled);
            }
        }

        if let Some(trigger) = self.poll_shadow(now, focus) {
            triggers.push(trigger);
        }

        triggers
    }

    fn poll_shadow(&mut self, now: Instant, focus: &dyn FocusSource) -> Option<RefreshTrigger> {
        let poll_interval = self.shadow_poll_interval;
        let mut drop_watch = false;
        let mut trigger = None;

        if let Some(watch) = self.shadow.as_mut() {
            match watch.host.upgrade() {
                None => drop_watch = true,
                Some(host) => {
                    if now >= watch.next_poll {
                        watch.next_poll = now + poll_interval;
                        let active = focus.shadow_active_element(&host);

                        let previous = watch
                            .last_active
                            .as_ref()
                            .and_then(|weak| weak.upgrade());
                        let changed = match (&active, &previous) {
                            (Some(a), Some(b)) => !a.same_element(b),
                            (None, None) => false,
                            _ => true,
                        };
                        watch.last_active = active.as_ref().map(|e| e.downgrade());

                        if !watch.primed {
                            // First sample is the baseline, not a change.
                            watch.primed = true;
                        } else if changed {
                            if let Some(element) = active {
                                let already_processed = watch
                                    .last_processed
                                    .as_ref()
                                    .and_then(|weak| weak.upgrade())
                                    .is_some_and(|p| p.same_element(&element));
                                if !already_processed {
                                    watch.last_processed = Some(element.downgrade());
                                    tracing::debug!(
                                        "shadow active element changed to {} in {}",
                                        element,
                                        host
                                    );
                                    trigger = Some(RefreshTrigger::ShadowFocusChanged {
                                        element,
                                        host,
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }

        if drop_watch {
            self.shadow = None;
        }
        trigger
    }
}
