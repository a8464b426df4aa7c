//! Cross-component pipeline tests
//!
//! Exercises the cache, staleness triggers, and coordinator together, with
//! the collaborator seams stubbed the way a host would implement them.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use futures::FutureExt;

use axlens_core::{
    AccessibilityInfo, AccessibilityProvider, ElementRef, FetchError, FocusSource,
    InspectorConfig, InspectorMessage, LocalChannel, NotificationChannel, TOPIC_INSPECTION,
};
use axlens_inspect::{Inspector, RefreshTrigger, MODULE_CACHE, MODULE_EVENTS};

// ============================================================================
// HOST STUBS
// ============================================================================

struct ImmediateProvider {
    info: AccessibilityInfo,
    calls: Cell<u32>,
}

impl ImmediateProvider {
    fn new(info: AccessibilityInfo) -> Rc<Self> {
        Rc::new(Self {
            info,
            calls: Cell::new(0),
        })
    }
}

impl AccessibilityProvider for ImmediateProvider {
    fn fetch(
        &self,
        _element: &ElementRef,
    ) -> LocalBoxFuture<'static, Result<AccessibilityInfo, FetchError>> {
        self.calls.set(self.calls.get() + 1);
        let info = self.info.clone();
        async move { Ok(info) }.boxed_local()
    }
}

struct PendingProvider {
    receivers: RefCell<VecDeque<oneshot::Receiver<Result<AccessibilityInfo, FetchError>>>>,
}

impl PendingProvider {
    fn new(
        receivers: Vec<oneshot::Receiver<Result<AccessibilityInfo, FetchError>>>,
    ) -> Rc<Self> {
        Rc::new(Self {
            receivers: RefCell::new(receivers.into()),
        })
    }
}

impl AccessibilityProvider for PendingProvider {
    fn fetch(
        &self,
        _element: &ElementRef,
    ) -> LocalBoxFuture<'static, Result<AccessibilityInfo, FetchError>> {
        let rx = self.receivers.borrow_mut().pop_front();
        async move {
            match rx {
                Some(rx) => rx
                    .await
                    .unwrap_or_else(|_| Err(FetchError::Provider("dropped".into()))),
                None => Err(FetchError::Provider("exhausted".into())),
            }
        }
        .boxed_local()
    }
}

struct StubFocus {
    current: RefCell<Option<ElementRef>>,
}

impl StubFocus {
    fn new() -> Rc<Self> {
        Rc::new(Self {
            current: RefCell::new(None),
        })
    }

    fn set_target(&self, element: Option<ElementRef>) {
        *self.current.borrow_mut() = element;
    }
}

impl FocusSource for StubFocus {
    fn current_target(&self) -> Option<ElementRef> {
        self.current.borrow().clone()
    }

    fn shadow_active_element(&self, _host: &ElementRef) -> Option<ElementRef> {
        None
    }
}

fn recording_channel() -> (Rc<LocalChannel>, Rc<RefCell<Vec<InspectorMessage>>>) {
    let channel = Rc::new(LocalChannel::new());
    let received: Rc<RefCell<Vec<InspectorMessage>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();
    channel.subscribe(
        TOPIC_INSPECTION,
        Rc::new(move |message| sink.borrow_mut().push(message.clone())),
    );
    (channel, received)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

// ============================================================================
// REFRESH PIPELINE
// ============================================================================

#[test]
fn test_visibility_regain_refreshes_current_target() -> anyhow::Result<()> {
    init_tracing();
    let provider = ImmediateProvider::new(AccessibilityInfo::new("button", "Send"));
    let focus = StubFocus::new();
    let (channel, received) = recording_channel();

    let inspector = Inspector::new(
        InspectorConfig::default(),
        provider.clone(),
        focus.clone(),
        channel,
    );
    inspector.set_enabled(true);

    let el = ElementRef::with_id("button", "send");
    focus.set_target(Some(el.clone()));

    smol::block_on(async {
        inspector.handle_visibility_change(false).await;
        inspector.handle_visibility_change(true).await;
    });

    let received = received.borrow();
    assert_eq!(received.len(), 1);
    match &received[0] {
        InspectorMessage::InspectionUpdated { target, info } => {
            assert_eq!(target, "button#send");
            assert_eq!(info.role, "button");
            assert_eq!(info.name, "Send");
        }
        other => anyhow::bail!("unexpected message: {:?}", other),
    }
    assert_eq!(provider.calls.get(), 1);
    Ok(())
}

#[test]
fn test_superseded_refresh_is_discarded() {
    init_tracing();
    let (tx1, rx1) = oneshot::channel();
    let (tx2, rx2) = oneshot::channel();
    let provider = PendingProvider::new(vec![rx1, rx2]);
    let focus = StubFocus::new();
    let (channel, received) = recording_channel();

    let inspector = Inspector::new(InspectorConfig::default(), provider, focus, channel);
    inspector.set_enabled(true);

    let first = ElementRef::with_id("button", "first");
    let second = ElementRef::with_id("a", "second");

    smol::block_on(async {
        futures::join!(
            inspector.refresh_element(&first, RefreshTrigger::PageRestored),
            inspector.refresh_element(&second, RefreshTrigger::PageRestored),
            async move {
                let _ = tx1.send(Ok(AccessibilityInfo::new("button", "First")));
                let _ = tx2.send(Ok(AccessibilityInfo::new("link", "Second")));
            }
        );
    });

    // Only the newest request is authoritative; the superseded result is
    // dropped even though its fetch completed.
    let received = received.borrow();
    assert_eq!(received.len(), 1);
    match &received[0] {
        InspectorMessage::InspectionUpdated { target, info } => {
            assert_eq!(target, "a#second");
            assert_eq!(info.name, "Second");
        }
        other => panic!("unexpected message: {:?}", other),
    }
}

#[test]
fn test_debounced_refetch_fires_from_tick() {
    init_tracing();
    let provider = ImmediateProvider::new(AccessibilityInfo::new("listitem", "Row"));
    let focus = StubFocus::new();
    let (channel, received) = recording_channel();

    let config = InspectorConfig {
        debounce_ms: 20,
        ..InspectorConfig::default()
    };
    let inspector = Inspector::new(config, provider, focus, channel);
    inspector.set_enabled(true);

    let el = ElementRef::new("li");
    inspector.schedule_refetch(&el);
    inspector.schedule_refetch(&el);

    smol::block_on(inspector.tick(Instant::now()));
    assert!(received.borrow().is_empty());

    std::thread::sleep(Duration::from_millis(40));
    smol::block_on(inspector.tick(Instant::now()));

    // Repeated scheduling within the window coalesced into one refresh.
    assert_eq!(received.borrow().len(), 1);
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[test]
fn test_core_modules_become_ready() {
    init_tracing();
    let provider = ImmediateProvider::new(AccessibilityInfo::new("button", "Ok"));
    let inspector = Inspector::new(
        InspectorConfig::default(),
        provider,
        StubFocus::new(),
        Rc::new(LocalChannel::new()),
    );

    let ready = smol::block_on(inspector.registry().wait_for_modules(
        &[MODULE_CACHE, MODULE_EVENTS],
        Duration::from_millis(200),
    ));
    assert!(ready);
}

#[test]
fn test_disable_keeps_entries_for_instant_reenable() {
    init_tracing();
    let provider = ImmediateProvider::new(AccessibilityInfo::new("button", "Keep"));
    let inspector = Inspector::new(
        InspectorConfig::default(),
        provider.clone(),
        StubFocus::new(),
        Rc::new(LocalChannel::new()),
    );
    inspector.set_enabled(true);

    let el = ElementRef::new("button");
    let result = smol::block_on(inspector.cache().lookup(&el));
    assert!(result.is_ok());
    assert_eq!(provider.calls.get(), 1);

    inspector.set_enabled(false);
    inspector.set_enabled(true);

    // Entry survived the disable; the next lookup is a pure cache hit.
    let result = smol::block_on(inspector.cache().lookup(&el));
    assert!(result.is_ok());
    assert_eq!(provider.calls.get(), 1);
}

#[test]
fn test_repeat_lookup_is_served_from_cache() {
    init_tracing();
    let provider = ImmediateProvider::new(AccessibilityInfo::new("checkbox", "Agree"));
    let inspector = Inspector::new(
        InspectorConfig::default(),
        provider.clone(),
        StubFocus::new(),
        Rc::new(LocalChannel::new()),
    );
    inspector.set_enabled(true);

    let el = ElementRef::new("input");
    smol::block_on(async {
        let first = inspector.cache().lookup(&el).await;
        let second = inspector.cache().lookup(&el).await;
        assert_eq!(first.unwrap(), second.unwrap());
    });
    assert_eq!(provider.calls.get(), 1);
    assert_eq!(inspector.cache().stats().hits, 1);
}
