//! In-process event bus.
//!
//! The bus owns every handler registration, keyed by declared kind. Publish
//! snapshots the matching registrations under the read lock and invokes them
//! after releasing it, so handlers may publish or (un)register re-entrantly and
//! a concurrent `register` never exposes a half-updated list.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock, Weak};

use crate::error::{lock_err, HandlerError, RegistrationError, VastError, VastResult};

use super::model::{Event, EventKind, Priority};
use super::sink::{ErrorContext, ErrorSink, TracingErrorSink};
use super::subscriber::Subscriber;

/// Identity of a registered subscriber.
///
/// Allocated by the bus on first registration and never reused, so a stale id
/// cannot match a subscriber registered later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    #[allow(missing_docs)]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Address of the `Arc` allocation. Only meaningful while compared against
/// live registrations: an address is reused only after its allocation is freed.
fn address_of<S: ?Sized>(subscriber: &Arc<S>) -> usize {
    Arc::as_ptr(subscriber).cast::<()>() as usize
}

/// Outcome counters for one publish call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Registrations whose kind matched the event.
    pub matched: usize,
    /// Handlers actually called (including ones that failed).
    pub invoked: usize,
    /// Handlers skipped because the event was cancelled.
    pub skipped_cancelled: usize,
    /// Handlers skipped because their subscriber was dropped.
    pub skipped_dropped: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

type ErasedHandler = dyn Fn(&Event) -> Option<Result<(), HandlerError>> + Send + Sync;

struct Registration {
    subscriber: SubscriberId,
    address: usize,
    subscriber_name: String,
    kind: EventKind,
    priority: Priority,
    ignore_cancelled: bool,
    seq: u64,
    liveness: Weak<dyn Any + Send + Sync>,
    invoke: Box<ErasedHandler>,
}

impl Registration {
    fn is_alive(&self) -> bool {
        self.liveness.strong_count() > 0
    }
}

#[derive(Default)]
struct BusState {
    by_kind: HashMap<EventKind, Vec<Arc<Registration>>>,
    next_seq: u64,
    next_subscriber: u64,
}

impl BusState {
    /// Id of the live subscriber registered from the allocation at `address`.
    fn live_id_at(&self, address: usize) -> Option<SubscriberId> {
        self.by_kind
            .values()
            .flatten()
            .find(|reg| reg.address == address && reg.is_alive())
            .map(|reg| reg.subscriber)
    }

    fn allocate_id(&mut self) -> SubscriberId {
        self.next_subscriber += 1;
        SubscriberId(self.next_subscriber)
    }

    /// Remove registrations matching `pred`; returns how many were removed.
    fn remove_where(&mut self, mut pred: impl FnMut(&Registration) -> bool) -> usize {
        let mut removed = 0;
        self.by_kind.retain(|_, list| {
            let before = list.len();
            list.retain(|reg| !pred(reg.as_ref()));
            removed += before - list.len();
            !list.is_empty()
        });
        removed
    }
}

/// Priority-ordered publish/subscribe registry.
///
/// Construct one per application context and share it by `Arc`.
pub struct EventBus {
    state: RwLock<BusState>,
    sink: Arc<dyn ErrorSink>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handler_count())
            .finish_non_exhaustive()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Bus reporting handler failures through [`TracingErrorSink`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_error_sink(Arc::new(TracingErrorSink))
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn with_error_sink(sink: Arc<dyn ErrorSink>) -> Self {
        Self {
            state: RwLock::new(BusState::default()),
            sink,
        }
    }

    /// Register every handler `subscriber` declares.
    ///
    /// All bindings are validated first; if any is malformed the whole
    /// registration is rejected and nothing is inserted. Registering a
    /// subscriber that is already registered replaces its previous handlers
    /// and keeps its id. The bus keeps only a weak reference to the subscriber.
    pub fn register<S: Subscriber>(&self, subscriber: &Arc<S>) -> VastResult<SubscriberId> {
        let address = address_of(subscriber);
        let name = subscriber.subscriber_name().to_string();
        let bindings = subscriber.bindings();

        if bindings.is_empty() {
            return Err(RegistrationError::InvalidHandler {
                subscriber: name,
                reason: "subscriber declares no handlers".to_string(),
            }
            .into());
        }
        for binding in &bindings {
            binding.kind.validate().map_err(|reason| RegistrationError::InvalidHandler {
                subscriber: name.clone(),
                reason,
            })?;
        }

        let weak: Weak<S> = Arc::downgrade(subscriber);
        let liveness: Weak<dyn Any + Send + Sync> = weak.clone();

        let mut state = self.state.write().map_err(|_| lock_err("bus.register"))?;
        let id = match state.live_id_at(address) {
            Some(id) => id,
            None => state.allocate_id(),
        };
        let replaced = state.remove_where(|reg| reg.subscriber == id || !reg.is_alive());

        let count = bindings.len();
        for binding in bindings {
            let seq = state.next_seq;
            state.next_seq += 1;

            let target = weak.clone();
            let callback = binding.callback;
            let registration = Registration {
                subscriber: id,
                address,
                subscriber_name: name.clone(),
                kind: binding.kind.clone(),
                priority: binding.priority,
                ignore_cancelled: binding.ignore_cancelled,
                seq,
                liveness: liveness.clone(),
                invoke: Box::new(move |event: &Event| target.upgrade().map(|s| callback(&*s, event))),
            };

            let list = state.by_kind.entry(binding.kind).or_default();
            list.push(Arc::new(registration));
            // Stable: equal priorities keep registration order.
            list.sort_by_key(|reg| reg.priority);
        }
        drop(state);

        tracing::debug!(subscriber = %name, id = %id, handlers = count, replaced, "registered subscriber");
        Ok(id)
    }

    /// Remove every handler owned by `subscriber`. Returns how many were removed.
    ///
    /// Idempotent; a never-registered subscriber is a no-op.
    pub fn unregister<S: ?Sized>(&self, subscriber: &Arc<S>) -> VastResult<usize> {
        let address = address_of(subscriber);
        self.remove_owned(|reg| reg.address == address)
    }

    /// Remove every handler registered under `id`.
    ///
    /// Ids are never reused, so an id whose subscriber is gone removes nothing.
    pub fn unregister_id(&self, id: SubscriberId) -> VastResult<usize> {
        self.remove_owned(|reg| reg.subscriber == id)
    }

    /// Remove live registrations matching `owned`, pruning dead ones on the way.
    fn remove_owned(&self, owned: impl Fn(&Registration) -> bool) -> VastResult<usize> {
        let mut state = self.state.write().map_err(|_| lock_err("bus.unregister"))?;
        let mut removed = 0;
        let mut ids = Vec::new();
        state.remove_where(|reg| {
            let hit = reg.is_alive() && owned(reg);
            if hit {
                removed += 1;
                ids.push(reg.subscriber);
            }
            hit || !reg.is_alive()
        });
        drop(state);

        if removed > 0 {
            ids.sort_unstable();
            ids.dedup();
            tracing::debug!(ids = ?ids, removed, "unregistered subscriber");
        }
        Ok(removed)
    }

    /// Deliver `event` to every matching handler and return once all have run.
    ///
    /// Handlers run in ascending priority, ties in registration order, across
    /// every kind list the event matches. A failing or panicking handler is
    /// reported to the error sink and does not stop the remaining handlers.
    pub fn publish(&self, event: &Event) -> PublishReport {
        let mut report = PublishReport::default();

        let handlers = match self.matching(event) {
            Ok(handlers) => handlers,
            Err(err) => {
                self.sink.report(
                    &ErrorContext::Dispatch {
                        event_kind: event.kind(),
                    },
                    &err,
                );
                return report;
            }
        };
        report.matched = handlers.len();

        for reg in handlers {
            if reg.ignore_cancelled && event.is_cancelled() {
                report.skipped_cancelled += 1;
                continue;
            }

            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| (reg.invoke)(event))) {
                Ok(None) => {
                    report.skipped_dropped += 1;
                    continue;
                }
                Ok(Some(outcome)) => outcome,
                Err(payload) => Err(HandlerError::from_panic(payload.as_ref())),
            };

            report.invoked += 1;
            if let Err(err) = outcome {
                report.failed += 1;
                self.sink.report(
                    &ErrorContext::Handler {
                        subscriber: reg.subscriber_name.clone(),
                        bound_kind: reg.kind.clone(),
                        event_kind: event.kind(),
                        resource_id: event.resource_id(),
                    },
                    &VastError::Handler(err),
                );
            }
        }

        tracing::trace!(
            kind = %event.kind(),
            resource_id = %event.resource_id(),
            invoked = report.invoked,
            failed = report.failed,
            "published event"
        );
        report
    }

    /// Number of registrations whose subscriber is still alive.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.state.read().map_or(0, |state| {
            state
                .by_kind
                .values()
                .flatten()
                .filter(|reg| reg.is_alive())
                .count()
        })
    }

    /// Number of live registrations bound to exactly `kind`.
    #[must_use]
    pub fn handler_count_for(&self, kind: &EventKind) -> usize {
        self.state.read().map_or(0, |state| {
            state
                .by_kind
                .get(kind)
                .map_or(0, |list| list.iter().filter(|reg| reg.is_alive()).count())
        })
    }

    fn matching(&self, event: &Event) -> VastResult<Vec<Arc<Registration>>> {
        let state = self.state.read().map_err(|_| lock_err("bus.publish"))?;
        let mut out: Vec<Arc<Registration>> = state
            .by_kind
            .iter()
            .filter(|(kind, _)| kind.matches(event))
            .flat_map(|(_, list)| list.iter().cloned())
            .collect();
        drop(state);

        out.sort_by_key(|reg| (reg.priority, reg.seq));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::event::HandlerBinding;
    use crate::snapshot::ResourceId;

    type Log = Arc<Mutex<Vec<String>>>;

    fn rid() -> ResourceId {
        ResourceId::new(1)
    }

    struct Recorder {
        tag: &'static str,
        log: Log,
        specs: Vec<(EventKind, Priority, bool)>,
    }

    impl Recorder {
        fn new(tag: &'static str, log: &Log, specs: Vec<(EventKind, Priority, bool)>) -> Arc<Self> {
            Arc::new(Self {
                tag,
                log: Arc::clone(log),
                specs,
            })
        }
    }

    impl Subscriber for Recorder {
        fn bindings(&self) -> Vec<HandlerBinding<Self>> {
            self.specs
                .iter()
                .map(|(kind, priority, ignore)| {
                    let label = format!("{}:{kind}", self.tag);
                    HandlerBinding::new(kind.clone(), move |me: &Self, _ev| {
                        me.log.lock().unwrap().push(label.clone());
                        Ok(())
                    })
                    .priority(*priority)
                    .ignore_cancelled(*ignore)
                })
                .collect()
        }

        fn subscriber_name(&self) -> &str {
            self.tag
        }
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[test]
    fn handlers_run_in_priority_then_registration_order() {
        let bus = EventBus::new();
        let log: Log = Arc::default();

        let monitor = Recorder::new("mon", &log, vec![(EventKind::StateChanged, Priority::Monitor, true)]);
        let low_a = Recorder::new("low-a", &log, vec![(EventKind::StateChanged, Priority::Low, true)]);
        let high = Recorder::new("high", &log, vec![(EventKind::StateChanged, Priority::High, true)]);
        let low_b = Recorder::new("low-b", &log, vec![(EventKind::StateChanged, Priority::Low, true)]);

        for s in [&monitor, &low_a, &high, &low_b] {
            bus.register(s).unwrap();
        }

        let report = bus.publish(&Event::state_changed(rid(), "a", "b", "c", "d"));
        assert_eq!(report.invoked, 4);
        assert_eq!(
            entries(&log),
            vec![
                "low-a:state_changed",
                "low-b:state_changed",
                "high:state_changed",
                "mon:state_changed"
            ]
        );
    }

    #[test]
    fn ancestor_kinds_merge_into_one_priority_order() {
        let bus = EventBus::new();
        let log: Log = Arc::default();

        let any = Recorder::new("any", &log, vec![(EventKind::Any, Priority::Lowest, true)]);
        let exact = Recorder::new("exact", &log, vec![(EventKind::ConnectivityReady, Priority::Normal, true)]);
        let other = Recorder::new("other", &log, vec![(EventKind::StateChanged, Priority::Lowest, true)]);
        bus.register(&exact).unwrap();
        bus.register(&any).unwrap();
        bus.register(&other).unwrap();

        let report = bus.publish(&Event::connectivity_ready(rid(), "h", 22));
        assert_eq!(report.matched, 2);
        assert_eq!(entries(&log), vec!["any:any", "exact:connectivity_ready"]);
    }

    struct Canceller;

    impl Subscriber for Canceller {
        fn bindings(&self) -> Vec<HandlerBinding<Self>> {
            vec![HandlerBinding::new(EventKind::Cancellable, |_, ev: &Event| {
                ev.set_cancelled(true);
                Ok(())
            })
            .priority(Priority::Lowest)]
        }
    }

    #[test]
    fn cancelled_events_skip_ignoring_handlers_only() {
        let bus = EventBus::new();
        let log: Log = Arc::default();

        let canceller = Arc::new(Canceller);
        let skipper = Recorder::new("skip", &log, vec![(EventKind::custom("launch"), Priority::Normal, true)]);
        let watcher = Recorder::new("watch", &log, vec![(EventKind::custom("launch"), Priority::Monitor, false)]);
        bus.register(&canceller).unwrap();
        bus.register(&skipper).unwrap();
        bus.register(&watcher).unwrap();

        let event = Event::custom(rid(), "launch", json!({})).cancellable();
        let report = bus.publish(&event);

        assert!(event.is_cancelled());
        assert_eq!(report.skipped_cancelled, 1);
        assert_eq!(report.invoked, 2);
        assert_eq!(entries(&log), vec!["watch:launch"]);
    }

    struct Faulty {
        panic: bool,
    }

    impl Subscriber for Faulty {
        fn bindings(&self) -> Vec<HandlerBinding<Self>> {
            vec![HandlerBinding::new(EventKind::Any, |me: &Self, _| {
                if me.panic {
                    panic!("handler exploded");
                }
                Err(HandlerError::new("refused"))
            })
            .priority(Priority::Lowest)]
        }
    }

    #[test]
    fn failing_handlers_are_reported_and_dispatch_continues() {
        let reports: Arc<Mutex<Vec<(ErrorContext, VastError)>>> = Arc::default();
        let sink_reports = Arc::clone(&reports);
        let bus = EventBus::with_error_sink(Arc::new(move |ctx: &ErrorContext, err: &VastError| {
            sink_reports.lock().unwrap().push((ctx.clone(), err.clone()));
        }));
        let log: Log = Arc::default();

        let erring = Arc::new(Faulty { panic: false });
        let panicking = Arc::new(Faulty { panic: true });
        let after = Recorder::new("after", &log, vec![(EventKind::StateChanged, Priority::Monitor, true)]);
        bus.register(&erring).unwrap();
        bus.register(&panicking).unwrap();
        bus.register(&after).unwrap();

        let report = bus.publish(&Event::state_changed(rid(), "a", "b", "c", "d"));
        assert_eq!(report.invoked, 3);
        assert_eq!(report.failed, 2);
        assert_eq!(entries(&log), vec!["after:state_changed"]);

        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|(_, err)| err.is_handler()));
        assert!(format!("{}", reports[1].1).contains("handler exploded"));
        assert!(matches!(reports[0].0, ErrorContext::Handler { .. }));
    }

    #[test]
    fn unregister_is_idempotent() {
        let bus = EventBus::new();
        let log: Log = Arc::default();
        let rec = Recorder::new(
            "r",
            &log,
            vec![
                (EventKind::StateChanged, Priority::Normal, true),
                (EventKind::ConnectivityReady, Priority::Normal, true),
            ],
        );
        let never = Recorder::new("never", &log, vec![(EventKind::Any, Priority::Normal, true)]);

        bus.register(&rec).unwrap();
        assert_eq!(bus.handler_count(), 2);
        assert_eq!(bus.unregister(&never).unwrap(), 0);
        assert_eq!(bus.unregister(&rec).unwrap(), 2);
        assert_eq!(bus.unregister(&rec).unwrap(), 0);
        assert_eq!(bus.handler_count(), 0);

        bus.publish(&Event::state_changed(rid(), "a", "b", "c", "d"));
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn reregistering_replaces_previous_handlers() {
        let bus = EventBus::new();
        let log: Log = Arc::default();
        let rec = Recorder::new("r", &log, vec![(EventKind::StateChanged, Priority::Normal, true)]);

        let first = bus.register(&rec).unwrap();
        let second = bus.register(&rec).unwrap();
        assert_eq!(first, second);
        assert_eq!(bus.handler_count_for(&EventKind::StateChanged), 1);
    }

    #[test]
    fn stale_id_never_matches_a_later_subscriber() {
        let bus = EventBus::new();
        let log: Log = Arc::default();

        let old = Recorder::new("old", &log, vec![(EventKind::Any, Priority::Normal, true)]);
        let stale = bus.register(&old).unwrap();
        drop(old);
        // Prunes the dead registration, releasing its allocation for reuse.
        assert_eq!(bus.unregister_id(stale).unwrap(), 0);

        let fresh: Vec<Arc<Recorder>> = (0..32)
            .map(|_| Recorder::new("fresh", &log, vec![(EventKind::Any, Priority::Normal, true)]))
            .collect();
        let mut ids = Vec::new();
        for rec in &fresh {
            ids.push(bus.register(rec).unwrap());
        }

        assert!(!ids.contains(&stale));
        assert_eq!(bus.unregister_id(stale).unwrap(), 0);
        assert_eq!(bus.handler_count(), 32);

        assert_eq!(bus.unregister_id(ids[0]).unwrap(), 1);
        assert_eq!(bus.unregister(&fresh[1]).unwrap(), 1);
        assert_eq!(bus.handler_count(), 30);
    }

    #[test]
    fn invalid_binding_rejects_whole_registration() {
        let bus = EventBus::new();
        let log: Log = Arc::default();
        let bad = Recorder::new(
            "bad",
            &log,
            vec![
                (EventKind::StateChanged, Priority::Normal, true),
                (EventKind::custom(""), Priority::Normal, true),
            ],
        );

        let err = bus.register(&bad).unwrap_err();
        assert!(err.is_registration());
        assert!(format!("{err}").contains("bad"));
        assert_eq!(bus.handler_count(), 0);

        let empty = Recorder::new("empty", &log, Vec::new());
        assert!(bus.register(&empty).unwrap_err().is_registration());
    }

    #[test]
    fn dropped_subscribers_are_not_kept_alive() {
        let bus = EventBus::new();
        let log: Log = Arc::default();
        let rec = Recorder::new("gone", &log, vec![(EventKind::Any, Priority::Normal, true)]);
        let weak = Arc::downgrade(&rec);
        bus.register(&rec).unwrap();
        drop(rec);

        assert!(weak.upgrade().is_none());
        assert_eq!(bus.handler_count(), 0);

        let report = bus.publish(&Event::connectivity_ready(rid(), "h", 1));
        assert_eq!(report.matched, 1);
        assert_eq!(report.skipped_dropped, 1);
        assert_eq!(report.invoked, 0);
        assert!(entries(&log).is_empty());
    }

    struct Reentrant {
        bus: Weak<EventBus>,
        log: Log,
    }

    impl Subscriber for Reentrant {
        fn bindings(&self) -> Vec<HandlerBinding<Self>> {
            vec![
                HandlerBinding::new(EventKind::StateChanged, |me: &Self, ev: &Event| {
                    let bus = me.bus.upgrade().ok_or_else(|| HandlerError::new("bus gone"))?;
                    bus.publish(&Event::custom(ev.resource_id(), "follow-up", json!(null)));
                    Ok(())
                }),
                HandlerBinding::new(EventKind::custom("follow-up"), |me: &Self, _| {
                    me.log.lock().unwrap().push("follow-up".to_string());
                    Ok(())
                }),
            ]
        }
    }

    #[test]
    fn handlers_may_publish_reentrantly() {
        let bus = Arc::new(EventBus::new());
        let log: Log = Arc::default();
        let sub = Arc::new(Reentrant {
            bus: Arc::downgrade(&bus),
            log: Arc::clone(&log),
        });
        bus.register(&sub).unwrap();

        let report = bus.publish(&Event::state_changed(rid(), "a", "b", "c", "d"));
        assert_eq!(report.failed, 0);
        assert_eq!(entries(&log), vec!["follow-up"]);
    }
}
