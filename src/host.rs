//! Host event loop
//!
//! [`Host`] stands in for the browser page: it routes signals to listeners,
//! keeps a virtual clock, runs timers when the clock advances and holds the
//! facts observers read (environment, current location, navigation timing).
//!
//! Everything is single-threaded. Each `observe`/`schedule` call hands back a
//! [`Subscription`]; dropping it detaches the listener together with every
//! timer the listener scheduled.

use crate::config::Environment;
use crate::signal::{NavigationTiming, Signal, SignalKind};
use chrono::{DateTime, Duration, Utc};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

type ListenerFn = Box<dyn FnMut(&Signal, &SignalContext<'_>)>;
type TimerFn = Box<dyn FnOnce(&SignalContext<'_>)>;

struct ListenerSlot {
    id: u64,
    kind: SignalKind,
    callback: Option<ListenerFn>,
}

struct TimerSlot {
    id: u64,
    owner: u64,
    due: DateTime<Utc>,
    callback: Option<TimerFn>,
}

struct HostInner {
    environment: Environment,
    now: Cell<DateTime<Utc>>,
    location: RefCell<String>,
    navigation_timing: RefCell<Option<NavigationTiming>>,
    listeners: RefCell<Vec<ListenerSlot>>,
    timers: RefCell<Vec<TimerSlot>>,
    next_id: Cell<u64>,
}

impl HostInner {
    fn allocate_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    fn remove(&self, id: u64) {
        self.listeners.borrow_mut().retain(|slot| slot.id != id);
        self.timers
            .borrow_mut()
            .retain(|slot| slot.id != id && slot.owner != id);
    }
}

/// Handle to the hosting page
#[derive(Clone)]
pub struct Host {
    inner: Rc<HostInner>,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("hostname", &self.inner.environment.hostname)
            .field("now", &self.inner.now.get())
            .field("listeners", &self.listener_count())
            .field("timers", &self.pending_timers())
            .finish()
    }
}

impl Host {
    /// Create a host page whose clock starts at `now`
    pub fn new(environment: Environment, now: DateTime<Utc>) -> Self {
        Self {
            inner: Rc::new(HostInner {
                environment,
                now: Cell::new(now),
                location: RefCell::new("/".to_string()),
                navigation_timing: RefCell::new(None),
                listeners: RefCell::new(Vec::new()),
                timers: RefCell::new(Vec::new()),
                next_id: Cell::new(1),
            }),
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.inner.environment
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.now.get()
    }

    /// Path plus query of the current route
    pub fn location(&self) -> String {
        self.inner.location.borrow().clone()
    }

    /// Path of the current route without the query
    pub fn path(&self) -> String {
        let location = self.inner.location.borrow();
        match location.split_once('?') {
            Some((path, _)) => path.to_string(),
            None => location.clone(),
        }
    }

    /// The navigation timing entry for the current page load, if recorded
    pub fn navigation_timing(&self) -> Option<NavigationTiming> {
        self.inner.navigation_timing.borrow().clone()
    }

    /// Publish (or replace) the navigation timing entry
    pub fn record_navigation_timing(&self, timing: NavigationTiming) {
        *self.inner.navigation_timing.borrow_mut() = Some(timing);
    }

    /// Attach a listener for one signal kind
    pub fn observe<F>(&self, kind: SignalKind, callback: F) -> Subscription
    where
        F: FnMut(&Signal, &SignalContext<'_>) + 'static,
    {
        let id = self.inner.allocate_id();
        self.inner.listeners.borrow_mut().push(ListenerSlot {
            id,
            kind,
            callback: Some(Box::new(callback)),
        });
        log::trace!("listener {} attached for {:?}", id, kind);
        Subscription::new(&self.inner, id)
    }

    /// Run `callback` once the clock reaches `now + delay`
    pub fn schedule<F>(&self, delay: Duration, callback: F) -> Subscription
    where
        F: FnOnce(&SignalContext<'_>) + 'static,
    {
        let id = self.inner.allocate_id();
        self.push_timer(id, id, delay, Box::new(callback));
        Subscription::new(&self.inner, id)
    }

    fn push_timer(&self, id: u64, owner: u64, delay: Duration, callback: TimerFn) {
        let Some(due) = self.now().checked_add_signed(delay) else {
            log::warn!("timer {} dropped: delay {} overflows the clock", id, delay);
            return;
        };
        self.inner.timers.borrow_mut().push(TimerSlot {
            id,
            owner,
            due,
            callback: Some(callback),
        });
    }

    /// Deliver a signal at time `at`.
    ///
    /// Timers due before `at` fire first. Navigation signals update the current
    /// location before any listener sees them.
    pub fn dispatch(&self, signal: Signal, at: DateTime<Utc>) {
        self.advance_to(at);

        if let Signal::Navigation(navigation) = &signal {
            *self.inner.location.borrow_mut() = navigation.location();
        }

        let kind = signal.kind();
        let ids: Vec<u64> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .filter(|slot| slot.kind == kind)
            .map(|slot| slot.id)
            .collect();

        for id in ids {
            let taken = self
                .inner
                .listeners
                .borrow_mut()
                .iter_mut()
                .find(|slot| slot.id == id)
                .and_then(|slot| slot.callback.take());

            // Listener detached earlier in this dispatch
            let Some(mut callback) = taken else {
                continue;
            };

            let ctx = SignalContext { host: self, owner: id };
            callback(&signal, &ctx);

            if let Some(slot) = self
                .inner
                .listeners
                .borrow_mut()
                .iter_mut()
                .find(|slot| slot.id == id)
            {
                slot.callback = Some(callback);
            }
        }
    }

    /// Move the clock forward to `at`, firing due timers in order
    pub fn advance_to(&self, at: DateTime<Utc>) {
        loop {
            let next = {
                let mut timers = self.inner.timers.borrow_mut();
                let due_index = timers
                    .iter()
                    .enumerate()
                    .filter(|(_, slot)| slot.due <= at)
                    .min_by_key(|(_, slot)| (slot.due, slot.id))
                    .map(|(index, _)| index);
                due_index.map(|index| timers.remove(index))
            };

            let Some(mut timer) = next else {
                break;
            };

            if timer.due > self.now() {
                self.inner.now.set(timer.due);
            }
            if let Some(callback) = timer.callback.take() {
                let ctx = SignalContext {
                    host: self,
                    owner: timer.owner,
                };
                callback(&ctx);
            }
        }

        if at > self.now() {
            self.inner.now.set(at);
        }
    }

    /// Number of attached listeners
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Number of timers waiting to fire
    pub fn pending_timers(&self) -> usize {
        self.inner.timers.borrow().len()
    }
}

/// View of the host handed to listeners and timers while they run
pub struct SignalContext<'a> {
    host: &'a Host,
    owner: u64,
}

impl<'a> SignalContext<'a> {
    pub fn now(&self) -> DateTime<Utc> {
        self.host.now()
    }

    pub fn host(&self) -> &'a Host {
        self.host
    }

    pub fn environment(&self) -> &'a Environment {
        self.host.environment()
    }

    pub fn path(&self) -> String {
        self.host.path()
    }

    pub fn navigation_timing(&self) -> Option<NavigationTiming> {
        self.host.navigation_timing()
    }

    /// Schedule a timer owned by the running listener.
    ///
    /// The timer is cancelled when the listener's subscription is released.
    pub fn schedule_after<F>(&self, delay: Duration, callback: F)
    where
        F: FnOnce(&SignalContext<'_>) + 'static,
    {
        let id = self.host.inner.allocate_id();
        self.host.push_timer(id, self.owner, delay, Box::new(callback));
    }
}

/// Registration of a listener or timer. Released on `stop()` or drop.
#[must_use = "dropping a Subscription detaches it immediately"]
pub struct Subscription {
    host: Weak<HostInner>,
    id: u64,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Subscription {
    fn new(host: &Rc<HostInner>, id: u64) -> Self {
        Self {
            host: Rc::downgrade(host),
            id,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Detach the listener and cancel its timers
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(host) = self.host.upgrade() {
            host.remove(self.id);
            log::trace!("subscription {} released", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{Navigation, ScrollMetrics};
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    fn host() -> Host {
        Host::new(Environment::new("example.dev"), start())
    }

    fn scroll() -> Signal {
        Signal::Scroll(ScrollMetrics::new(100.0, 2000.0, 1000.0))
    }

    #[test]
    fn test_dispatch_routes_by_kind() {
        let host = host();
        let seen = Rc::new(Cell::new(0));
        let counter = seen.clone();
        let _sub = host.observe(SignalKind::Scroll, move |_, _| counter.set(counter.get() + 1));

        host.dispatch(scroll(), start());
        host.dispatch(Signal::Load, start());
        host.dispatch(scroll(), start());

        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn test_dropping_subscription_detaches() {
        let host = host();
        let seen = Rc::new(Cell::new(0));
        let counter = seen.clone();
        let sub = host.observe(SignalKind::Scroll, move |_, _| counter.set(counter.get() + 1));

        host.dispatch(scroll(), start());
        sub.stop();
        host.dispatch(scroll(), start());

        assert_eq!(seen.get(), 1);
        assert_eq!(host.listener_count(), 0);
    }

    #[test]
    fn test_timer_past_clock_range_is_dropped() {
        let host = host();
        let fired = Rc::new(Cell::new(false));
        let flag = fired.clone();
        let _timer = host.schedule(Duration::days(100_000_000), move |_| flag.set(true));

        assert_eq!(host.pending_timers(), 0);
        host.advance_to(start() + Duration::days(365));
        assert!(!fired.get());
    }

    #[test]
    fn test_timers_fire_in_order_and_advance_clock() {
        let host = host();
        let fired = Rc::new(RefCell::new(Vec::new()));

        let log_a = fired.clone();
        let _a = host.schedule(Duration::seconds(2), move |ctx| log_a.borrow_mut().push(("a", ctx.now())));
        let log_b = fired.clone();
        let _b = host.schedule(Duration::seconds(1), move |ctx| log_b.borrow_mut().push(("b", ctx.now())));

        host.advance_to(start() + Duration::seconds(5));

        let fired = fired.borrow();
        assert_eq!(fired.len(), 2);
        assert_eq!(fired[0], ("b", start() + Duration::seconds(1)));
        assert_eq!(fired[1], ("a", start() + Duration::seconds(2)));
        assert_eq!(host.now(), start() + Duration::seconds(5));
        assert_eq!(host.pending_timers(), 0);
    }

    #[test]
    fn test_listener_timers_cancelled_with_subscription() {
        let host = host();
        let fired = Rc::new(Cell::new(false));
        let flag = fired.clone();
        let sub = host.observe(SignalKind::Load, move |_, ctx| {
            let flag = flag.clone();
            ctx.schedule_after(Duration::seconds(1), move |_| flag.set(true));
        });

        host.dispatch(Signal::Load, start());
        assert_eq!(host.pending_timers(), 1);

        sub.stop();
        assert_eq!(host.pending_timers(), 0);

        host.advance_to(start() + Duration::seconds(10));
        assert!(!fired.get());
    }

    #[test]
    fn test_listener_may_detach_itself_during_dispatch() {
        let host = host();
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let inner = slot.clone();
        let sub = host.observe(SignalKind::Scroll, move |_, _| {
            inner.borrow_mut().take();
        });
        *slot.borrow_mut() = Some(sub);

        host.dispatch(scroll(), start());
        assert_eq!(host.listener_count(), 0);
    }

    #[test]
    fn test_navigation_updates_location() {
        let host = host();
        host.dispatch(
            Signal::Navigation(Navigation::to("/blog").with_query("tag=rust")),
            start(),
        );
        assert_eq!(host.location(), "/blog?tag=rust");
        assert_eq!(host.path(), "/blog");
    }
}
