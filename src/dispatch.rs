//! Queueing and delivery: `push`, `flush`, `send`.
//!
//! All three forward to the root of the tree — the only authoritative queue
//! and channel index. `push` enqueues, `flush` drains one snapshot of the
//! queue, `send` resolves the handler chain for a dispatch key and invokes
//! it in order, filters first.
//!
//! Failure policy (per handler): a [`HandlerError::Failure`] is pushed back
//! onto the bus as an `Error` event on the `error` channel (unless logging
//! is disabled) and optionally re-raised (`try_send`). An
//! [`HandlerError::Interrupt`] is never reified: it clears the running flag
//! and propagates.

use std::fmt;
use std::sync::atomic::Ordering;

use tracing::{trace, warn};

use crate::channels::scoped_key;
use crate::component::{Component, lock};
use crate::error::HandlerError;
use crate::event::{self, Event, Value, is_truthy};

// ── Target ────────────────────────────────────────────────────────────────────

/// Where an event is aimed: a target namespace string, or a component whose
/// channel is substituted at send time.
#[derive(Clone)]
pub enum Target {
    Channel(String),
    Component(Component),
}

impl Target {
    /// The namespace string this target resolves to. A component without a
    /// channel resolves to none (unscoped dispatch).
    pub(crate) fn resolve(&self) -> Option<String> {
        match self {
            Target::Channel(s) => Some(s.clone()),
            Target::Component(c) => c.channel().map(str::to_string),
        }
    }
}

impl From<&str> for Target {
    fn from(s: &str) -> Self {
        Target::Channel(s.to_string())
    }
}

impl From<String> for Target {
    fn from(s: String) -> Self {
        Target::Channel(s)
    }
}

impl From<&Component> for Target {
    fn from(c: &Component) -> Self {
        Target::Component(c.clone())
    }
}

impl From<Component> for Target {
    fn from(c: Component) -> Self {
        Target::Component(c)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Channel(s) => write!(f, "Target::Channel({s:?})"),
            Target::Component(c) => write!(f, "Target::Component({:?})", c.id()),
        }
    }
}

/// One queued dispatch: the event and its coordinates.
pub(crate) struct Pending {
    pub(crate) event: Event,
    pub(crate) channel: String,
    pub(crate) target: Option<Target>,
}

// ── Push / flush / send ───────────────────────────────────────────────────────

impl Component {
    /// Enqueue an event on a channel at the root. The target defaults to
    /// this component's own channel.
    pub fn push(&self, event: Event, channel: &str) {
        self.enqueue(event, channel, None);
    }

    /// Enqueue an event aimed at an explicit target.
    pub fn push_to(&self, event: Event, channel: &str, target: impl Into<Target>) {
        self.enqueue(event, channel, Some(target.into()));
    }

    /// Alias for [`Component::push`].
    pub fn fire(&self, event: Event, channel: &str) {
        self.push(event, channel);
    }

    fn enqueue(&self, event: Event, channel: &str, target: Option<Target>) {
        let target = target.or_else(|| self.channel().map(|c| Target::Channel(c.to_string())));
        let root = self.root();
        trace!(channel, name = event.name(), "push");
        lock(&root.shared.core).queue.push_back(Pending {
            event,
            channel: channel.to_string(),
            target,
        });
    }

    /// Drain every event currently queued, dispatching each in FIFO order.
    ///
    /// Events pushed while flushing land in the next snapshot. An interrupt
    /// raised by a handler clears the running flag and abandons the rest of
    /// the current snapshot.
    pub fn flush(&self) {
        let _ = self.flush_inner();
    }

    /// `flush` that surfaces the interrupt — the run loop needs it to break
    /// out of its iteration.
    pub(crate) fn flush_inner(&self) -> Result<(), HandlerError> {
        let root = self.root();
        let snapshot: Vec<Pending> = {
            let mut core = lock(&root.shared.core);
            core.queue.drain(..).collect()
        };
        for pending in snapshot {
            if let Err(e) =
                root.dispatch(pending.event, &pending.channel, pending.target, false, true)
            {
                root.shared.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Dispatch immediately with the default policy: failures become `Error`
    /// events, nothing re-raises. Returns the filter short-circuit value or
    /// the last handler's return value; `None` on an empty chain.
    ///
    /// An interrupt clears the running flag and yields `None`; use
    /// [`Component::try_send`] to observe it.
    pub fn send(&self, event: Event, channel: &str) -> Option<Value> {
        self.send_opt(event, channel, None)
    }

    /// [`Component::send`] with an explicit target.
    pub fn send_to(&self, event: Event, channel: &str, target: impl Into<Target>) -> Option<Value> {
        self.send_opt(event, channel, Some(target.into()))
    }

    fn send_opt(&self, event: Event, channel: &str, target: Option<Target>) -> Option<Value> {
        match self.dispatch_from(event, channel, target, false, true) {
            Ok(value) => value,
            Err(_) => {
                // Only the interrupt escapes a non-raising dispatch.
                self.root().shared.running.store(false, Ordering::SeqCst);
                None
            }
        }
    }

    /// Dispatch with `errors = true`: the first handler failure is re-raised
    /// to the caller (after being reified, unless `log` is false).
    pub fn try_send(
        &self,
        event: Event,
        channel: &str,
        target: Option<Target>,
        log: bool,
    ) -> Result<Option<Value>, HandlerError> {
        self.dispatch_from(event, channel, target, true, log)
    }

    /// Build an event named after the title-cased channel and send it at
    /// this component's own namespace.
    pub fn call(&self, channel: &str, args: Vec<Value>) -> Option<Value> {
        let mut event = Event::new(title(channel));
        for arg in args {
            event = event.arg(arg);
        }
        self.send(event, channel)
    }

    fn dispatch_from(
        &self,
        event: Event,
        channel: &str,
        target: Option<Target>,
        errors: bool,
        log: bool,
    ) -> Result<Option<Value>, HandlerError> {
        let target = target.or_else(|| self.channel().map(|c| Target::Channel(c.to_string())));
        self.root().dispatch(event, channel, target, errors, log)
    }

    /// Core delivery, on the root: stamp the event's route, resolve the
    /// handler chain, invoke in order honouring the filter short-circuit.
    pub(crate) fn dispatch(
        &self,
        mut event: Event,
        channel: &str,
        target: Option<Target>,
        errors: bool,
        log: bool,
    ) -> Result<Option<Value>, HandlerError> {
        let target = target.as_ref().and_then(Target::resolve);
        event.set_route(channel, target.as_deref());
        let key = scoped_key(target.as_deref(), channel);

        let chain = lock(&self.shared.core).channels.resolve(&key);
        trace!(key = %key, handlers = chain.len(), name = event.name(), "send");

        let mut last: Option<Value> = None;
        for handler in chain {
            match handler.invoke(&event) {
                Ok(value) => {
                    if handler.is_filter() && value.as_ref().is_some_and(is_truthy) {
                        return Ok(value);
                    }
                    last = value;
                }
                Err(HandlerError::Interrupt) => return Err(HandlerError::Interrupt),
                Err(HandlerError::Failure { kind, message }) => {
                    warn!(handler = handler.name(), key = %key, %kind, %message, "handler failed");
                    if log {
                        let trace = format!("in handler '{}' on '{key}'", handler.name());
                        self.push(event::error(&kind, &message, trace), event::ERROR);
                    }
                    if errors {
                        return Err(HandlerError::Failure { kind, message });
                    }
                }
            }
        }
        Ok(last)
    }
}

/// Title-case a channel name for [`Component::call`]: `"greet"` → `"Greet"`.
fn title(channel: &str) -> String {
    let mut chars = channel.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<Value>>>, impl Fn(&[Value]) -> Option<Value> + Clone) {
        let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |args: &[Value]| {
            sink.lock().unwrap().push(args.first().cloned().unwrap_or(Value::Null));
            None
        })
    }

    #[test]
    fn simple_echo_after_one_flush() {
        let a = Component::new();
        let (seen, record) = recorder();
        a.add_handler(Handler::listener("foo", move |args, _| Ok(record(args))));

        a.push(Event::new("x").arg("x"), "foo");
        assert_eq!(a.queue_len(), 1);
        a.flush();

        assert_eq!(*seen.lock().unwrap(), vec![json!("x")]);
        assert_eq!(a.queue_len(), 0);
    }

    #[test]
    fn filter_truthy_halts_dispatch_and_returns_value() {
        let a = Component::new();
        let (seen, record) = recorder();
        a.add_handler(Handler::filter("c", |_, _| Ok(Some(json!(true)))));
        a.add_handler(Handler::listener("c", move |args, _| Ok(record(args))));

        let out = a.send(Event::new("x"), "c");
        assert_eq!(out, Some(json!(true)));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn falsy_filter_return_does_not_halt() {
        let a = Component::new();
        let (seen, record) = recorder();
        a.add_handler(Handler::filter("c", |_, _| Ok(Some(json!(false)))));
        a.add_handler(Handler::listener("c", move |args, _| Ok(record(args))));

        a.send(Event::new("x").arg(1), "c");
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn targeted_dispatch_only_hits_matching_namespace() {
        let root = Component::new();
        let a = Component::with_channel("a");
        let (seen, record) = recorder();
        a.add_handler(Handler::listener("ping", move |args, _| Ok(record(args))));
        a.register(&root);
        root.flush(); // clear the Registered event

        root.push_to(Event::new("ping").arg(1), "ping", "a");
        root.flush();
        assert_eq!(seen.lock().unwrap().len(), 1);

        root.push_to(Event::new("ping").arg(2), "ping", "b");
        root.flush();
        assert_eq!(seen.lock().unwrap().len(), 1, "no handler lives at target b");
    }

    #[test]
    fn channelled_component_targets_itself_by_default() {
        let a = Component::with_channel("a");
        let (seen, record) = recorder();
        a.add_handler(Handler::listener("ping", move |args, _| Ok(record(args))));

        a.push(Event::new("ping").arg("hi"), "ping");
        a.flush();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn failure_is_reified_as_error_event() {
        let a = Component::new();
        a.add_handler(Handler::listener("boom", |_, _| {
            Err(HandlerError::failure("ValueError", "boom"))
        }));
        let (kinds, record) = recorder();
        a.add_handler(Handler::listener("error", move |args, _| Ok(record(args))));

        a.push(Event::new("go"), "boom");
        a.flush();
        // The Error event was pushed during the flush — it drains next cycle.
        assert_eq!(a.queue_len(), 1);
        a.flush();

        assert_eq!(*kinds.lock().unwrap(), vec![json!("ValueError")]);
    }

    #[test]
    fn try_send_re_raises_the_failure() {
        let a = Component::new();
        a.add_handler(Handler::listener("boom", |_, _| {
            Err(HandlerError::failure("ValueError", "boom"))
        }));

        let err = a
            .try_send(Event::new("go"), "boom", None, false)
            .expect_err("failure should re-raise");
        assert_eq!(err.to_string(), "ValueError: boom");
        // log = false: nothing was reified.
        assert_eq!(a.queue_len(), 0);
    }

    #[test]
    fn events_pushed_mid_flush_drain_next_cycle() {
        let a = Component::new();
        let relay = a.clone();
        a.add_handler(Handler::listener("first", move |_, _| {
            relay.push(Event::new("next"), "second");
            Ok(None)
        }));
        let (seen, record) = recorder();
        a.add_handler(Handler::listener("second", move |args, _| Ok(record(args))));

        a.push(Event::new("go"), "first");
        a.flush();
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(a.queue_len(), 1);

        a.flush();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn empty_channel_dispatch_returns_none() {
        let a = Component::new();
        assert_eq!(a.send(Event::new("x"), "nowhere"), None);
    }

    #[test]
    fn send_returns_the_last_handler_value() {
        let a = Component::new();
        a.add_handler(Handler::listener("c", |_, _| Ok(Some(json!("first")))));
        a.add_handler(Handler::listener("c", |_, _| Ok(Some(json!("second")))));
        assert_eq!(a.send(Event::new("x"), "c"), Some(json!("second")));
    }

    #[test]
    fn interrupt_abandons_the_rest_of_the_snapshot() {
        let a = Component::new();
        a.add_handler(Handler::listener("halt", |_, _| Err(HandlerError::Interrupt)));
        let (seen, record) = recorder();
        a.add_handler(Handler::listener("after", move |args, _| Ok(record(args))));

        a.push(Event::new("one"), "halt");
        a.push(Event::new("two"), "after");
        a.flush();

        assert!(seen.lock().unwrap().is_empty(), "second event abandoned");
        assert_eq!(a.queue_len(), 0);
        assert!(!a.running());
    }

    #[test]
    fn component_target_resolves_to_its_channel() {
        let root = Component::new();
        let a = Component::with_channel("a");
        let (seen, record) = recorder();
        a.add_handler(Handler::listener("ping", move |args, _| Ok(record(args))));
        a.register(&root);
        root.flush();

        root.push_to(Event::new("ping").arg(1), "ping", &a);
        root.flush();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn fire_is_push() {
        let a = Component::new();
        a.fire(Event::new("x"), "c");
        assert_eq!(a.queue_len(), 1);
    }

    #[test]
    fn call_builds_a_title_cased_event() {
        let a = Component::new();
        a.add_handler(
            Handler::builder("greet")
                .channel("greet")
                .event(|event| Ok(Some(json!(event.name())))),
        );
        assert_eq!(a.call("greet", vec![json!("hi")]), Some(json!("Greet")));
    }

    #[test]
    fn dispatched_event_carries_its_route() {
        let a = Component::new();
        a.add_handler(Handler::builder("route").channel("c").event(|event| {
            assert_eq!(event.channel(), Some("c"));
            assert_eq!(event.target(), Some("t"));
            Ok(Some(json!("unscoped")))
        }));
        // Unscoped buckets are consulted for targeted dispatch too.
        assert_eq!(a.send_to(Event::new("x"), "c", "t"), Some(json!("unscoped")));
    }
}
