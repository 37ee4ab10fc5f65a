//! Handler descriptors — the explicit "what do I handle" record.
//!
//! A [`Handler`] binds a callable to a set of channels, optionally pinned to
//! a target namespace, and flagged as either a *listener* (the default) or a
//! *filter*. Filters sort before listeners in every bucket and may halt a
//! dispatch by returning a truthy value.
//!
//! Two callback shapes exist: a *payload* callback receives the event's
//! args/kwargs, an *event* callback receives the whole [`Event`] (and can
//! read the delivery channel/target off it). The shape is fixed at
//! construction and reported by [`Handler::passes_event`].

use std::fmt;

use uuid::Uuid;

use crate::error::HandlerError;
use crate::event::{Event, Kwargs, Value};

/// What a handler body returns: an optional result value, or a failure.
///
/// The returned value feeds the filter short-circuit rule and becomes the
/// return value of `send` when this handler runs last.
pub type HandlerResult = Result<Option<Value>, HandlerError>;

type PayloadFn = dyn Fn(&[Value], &Kwargs) -> HandlerResult + Send + Sync;
type EventFn = dyn Fn(&Event) -> HandlerResult + Send + Sync;

enum Callback {
    Payload(Box<PayloadFn>),
    Event(Box<EventFn>),
}

// ── Handler ───────────────────────────────────────────────────────────────────

/// A callable bound to channels, with routing metadata.
pub struct Handler {
    id: Uuid,
    name: String,
    channels: Vec<String>,
    target: Option<String>,
    filter: bool,
    call: Callback,
}

impl Handler {
    /// A listener on the channel equal to its name.
    ///
    /// This is the common case for component methods: a handler named
    /// `"ping"` listens on channel `ping`.
    pub fn listener<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Value], &Kwargs) -> HandlerResult + Send + Sync + 'static,
    {
        let name = name.into();
        Self::builder(name.clone()).channel(name).payload(f)
    }

    /// A filter on the channel equal to its name.
    pub fn filter<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Value], &Kwargs) -> HandlerResult + Send + Sync + 'static,
    {
        let name = name.into();
        Self::builder(name.clone()).channel(name).filter(true).payload(f)
    }

    /// Start a builder with no channels bound. A handler built without
    /// channels is global: it lands in the `*` bucket at registration.
    pub fn builder(name: impl Into<String>) -> HandlerBuilder {
        HandlerBuilder {
            name: name.into(),
            channels: Vec::new(),
            target: None,
            filter: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Channels this handler asked for. Empty means global.
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Target namespace override, if pinned.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn is_filter(&self) -> bool {
        self.filter
    }

    /// `true` when the callback receives the event object itself.
    pub fn passes_event(&self) -> bool {
        matches!(self.call, Callback::Event(_))
    }

    /// Run the callback against a delivered event.
    pub(crate) fn invoke(&self, event: &Event) -> HandlerResult {
        match &self.call {
            Callback::Payload(f) => f(event.args(), event.kwargs()),
            Callback::Event(f) => f(event),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("channels", &self.channels)
            .field("target", &self.target)
            .field("filter", &self.filter)
            .field("passes_event", &self.passes_event())
            .finish()
    }
}

// ── HandlerBuilder ────────────────────────────────────────────────────────────

/// Builder for handlers needing more than the [`Handler::listener`] /
/// [`Handler::filter`] shorthands: extra channels, a target pin, or the
/// event-shaped callback.
pub struct HandlerBuilder {
    name: String,
    channels: Vec<String>,
    target: Option<String>,
    filter: bool,
}

impl HandlerBuilder {
    /// Add one channel to listen on.
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channels.push(channel.into());
        self
    }

    /// Add several channels to listen on.
    pub fn channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels.extend(channels.into_iter().map(Into::into));
        self
    }

    /// Pin the handler to a target component namespace.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Mark the handler as a filter (runs before listeners, may halt
    /// dispatch with a truthy return).
    pub fn filter(mut self, filter: bool) -> Self {
        self.filter = filter;
        self
    }

    /// Finish with a payload callback (`args`/`kwargs` only).
    pub fn payload<F>(self, f: F) -> Handler
    where
        F: Fn(&[Value], &Kwargs) -> HandlerResult + Send + Sync + 'static,
    {
        self.finish(Callback::Payload(Box::new(f)))
    }

    /// Finish with an event callback (receives the delivered [`Event`]).
    pub fn event<F>(self, f: F) -> Handler
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        self.finish(Callback::Event(Box::new(f)))
    }

    fn finish(self, call: Callback) -> Handler {
        Handler {
            id: Uuid::new_v4(),
            name: self.name,
            channels: self.channels,
            target: self.target,
            filter: self.filter,
            call,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn listener_binds_channel_to_name() {
        let h = Handler::listener("ping", |_, _| Ok(None));
        assert_eq!(h.name(), "ping");
        assert_eq!(h.channels(), ["ping"]);
        assert!(!h.is_filter());
        assert!(!h.passes_event());
    }

    #[test]
    fn filter_shorthand_sets_flag() {
        let h = Handler::filter("gate", |_, _| Ok(Some(json!(true))));
        assert!(h.is_filter());
        assert_eq!(h.channels(), ["gate"]);
    }

    #[test]
    fn builder_without_channels_is_global() {
        let h = Handler::builder("record").event(|_| Ok(None));
        assert!(h.channels().is_empty());
        assert!(h.passes_event());
    }

    #[test]
    fn builder_collects_channels_and_target() {
        let h = Handler::builder("multi")
            .channels(["a", "b"])
            .channel("c")
            .target("other")
            .payload(|_, _| Ok(None));
        assert_eq!(h.channels(), ["a", "b", "c"]);
        assert_eq!(h.target(), Some("other"));
    }

    #[test]
    fn payload_callback_sees_args_and_kwargs() {
        let h = Handler::listener("echo", |args, kwargs| {
            assert_eq!(args[0], json!("hello"));
            assert_eq!(kwargs["who"], json!("world"));
            Ok(Some(args[0].clone()))
        });
        let event = Event::new("echo").arg("hello").kwarg("who", "world");
        let out = h.invoke(&event).expect("handler ok");
        assert_eq!(out, Some(json!("hello")));
    }

    #[test]
    fn event_callback_sees_delivery_route() {
        let h = Handler::builder("route").event(|event| {
            Ok(Some(json!(event.channel().unwrap_or(""))))
        });
        let mut event = Event::new("x");
        event.set_route("somewhere", None);
        assert_eq!(h.invoke(&event).unwrap(), Some(json!("somewhere")));
    }

    #[test]
    fn ids_are_unique() {
        let a = Handler::listener("same", |_, _| Ok(None));
        let b = Handler::listener("same", |_, _| Ok(None));
        assert_ne!(a.id(), b.id());
    }
}
