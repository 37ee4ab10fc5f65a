//! Event values and the kernel's own event vocabulary.
//!
//! An [`Event`] is a named value with positional (`args`) and keyword
//! (`kwargs`) payloads. Routing never looks at the name — it is metadata for
//! handlers and logs; delivery is decided by the channel (and optional
//! target) the event is pushed on. The dispatcher stamps `channel`/`target`
//! onto the event at send time, so handlers can see where an event was
//! delivered.
//!
//! Payload values are [`serde_json::Value`], which keeps payloads
//! serialisable and printable without a schema.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::component::Component;

/// Payload value type for event args and kwargs.
pub type Value = serde_json::Value;

/// Keyword payload map. Keys are unique; ordering is not significant, a
/// sorted map keeps equality and serialisation deterministic.
pub type Kwargs = BTreeMap<String, Value>;

// ── Well-known channels ───────────────────────────────────────────────────────

/// Channel the run loop announces itself on, once, before the first drain.
pub const STARTED: &str = "started";
/// Channel the run loop signs off on, once, before the bounded drain.
pub const STOPPED: &str = "stopped";
/// Channel for component attachment notifications.
pub const REGISTERED: &str = "registered";
/// Channel for component detachment notifications.
pub const UNREGISTERED: &str = "unregistered";
/// Channel reified handler failures are pushed on.
pub const ERROR: &str = "error";

// ── Event ─────────────────────────────────────────────────────────────────────

/// A named value travelling the bus.
///
/// Two events are equal iff all five attributes — name, args, kwargs,
/// channel, target — are equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    name: String,
    args: Vec<Value>,
    kwargs: Kwargs,
    channel: Option<String>,
    target: Option<String>,
}

impl Event {
    /// Create an event with no payload. `channel`/`target` stay unset until
    /// the dispatcher delivers it.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            kwargs: Kwargs::new(),
            channel: None,
            target: None,
        }
    }

    /// Append a positional payload value.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Insert a keyword payload value.
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn kwargs(&self) -> &Kwargs {
        &self.kwargs
    }

    /// Channel this event was delivered on, if it has been dispatched.
    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    /// Target namespace this event was delivered to, if any.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Positional payload by index, `None` when out of range.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Keyword payload by key, `None` when absent.
    pub fn get_kwarg(&self, key: &str) -> Option<&Value> {
        self.kwargs.get(key)
    }

    /// Stamp the delivery route. Called by the dispatcher in `send`.
    pub(crate) fn set_route(&mut self, channel: &str, target: Option<&str>) {
        self.channel = Some(channel.to_string());
        self.target = target.map(str::to_string);
    }
}

impl Index<usize> for Event {
    type Output = Value;

    /// `event[i]` reads `args[i]`. Panics when out of range.
    fn index(&self, index: usize) -> &Value {
        &self.args[index]
    }
}

impl Index<&str> for Event {
    type Output = Value;

    /// `event[key]` reads `kwargs[key]`. Panics when the key is absent.
    fn index(&self, key: &str) -> &Value {
        &self.kwargs[key]
    }
}

impl fmt::Display for Event {
    /// Renders as `<Name[target:channel] (args, kwargs)>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let route = match (&self.target, &self.channel) {
            (Some(t), Some(c)) => format!("{t}:{c}"),
            (None, Some(c)) => c.clone(),
            _ => String::new(),
        };
        let args = self
            .args
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let kwargs = self
            .kwargs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "<{}[{route}] ({args}, {kwargs})>", self.name)
    }
}

// ── Truthiness ────────────────────────────────────────────────────────────────

/// Filter short-circuit rule: null, `false`, `0`, `""`, `[]` and `{}` are
/// falsy, everything else truthy.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

// ── Kernel events ─────────────────────────────────────────────────────────────

/// Emitted once when a run loop begins. Pushed on [`STARTED`].
pub fn started(component: &Component) -> Event {
    Event::new("Started").arg(component.describe())
}

/// Emitted once when a run loop terminates. Pushed on [`STOPPED`].
pub fn stopped(component: &Component) -> Event {
    Event::new("Stopped").arg(component.describe())
}

/// Emitted when a component is attached to a manager other than itself.
/// Pushed on [`REGISTERED`].
pub fn registered(component: &Component, manager: &Component) -> Event {
    Event::new("Registered")
        .arg(component.describe())
        .arg(manager.describe())
}

/// Symmetric to [`registered`]. Pushed on [`UNREGISTERED`].
pub fn unregistered(component: &Component, manager: &Component) -> Event {
    Event::new("Unregistered")
        .arg(component.describe())
        .arg(manager.describe())
}

/// Reified handler failure. Pushed on [`ERROR`].
///
/// `trace` carries the failing handler's name and dispatch key — the
/// closest thing to a traceback the dispatcher can offer.
pub fn error(
    kind: impl Into<String>,
    message: impl Into<String>,
    trace: impl Into<String>,
) -> Event {
    Event::new("Error")
        .arg(Value::String(kind.into()))
        .arg(Value::String(message.into()))
        .arg(Value::String(trace.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn equality_covers_all_five_attributes() {
        let a = Event::new("x").arg(1).kwarg("k", "v");
        let b = Event::new("x").arg(1).kwarg("k", "v");
        assert_eq!(a, b);

        let mut c = b.clone();
        c.set_route("foo", None);
        assert_ne!(a, c);

        let mut d = b.clone();
        d.set_route("foo", Some("t"));
        assert_ne!(c, d);

        assert_ne!(a, Event::new("y").arg(1).kwarg("k", "v"));
        assert_ne!(a, Event::new("x").arg(2).kwarg("k", "v"));
        assert_ne!(a, Event::new("x").arg(1).kwarg("k", "w"));
    }

    #[test]
    fn indexing_reads_args_and_kwargs() {
        let e = Event::new("x").arg("a").arg(2).kwarg("key", true);
        assert_eq!(e[0], json!("a"));
        assert_eq!(e[1], json!(2));
        assert_eq!(e["key"], json!(true));
        assert_eq!(e.get(5), None);
        assert_eq!(e.get_kwarg("nope"), None);
    }

    #[test]
    #[should_panic]
    fn indexing_out_of_range_panics() {
        let e = Event::new("x");
        let _ = &e[0];
    }

    #[test]
    fn serde_round_trip_preserves_equality() {
        let mut e = Event::new("greet").arg("hello").kwarg("who", "world");
        e.set_route("salutations", Some("lobby"));
        let text = serde_json::to_string(&e).expect("serialise");
        let back: Event = serde_json::from_str(&text).expect("deserialise");
        assert_eq!(e, back);
    }

    #[test]
    fn display_includes_route_and_payload() {
        let mut e = Event::new("Ping").arg("localhost");
        e.set_route("ping", Some("irc"));
        assert_eq!(e.to_string(), "<Ping[irc:ping] (\"localhost\", )>");

        let bare = Event::new("Ping");
        assert_eq!(bare.to_string(), "<Ping[] (, )>");
    }

    #[test]
    fn truthiness_table() {
        for falsy in [json!(null), json!(false), json!(0), json!(""), json!([]), json!({})] {
            assert!(!is_truthy(&falsy), "{falsy} should be falsy");
        }
        for truthy in [json!(true), json!(1), json!(-2.5), json!("x"), json!([0]), json!({"a": 0})] {
            assert!(is_truthy(&truthy), "{truthy} should be truthy");
        }
    }

    #[test]
    fn kernel_events_have_fixed_names() {
        let c = Component::new();
        assert_eq!(started(&c).name(), "Started");
        assert_eq!(stopped(&c).name(), "Stopped");
        assert_eq!(registered(&c, &c).name(), "Registered");
        assert_eq!(unregistered(&c, &c).name(), "Unregistered");

        let e = error("ValueError", "boom", "in handler 'h' on 'boom'");
        assert_eq!(e.name(), "Error");
        assert_eq!(e[0], json!("ValueError"));
        assert_eq!(e[1], json!("boom"));
    }
}
