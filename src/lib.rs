//! Switchboard — an in-process component event bus.
//!
//! Long-lived [`Component`]s communicate exclusively through named
//! [`Event`]s routed on named channels. Components compose into trees;
//! routing stays flat: whatever the tree shape, one root owns the
//! authoritative queue and channel index, and every push/flush/send
//! forwards there. A cooperative run loop drives ticks and queue drains,
//! reifying handler failures as `Error` events so the loop stays alive.
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use switchboard::{Component, Event, Handler};
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//!
//! let app = Component::new();
//! app.add_handler(Handler::listener("greet", move |args, _| {
//!     sink.lock().unwrap().push(args[0].clone());
//!     Ok(None)
//! }));
//!
//! app.push(Event::new("Greet").arg("hello"), "greet");
//! app.flush();
//! assert_eq!(seen.lock().unwrap().len(), 1);
//! ```

mod channels;
mod component;
mod dispatch;
mod runloop;

pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod logger;

pub use component::{Component, Tick};
pub use config::RunConfig;
pub use dispatch::Target;
pub use error::{ConfigError, HandlerError, LoggerError, StructuralError};
pub use event::{Event, Kwargs, Value};
pub use handler::{Handler, HandlerBuilder, HandlerResult};
pub use runloop::LoopState;
