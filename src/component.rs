//! Components and the registration tree.
//!
//! A [`Component`] doubles as a manager: a freshly constructed component is
//! the root of its own event-bus tree, owning an authoritative queue,
//! handler set, channel index, child set, hidden set and tick set. When it
//! registers into a parent, its handlers move into the parent tree's root
//! index and every operation forwards upward — the tree keeps ownership,
//! routing is flat at the root.
//!
//! Handles are cheap clones over shared state; identity is the component id,
//! so clones compare equal. Root-ness is an absent parent pointer and
//! [`Component::root`] walks up until it finds one.
//!
//! `register`/`unregister` called from outside the run loop must be
//! externally serialised with respect to each other; everything else is
//! mutated only from the loop's thread.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::JoinHandle;

use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::channels::{ChannelIndex, scoped_key};
use crate::dispatch::Pending;
use crate::error::{HandlerError, StructuralError};
use crate::event::{self, Value};
use crate::handler::Handler;

/// Tick callback: nullary periodic work run once per loop iteration, before
/// the queue drain. Must not block.
pub type Tick = Arc<dyn Fn() -> Result<(), HandlerError> + Send + Sync>;

/// Lock a mutex, ignoring poisoning — state stays usable after a panicking
/// handler thread.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ── Shared state ──────────────────────────────────────────────────────────────

pub(crate) struct Shared {
    pub(crate) id: Uuid,
    pub(crate) channel: Option<String>,
    pub(crate) running: AtomicBool,
    /// `None` ⇒ this component is the root of its tree.
    pub(crate) parent: Mutex<Option<Component>>,
    pub(crate) own: Mutex<OwnTable>,
    pub(crate) core: Mutex<Core>,
    pub(crate) task: Mutex<Option<JoinHandle<()>>>,
}

/// The component's own declarations and registration bookkeeping.
pub(crate) struct OwnTable {
    /// Handlers declared on this component (the explicit handler table).
    pub(crate) handlers: Vec<Arc<Handler>>,
    pub(crate) tick: Option<Tick>,
    /// Descendants surrendered to the root during our registration; demoted
    /// back to us on unregister.
    pub(crate) promoted: Vec<Component>,
    /// Non-root parent we were promoted past. Weak: the owner's child set
    /// already holds us strongly.
    pub(crate) owner: Option<Weak<Shared>>,
}

/// Manager state — authoritative only at the root of a tree.
pub(crate) struct Core {
    pub(crate) queue: VecDeque<Pending>,
    pub(crate) handlers: HashMap<Uuid, Arc<Handler>>,
    pub(crate) channels: ChannelIndex,
    pub(crate) components: Vec<Component>,
    pub(crate) hidden: Vec<Component>,
    /// Ticks keyed by the owning component's id.
    pub(crate) ticks: HashMap<Uuid, Tick>,
}

// ── Component ─────────────────────────────────────────────────────────────────

/// Handle to one component. Clone freely; clones share state and identity.
#[derive(Clone)]
pub struct Component {
    pub(crate) shared: Arc<Shared>,
}

impl Component {
    /// An unchannelled component — a plain manager, root of its own tree.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A component with a target-namespace channel of its own.
    pub fn with_channel(channel: impl Into<String>) -> Self {
        Self::build(Some(channel.into()))
    }

    fn build(channel: Option<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                channel,
                running: AtomicBool::new(false),
                parent: Mutex::new(None),
                own: Mutex::new(OwnTable {
                    handlers: Vec::new(),
                    tick: None,
                    promoted: Vec::new(),
                    owner: None,
                }),
                core: Mutex::new(Core {
                    queue: VecDeque::new(),
                    handlers: HashMap::new(),
                    channels: ChannelIndex::default(),
                    components: Vec::new(),
                    hidden: Vec::new(),
                    ticks: HashMap::new(),
                }),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// The component's default target namespace, if any.
    pub fn channel(&self) -> Option<&str> {
        self.shared.channel.as_deref()
    }

    pub fn parent(&self) -> Option<Component> {
        lock(&self.shared.parent).clone()
    }

    pub fn is_root(&self) -> bool {
        lock(&self.shared.parent).is_none()
    }

    /// Walk parent pointers to the root of this tree.
    pub fn root(&self) -> Component {
        let mut current = self.clone();
        loop {
            let parent = lock(&current.shared.parent).clone();
            match parent {
                Some(p) => current = p,
                None => return current,
            }
        }
    }

    /// JSON descriptor used when this component appears in event payloads.
    pub(crate) fn describe(&self) -> Value {
        json!({ "id": self.id().to_string(), "channel": self.shared.channel })
    }

    // ── Declarations ──────────────────────────────────────────────────────

    /// Declare a handler on this component.
    ///
    /// The handler joins the component's own table and is indexed
    /// immediately wherever the component is currently registered (itself
    /// when it is a root).
    pub fn add_handler(&self, handler: Handler) {
        let handler = Arc::new(handler);
        lock(&self.shared.own).handlers.push(Arc::clone(&handler));

        let holder = self.parent().unwrap_or_else(|| self.clone());
        let mut core = lock(&holder.shared.core);
        core.handlers.insert(handler.id(), Arc::clone(&handler));
        for key in self.handler_keys(&handler) {
            core.channels.add(&key, Arc::clone(&handler));
        }
    }

    /// Install this component's tick. Replaces any previous tick and is
    /// registered with the current root immediately.
    pub fn set_tick<F>(&self, f: F)
    where
        F: Fn() -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let tick: Tick = Arc::new(f);
        lock(&self.shared.own).tick = Some(Arc::clone(&tick));
        let root = self.root();
        lock(&root.shared.core).ticks.insert(self.id(), tick);
    }

    /// Bucket keys for one of our handlers: the handler's target (falling
    /// back to our channel) combined with each of its channels, `*` when it
    /// declared none.
    fn handler_keys(&self, handler: &Handler) -> Vec<String> {
        let target = handler.target().or_else(|| self.channel());
        if handler.channels().is_empty() {
            vec![scoped_key(target, "*")]
        } else {
            handler
                .channels()
                .iter()
                .map(|c| scoped_key(target, c))
                .collect()
        }
    }

    // ── Registration ──────────────────────────────────────────────────────

    /// Attach this component (and its subtree) to a parent manager.
    ///
    /// Our handler table is merged into the parent's channel index, we join
    /// the parent's child set, a `Registered` event is pushed, and the
    /// hidden-promotion pass flattens our subtree into the tree's root so
    /// every handler is reachable from the authoritative index.
    pub fn register(&self, parent: &Component) {
        if self == parent {
            return;
        }
        debug!(component = %self.id(), parent = %parent.id(), "register");

        let own_handlers = lock(&self.shared.own).handlers.clone();
        {
            let mut core = lock(&parent.shared.core);
            for h in &own_handlers {
                core.handlers.insert(h.id(), Arc::clone(h));
                for key in self.handler_keys(h) {
                    core.channels.add(&key, Arc::clone(h));
                }
            }
            if !core.components.contains(self) {
                core.components.push(self.clone());
            }
        }
        *lock(&self.shared.parent) = Some(parent.clone());

        self.push(event::registered(self, parent), event::REGISTERED);
        self.promote_hidden(parent);

        let root = self.root();
        let ticks = self.subtree_ticks();
        let mut core = lock(&root.shared.core);
        for (id, tick) in ticks {
            core.ticks.insert(id, tick);
        }
    }

    /// Detach this component from its manager, restoring it as the root of
    /// its own subtree. No-op on an unattached root.
    pub fn unregister(&self) {
        let Some(manager) = self.parent() else {
            return;
        };
        debug!(component = %self.id(), manager = %manager.id(), "unregister");

        let own_handlers = lock(&self.shared.own).handlers.clone();
        {
            let mut core = lock(&manager.shared.core);
            for h in &own_handlers {
                core.handlers.remove(&h.id());
                core.channels.remove(h.id());
            }
            core.components.retain(|c| c != self);
            core.hidden.retain(|c| c != self);
        }
        {
            let ticks = self.subtree_ticks();
            let mut core = lock(&manager.shared.core);
            for (id, _) in ticks {
                core.ticks.remove(&id);
            }
        }

        // Deep-promotion case: also clean the table of the parent we were
        // originally registered with.
        let owner = lock(&self.shared.own)
            .owner
            .take()
            .and_then(|w| w.upgrade())
            .map(|shared| Component { shared });
        if let Some(owner) = owner {
            if owner != manager {
                let mut core = lock(&owner.shared.core);
                for h in &own_handlers {
                    core.handlers.remove(&h.id());
                    core.channels.remove(h.id());
                }
                core.components.retain(|c| c != self);
            }
        }

        self.push(event::unregistered(self, &manager), event::UNREGISTERED);
        *lock(&self.shared.parent) = None;

        // Reclaim the descendants we surrendered at registration time, now
        // that we are a standalone root again.
        let promoted: Vec<Component> = std::mem::take(&mut lock(&self.shared.own).promoted);
        for d in promoted {
            if d.parent().as_ref() == Some(&manager) {
                d.unregister();
                d.register(self);
            }
        }
    }

    /// Checked detach of a direct descendant — the operator form panics on
    /// the error this returns.
    pub fn detach(&self, child: &Component) -> Result<(), StructuralError> {
        if child.parent().as_ref() == Some(self) {
            child.unregister();
            Ok(())
        } else {
            Err(StructuralError::NotRegistered { id: child.id() })
        }
    }

    /// Hidden-promotion pass (run on every attach): walk our subtree —
    /// through both child and hidden sets — and re-register every descendant
    /// not already attached to the tree's root. Collected components end up
    /// in the root's hidden set; subtrees of collected components are left
    /// to their own recursive registration.
    fn promote_hidden(&self, parent: &Component) {
        let root = parent.root();
        let root_members = lock(&root.shared.core).components.clone();

        let mut collected: Vec<Component> = Vec::new();
        let mut visited: Vec<Uuid> = vec![self.id()];
        let mut stack: Vec<Component> = {
            let core = lock(&self.shared.core);
            core.components.iter().chain(core.hidden.iter()).cloned().collect()
        };
        while let Some(x) = stack.pop() {
            if visited.contains(&x.id()) {
                continue;
            }
            visited.push(x.id());

            let detached_from_self = x.parent().as_ref() != Some(self);
            let absent_at_root = !root_members.contains(&x);
            if detached_from_self || absent_at_root {
                collected.push(x);
                continue;
            }
            let core = lock(&x.shared.core);
            stack.extend(core.components.iter().chain(core.hidden.iter()).cloned());
        }

        for d in &collected {
            debug!(component = %d.id(), root = %root.id(), "promote hidden");
            d.register(&root);
        }
        {
            let mut core = lock(&root.shared.core);
            for d in &collected {
                core.components.retain(|c| c != d);
                if !core.hidden.contains(d) {
                    core.hidden.push(d.clone());
                }
            }
        }
        {
            let mut core = lock(&self.shared.core);
            core.components.retain(|c| !collected.contains(c));
            core.hidden.retain(|c| !collected.contains(c));
        }
        lock(&self.shared.own).promoted.extend(collected);

        // A parent that is not itself the root: we get promoted too, so our
        // handlers live in the authoritative index. The parent keeps us in
        // its child set for ownership.
        if parent != &root {
            let own_handlers = lock(&self.shared.own).handlers.clone();
            {
                let mut core = lock(&root.shared.core);
                for h in &own_handlers {
                    core.handlers.insert(h.id(), Arc::clone(h));
                    for key in self.handler_keys(h) {
                        core.channels.add(&key, Arc::clone(h));
                    }
                }
                core.components.retain(|c| c != self);
                if !core.hidden.contains(self) {
                    core.hidden.push(self.clone());
                }
            }
            lock(&self.shared.own).owner = Some(Arc::downgrade(&parent.shared));
            *lock(&self.shared.parent) = Some(root);
        }
    }

    /// This component's tick plus the ticks of its direct child and hidden
    /// members — the set merged into (or removed from) a root's tick table.
    fn subtree_ticks(&self) -> Vec<(Uuid, Tick)> {
        let mut out = Vec::new();
        if let Some(t) = lock(&self.shared.own).tick.clone() {
            out.push((self.id(), t));
        }
        let (children, hidden) = {
            let core = lock(&self.shared.core);
            (core.components.clone(), core.hidden.clone())
        };
        for member in children.iter().chain(hidden.iter()) {
            if let Some(t) = lock(&member.shared.own).tick.clone() {
                out.push((member.id(), t));
            }
        }
        out
    }

    // ── Introspection ─────────────────────────────────────────────────────

    /// Events waiting in this component's queue. Only the root's queue is
    /// authoritative; pushes on attached components forward upward.
    pub fn queue_len(&self) -> usize {
        lock(&self.shared.core).queue.len()
    }

    /// Handlers registered in this component's own table.
    pub fn handler_count(&self) -> usize {
        lock(&self.shared.core).handlers.len()
    }

    /// Live buckets in this component's own channel index.
    pub fn channel_count(&self) -> usize {
        lock(&self.shared.core).channels.len()
    }

    pub fn tick_count(&self) -> usize {
        lock(&self.shared.core).ticks.len()
    }

    /// Directly attached children.
    pub fn components(&self) -> Vec<Component> {
        lock(&self.shared.core).components.clone()
    }

    /// Descendants promoted into this root's flat registration table.
    pub fn hidden(&self) -> Vec<Component> {
        lock(&self.shared.core).hidden.clone()
    }
}

impl Default for Component {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for Component {}

impl fmt::Debug for Component {
    /// Renders as `<Component/chan (q: _ c: _ h: _) [S]>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = lock(&self.shared.core);
        write!(
            f,
            "<Component/{} (q: {} c: {} h: {}) [{}]>",
            self.shared.channel.as_deref().unwrap_or(""),
            core.queue.len(),
            core.channels.len(),
            core.handlers.len(),
            self.state().as_str(),
        )
    }
}

// ── Composition operators ─────────────────────────────────────────────────────

/// `parent + child` registers the child and returns the parent.
impl Add<Component> for Component {
    type Output = Component;

    fn add(self, child: Component) -> Component {
        child.register(&self);
        self
    }
}

/// `parent += child` registers the child.
impl AddAssign<Component> for Component {
    fn add_assign(&mut self, child: Component) {
        child.register(self);
    }
}

/// `parent - child` unregisters the child and returns the parent.
///
/// # Panics
///
/// Panics when the child is not registered with this manager — the checked
/// form is [`Component::detach`].
impl Sub<Component> for Component {
    type Output = Component;

    fn sub(self, child: Component) -> Component {
        if let Err(e) = self.detach(&child) {
            panic!("{e}");
        }
        self
    }
}

/// `parent -= child` unregisters the child. Panics like `-`.
impl SubAssign<Component> for Component {
    fn sub_assign(&mut self, child: Component) {
        if let Err(e) = self.detach(&child) {
            panic!("{e}");
        }
    }
}
