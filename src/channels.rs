//! The channel index — bucket table behind handler resolution.
//!
//! Keys follow the grammar `target ":" channel`; a colon-free key is
//! unscoped. `*` wildcards either side. Every bucket keeps its filters ahead
//! of its listeners, preserving insertion order within each class, and a
//! handler appears at most once per bucket. Empty buckets are pruned on
//! removal so the table never accumulates dead keys.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::handler::Handler;

/// Compose a bucket key from an optional target and a channel.
pub(crate) fn scoped_key(target: Option<&str>, channel: &str) -> String {
    match target {
        Some(t) => format!("{t}:{channel}"),
        None => channel.to_string(),
    }
}

/// Split a key into `(target, channel)` at the first colon.
pub(crate) fn split_key(key: &str) -> (Option<&str>, &str) {
    match key.split_once(':') {
        Some((target, channel)) => (Some(target), channel),
        None => (None, key),
    }
}

// ── ChannelIndex ──────────────────────────────────────────────────────────────

/// Ordered bucket table. `BTreeMap` keeps the wildcard scans deterministic.
#[derive(Default)]
pub(crate) struct ChannelIndex {
    buckets: BTreeMap<String, Vec<Arc<Handler>>>,
}

impl ChannelIndex {
    /// Insert a handler into the bucket for `key`, keeping filters ahead of
    /// listeners. Returns `false` when the handler was already present.
    pub(crate) fn add(&mut self, key: &str, handler: Arc<Handler>) -> bool {
        let bucket = self.buckets.entry(key.to_string()).or_default();
        if bucket.iter().any(|h| h.id() == handler.id()) {
            return false;
        }
        debug!(key, handler = handler.name(), filter = handler.is_filter(), "index add");
        if handler.is_filter() {
            let at = bucket.iter().take_while(|h| h.is_filter()).count();
            bucket.insert(at, handler);
        } else {
            bucket.push(handler);
        }
        true
    }

    /// Remove a handler from every bucket, pruning buckets that empty out.
    pub(crate) fn remove(&mut self, id: Uuid) {
        self.buckets.retain(|key, bucket| {
            let before = bucket.len();
            bucket.retain(|h| h.id() != id);
            if bucket.len() != before {
                debug!(key, "index remove");
            }
            !bucket.is_empty()
        });
    }

    /// Number of live buckets.
    pub(crate) fn len(&self) -> usize {
        self.buckets.len()
    }

    #[cfg(test)]
    pub(crate) fn contains_key(&self, key: &str) -> bool {
        self.buckets.contains_key(key)
    }

    /// `true` when the handler appears in at least one bucket.
    #[cfg(test)]
    pub(crate) fn contains(&self, id: Uuid) -> bool {
        self.buckets.values().any(|b| b.iter().any(|h| h.id() == id))
    }

    /// Resolve the dispatch chain for a key, in delivery order:
    ///
    /// 1. the global `*` bucket;
    /// 2. `*:C` keys — every bucket named `C` or ending in `:C`;
    /// 3. `T:*` keys — every bucket starting with `T:` plus every unscoped
    ///    bucket;
    /// 4. otherwise the buckets `C`, `T:*`, `*:C`, `T:C` in that order.
    ///
    /// `*:*` short-circuits to every registered handler, deduplicated.
    /// The wildcard scans skip the global bucket — step 1 already emitted it.
    pub(crate) fn resolve(&self, key: &str) -> Vec<Arc<Handler>> {
        if key == "*:*" {
            let mut seen = Vec::new();
            let mut chain = Vec::new();
            for bucket in self.buckets.values() {
                for h in bucket {
                    if !seen.contains(&h.id()) {
                        seen.push(h.id());
                        chain.push(Arc::clone(h));
                    }
                }
            }
            return chain;
        }

        let (target, channel) = split_key(key);
        let mut chain: Vec<Arc<Handler>> = self
            .buckets
            .get("*")
            .map(|b| b.to_vec())
            .unwrap_or_default();

        if target == Some("*") {
            let suffix = format!(":{channel}");
            for (k, bucket) in &self.buckets {
                if k != "*" && (k == channel || k.ends_with(&suffix)) {
                    chain.extend(bucket.iter().cloned());
                }
            }
        } else if channel == "*" {
            let prefix = target.map(|t| format!("{t}:"));
            for (k, bucket) in &self.buckets {
                if k == "*" {
                    continue;
                }
                let scoped_match = prefix.as_deref().is_some_and(|p| k.starts_with(p));
                if scoped_match || !k.contains(':') {
                    chain.extend(bucket.iter().cloned());
                }
            }
        } else {
            if let Some(bucket) = self.buckets.get(channel) {
                chain.extend(bucket.iter().cloned());
            }
            if let Some(t) = target {
                if let Some(bucket) = self.buckets.get(&format!("{t}:*")) {
                    chain.extend(bucket.iter().cloned());
                }
            }
            if let Some(bucket) = self.buckets.get(&format!("*:{channel}")) {
                chain.extend(bucket.iter().cloned());
            }
            if target.is_some() {
                if let Some(bucket) = self.buckets.get(key) {
                    chain.extend(bucket.iter().cloned());
                }
            }
        }

        chain
    }
}
