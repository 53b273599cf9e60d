//! Subscriptions, change propagation, batching and transactions.
//!
//! A change emitted on a node is delivered to that node's subscribers, then
//! re-emitted on the parent with the node's key prepended, up to the root.
//! A change at depth D therefore produces D+1 independently filtered passes.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use tracing::{debug, warn};

use crate::error::PropertyError;
use crate::path::{path_matches, prefix_path};

use super::arena::{ActiveFlag, NodeId, Tree};
use super::PropertyNode;

// ─── Filters and events ───────────────────────────────────────

/// Which emitted paths a subscriber wants to see.
#[derive(Clone, Default)]
pub enum ChangeFilter {
    #[default]
    All,
    /// Segment-boundary prefix.
    Prefix(String),
    /// Any of several prefixes.
    AnyOf(Vec<String>),
    Predicate(Rc<dyn Fn(&str) -> bool>),
}

impl ChangeFilter {
    pub fn predicate(f: impl Fn(&str) -> bool + 'static) -> Self {
        ChangeFilter::Predicate(Rc::new(f))
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            ChangeFilter::All => true,
            ChangeFilter::Prefix(prefix) => path_matches(prefix, path),
            ChangeFilter::AnyOf(prefixes) => prefixes.iter().any(|p| path_matches(p, path)),
            ChangeFilter::Predicate(f) => f(path),
        }
    }
}

impl fmt::Debug for ChangeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeFilter::All => f.write_str("All"),
            ChangeFilter::Prefix(p) => f.debug_tuple("Prefix").field(p).finish(),
            ChangeFilter::AnyOf(ps) => f.debug_tuple("AnyOf").field(ps).finish(),
            ChangeFilter::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<&str> for ChangeFilter {
    fn from(prefix: &str) -> Self {
        ChangeFilter::Prefix(prefix.to_string())
    }
}

impl From<String> for ChangeFilter {
    fn from(prefix: String) -> Self {
        ChangeFilter::Prefix(prefix)
    }
}

impl From<Vec<String>> for ChangeFilter {
    fn from(prefixes: Vec<String>) -> Self {
        ChangeFilter::AnyOf(prefixes)
    }
}

impl From<Vec<&str>> for ChangeFilter {
    fn from(prefixes: Vec<&str>) -> Self {
        ChangeFilter::AnyOf(prefixes.into_iter().map(str::to_string).collect())
    }
}

/// One notification. Unbatched emits carry a single path; a batch flush
/// carries every distinct path the subscriber's filter accepted, in first
/// emission order. `""` denotes the receiving node itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub paths: Vec<String>,
}

impl ChangeEvent {
    /// First (for unbatched events, only) path.
    pub fn path(&self) -> &str {
        self.paths.first().map(String::as_str).unwrap_or("")
    }
}

pub(crate) type Callback = Rc<dyn Fn(&ChangeEvent)>;

pub(crate) struct SubscriptionEntry {
    pub(crate) id: u64,
    pub(crate) filter: ChangeFilter,
    pub(crate) callback: Callback,
    pub(crate) active: ActiveFlag,
}

/// Handle returned by [`PropertyNode::subscribe`]. Dropping it does not
/// unsubscribe.
pub struct Subscription {
    tree: Weak<RefCell<Tree>>,
    node: NodeId,
    id: u64,
    active: ActiveFlag,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if !self.active.replace(false) {
            return;
        }
        let Some(shared) = self.tree.upgrade() else {
            return;
        };
        // Inactive entries are skipped at delivery even if removal is deferred.
        if let Ok(mut tree) = shared.try_borrow_mut() {
            if let Ok(data) = tree.get_mut(self.node) {
                data.subscriptions.retain(|s| s.id != self.id);
            }
        };
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("node", &self.node)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

// ─── Node operations ──────────────────────────────────────────

impl PropertyNode {
    /// Subscribe to changes on this node and its descendants.
    pub fn subscribe<F>(
        &self,
        filter: impl Into<ChangeFilter>,
        callback: F,
    ) -> Result<Subscription, PropertyError>
    where
        F: Fn(&ChangeEvent) + 'static,
    {
        let mut tree = self.tree.borrow_mut();
        let id = tree.next_subscription_id();
        let active: ActiveFlag = Rc::new(Cell::new(true));
        tree.get_mut(self.id)?.subscriptions.push(SubscriptionEntry {
            id,
            filter: filter.into(),
            callback: Rc::new(callback),
            active: active.clone(),
        });
        Ok(Subscription {
            tree: Rc::downgrade(&self.tree),
            node: self.id,
            id,
            active,
        })
    }

    pub fn subscription_count(&self) -> Result<usize, PropertyError> {
        self.with(|d| d.subscriptions.len())
    }

    /// Notify this node's subscribers that `path` (relative to this node)
    /// changed, then propagate to the ancestors. Inside a `batch` on this
    /// node the path is buffered instead.
    pub fn emit_change(&self, path: &str) -> Result<(), PropertyError> {
        {
            let mut tree = self.tree.borrow_mut();
            let data = tree.get_mut(self.id)?;
            if data.batch.depth > 0 {
                data.batch.buffer.push(path.to_string());
                return Ok(());
            }
        }
        self.deliver(&[path.to_string()]);
        self.propagate(path)
    }

    /// Hand `paths` to this node's own subscribers only.
    fn deliver(&self, paths: &[String]) {
        let targets: Vec<(ChangeFilter, Callback, ActiveFlag)> = {
            let tree = self.tree.borrow();
            match tree.get(self.id) {
                Ok(data) => data
                    .subscriptions
                    .iter()
                    .map(|s| (s.filter.clone(), s.callback.clone(), s.active.clone()))
                    .collect(),
                Err(_) => return,
            }
        };
        for (filter, callback, active) in targets {
            if !active.get() {
                continue;
            }
            let accepted: Vec<String> = paths
                .iter()
                .filter(|p| filter.matches(p))
                .cloned()
                .collect();
            if !accepted.is_empty() {
                callback(&ChangeEvent { paths: accepted });
            }
        }
    }

    fn propagate(&self, path: &str) -> Result<(), PropertyError> {
        match self.parent_and_key() {
            Some((parent, key)) => parent.emit_change(&prefix_path(&key, path)),
            None => Ok(()),
        }
    }

    /// Run `f` with this node's emits deferred. On success the distinct
    /// paths are delivered once to this node's subscribers and then
    /// propagated upward; on error they are dropped. Nested batches on the
    /// same node fold into the outermost one.
    pub fn batch<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&PropertyNode) -> Result<T, E>,
        E: From<PropertyError>,
    {
        self.with_mut(|d| d.batch.depth += 1)?;
        let mut scope = BatchScope {
            node: self,
            armed: true,
        };
        let result = f(self);
        scope.armed = false;

        let pending = {
            let mut tree = self.tree.borrow_mut();
            match tree.get_mut(self.id) {
                Ok(data) => {
                    data.batch.depth = data.batch.depth.saturating_sub(1);
                    if result.is_err() {
                        data.batch.buffer.clear();
                        None
                    } else if data.batch.depth == 0 {
                        Some(std::mem::take(&mut data.batch.buffer))
                    } else {
                        None
                    }
                }
                // Destroyed inside the batch: nothing left to notify.
                Err(_) => None,
            }
        };

        match (result, pending) {
            (Ok(value), Some(buffer)) => {
                self.flush(buffer)?;
                Ok(value)
            }
            (result, _) => result,
        }
    }

    fn flush(&self, buffer: Vec<String>) -> Result<(), PropertyError> {
        let unique: Vec<String> = buffer
            .into_iter()
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect();
        if unique.is_empty() {
            return Ok(());
        }
        debug!(paths = unique.len(), "flushing batched changes");
        self.deliver(&unique);
        for path in &unique {
            self.propagate(path)?;
        }
        Ok(())
    }

    /// Run `f`; if it fails, restore the `value` of this node and of every
    /// child still present to what it was before, then return the error.
    /// Metadata, constraints and added/removed children are not rolled back.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&PropertyNode) -> Result<T, E>,
        E: From<PropertyError>,
    {
        let snapshot = self.to_property()?;
        match f(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!(node = %snapshot.id, "transaction failed, restoring values");
                self.tree.borrow_mut().restore_values(self.id, &snapshot);
                Err(err)
            }
        }
    }

    /// Async form of [`transaction`](Self::transaction).
    pub async fn transaction_async<T, E, F, Fut>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(PropertyNode) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<PropertyError>,
    {
        let snapshot = self.to_property()?;
        match f(self.clone()).await {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!(node = %snapshot.id, "transaction failed, restoring values");
                self.tree.borrow_mut().restore_values(self.id, &snapshot);
                Err(err)
            }
        }
    }
}

/// Unwinds batch state if the closure panics.
struct BatchScope<'a> {
    node: &'a PropertyNode,
    armed: bool,
}

impl Drop for BatchScope<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut tree) = self.node.tree.try_borrow_mut() {
            if let Ok(data) = tree.get_mut(self.node.id) {
                data.batch.depth = data.batch.depth.saturating_sub(1);
                data.batch.buffer.clear();
            }
        }
    }
}
