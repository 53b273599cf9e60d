//! Live, navigable wrapper over a [`Property`] tree.
//!
//! A [`PropertyNode`] is a cheap handle (`Rc` to the tree plus a slot id).
//! Children are wrapped lazily on first access and the wrapper is cached, so
//! `node.child("a")` twice yields the same node. Handles to a destroyed node
//! fail every call with [`PropertyError::Destroyed`].

mod arena;
mod codec;
mod reactive;
mod traverse;
mod validation;

pub use arena::NodeId;
pub use reactive::{ChangeEvent, ChangeFilter, Subscription};
pub use traverse::{TraversalOrder, Visit};
pub use validation::{DeepValidation, ValidationResult};

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

use crate::config::TreeConfig;
use crate::error::PropertyError;
use crate::eval::EvalContext;
use crate::path::{join_path, IntoPath};
use crate::property::{ExprKind, Property, TypeRef, Value};
use crate::registry::Registry;

use arena::{ChildEntry, NodeData, Tree};

/// Options for [`PropertyNode::set_value_with`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Target relative to the node; empty means the node itself.
    pub path: Vec<String>,
    /// Skip change notification.
    pub silent: bool,
}

impl SetOptions {
    pub fn at(path: impl IntoPath) -> Self {
        Self {
            path: path.into_segments(),
            silent: false,
        }
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}

#[derive(Clone)]
pub struct PropertyNode {
    pub(crate) tree: Rc<RefCell<Tree>>,
    pub(crate) id: NodeId,
}

// ─── Construction ─────────────────────────────────────────────

impl PropertyNode {
    /// Wrap `property` as the root of a new tree.
    pub fn new(property: Property) -> Self {
        Self::with_config(property, TreeConfig::default())
    }

    pub fn with_config(property: Property, config: TreeConfig) -> Self {
        let (tree, id) = Tree::with_root(config, NodeData::from_property(property, None));
        Self {
            tree: Rc::new(RefCell::new(tree)),
            id,
        }
    }

    /// Wrap `property` as a root evaluating against `registry`.
    pub fn with_registry(property: Property, registry: Rc<Registry>) -> Self {
        let node = Self::new(property);
        if let Ok(data) = node.tree.borrow_mut().get_mut(node.id) {
            data.registry = Some(registry);
        }
        node
    }

    /// Set (or clear) this node's own registry. Descendants without one
    /// inherit it.
    pub fn set_registry(&self, registry: Option<Rc<Registry>>) -> Result<(), PropertyError> {
        self.with_mut(|d| d.registry = registry)
    }

    /// Effective registry: this node's own, else the nearest ancestor's.
    pub fn registry(&self) -> Result<Option<Rc<Registry>>, PropertyError> {
        let tree = self.tree.borrow();
        let mut cursor = Some(self.id);
        while let Some(id) = cursor {
            let data = tree.get(id)?;
            if let Some(registry) = &data.registry {
                return Ok(Some(registry.clone()));
            }
            cursor = data.parent;
        }
        Ok(None)
    }

    pub fn config(&self) -> Result<TreeConfig, PropertyError> {
        self.ensure_live()?;
        Ok(self.tree.borrow().config.clone())
    }

    /// Replace the configuration of the whole tree this node belongs to.
    pub fn set_config(&self, config: TreeConfig) -> Result<(), PropertyError> {
        self.ensure_live()?;
        self.tree.borrow_mut().config = config;
        Ok(())
    }

    pub(crate) fn handle(&self, id: NodeId) -> PropertyNode {
        PropertyNode {
            tree: self.tree.clone(),
            id,
        }
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&NodeData) -> R) -> Result<R, PropertyError> {
        let tree = self.tree.borrow();
        Ok(f(tree.get(self.id)?))
    }

    pub(crate) fn with_mut<R>(
        &self,
        f: impl FnOnce(&mut NodeData) -> R,
    ) -> Result<R, PropertyError> {
        let mut tree = self.tree.borrow_mut();
        Ok(f(tree.get_mut(self.id)?))
    }
}

// ─── Identity & liveness ──────────────────────────────────────

impl PropertyNode {
    pub fn ensure_live(&self) -> Result<(), PropertyError> {
        if self.tree.borrow().is_live(self.id) {
            Ok(())
        } else {
            Err(PropertyError::Destroyed)
        }
    }

    pub fn is_destroyed(&self) -> bool {
        !self.tree.borrow().is_live(self.id)
    }

    /// Handle identity, not structural equality.
    pub fn same_node(&self, other: &PropertyNode) -> bool {
        Rc::ptr_eq(&self.tree, &other.tree) && self.id == other.id
    }

    pub fn node_id(&self) -> NodeId {
        self.id
    }

    /// The wrapped property's `id` field.
    pub fn id(&self) -> Result<String, PropertyError> {
        self.with(|d| d.id.clone())
    }

    pub fn type_ref(&self) -> Result<TypeRef, PropertyError> {
        self.with(|d| d.ty.clone())
    }

    pub fn kind(&self) -> Result<ExprKind, PropertyError> {
        self.with(|d| d.ty.expr_kind())
    }

    /// Rebuild the full Property this node currently represents.
    pub fn to_property(&self) -> Result<Property, PropertyError> {
        self.tree.borrow().assemble(self.id)
    }
}

// ─── Navigation ───────────────────────────────────────────────

impl PropertyNode {
    pub fn parent(&self) -> Result<Option<PropertyNode>, PropertyError> {
        let parent = self.with(|d| d.parent)?;
        Ok(parent.map(|id| self.handle(id)))
    }

    pub fn root(&self) -> Result<PropertyNode, PropertyError> {
        let mut node = self.clone();
        while let Some(parent) = node.parent()? {
            node = parent;
        }
        Ok(node)
    }

    pub fn is_root(&self) -> Result<bool, PropertyError> {
        Ok(self.parent()?.is_none())
    }

    /// Parent handle and the key this node is stored under there.
    pub(crate) fn parent_and_key(&self) -> Option<(PropertyNode, String)> {
        let tree = self.tree.borrow();
        let parent = tree.get(self.id).ok()?.parent?;
        let key = tree.get(parent).ok()?.key_of(self.id)?.to_string();
        Some((self.handle(parent), key))
    }

    /// Keys from the tree root down to this node.
    pub fn path(&self) -> Result<Vec<String>, PropertyError> {
        self.ensure_live()?;
        let mut segments = Vec::new();
        let mut node = self.clone();
        while let Some((parent, key)) = node.parent_and_key() {
            segments.push(key);
            node = parent;
        }
        segments.reverse();
        Ok(segments)
    }

    pub fn path_string(&self) -> Result<String, PropertyError> {
        Ok(join_path(&self.path()?))
    }

    /// Wrapper for the child under `key`, created on first access.
    pub fn child(&self, key: &str) -> Result<Option<PropertyNode>, PropertyError> {
        let id = self.tree.borrow_mut().materialize(self.id, key)?;
        Ok(id.map(|id| self.handle(id)))
    }

    /// Walk `path` through children. The empty path is this node.
    pub fn get(&self, path: impl IntoPath) -> Result<Option<PropertyNode>, PropertyError> {
        self.ensure_live()?;
        let mut node = self.clone();
        for segment in path.into_segments() {
            match node.child(&segment)? {
                Some(child) => node = child,
                None => return Ok(None),
            }
        }
        Ok(Some(node))
    }

    pub fn keys(&self) -> Result<Vec<String>, PropertyError> {
        self.with(|d| d.children.keys().cloned().collect())
    }

    pub fn has_child(&self, key: &str) -> Result<bool, PropertyError> {
        self.with(|d| d.children.contains_key(key))
    }

    /// Every child, wrapped, in key order.
    pub fn children(&self) -> Result<Vec<(String, PropertyNode)>, PropertyError> {
        let mut out = Vec::new();
        for key in self.keys()? {
            if let Some(child) = self.child(&key)? {
                out.push((key, child));
            }
        }
        Ok(out)
    }
}

// ─── Values ───────────────────────────────────────────────────

impl PropertyNode {
    /// Unevaluated payload of this node.
    pub fn raw_value(&self) -> Result<Option<Value>, PropertyError> {
        self.with(|d| d.value.clone())
    }

    pub fn raw_value_at(&self, path: impl IntoPath) -> Result<Option<Value>, PropertyError> {
        match self.get(path)? {
            Some(target) => target.raw_value(),
            None => Ok(None),
        }
    }

    pub fn set_value(&self, value: impl Into<Value>) -> Result<bool, PropertyError> {
        self.set_value_with(value, SetOptions::default())
    }

    pub fn set_value_at(
        &self,
        path: impl IntoPath,
        value: impl Into<Value>,
    ) -> Result<bool, PropertyError> {
        self.set_value_with(value, SetOptions::at(path))
    }

    /// Replace the value at `options.path`. Returns `false` when the target
    /// does not exist. Unless silent, the change is emitted from this node
    /// with the target's relative path.
    pub fn set_value_with(
        &self,
        value: impl Into<Value>,
        options: SetOptions,
    ) -> Result<bool, PropertyError> {
        let Some(target) = self.get(options.path.clone())? else {
            return Ok(false);
        };
        target.with_mut(|d| d.value = Some(value.into()))?;
        if !options.silent {
            self.emit_change(&join_path(&options.path))?;
        }
        Ok(true)
    }

    /// Evaluated value of this node.
    pub async fn get_value(&self) -> Result<Option<Value>, PropertyError> {
        self.ensure_live()?;
        self.evaluated_value().await
    }

    /// Evaluated value at `path`; `None` when the target does not exist.
    pub async fn get_value_at(&self, path: impl IntoPath) -> Result<Option<Value>, PropertyError> {
        match self.get(path)? {
            Some(target) => target.evaluated_value().await,
            None => Ok(None),
        }
    }

    /// An expression node evaluates itself; a node whose value is an
    /// embedded expression evaluates that; anything else is returned raw.
    async fn evaluated_value(&self) -> Result<Option<Value>, PropertyError> {
        let (kind, value) = self.with(|d| (d.ty.expr_kind(), d.value.clone()))?;
        if kind.is_expr() {
            let expr = self.to_property()?;
            return self.evaluate(&expr).await;
        }
        match value {
            Some(Value::Property(expr)) if expr.is_expr() => self.evaluate(&expr).await,
            other => Ok(other),
        }
    }

    /// Evaluate `expr` anchored at this node.
    pub async fn evaluate(&self, expr: &Property) -> Result<Option<Value>, PropertyError> {
        EvalContext::for_node(self)?.evaluate(expr).await
    }

    /// Evaluate a metadata or constraint entry: an expression entry is
    /// evaluated, an entry holding an embedded expression evaluates that.
    pub(crate) async fn evaluate_entry(
        &self,
        entry: Property,
    ) -> Result<Option<Value>, PropertyError> {
        if entry.is_expr() {
            return self.evaluate(&entry).await;
        }
        match entry.value {
            Some(Value::Property(expr)) if expr.is_expr() => self.evaluate(&expr).await,
            other => Ok(other),
        }
    }

    pub fn default_value(&self) -> Result<Option<Value>, PropertyError> {
        self.with(|d| d.default_value.clone())
    }

    pub fn set_default_value(
        &self,
        value: Option<Value>,
        silent: bool,
    ) -> Result<(), PropertyError> {
        self.with_mut(|d| d.default_value = value)?;
        self.notify_self(silent)
    }

    /// Copy `defaultValue` into `value`.
    pub fn reset(&self, silent: bool) -> Result<(), PropertyError> {
        self.with_mut(|d| d.value = d.default_value.clone())?;
        self.notify_self(silent)
    }

    /// Reset this node and every descendant, pre-order. Notifications are
    /// collected into one batch.
    pub fn reset_deep(&self, silent: bool) -> Result<(), PropertyError> {
        let nodes = self.find_all(|_, _| true)?;
        if silent {
            return nodes.iter().try_for_each(|n| n.reset(true));
        }
        self.batch(|_| nodes.iter().try_for_each(|n| n.reset(false)))
    }

    fn notify_self(&self, silent: bool) -> Result<(), PropertyError> {
        if silent {
            Ok(())
        } else {
            self.emit_change("")
        }
    }
}

// ─── Metadata & constraints ───────────────────────────────────

impl PropertyNode {
    pub fn metadata_property(&self, key: &str) -> Result<Option<Property>, PropertyError> {
        self.with(|d| d.metadata.get(key).cloned())
    }

    /// Metadata entry, evaluated if it is (or holds) an expression.
    pub async fn get_metadata(&self, key: &str) -> Result<Option<Value>, PropertyError> {
        match self.metadata_property(key)? {
            Some(entry) => self.evaluate_entry(entry).await,
            None => Ok(None),
        }
    }

    pub fn set_metadata(
        &self,
        key: impl Into<String>,
        entry: Property,
        silent: bool,
    ) -> Result<(), PropertyError> {
        let key = key.into();
        self.with_mut(|d| d.metadata.insert(key, entry))?;
        self.notify_self(silent)
    }

    pub fn remove_metadata(&self, key: &str, silent: bool) -> Result<Option<Property>, PropertyError> {
        let removed = self.with_mut(|d| d.metadata.shift_remove(key))?;
        if removed.is_some() {
            self.notify_self(silent)?;
        }
        Ok(removed)
    }

    pub fn has_metadata(&self, key: &str) -> Result<bool, PropertyError> {
        self.with(|d| d.metadata.contains_key(key))
    }

    pub fn metadata_keys(&self) -> Result<Vec<String>, PropertyError> {
        self.with(|d| d.metadata.keys().cloned().collect())
    }

    pub fn constraint_property(&self, key: &str) -> Result<Option<Property>, PropertyError> {
        self.with(|d| d.constraints.get(key).cloned())
    }

    /// Constraint result, evaluated the same way as metadata.
    pub async fn get_constraint(&self, key: &str) -> Result<Option<Value>, PropertyError> {
        match self.constraint_property(key)? {
            Some(entry) => self.evaluate_entry(entry).await,
            None => Ok(None),
        }
    }

    pub fn set_constraint(
        &self,
        key: impl Into<String>,
        constraint: Property,
        silent: bool,
    ) -> Result<(), PropertyError> {
        let key = key.into();
        self.with_mut(|d| d.constraints.insert(key, constraint))?;
        self.notify_self(silent)
    }

    pub fn remove_constraint(
        &self,
        key: &str,
        silent: bool,
    ) -> Result<Option<Property>, PropertyError> {
        let removed = self.with_mut(|d| d.constraints.shift_remove(key))?;
        if removed.is_some() {
            self.notify_self(silent)?;
        }
        Ok(removed)
    }

    pub fn has_constraint(&self, key: &str) -> Result<bool, PropertyError> {
        self.with(|d| d.constraints.contains_key(key))
    }

    pub fn constraint_keys(&self) -> Result<Vec<String>, PropertyError> {
        self.with(|d| d.constraints.keys().cloned().collect())
    }
}

// ─── Structure & lifecycle ────────────────────────────────────

impl PropertyNode {
    /// Insert or replace the child under `key`. A cached wrapper for a
    /// replaced child is destroyed.
    pub fn add_child(&self, key: impl Into<String>, child: Property) -> Result<(), PropertyError> {
        let key = key.into();
        {
            let mut tree = self.tree.borrow_mut();
            let previous = tree
                .get_mut(self.id)?
                .children
                .insert(key.clone(), ChildEntry::Data(child));
            if let Some(ChildEntry::Node(old)) = previous {
                debug!(key = %key, "replacing wrapped child");
                tree.release(old);
            }
        }
        self.emit_change(&key)
    }

    /// Remove the child under `key`, destroying its wrapper if one exists.
    pub fn remove_child(&self, key: &str) -> Result<Option<Property>, PropertyError> {
        let removed = {
            let mut tree = self.tree.borrow_mut();
            let entry = tree.get_mut(self.id)?.children.shift_remove(key);
            match entry {
                Some(ChildEntry::Data(p)) => Some(p),
                Some(ChildEntry::Node(id)) => tree.release(id),
                None => None,
            }
        };
        if removed.is_some() {
            self.emit_change(key)?;
        }
        Ok(removed)
    }

    /// Destroy this node and every wrapped descendant. Subscriptions are
    /// deactivated and the parent keeps the data under the same key, so a
    /// later `child(key)` yields a fresh wrapper. Returns the node's data.
    pub fn destroy(&self) -> Result<Property, PropertyError> {
        let mut tree = self.tree.borrow_mut();
        let parent = tree.get(self.id)?.parent;
        let key = parent
            .and_then(|p| tree.get(p).ok())
            .and_then(|p| p.key_of(self.id))
            .map(str::to_string);

        let property = tree.release(self.id).ok_or(PropertyError::Destroyed)?;
        debug!(node = %property.id, "destroyed node");
        if let (Some(parent), Some(key)) = (parent, key) {
            if let Some(entry) = tree
                .get_mut(parent)
                .ok()
                .and_then(|p| p.children.get_mut(&key))
            {
                *entry = ChildEntry::Data(property.clone());
            }
        }
        Ok(property)
    }
}

impl fmt::Debug for PropertyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self
            .tree
            .try_borrow()
            .ok()
            .and_then(|t| t.get(self.id).ok().map(|d| d.id.clone()));
        f.debug_struct("PropertyNode")
            .field("slot", &self.id)
            .field("id", &id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{lit, op, reference};
    use std::cell::Cell;

    fn form() -> PropertyNode {
        PropertyNode::new(
            Property::group("form")
                .with_child(
                    "user",
                    Property::group("user")
                        .with_child("name", Property::data("name", "ada"))
                        .with_child("age", Property::data("age", 5).with_default(1)),
                )
                .with_child("user.id", Property::data("user.id", 7)),
        )
    }

    #[test]
    fn child_wrappers_are_cached() {
        let root = form();
        let a = root.child("user").unwrap().unwrap();
        let b = root.child("user").unwrap().unwrap();
        assert!(a.same_node(&b));
        assert!(root.child("missing").unwrap().is_none());
    }

    #[test]
    fn navigation_and_paths() {
        let root = form();
        let age = root.get("user.age").unwrap().unwrap();
        assert_eq!(age.path().unwrap(), vec!["user", "age"]);
        assert_eq!(age.path_string().unwrap(), "user.age");
        assert!(age.root().unwrap().same_node(&root));
        let user = age.parent().unwrap().unwrap();
        assert!(user.parent().unwrap().unwrap().is_root().unwrap());
        assert!(!user.is_root().unwrap());
        assert!(root.get("").unwrap().unwrap().same_node(&root));
        assert!(root.get("user.nope.deeper").unwrap().is_none());

        let dotted = root.get(["user.id"]).unwrap().unwrap();
        assert_eq!(dotted.raw_value().unwrap(), Some(Value::from(7)));
        assert_eq!(root.keys().unwrap(), vec!["user", "user.id"]);
    }

    #[test]
    fn set_then_reset_restores_default() {
        let root = form();
        let age = root.get("user.age").unwrap().unwrap();
        assert!(age.set_value(9).unwrap());
        assert_eq!(age.raw_value().unwrap(), Some(Value::from(9)));
        age.reset(false).unwrap();
        assert_eq!(age.raw_value().unwrap(), Some(Value::from(1)));
    }

    #[test]
    fn set_value_at_missing_target_is_false() {
        let root = form();
        let fired = Rc::new(Cell::new(0));
        let sink = fired.clone();
        root.subscribe(ChangeFilter::All, move |_| sink.set(sink.get() + 1))
            .unwrap();
        assert!(!root.set_value_at("user.nope", 1).unwrap());
        assert_eq!(fired.get(), 0);
    }

    #[test]
    fn set_value_emits_normalized_path() {
        let root = form();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        root.subscribe(ChangeFilter::All, move |e| sink.borrow_mut().push(e.path().to_string()))
            .unwrap();
        root.set_value_at("user..name", "grace").unwrap();
        root.set_value_with(1, SetOptions::at("user.age").silent()).unwrap();
        root.set_value("top").unwrap();
        assert_eq!(*seen.borrow(), vec!["user.name", ""]);
    }

    #[test]
    fn reset_deep_notifies_once() {
        let root = form();
        root.set_value_at("user.age", 30).unwrap();
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        root.subscribe(ChangeFilter::All, move |e| sink.borrow_mut().push(e.paths.clone()))
            .unwrap();
        root.reset_deep(false).unwrap();
        assert_eq!(root.raw_value_at("user.age").unwrap(), Some(Value::from(1)));
        assert_eq!(events.borrow().len(), 1);
        assert_eq!(events.borrow()[0], vec!["", "user", "user.name", "user.age", "user.id"]);
    }

    #[tokio::test]
    async fn get_value_evaluates_embedded_expressions() {
        let registry = Registry::new();
        registry.register_fn("concat", |args, ctx| async move {
            let vals = ctx.eval_args(&args).await?;
            let joined: String = vals.iter().flatten().filter_map(Value::as_str).collect();
            Ok(Some(Value::from(joined)))
        });
        let root = PropertyNode::with_registry(
            Property::group("root")
                .with_child("first", Property::data("first", "Ada"))
                .with_child(
                    "greeting",
                    Property::group("greeting").with_value(op(
                        "concat",
                        [lit("Hi "), reference("parent.first.value")],
                    )),
                )
                .with_child("shout", op("concat", [reference("root.first.value"), lit("!")])),
            Rc::new(registry),
        );
        assert_eq!(
            root.get_value_at("greeting").await.unwrap(),
            Some(Value::from("Hi Ada"))
        );
        assert_eq!(
            root.get_value_at("shout").await.unwrap(),
            Some(Value::from("Ada!"))
        );
        assert_eq!(root.get_value_at("nope").await.unwrap(), None);
        assert!(root.raw_value_at("greeting").unwrap().unwrap().is_expr());
    }

    #[test]
    fn registry_is_inherited_from_ancestors() {
        let shared = Rc::new(Registry::new());
        let root = PropertyNode::with_registry(
            Property::group("r").with_child("a", Property::group("a")),
            shared.clone(),
        );
        let a = root.child("a").unwrap().unwrap();
        assert!(Rc::ptr_eq(&a.registry().unwrap().unwrap(), &shared));

        let own = Rc::new(Registry::new());
        a.set_registry(Some(own.clone())).unwrap();
        assert!(Rc::ptr_eq(&a.registry().unwrap().unwrap(), &own));
    }

    #[tokio::test]
    async fn metadata_accessors() {
        let root = form();
        root.set_metadata("label", Property::data("label", "Form"), false)
            .unwrap();
        root.set_metadata("echo", reference("self.label.value"), true)
            .unwrap();
        assert!(root.has_metadata("label").unwrap());
        assert_eq!(root.metadata_keys().unwrap(), vec!["label", "echo"]);
        assert_eq!(
            root.get_metadata("label").await.unwrap(),
            Some(Value::from("Form"))
        );
        assert_eq!(
            root.get_metadata("echo").await.unwrap(),
            Some(Value::from("Form"))
        );
        assert!(root.remove_metadata("label", false).unwrap().is_some());
        assert_eq!(root.get_metadata("label").await.unwrap(), None);
    }

    #[test]
    fn add_child_replacing_destroys_old_wrapper() {
        let root = form();
        let old = root.child("user").unwrap().unwrap();
        let old_name = old.child("name").unwrap().unwrap();
        root.add_child("user", Property::data("user", "flat")).unwrap();
        assert!(old.is_destroyed());
        assert!(old_name.is_destroyed());
        assert_eq!(root.raw_value_at("user").unwrap(), Some(Value::from("flat")));
        assert_eq!(root.keys().unwrap(), vec!["user", "user.id"], "position kept");
    }

    #[test]
    fn remove_child_returns_data_and_emits_key() {
        let root = form();
        let user = root.child("user").unwrap().unwrap();
        user.set_value_at("name", "grace").unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        root.subscribe(ChangeFilter::All, move |e| sink.borrow_mut().push(e.path().to_string()))
            .unwrap();

        let removed = root.remove_child("user").unwrap().unwrap();
        assert_eq!(removed.children["name"].value, Some(Value::from("grace")));
        assert!(user.is_destroyed());
        assert!(root.remove_child("user").unwrap().is_none());
        assert_eq!(*seen.borrow(), vec!["user"]);
    }

    #[test]
    fn destroy_cascades_and_blocks_mutation() {
        let root = form();
        let user = root.child("user").unwrap().unwrap();
        let name = user.child("name").unwrap().unwrap();

        let data = user.destroy().unwrap();
        assert_eq!(data.id, "user");
        assert!(user.is_destroyed());
        assert!(name.is_destroyed());
        assert!(matches!(user.set_value(1), Err(PropertyError::Destroyed)));
        assert!(matches!(name.child("x"), Err(PropertyError::Destroyed)));
        assert!(matches!(user.destroy(), Err(PropertyError::Destroyed)));

        // Data stays with the parent; a fresh wrapper can be created.
        let again = root.child("user").unwrap().unwrap();
        assert!(!again.same_node(&user));
        assert_eq!(again.raw_value_at("name").unwrap(), Some(Value::from("ada")));
    }

    #[test]
    fn destroying_root_invalidates_every_handle() {
        let root = form();
        let age = root.get("user.age").unwrap().unwrap();
        root.destroy().unwrap();
        assert!(age.is_destroyed());
        assert!(matches!(root.set_value(1), Err(PropertyError::Destroyed)));
    }

    #[test]
    fn destroyed_handles_reject_navigation_and_config() {
        let root = form();
        let user = root.child("user").unwrap().unwrap();
        user.destroy().unwrap();

        assert!(matches!(user.parent(), Err(PropertyError::Destroyed)));
        assert!(matches!(user.root(), Err(PropertyError::Destroyed)));
        assert!(matches!(user.is_root(), Err(PropertyError::Destroyed)));
        assert!(matches!(user.path(), Err(PropertyError::Destroyed)));
        assert!(matches!(user.path_string(), Err(PropertyError::Destroyed)));
        assert!(matches!(user.registry(), Err(PropertyError::Destroyed)));
        assert!(matches!(user.config(), Err(PropertyError::Destroyed)));
        assert!(matches!(
            user.set_config(TreeConfig::default()),
            Err(PropertyError::Destroyed)
        ));
        assert!(root.config().is_ok());
    }
}
