//! Arena backing a property tree.
//!
//! Every materialized node lives in one slot of [`Tree`]. A node's children
//! map holds either the still-unwrapped [`Property`] data or the id of the
//! slot it was moved into, so the data exists in exactly one place. Parent
//! links are plain ids; slots are recycled with a generation bump so stale
//! handles never alias a newer node.

use indexmap::IndexMap;
use std::cell::Cell;
use std::rc::Rc;

use crate::config::TreeConfig;
use crate::error::PropertyError;
use crate::property::{Property, PropertyMap, TypeRef, Value};
use crate::registry::Registry;

use super::reactive::SubscriptionEntry;

/// Stable handle to an arena slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

/// One entry of a node's children map.
#[derive(Debug)]
pub(crate) enum ChildEntry {
    /// Not yet wrapped.
    Data(Property),
    /// Wrapped; the property data lives in this slot.
    Node(NodeId),
}

#[derive(Default)]
pub(crate) struct BatchState {
    pub(crate) depth: usize,
    pub(crate) buffer: Vec<String>,
}

/// Property fields plus per-wrapper state.
pub(crate) struct NodeData {
    pub(crate) id: String,
    pub(crate) ty: TypeRef,
    pub(crate) value: Option<Value>,
    pub(crate) default_value: Option<Value>,
    pub(crate) metadata: PropertyMap,
    pub(crate) constraints: PropertyMap,
    pub(crate) children: IndexMap<String, ChildEntry>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) registry: Option<Rc<Registry>>,
    pub(crate) subscriptions: Vec<SubscriptionEntry>,
    pub(crate) batch: BatchState,
}

impl NodeData {
    pub(crate) fn from_property(property: Property, parent: Option<NodeId>) -> Self {
        Self {
            id: property.id,
            ty: property.ty,
            value: property.value,
            default_value: property.default_value,
            metadata: property.metadata,
            constraints: property.constraints,
            children: property
                .children
                .into_iter()
                .map(|(k, p)| (k, ChildEntry::Data(p)))
                .collect(),
            parent,
            registry: None,
            subscriptions: Vec::new(),
            batch: BatchState::default(),
        }
    }

    /// Key under which `child` is stored, found by identity.
    pub(crate) fn key_of(&self, child: NodeId) -> Option<&str> {
        self.children.iter().find_map(|(k, e)| match e {
            ChildEntry::Node(id) if *id == child => Some(k.as_str()),
            _ => None,
        })
    }

    pub(crate) fn materialized_children(&self) -> Vec<(String, NodeId)> {
        self.children
            .iter()
            .filter_map(|(k, e)| match e {
                ChildEntry::Node(id) => Some((k.clone(), *id)),
                ChildEntry::Data(_) => None,
            })
            .collect()
    }

    fn deactivate_subscriptions(&self) {
        for sub in &self.subscriptions {
            sub.active.set(false);
        }
    }
}

/// Slot indices are `u32`; a tree never grows past that.
fn slot_index(len: usize) -> Result<u32, PropertyError> {
    u32::try_from(len).map_err(|_| PropertyError::CapacityExceeded)
}

struct Slot {
    generation: u32,
    data: Option<NodeData>,
}

/// All nodes of one tree plus tree-wide settings.
pub(crate) struct Tree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    pub(crate) config: TreeConfig,
    next_subscription: u64,
}

impl Tree {
    pub(crate) fn new(config: TreeConfig) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            config,
            next_subscription: 0,
        }
    }

    /// A tree holding only `root`, which takes slot 0.
    pub(crate) fn with_root(config: TreeConfig, root: NodeData) -> (Self, NodeId) {
        let mut tree = Self::new(config);
        tree.slots.push(Slot {
            generation: 0,
            data: Some(root),
        });
        (
            tree,
            NodeId {
                index: 0,
                generation: 0,
            },
        )
    }

    fn has_capacity(&self) -> bool {
        !self.free.is_empty() || slot_index(self.slots.len()).is_ok()
    }

    pub(crate) fn alloc(&mut self, data: NodeData) -> Result<NodeId, PropertyError> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.data = Some(data);
            return Ok(NodeId {
                index,
                generation: slot.generation,
            });
        }
        let index = slot_index(self.slots.len())?;
        self.slots.push(Slot {
            generation: 0,
            data: Some(data),
        });
        Ok(NodeId {
            index,
            generation: 0,
        })
    }

    fn slot(&self, id: NodeId) -> Option<&NodeData> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.data.as_ref())
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.data.as_mut())
    }

    pub(crate) fn is_live(&self, id: NodeId) -> bool {
        self.slot(id).is_some()
    }

    pub(crate) fn get(&self, id: NodeId) -> Result<&NodeData, PropertyError> {
        self.slot(id).ok_or(PropertyError::Destroyed)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Result<&mut NodeData, PropertyError> {
        self.slot_mut(id).ok_or(PropertyError::Destroyed)
    }

    pub(crate) fn next_subscription_id(&mut self) -> u64 {
        self.next_subscription += 1;
        self.next_subscription
    }

    /// Wrap the child stored under `key`, reusing the cached wrapper if one
    /// exists. `Ok(None)` when the key is absent.
    pub(crate) fn materialize(
        &mut self,
        parent: NodeId,
        key: &str,
    ) -> Result<Option<NodeId>, PropertyError> {
        let room = self.has_capacity();
        let data = self.get_mut(parent)?;
        let property = match data.children.get_mut(key) {
            None => return Ok(None),
            Some(ChildEntry::Node(id)) => return Ok(Some(*id)),
            Some(_) if !room => return Err(PropertyError::CapacityExceeded),
            Some(entry) => match std::mem::replace(entry, ChildEntry::Data(Property::group(""))) {
                ChildEntry::Data(p) => p,
                ChildEntry::Node(id) => return Ok(Some(id)),
            },
        };
        let id = self.alloc(NodeData::from_property(property, Some(parent)))?;
        if let Some(entry) = self.get_mut(parent)?.children.get_mut(key) {
            *entry = ChildEntry::Node(id);
        }
        Ok(Some(id))
    }

    /// Rebuild the full Property of a node without touching the arena.
    pub(crate) fn assemble(&self, id: NodeId) -> Result<Property, PropertyError> {
        let data = self.get(id)?;
        let mut children = PropertyMap::with_capacity(data.children.len());
        for (key, entry) in &data.children {
            let child = match entry {
                ChildEntry::Data(p) => p.clone(),
                ChildEntry::Node(cid) => self.assemble(*cid)?,
            };
            children.insert(key.clone(), child);
        }
        Ok(Property {
            id: data.id.clone(),
            ty: data.ty.clone(),
            value: data.value.clone(),
            default_value: data.default_value.clone(),
            metadata: data.metadata.clone(),
            constraints: data.constraints.clone(),
            children,
        })
    }

    /// Destroy `id` and every materialized descendant, returning the node's
    /// data with all descendants folded back in. Subscriptions are marked
    /// inactive and the slots freed. The parent's children map is left alone.
    pub(crate) fn release(&mut self, id: NodeId) -> Option<Property> {
        let children = self.slot(id)?.materialized_children();
        for (key, cid) in children {
            if let Some(property) = self.release(cid) {
                if let Some(entry) = self.slot_mut(id).and_then(|d| d.children.get_mut(&key)) {
                    *entry = ChildEntry::Data(property);
                }
            }
        }

        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let data = slot.data.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        data.deactivate_subscriptions();

        Some(Property {
            id: data.id,
            ty: data.ty,
            value: data.value,
            default_value: data.default_value,
            metadata: data.metadata,
            constraints: data.constraints,
            children: data
                .children
                .into_iter()
                .filter_map(|(k, e)| match e {
                    ChildEntry::Data(p) => Some((k, p)),
                    // Every wrapped child was folded back above.
                    ChildEntry::Node(_) => None,
                })
                .collect(),
        })
    }

    /// Copy `value` fields from `snapshot` onto `id` and, recursively, onto
    /// every child key still present. Other fields are not touched.
    pub(crate) fn restore_values(&mut self, id: NodeId, snapshot: &Property) {
        let Some(data) = self.slot_mut(id) else {
            return;
        };
        data.value = snapshot.value.clone();

        let mut wrapped = Vec::new();
        for (key, child_snapshot) in &snapshot.children {
            match data.children.get_mut(key) {
                Some(ChildEntry::Data(p)) => restore_property_values(p, child_snapshot),
                Some(ChildEntry::Node(cid)) => wrapped.push((*cid, child_snapshot)),
                None => {}
            }
        }
        for (cid, child_snapshot) in wrapped {
            self.restore_values(cid, child_snapshot);
        }
    }
}

fn restore_property_values(target: &mut Property, snapshot: &Property) {
    target.value = snapshot.value.clone();
    for (key, child_snapshot) in &snapshot.children {
        if let Some(child) = target.children.get_mut(key) {
            restore_property_values(child, child_snapshot);
        }
    }
}

/// Liveness flag shared between a subscription entry and its handle.
pub(crate) type ActiveFlag = Rc<Cell<bool>>;

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with(property: Property) -> (Tree, NodeId) {
        Tree::with_root(TreeConfig::default(), NodeData::from_property(property, None))
    }

    fn sample() -> Property {
        Property::group("root").with_child(
            "a",
            Property::group("a").with_child("b", Property::data("b", 1)),
        )
    }

    #[test]
    fn materialize_caches_one_wrapper_per_key() {
        let (mut tree, root) = tree_with(sample());
        let a1 = tree.materialize(root, "a").unwrap().unwrap();
        let a2 = tree.materialize(root, "a").unwrap().unwrap();
        assert_eq!(a1, a2);
        assert_eq!(tree.get(root).unwrap().key_of(a1), Some("a"));
        assert!(tree.materialize(root, "zzz").unwrap().is_none());
    }

    #[test]
    fn assemble_sees_through_wrappers() {
        let (mut tree, root) = tree_with(sample());
        let a = tree.materialize(root, "a").unwrap().unwrap();
        tree.materialize(a, "b").unwrap();
        assert_eq!(tree.assemble(root).unwrap(), sample());
    }

    #[test]
    fn release_folds_data_and_recycles_slots() {
        let (mut tree, root) = tree_with(sample());
        let a = tree.materialize(root, "a").unwrap().unwrap();
        let b = tree.materialize(a, "b").unwrap().unwrap();

        let released = tree.release(a).unwrap();
        assert_eq!(released, sample().children["a"]);
        assert!(!tree.is_live(a));
        assert!(!tree.is_live(b));

        // Recycled slot gets a new generation; the stale id stays dead.
        let fresh = tree
            .alloc(NodeData::from_property(Property::group("x"), None))
            .unwrap();
        assert!(tree.is_live(fresh));
        assert!(!tree.is_live(a));
        assert!(!tree.is_live(b));
    }

    #[test]
    fn slot_indices_stop_at_u32_range() {
        assert_eq!(slot_index(7).unwrap(), 7);
        assert_eq!(slot_index(u32::MAX as usize).unwrap(), u32::MAX);
        if let Ok(past_end) = usize::try_from(u64::from(u32::MAX) + 1) {
            assert!(matches!(
                slot_index(past_end),
                Err(PropertyError::CapacityExceeded)
            ));
        }
    }

    #[test]
    fn restore_reaches_wrapped_and_unwrapped_children() {
        let snapshot = sample();
        let (mut tree, root) = tree_with(sample());
        let a = tree.materialize(root, "a").unwrap().unwrap();
        if let Some(ChildEntry::Data(b)) = tree.get_mut(a).unwrap().children.get_mut("b") {
            b.value = Some(Value::from(99));
        }
        tree.get_mut(root).unwrap().value = Some(Value::from("changed"));

        tree.restore_values(root, &snapshot);
        assert_eq!(tree.assemble(root).unwrap(), snapshot);
    }
}
