//! Tree walks and the combinators built on them.
//!
//! Every walk wraps children as it goes and hands the visitor the node plus
//! its key path relative to the node the walk started from.

use std::collections::VecDeque;

use crate::error::PropertyError;

use super::PropertyNode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TraversalOrder {
    #[default]
    PreOrder,
    PostOrder,
    BreadthFirst,
}

/// Visitor verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visit {
    #[default]
    Continue,
    Stop,
}

impl Visit {
    pub fn stop_if(condition: bool) -> Self {
        if condition {
            Visit::Stop
        } else {
            Visit::Continue
        }
    }
}

type Visitor<'a> = dyn FnMut(&PropertyNode, &[String]) -> Visit + 'a;

fn pre_order(
    node: &PropertyNode,
    path: &mut Vec<String>,
    visitor: &mut Visitor<'_>,
) -> Result<Visit, PropertyError> {
    if visitor(node, path) == Visit::Stop {
        return Ok(Visit::Stop);
    }
    for (key, child) in node.children()? {
        path.push(key);
        let verdict = pre_order(&child, path, visitor)?;
        path.pop();
        if verdict == Visit::Stop {
            return Ok(Visit::Stop);
        }
    }
    Ok(Visit::Continue)
}

// A Stop from a child skips that child's later siblings only; the parent
// is still visited and its own verdict decides what happens above it.
fn post_order(
    node: &PropertyNode,
    path: &mut Vec<String>,
    visitor: &mut Visitor<'_>,
) -> Result<Visit, PropertyError> {
    for (key, child) in node.children()? {
        path.push(key);
        let verdict = post_order(&child, path, visitor)?;
        path.pop();
        if verdict == Visit::Stop {
            break;
        }
    }
    Ok(visitor(node, path))
}

fn breadth_first(start: &PropertyNode, visitor: &mut Visitor<'_>) -> Result<(), PropertyError> {
    let mut queue = VecDeque::from([(start.clone(), Vec::<String>::new())]);
    while let Some((node, path)) = queue.pop_front() {
        if visitor(&node, &path) == Visit::Stop {
            return Ok(());
        }
        for (key, child) in node.children()? {
            let mut child_path = path.clone();
            child_path.push(key);
            queue.push_back((child, child_path));
        }
    }
    Ok(())
}

impl PropertyNode {
    /// Walk this node and its descendants in `order`.
    pub fn traverse<F>(&self, order: TraversalOrder, mut visitor: F) -> Result<(), PropertyError>
    where
        F: FnMut(&PropertyNode, &[String]) -> Visit,
    {
        self.ensure_live()?;
        let mut path = Vec::new();
        match order {
            TraversalOrder::PreOrder => pre_order(self, &mut path, &mut visitor).map(|_| ()),
            TraversalOrder::PostOrder => post_order(self, &mut path, &mut visitor).map(|_| ()),
            TraversalOrder::BreadthFirst => breadth_first(self, &mut visitor),
        }
    }

    /// First node, pre-order, matching `predicate`.
    pub fn find<F>(&self, mut predicate: F) -> Result<Option<PropertyNode>, PropertyError>
    where
        F: FnMut(&PropertyNode, &[String]) -> bool,
    {
        let mut found = None;
        self.traverse(TraversalOrder::PreOrder, |node, path| {
            if predicate(node, path) {
                found = Some(node.clone());
                Visit::Stop
            } else {
                Visit::Continue
            }
        })?;
        Ok(found)
    }

    pub fn find_all<F>(&self, mut predicate: F) -> Result<Vec<PropertyNode>, PropertyError>
    where
        F: FnMut(&PropertyNode, &[String]) -> bool,
    {
        let mut found = Vec::new();
        self.traverse(TraversalOrder::PreOrder, |node, path| {
            if predicate(node, path) {
                found.push(node.clone());
            }
            Visit::Continue
        })?;
        Ok(found)
    }

    /// First node whose property `id` equals `id`.
    pub fn find_by_id(&self, id: &str) -> Result<Option<PropertyNode>, PropertyError> {
        self.find(|node, _| node.with(|d| d.id == id).unwrap_or(false))
    }

    /// Every node whose type reference has id `type_id`.
    pub fn find_by_type(&self, type_id: &str) -> Result<Vec<PropertyNode>, PropertyError> {
        self.find_all(|node, _| node.with(|d| d.ty.id() == type_id).unwrap_or(false))
    }

    /// Pre-order map.
    pub fn map<T, F>(&self, mut f: F) -> Result<Vec<T>, PropertyError>
    where
        F: FnMut(&PropertyNode, &[String]) -> T,
    {
        let mut out = Vec::new();
        self.traverse(TraversalOrder::PreOrder, |node, path| {
            out.push(f(node, path));
            Visit::Continue
        })?;
        Ok(out)
    }

    /// Pre-order fold.
    pub fn reduce<A, F>(&self, init: A, mut f: F) -> Result<A, PropertyError>
    where
        F: FnMut(A, &PropertyNode, &[String]) -> A,
    {
        let mut visited = Vec::new();
        self.traverse(TraversalOrder::PreOrder, |node, path| {
            visited.push((node.clone(), path.to_vec()));
            Visit::Continue
        })?;
        Ok(visited
            .iter()
            .fold(init, |acc, (node, path)| f(acc, node, path.as_slice())))
    }

    pub fn some<F>(&self, predicate: F) -> Result<bool, PropertyError>
    where
        F: FnMut(&PropertyNode, &[String]) -> bool,
    {
        Ok(self.find(predicate)?.is_some())
    }

    pub fn every<F>(&self, mut predicate: F) -> Result<bool, PropertyError>
    where
        F: FnMut(&PropertyNode, &[String]) -> bool,
    {
        Ok(!self.some(|node, path| !predicate(node, path))?)
    }

    /// Number of nodes matching `predicate`.
    pub fn count<F>(&self, mut predicate: F) -> Result<usize, PropertyError>
    where
        F: FnMut(&PropertyNode, &[String]) -> bool,
    {
        let mut n = 0;
        self.traverse(TraversalOrder::PreOrder, |node, path| {
            if predicate(node, path) {
                n += 1;
            }
            Visit::Continue
        })?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::join_path;
    use crate::property::{Property, TypeRef};

    //      root
    //     /    \
    //    a      d
    //   / \
    //  b   c
    fn tree() -> PropertyNode {
        let text = TypeRef::named("text");
        PropertyNode::new(
            Property::group("root")
                .with_child(
                    "a",
                    Property::group("a")
                        .with_child("b", Property::data("b", 1).with_type(text.clone()))
                        .with_child("c", Property::data("c", 2)),
                )
                .with_child("d", Property::data("d", 3).with_type(text)),
        )
    }

    fn order(root: &PropertyNode, order: TraversalOrder, stop_at: Option<&str>) -> Vec<String> {
        let mut seen = Vec::new();
        root.traverse(order, |node, _| {
            let id = node.id().unwrap();
            let verdict = Visit::stop_if(stop_at == Some(id.as_str()));
            seen.push(id);
            verdict
        })
        .unwrap();
        seen
    }

    #[test]
    fn visit_orders() {
        let root = tree();
        assert_eq!(order(&root, TraversalOrder::PreOrder, None), ["root", "a", "b", "c", "d"]);
        assert_eq!(order(&root, TraversalOrder::PostOrder, None), ["b", "c", "a", "d", "root"]);
        assert_eq!(order(&root, TraversalOrder::BreadthFirst, None), ["root", "a", "d", "b", "c"]);
    }

    #[test]
    fn pre_order_stop_ends_everything() {
        assert_eq!(order(&tree(), TraversalOrder::PreOrder, Some("b")), ["root", "a", "b"]);
    }

    #[test]
    fn post_order_stop_skips_siblings_but_visits_ancestors() {
        assert_eq!(
            order(&tree(), TraversalOrder::PostOrder, Some("b")),
            ["b", "a", "d", "root"]
        );
    }

    #[test]
    fn breadth_first_stop_drains_queue() {
        assert_eq!(order(&tree(), TraversalOrder::BreadthFirst, Some("a")), ["root", "a"]);
    }

    #[test]
    fn paths_are_relative_to_start() {
        let root = tree();
        let a = root.child("a").unwrap().unwrap();
        let paths = a.map(|_, path| join_path(path)).unwrap();
        assert_eq!(paths, ["", "b", "c"]);
    }

    #[test]
    fn combinators() {
        let root = tree();
        assert_eq!(root.find_by_id("c").unwrap().unwrap().path_string().unwrap(), "a.c");
        assert!(root.find_by_id("zzz").unwrap().is_none());
        assert_eq!(root.find_by_type("text").unwrap().len(), 2);

        let sum = root
            .reduce(0i64, |acc, node, _| {
                acc + node
                    .raw_value()
                    .unwrap()
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0)
            })
            .unwrap();
        assert_eq!(sum, 6);

        assert!(root.some(|n, _| n.id().unwrap() == "d").unwrap());
        assert!(!root.every(|n, _| n.raw_value().unwrap().is_some()).unwrap());
        assert!(root.every(|n, _| !n.is_destroyed()).unwrap());
        assert_eq!(root.count(|_, _| true).unwrap(), 5);
        assert_eq!(root.count(|_, path| path.len() == 2).unwrap(), 2);
    }
}
