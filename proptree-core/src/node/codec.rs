//! Serialization, evaluated snapshots, structural equality and cloning for
//! live nodes.

use futures::future::{FutureExt, LocalBoxFuture};
use serde_json::{Map, Value as Json};
use std::rc::Rc;

use crate::error::PropertyError;
use crate::json::TypeResolver;
use crate::property::Property;
use crate::registry::Registry;

use super::PropertyNode;

impl PropertyNode {
    /// Wire record of the node's current state.
    pub fn to_json(&self) -> Result<Json, PropertyError> {
        Ok(self.to_property()?.to_json())
    }

    /// Build a new tree from a wire record.
    pub fn from_json(
        json: &Json,
        resolver: Option<&dyn TypeResolver>,
        registry: Option<Rc<Registry>>,
    ) -> Result<PropertyNode, PropertyError> {
        let node = PropertyNode::new(Property::from_json(json, resolver)?);
        node.set_registry(registry)?;
        Ok(node)
    }

    /// Evaluated values only. A leaf collapses to its value, a branch to an
    /// object keyed by child; a branch with a value of its own keeps it under
    /// the configured reserved key. Expression nodes count as leaves.
    pub async fn snapshot(&self) -> Result<Json, PropertyError> {
        self.snapshot_boxed().await
    }

    fn snapshot_boxed(&self) -> LocalBoxFuture<'_, Result<Json, PropertyError>> {
        async move {
            let value = self.get_value().await?;
            let is_expr = self.kind()?.is_expr();
            let children = if is_expr { Vec::new() } else { self.children()? };
            if children.is_empty() {
                return Ok(value.map(|v| v.to_json()).unwrap_or(Json::Null));
            }

            let mut obj = Map::new();
            if let Some(own) = value {
                obj.insert(self.config()?.snapshot_value_key, own.to_json());
            }
            for (key, child) in children {
                obj.insert(key, child.snapshot_boxed().await?);
            }
            Ok(Json::Object(obj))
        }
        .boxed_local()
    }

    /// Structural equality with another node, possibly from another tree.
    pub fn equals(&self, other: &PropertyNode) -> Result<bool, PropertyError> {
        Ok(self.to_property()? == other.to_property()?)
    }

    /// Independent tree with the same structure, configuration and effective
    /// registry. No subscriptions are carried over.
    pub fn clone_tree(&self) -> Result<PropertyNode, PropertyError> {
        let copy = PropertyNode::with_config(self.to_property()?, self.config()?);
        copy.set_registry(self.registry()?)?;
        Ok(copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;
    use crate::json::sentinel_resolver;
    use crate::property::{lit, op, reference, Value};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn registry() -> Rc<Registry> {
        let registry = Registry::new();
        registry.register_fn("double", |args, ctx| async move {
            let n = ctx
                .eval_arg(&args[0])
                .await?
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            Ok(Some(Value::from(n * 2.0)))
        });
        Rc::new(registry)
    }

    fn order() -> Property {
        Property::group("order")
            .with_value("pending")
            .with_child("qty", Property::data("qty", 4))
            .with_child(
                "twice",
                Property::group("twice").with_value(op("double", [reference("root.qty.value")])),
            )
            .with_child(
                "meta",
                Property::group("meta").with_child("note", Property::data("note", "rush")),
            )
    }

    #[tokio::test]
    async fn snapshot_evaluates_and_nests() {
        let node = PropertyNode::with_registry(order(), registry());
        let snap = node.snapshot().await.unwrap();
        assert_eq!(
            snap,
            json!({
                "_value": "pending",
                "qty": 4,
                "twice": 8.0,
                "meta": {"note": "rush"}
            })
        );
    }

    #[tokio::test]
    async fn snapshot_value_key_is_configurable() {
        let config = TreeConfig {
            snapshot_value_key: "$self".to_string(),
            ..TreeConfig::default()
        };
        let node = PropertyNode::with_config(
            Property::group("g")
                .with_value(1)
                .with_child("c", Property::data("c", 2)),
            config,
        );
        assert_eq!(node.snapshot().await.unwrap(), json!({"$self": 1, "c": 2}));
    }

    #[tokio::test]
    async fn expression_nodes_snapshot_as_leaves() {
        let node = PropertyNode::with_registry(
            Property::group("r").with_child("sum", op("double", [lit(3)])),
            registry(),
        );
        assert_eq!(node.snapshot().await.unwrap(), json!({"sum": 6.0}));
    }

    #[test]
    fn json_round_trip_through_nodes() {
        let node = PropertyNode::new(order());
        node.set_value_at("qty", 10).unwrap();
        let wire = node.to_json().unwrap();

        let back = PropertyNode::from_json(&wire, Some(&sentinel_resolver), None).unwrap();
        assert!(back.equals(&node).unwrap());
        assert_eq!(back.to_json().unwrap(), wire);
    }

    #[test]
    fn clone_tree_is_independent() {
        let shared = registry();
        let node = PropertyNode::with_registry(order(), shared.clone());
        let copy = node.clone_tree().unwrap();
        assert!(copy.equals(&node).unwrap());
        assert!(!copy.same_node(&node));
        assert!(Rc::ptr_eq(&copy.registry().unwrap().unwrap(), &shared));

        copy.set_value_at("meta.note", "slow").unwrap();
        assert!(!copy.equals(&node).unwrap());
        assert_eq!(
            node.raw_value_at("meta.note").unwrap(),
            Some(Value::from("rush"))
        );
    }
}
