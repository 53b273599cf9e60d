//! Constraint validation.

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::PropertyError;
use crate::path::join_path;
use crate::property::Value;

use super::PropertyNode;

/// Outcome of validating one node: failing constraint key → message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: IndexMap<String, String>,
}

/// Outcome of validating a subtree, keyed by node path. The node the
/// validation started from is reported under the configured root key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeepValidation {
    pub valid: bool,
    pub errors: IndexMap<String, IndexMap<String, String>>,
}

fn message_text(value: Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_json().to_string(),
    }
}

impl PropertyNode {
    /// Evaluate every constraint on this node. A constraint passes when its
    /// result is truthy; an absent result fails. A constraint carrying no
    /// check at all passes.
    pub async fn validate(&self) -> Result<ValidationResult, PropertyError> {
        let mut errors = IndexMap::new();
        for key in self.constraint_keys()? {
            let unchecked = self
                .constraint_property(&key)?
                .is_some_and(|c| c.value.is_none());
            if unchecked {
                continue;
            }
            let passed = self
                .get_constraint(&key)
                .await?
                .is_some_and(|v| v.is_truthy());
            if passed {
                continue;
            }
            let message = self.constraint_message(&key).await?;
            errors.insert(key, message);
        }
        Ok(ValidationResult {
            valid: errors.is_empty(),
            errors,
        })
    }

    async fn constraint_message(&self, key: &str) -> Result<String, PropertyError> {
        let custom = match self
            .constraint_property(key)?
            .and_then(|c| c.metadata.get("message").cloned())
        {
            Some(entry) => self.evaluate_entry(entry).await?,
            None => None,
        };
        Ok(match custom {
            Some(text) => message_text(text),
            None => self.config()?.constraint_message(key),
        })
    }

    /// Validate this node and every descendant, pre-order. Only nodes with
    /// failures appear in `errors`.
    pub async fn validate_deep(&self) -> Result<DeepValidation, PropertyError> {
        let nodes = self.map(|node, path| (node.clone(), join_path(path)))?;
        let root_key = self.config()?.root_error_key;
        let mut errors = IndexMap::new();
        for (node, path) in nodes {
            let result = node.validate().await?;
            if result.valid {
                continue;
            }
            let key = if path.is_empty() { root_key.clone() } else { path };
            errors.insert(key, result.errors);
        }
        Ok(DeepValidation {
            valid: errors.is_empty(),
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;
    use crate::property::{constraint, lit, op, reference, Kind, Property, TypeRef};
    use crate::registry::Registry;
    use std::rc::Rc;

    fn registry() -> Rc<Registry> {
        let registry = Registry::new();
        registry.register_fn("eq", |args, ctx| async move {
            let vals = ctx.eval_args(&args).await?;
            Ok(Some(Value::from(vals.first() == vals.get(1))))
        });
        Rc::new(registry)
    }

    fn signup(confirm: &str) -> PropertyNode {
        PropertyNode::with_registry(
            Property::group("signup")
                .with_child("password", Property::data("password", "secret123"))
                .with_child(
                    "confirmPassword",
                    Property::data("confirmPassword", confirm).with_constraint(
                        "matches",
                        constraint(
                            op("eq", [reference("self.value"), reference("parent.password.value")]),
                            Some("Passwords must match"),
                        ),
                    ),
                ),
            registry(),
        )
    }

    #[tokio::test]
    async fn matching_passwords_are_valid() {
        let node = signup("secret123");
        let confirm = node.child("confirmPassword").unwrap().unwrap();
        let result = confirm.validate().await.unwrap();
        assert!(result.valid);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn mismatch_reports_under_constraint_key() {
        let node = signup("other");
        let confirm = node.child("confirmPassword").unwrap().unwrap();
        let result = confirm.validate().await.unwrap();
        assert!(!result.valid);
        assert_eq!(result.errors["matches"], "Passwords must match");
    }

    #[tokio::test]
    async fn falsy_results_fail_with_default_message() {
        let node = PropertyNode::new(
            Property::data("x", 0)
                .with_constraint("absent", constraint(reference("self.nothing.value"), None))
                .with_constraint("zero", constraint(reference("self.value"), None))
                .with_constraint("empty", constraint(lit(""), None))
                .with_constraint("ok", constraint(true, None)),
        );
        let result = node.validate().await.unwrap();
        assert_eq!(
            result.errors.keys().collect::<Vec<_>>(),
            vec!["absent", "zero", "empty"]
        );
        assert_eq!(result.errors["zero"], "Constraint 'zero' failed");
    }

    #[tokio::test]
    async fn constraint_without_check_is_vacuously_valid() {
        let node = PropertyNode::new(
            Property::data("x", 0).with_constraint(
                "pending",
                Property::new("pending", TypeRef::Sentinel(Kind::Constraint)),
            ),
        );
        let result = node.validate().await.unwrap();
        assert!(result.valid);
        assert!(result.errors.is_empty());
        assert!(node.validate_deep().await.unwrap().valid);
    }

    #[tokio::test]
    async fn message_may_be_an_expression() {
        let node = PropertyNode::new(
            Property::data("age", 3)
                .with_metadata("label", Property::data("label", "Age"))
                .with_constraint(
                    "min",
                    constraint(false, None)
                        .with_metadata("message", reference("self.label.value")),
                ),
        );
        let result = node.validate().await.unwrap();
        assert_eq!(result.errors["min"], "Age");
    }

    #[tokio::test]
    async fn deep_validation_keys_by_path() {
        let node = PropertyNode::with_config(
            Property::group("form")
                .with_constraint("never", constraint(false, None))
                .with_child(
                    "inner",
                    Property::group("inner")
                        .with_child("leaf", Property::data("leaf", "").with_constraint(
                            "required",
                            constraint(reference("self.value"), Some("required")),
                        )),
                ),
            TreeConfig {
                root_error_key: "$".to_string(),
                ..TreeConfig::default()
            },
        );
        let deep = node.validate_deep().await.unwrap();
        assert!(!deep.valid);
        assert_eq!(
            deep.errors.keys().collect::<Vec<_>>(),
            vec!["$", "inner.leaf"]
        );
        assert_eq!(deep.errors["inner.leaf"]["required"], "required");
    }
}
