//! Expression evaluator.
//!
//! Three expression kinds are interpreted:
//! - **LIT** returns its `value` verbatim, one level deep.
//! - **REF** resolves a path from a `self` / `parent` / `root` anchor through
//!   children and metadata; a trailing `value` segment yields the raw payload.
//!   Unresolvable paths are "no value", not an error.
//! - **OP** hands its unevaluated `arg*` operands to a registered handler.
//!
//! Evaluation is async end-to-end because handlers may suspend. Nothing is
//! evaluated in parallel.

use std::fmt;
use std::rc::Rc;
use tracing::trace;

use crate::error::PropertyError;
use crate::node::PropertyNode;
use crate::path::split_path;
use crate::property::{ExprKind, Property, Value};
use crate::registry::Registry;

/// Parent lookup used by the `parent` anchor.
pub type ParentLookup = Rc<dyn Fn(&PropertyNode) -> Option<PropertyNode>>;

/// Everything an evaluation needs: the anchor node, the tree root, the
/// operator registry, and how to find a node's parent.
#[derive(Clone)]
pub struct EvalContext {
    pub current: Option<PropertyNode>,
    pub root: Option<PropertyNode>,
    pub registry: Option<Rc<Registry>>,
    pub parent_of: ParentLookup,
}

fn tree_parent(node: &PropertyNode) -> Option<PropertyNode> {
    node.parent().ok().flatten()
}

impl EvalContext {
    /// A context with no anchor node. References resolve to "no value".
    pub fn detached(registry: Option<Rc<Registry>>) -> Self {
        Self {
            current: None,
            root: None,
            registry,
            parent_of: Rc::new(tree_parent),
        }
    }

    /// Anchor at `node`, using its tree root and effective registry.
    pub fn for_node(node: &PropertyNode) -> Result<Self, PropertyError> {
        Ok(Self {
            current: Some(node.clone()),
            root: Some(node.root()?),
            registry: node.registry()?,
            parent_of: Rc::new(tree_parent),
        })
    }

    pub fn with_registry(mut self, registry: Rc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_parent_lookup(mut self, parent_of: ParentLookup) -> Self {
        self.parent_of = parent_of;
        self
    }

    /// Same context re-anchored at `node`.
    pub fn at(&self, node: &PropertyNode) -> Self {
        Self {
            current: Some(node.clone()),
            ..self.clone()
        }
    }

    pub fn parent_of(&self, node: &PropertyNode) -> Option<PropertyNode> {
        (self.parent_of)(node)
    }

    pub async fn evaluate(&self, expr: &Property) -> Result<Option<Value>, PropertyError> {
        evaluate(expr, self).await
    }

    pub async fn eval_arg(&self, arg: &Property) -> Result<Option<Value>, PropertyError> {
        eval_arg(arg, self).await
    }

    pub async fn eval_args(&self, args: &[Property]) -> Result<Vec<Option<Value>>, PropertyError> {
        eval_args(args, self).await
    }
}

impl fmt::Debug for EvalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalContext")
            .field("current", &self.current)
            .field("root", &self.root)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Evaluate one expression. Non-expression properties evaluate to their own
/// raw value.
pub async fn evaluate(expr: &Property, ctx: &EvalContext) -> Result<Option<Value>, PropertyError> {
    match expr.kind() {
        ExprKind::Literal => Ok(expr.value.clone()),
        ExprKind::Reference => Ok(resolve_reference(expr, ctx)),
        ExprKind::Operator => evaluate_op(expr, ctx).await,
        ExprKind::Plain | ExprKind::Constraint | ExprKind::Type => Ok(expr.value.clone()),
    }
}

async fn evaluate_op(expr: &Property, ctx: &EvalContext) -> Result<Option<Value>, PropertyError> {
    let registry = ctx.registry.as_ref().ok_or(PropertyError::MissingRegistry)?;
    let name = expr
        .op_name()
        .ok_or_else(|| PropertyError::UnknownOperator(format!("<unnamed:{}>", expr.id)))?;
    let handler = registry
        .lookup(name)
        .ok_or_else(|| PropertyError::UnknownOperator(name.to_string()))?;

    let args: Vec<Property> = expr.op_args().into_iter().cloned().collect();
    trace!(operator = name, argc = args.len(), "dispatching operator");

    match handler.call(&args, ctx).await {
        Ok(value) => Ok(value),
        // Failures from nested evaluation keep their own identity.
        Err(err) => match err.downcast::<PropertyError>() {
            Ok(inner) => Err(inner),
            Err(other) => Err(PropertyError::operator(name, other)),
        },
    }
}

/// Resolve one operand: expressions are evaluated, plain properties yield
/// their raw value, and a result that is itself an embedded expression is
/// evaluated exactly one more level.
pub async fn eval_arg(arg: &Property, ctx: &EvalContext) -> Result<Option<Value>, PropertyError> {
    let first = if arg.is_expr() {
        evaluate(arg, ctx).await?
    } else {
        arg.value.clone()
    };
    match first {
        Some(Value::Property(nested)) if nested.is_expr() => evaluate(&nested, ctx).await,
        other => Ok(other),
    }
}

/// Resolve operands in order, one after another.
pub async fn eval_args(
    args: &[Property],
    ctx: &EvalContext,
) -> Result<Vec<Option<Value>>, PropertyError> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        out.push(eval_arg(arg, ctx).await?);
    }
    Ok(out)
}

// ─── References ───────────────────────────────────────────────

/// Segments of a REF payload: a dot string or a JSON array of strings.
fn reference_path(value: &Value) -> Option<Vec<String>> {
    match value.as_data()? {
        serde_json::Value::String(s) => Some(split_path(s)),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|s| s.as_str().map(str::to_string))
            .collect(),
        _ => None,
    }
}

/// Position while walking a reference path: either a live node or plain
/// property data reached through metadata.
enum Cursor {
    Node(PropertyNode),
    Data(Property),
}

impl Cursor {
    fn descend(self, key: &str) -> Option<Cursor> {
        match self {
            Cursor::Node(node) => {
                if let Some(child) = node.child(key).ok().flatten() {
                    return Some(Cursor::Node(child));
                }
                node.metadata_property(key)
                    .ok()
                    .flatten()
                    .map(Cursor::Data)
            }
            Cursor::Data(mut prop) => prop
                .children
                .shift_remove(key)
                .or_else(|| prop.metadata.shift_remove(key))
                .map(Cursor::Data),
        }
    }

    fn raw_value(self) -> Option<Value> {
        match self {
            Cursor::Node(node) => node.raw_value().ok().flatten(),
            Cursor::Data(prop) => prop.value,
        }
    }

    fn into_value(self) -> Option<Value> {
        match self {
            Cursor::Node(node) => node.to_property().ok().map(Value::from),
            Cursor::Data(prop) => Some(Value::from(prop)),
        }
    }
}

/// Resolve a REF expression against `ctx`. A first segment other than
/// `self`, `parent` or `root` is resolved relative to `self`.
pub fn resolve_reference(expr: &Property, ctx: &EvalContext) -> Option<Value> {
    let segments = reference_path(expr.value.as_ref()?)?;
    let (first, _) = segments.split_first()?;

    let (anchor, rest) = match first.as_str() {
        "self" => (ctx.current.clone(), &segments[1..]),
        "parent" => (
            ctx.current.as_ref().and_then(|c| ctx.parent_of(c)),
            &segments[1..],
        ),
        "root" => (ctx.root.clone(), &segments[1..]),
        _ => (ctx.current.clone(), &segments[..]),
    };

    let mut cursor = Cursor::Node(anchor?);
    for (i, segment) in rest.iter().enumerate() {
        if segment == "value" && i + 1 == rest.len() {
            return cursor.raw_value();
        }
        cursor = cursor.descend(segment)?;
    }
    cursor.into_value()
}
