//! Reactive property trees with an embedded expression evaluator.
//!
//! Everything is a [`Property`]: plain data, type tags, expressions and
//! constraints share one shape. This crate provides:
//! - `Property` plus the `lit` / `reference` / `op` / `constraint` builders
//! - `Registry` - named operator handlers supplied by the host
//! - `eval` - async interpreter for literal, reference and operator expressions
//! - `PropertyNode` - live tree wrapper with lazy children, path-filtered
//!   subscriptions, batching, transactions, traversal and validation
//! - `json` - the `{id, type: {id}, ...}` wire format
//!
//! The crate ships no operators; arithmetic, comparison and validators come
//! from the host through the registry. All state is single-threaded
//! (`Rc` / `RefCell`) and every future is `?Send`.

pub mod config;
pub mod error;
pub mod eval;
pub mod json;
pub mod node;
pub mod path;
pub mod property;
pub mod registry;

pub use config::TreeConfig;
pub use error::PropertyError;
pub use eval::{evaluate, EvalContext};
pub use json::{placeholder_resolver, sentinel_resolver, TypeResolver};
pub use node::{
    ChangeEvent, ChangeFilter, DeepValidation, NodeId, PropertyNode, SetOptions, Subscription,
    TraversalOrder, ValidationResult, Visit,
};
pub use path::IntoPath;
pub use property::{
    constraint, lit, op, reference, reference_segments, ExprKind, Kind, Property, PropertyMap,
    TypeRef, Value,
};
pub use registry::{FnHandler, OperatorHandler, Registry};
