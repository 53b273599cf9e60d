//! Operator registry.
//!
//! A plain name→handler table. The core ships no operators; domain libraries
//! register theirs before evaluation starts. Re-registering a name replaces
//! the previous handler (last write wins) and hands the old one back.

use async_trait::async_trait;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use tracing::debug;

use crate::eval::EvalContext;
use crate::property::{Property, Value};

/// A named operator.
///
/// Handlers receive their operands unevaluated and decide themselves which to
/// evaluate (through [`EvalContext::eval_arg`]), in what order, and whether to
/// short-circuit. Returning `Ok(None)` means "no value".
#[async_trait(?Send)]
pub trait OperatorHandler {
    async fn call(&self, args: &[Property], ctx: &EvalContext) -> anyhow::Result<Option<Value>>;
}

/// Adapter turning an async closure into an [`OperatorHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait(?Send)]
impl<F, Fut> OperatorHandler for FnHandler<F>
where
    F: Fn(Vec<Property>, EvalContext) -> Fut + 'static,
    Fut: Future<Output = anyhow::Result<Option<Value>>> + 'static,
{
    async fn call(&self, args: &[Property], ctx: &EvalContext) -> anyhow::Result<Option<Value>> {
        (self.0)(args.to_vec(), ctx.clone()).await
    }
}

/// Mutable operator table, shared between trees through `Rc<Registry>`.
#[derive(Default)]
pub struct Registry {
    handlers: RefCell<HashMap<Rc<str>, Rc<dyn OperatorHandler>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, returning any handler it replaced.
    pub fn register<H>(&self, name: &str, handler: H) -> Option<Rc<dyn OperatorHandler>>
    where
        H: OperatorHandler + 'static,
    {
        self.register_rc(name, Rc::new(handler))
    }

    pub fn register_rc(
        &self,
        name: &str,
        handler: Rc<dyn OperatorHandler>,
    ) -> Option<Rc<dyn OperatorHandler>> {
        let previous = self.handlers.borrow_mut().insert(Rc::from(name), handler);
        if previous.is_some() {
            debug!(operator = name, "operator handler replaced");
        }
        previous
    }

    /// Register an async closure `|args, ctx| async move { ... }`.
    pub fn register_fn<F, Fut>(&self, name: &str, f: F) -> Option<Rc<dyn OperatorHandler>>
    where
        F: Fn(Vec<Property>, EvalContext) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<Option<Value>>> + 'static,
    {
        self.register(name, FnHandler(f))
    }

    pub fn lookup(&self, name: &str) -> Option<Rc<dyn OperatorHandler>> {
        self.handlers.borrow().get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.handlers.borrow().contains_key(name)
    }

    pub fn unregister(&self, name: &str) -> Option<Rc<dyn OperatorHandler>> {
        self.handlers.borrow_mut().remove(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .borrow()
            .keys()
            .map(|k| k.to_string())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.borrow().is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("operators", &self.names())
            .finish()
    }
}
