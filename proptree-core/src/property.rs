//! The uniform Property shape and its classification guards.
//!
//! A [`Property`] is plain data: an id, a type reference, an optional value
//! and default, and three insertion-ordered maps (metadata, constraints,
//! children). The same shape encodes data, type tags, expressions and
//! constraints; which one it is depends solely on its [`TypeRef`].

use indexmap::IndexMap;
use std::sync::{Arc, OnceLock};

// ─── Sentinel kinds ───────────────────────────────────────────

/// Canonical sentinel types. Expression kind is decided by matching on these,
/// never by comparing id strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    /// The root type of types. Its own type is itself.
    Type,
    Lit,
    Ref,
    Op,
    Constraint,
}

impl Kind {
    pub const ALL: [Kind; 5] = [Kind::Type, Kind::Lit, Kind::Ref, Kind::Op, Kind::Constraint];

    /// Wire id of the sentinel.
    pub fn id(self) -> &'static str {
        match self {
            Kind::Type => "TYPE",
            Kind::Lit => "LIT",
            Kind::Ref => "REF",
            Kind::Op => "OP",
            Kind::Constraint => "CONSTRAINT",
        }
    }

    pub fn from_id(id: &str) -> Option<Kind> {
        Kind::ALL.into_iter().find(|k| k.id() == id)
    }
}

/// Structural classification of a Property, derived from its type reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExprKind {
    Plain,
    Literal,
    Reference,
    Operator,
    Constraint,
    Type,
}

impl ExprKind {
    pub fn is_expr(self) -> bool {
        matches!(
            self,
            ExprKind::Literal | ExprKind::Reference | ExprKind::Operator
        )
    }
}

// ─── Type references ──────────────────────────────────────────

/// The `type` slot of a Property.
///
/// Named types are shared through `Arc` so a type hierarchy is stored once
/// no matter how many properties point at it.
#[derive(Clone, Debug)]
pub enum TypeRef {
    Sentinel(Kind),
    Named(Arc<Property>),
}

impl TypeRef {
    /// A user-defined type. Its own type is the `TYPE` sentinel.
    pub fn named(id: impl Into<String>) -> Self {
        TypeRef::Named(Arc::new(Property::new(id, TypeRef::Sentinel(Kind::Type))))
    }

    /// Wrap an existing type definition.
    pub fn from_property(def: Property) -> Self {
        TypeRef::Named(Arc::new(def))
    }

    /// Shared catch-all type used by [`Property::data`].
    pub fn any() -> Self {
        static ANY: OnceLock<Arc<Property>> = OnceLock::new();
        TypeRef::Named(
            ANY.get_or_init(|| Arc::new(Property::new("ANY", TypeRef::Sentinel(Kind::Type))))
                .clone(),
        )
    }

    pub fn id(&self) -> &str {
        match self {
            TypeRef::Sentinel(kind) => kind.id(),
            TypeRef::Named(def) => &def.id,
        }
    }

    /// The sentinel kind, if this is one of the canonical sentinels.
    pub fn sentinel(&self) -> Option<Kind> {
        match self {
            TypeRef::Sentinel(kind) => Some(*kind),
            TypeRef::Named(_) => None,
        }
    }

    /// Classification of a property carrying this type.
    pub fn expr_kind(&self) -> ExprKind {
        match self.sentinel() {
            Some(Kind::Lit) => ExprKind::Literal,
            Some(Kind::Ref) => ExprKind::Reference,
            Some(Kind::Op) => ExprKind::Operator,
            Some(Kind::Constraint) => ExprKind::Constraint,
            Some(Kind::Type) => ExprKind::Type,
            None => ExprKind::Plain,
        }
    }

    /// The type's own type. The `TYPE` sentinel is self-referential.
    pub fn type_of(&self) -> TypeRef {
        match self {
            TypeRef::Sentinel(_) => TypeRef::Sentinel(Kind::Type),
            TypeRef::Named(def) => def.ty.clone(),
        }
    }
}

/// Type references compare by id only; types are never deep-compared.
impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

// ─── Values ───────────────────────────────────────────────────

/// Payload of a `value` or `defaultValue` slot.
///
/// Equality compares numbers by value, so `1` and `1.0` are equal.
#[derive(Clone, Debug)]
pub enum Value {
    /// Primitive or arbitrary structured data.
    Data(serde_json::Value),
    /// A nested Property, typically an embedded expression.
    Property(Box<Property>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Data(a), Value::Data(b)) => data_eq(a, b),
            (Value::Property(a), Value::Property(b)) => a == b,
            _ => false,
        }
    }
}

fn data_eq(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    use serde_json::Value as Json;
    match (a, b) {
        (Json::Number(x), Json::Number(y)) => {
            if x.is_f64() || y.is_f64() {
                x.as_f64() == y.as_f64()
            } else {
                x == y
            }
        }
        (Json::Array(x), Json::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| data_eq(a, b))
        }
        (Json::Object(x), Json::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| data_eq(v, w)))
        }
        _ => a == b,
    }
}

impl Value {
    pub fn null() -> Self {
        Value::Data(serde_json::Value::Null)
    }

    pub fn as_data(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Data(v) => Some(v),
            Value::Property(_) => None,
        }
    }

    pub fn as_property(&self) -> Option<&Property> {
        match self {
            Value::Property(p) => Some(p),
            Value::Data(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_data().and_then(serde_json::Value::as_bool)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_data().and_then(serde_json::Value::as_f64)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_data().and_then(serde_json::Value::as_i64)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_data().and_then(serde_json::Value::as_str)
    }

    /// True when the payload is a nested Property.
    pub fn is_property(&self) -> bool {
        matches!(self, Value::Property(_))
    }

    /// True when the payload is a nested literal/reference/operator.
    pub fn is_expr(&self) -> bool {
        self.as_property().is_some_and(Property::is_expr)
    }

    /// Truthiness used by constraint validation: null, false, 0, NaN and ""
    /// are falsy. Arrays, objects and nested properties are truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Data(serde_json::Value::Null) => false,
            Value::Data(serde_json::Value::Bool(b)) => *b,
            Value::Data(serde_json::Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Value::Data(serde_json::Value::String(s)) => !s.is_empty(),
            Value::Data(_) | Value::Property(_) => true,
        }
    }

    /// Plain JSON view. Nested properties become their wire record.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Data(v) => v.clone(),
            Value::Property(p) => p.to_json(),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Data(v)
    }
}

impl From<Property> for Value {
    fn from(p: Property) -> Self {
        Value::Property(Box::new(p))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Data(b.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Data(n.into())
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Data(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Data(n.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Data(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Data(s.into())
    }
}

// ─── Property ─────────────────────────────────────────────────

/// Ordered string-keyed map of properties.
pub type PropertyMap = IndexMap<String, Property>;

/// The uniform tree node.
///
/// Equality is structural: ids, type ids, values and defaults, and the three
/// maps compared key-by-key regardless of insertion order.
#[derive(Clone, Debug, PartialEq)]
pub struct Property {
    pub id: String,
    pub ty: TypeRef,
    pub value: Option<Value>,
    pub default_value: Option<Value>,
    pub metadata: PropertyMap,
    pub constraints: PropertyMap,
    pub children: PropertyMap,
}

impl Property {
    pub fn new(id: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            id: id.into(),
            ty,
            value: None,
            default_value: None,
            metadata: PropertyMap::new(),
            constraints: PropertyMap::new(),
            children: PropertyMap::new(),
        }
    }

    /// A plain data property of the shared `ANY` type.
    pub fn data(id: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(id, TypeRef::any()).with_value(value)
    }

    /// A plain branch property with no value.
    pub fn group(id: impl Into<String>) -> Self {
        Self::new(id, TypeRef::any())
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_type(mut self, ty: TypeRef) -> Self {
        self.ty = ty;
        self
    }

    pub fn with_child(mut self, key: impl Into<String>, child: Property) -> Self {
        self.children.insert(key.into(), child);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, entry: Property) -> Self {
        self.metadata.insert(key.into(), entry);
        self
    }

    pub fn with_constraint(mut self, key: impl Into<String>, constraint: Property) -> Self {
        self.constraints.insert(key.into(), constraint);
        self
    }

    // ── Guards ──

    pub fn kind(&self) -> ExprKind {
        self.ty.expr_kind()
    }

    pub fn is_lit(&self) -> bool {
        self.kind() == ExprKind::Literal
    }

    pub fn is_ref(&self) -> bool {
        self.kind() == ExprKind::Reference
    }

    pub fn is_op(&self) -> bool {
        self.kind() == ExprKind::Operator
    }

    pub fn is_constraint(&self) -> bool {
        self.kind() == ExprKind::Constraint
    }

    pub fn is_expr(&self) -> bool {
        self.kind().is_expr()
    }

    /// Operand expressions of an operator, ordered by the numeric suffix of
    /// their `argN` key. Keys that are not `arg<digits>` are not operands.
    pub fn op_args(&self) -> Vec<&Property> {
        let mut args: Vec<(u64, &Property)> = self
            .children
            .iter()
            .filter_map(|(key, child)| arg_index(key).map(|i| (i, child)))
            .collect();
        args.sort_by_key(|(i, _)| *i);
        args.into_iter().map(|(_, p)| p).collect()
    }

    /// Operator name of an OP expression.
    pub fn op_name(&self) -> Option<&str> {
        if !self.is_op() {
            return None;
        }
        self.value.as_ref().and_then(Value::as_str)
    }
}

/// Numeric suffix of an operand key (`arg0`, `arg12`).
pub fn arg_index(key: &str) -> Option<u64> {
    let digits = key.strip_prefix("arg")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

// ─── Value-level guards ───────────────────────────────────────

pub fn is_property(value: &Value) -> bool {
    value.is_property()
}

pub fn is_lit(value: &Value) -> bool {
    value.as_property().is_some_and(Property::is_lit)
}

pub fn is_ref(value: &Value) -> bool {
    value.as_property().is_some_and(Property::is_ref)
}

pub fn is_op(value: &Value) -> bool {
    value.as_property().is_some_and(Property::is_op)
}

pub fn is_constraint(value: &Value) -> bool {
    value.as_property().is_some_and(Property::is_constraint)
}

pub fn is_expr(value: &Value) -> bool {
    value.is_expr()
}

// ─── Expression constructors ──────────────────────────────────

/// Literal expression returning `value` verbatim.
pub fn lit(value: impl Into<Value>) -> Property {
    Property::new("lit", TypeRef::Sentinel(Kind::Lit)).with_value(value)
}

/// Reference expression over a dot path such as `"parent.password.value"`.
pub fn reference(path: impl Into<String>) -> Property {
    Property::new("ref", TypeRef::Sentinel(Kind::Ref)).with_value(path.into())
}

/// Reference expression over explicit segments, for keys containing dots.
pub fn reference_segments<I, S>(segments: I) -> Property
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let segments: Vec<serde_json::Value> = segments
        .into_iter()
        .map(|s| serde_json::Value::String(s.into()))
        .collect();
    Property::new("ref", TypeRef::Sentinel(Kind::Ref))
        .with_value(serde_json::Value::Array(segments))
}

/// Operator expression; operands are stored as `arg0..argN`.
pub fn op(name: impl Into<String>, args: impl IntoIterator<Item = Property>) -> Property {
    let name = name.into();
    let mut expr = Property::new(name.clone(), TypeRef::Sentinel(Kind::Op)).with_value(name);
    for (i, arg) in args.into_iter().enumerate() {
        expr.children.insert(format!("arg{i}"), arg);
    }
    expr
}

/// Constraint whose value is `check` (an expression or a boolean literal)
/// and whose failure message lives in `message` metadata.
pub fn constraint(check: impl Into<Value>, message: Option<&str>) -> Property {
    let mut c = Property::new("constraint", TypeRef::Sentinel(Kind::Constraint)).with_value(check);
    if let Some(message) = message {
        c.metadata
            .insert("message".to_string(), Property::data("message", message));
    }
    c
}
