//! JSON wire format.
//!
//! Layout per property:
//! `{id, type: {id}, value?, defaultValue?, metadata?, constraints?, children?}`.
//! Type references are flattened to an `{id}` marker; types are never
//! deep-serialized. On the way back in, a [`TypeResolver`] turns each marker
//! into a [`TypeRef`]. No version field is written.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as Json};

use crate::error::PropertyError;
use crate::property::{Kind, Property, PropertyMap, TypeRef, Value};

// ─── Type resolution ──────────────────────────────────────────

/// Maps a serialized type id back to a type reference.
pub trait TypeResolver {
    fn resolve(&self, id: &str) -> TypeRef;
}

impl<F> TypeResolver for F
where
    F: Fn(&str) -> TypeRef,
{
    fn resolve(&self, id: &str) -> TypeRef {
        self(id)
    }
}

/// Default resolver: an inert placeholder type carrying the same id.
/// Expressions deserialized this way are plain data until a resolver that
/// knows the sentinels is used.
pub fn placeholder_resolver(id: &str) -> TypeRef {
    TypeRef::named(id)
}

/// Resolver that recovers the LIT/REF/OP/CONSTRAINT/TYPE sentinels by id and
/// falls back to placeholders for everything else.
pub fn sentinel_resolver(id: &str) -> TypeRef {
    Kind::from_id(id)
        .map(TypeRef::Sentinel)
        .unwrap_or_else(|| TypeRef::named(id))
}

// ─── Wire record ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeMarker {
    pub id: String,
}

/// Wire shape of one property. Serializing it writes the same layout as
/// [`Property::to_json`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub ty: TypeMarker,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Json>,
    #[serde(
        rename = "defaultValue",
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_value: Option<Json>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub metadata: IndexMap<String, PropertyRecord>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub constraints: IndexMap<String, PropertyRecord>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub children: IndexMap<String, PropertyRecord>,
}

/// Keeps an explicit `null` distinct from a missing field.
fn present<'de, D>(deserializer: D) -> Result<Option<Json>, D::Error>
where
    D: Deserializer<'de>,
{
    Json::deserialize(deserializer).map(Some)
}

/// Shape test used only when reading JSON: an object with a string `id` and
/// an object `type` carrying a string `id` is a nested property.
pub fn looks_like_property(json: &Json) -> bool {
    let Some(obj) = json.as_object() else {
        return false;
    };
    obj.get("id").is_some_and(Json::is_string)
        && obj
            .get("type")
            .and_then(Json::as_object)
            .and_then(|t| t.get("id"))
            .is_some_and(Json::is_string)
}

impl PropertyRecord {
    pub fn into_property(self, resolver: &dyn TypeResolver) -> Result<Property, PropertyError> {
        Ok(Property {
            ty: resolver.resolve(&self.ty.id),
            id: self.id,
            value: self.value.map(|v| value_from_json(v, resolver)),
            default_value: self.default_value.map(|v| value_from_json(v, resolver)),
            metadata: map_from_records(self.metadata, resolver)?,
            constraints: map_from_records(self.constraints, resolver)?,
            children: map_from_records(self.children, resolver)?,
        })
    }
}

fn map_from_records(
    records: IndexMap<String, PropertyRecord>,
    resolver: &dyn TypeResolver,
) -> Result<PropertyMap, PropertyError> {
    records
        .into_iter()
        .map(|(k, r)| r.into_property(resolver).map(|p| (k, p)))
        .collect()
}

/// A value is promoted to a nested property only when its record writes
/// back to exactly the same JSON. Anything else stays data.
fn value_from_json(json: Json, resolver: &dyn TypeResolver) -> Value {
    match embedded_record(&json).map(|r| r.into_property(resolver)) {
        Some(Ok(property)) => Value::Property(Box::new(property)),
        _ => Value::Data(json),
    }
}

fn embedded_record(json: &Json) -> Option<PropertyRecord> {
    if !looks_like_property(json) {
        return None;
    }
    let record = PropertyRecord::deserialize(json).ok()?;
    let canonical = serde_json::to_value(&record).ok()?;
    (canonical == *json).then_some(record)
}

fn map_to_json(map: &PropertyMap) -> Json {
    Json::Object(
        map.iter()
            .map(|(k, p)| (k.clone(), p.to_json()))
            .collect::<Map<String, Json>>(),
    )
}

// ─── Property <-> JSON ────────────────────────────────────────

impl Property {
    /// Serialize the full shape. Empty maps and absent values are omitted.
    pub fn to_json(&self) -> Json {
        let mut obj = Map::new();
        obj.insert("id".to_string(), Json::String(self.id.clone()));
        let mut marker = Map::new();
        marker.insert("id".to_string(), Json::String(self.ty.id().to_string()));
        obj.insert("type".to_string(), Json::Object(marker));
        if let Some(value) = &self.value {
            obj.insert("value".to_string(), value.to_json());
        }
        if let Some(default) = &self.default_value {
            obj.insert("defaultValue".to_string(), default.to_json());
        }
        if !self.metadata.is_empty() {
            obj.insert("metadata".to_string(), map_to_json(&self.metadata));
        }
        if !self.constraints.is_empty() {
            obj.insert("constraints".to_string(), map_to_json(&self.constraints));
        }
        if !self.children.is_empty() {
            obj.insert("children".to_string(), map_to_json(&self.children));
        }
        Json::Object(obj)
    }

    /// Rebuild a property from its wire record. `None` uses
    /// [`placeholder_resolver`].
    pub fn from_json(
        json: &Json,
        resolver: Option<&dyn TypeResolver>,
    ) -> Result<Property, PropertyError> {
        if !looks_like_property(json) {
            return Err(PropertyError::InvalidJson(
                "expected an object with string `id` and `type.id`".to_string(),
            ));
        }
        let record: PropertyRecord = serde_json::from_value(json.clone())?;
        record.into_property(resolver.unwrap_or(&placeholder_resolver))
    }

    pub fn from_json_str(
        source: &str,
        resolver: Option<&dyn TypeResolver>,
    ) -> Result<Property, PropertyError> {
        let json: Json = serde_json::from_str(source)?;
        Self::from_json(&json, resolver)
    }
}

impl Serialize for Property {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Deserializes with [`placeholder_resolver`].
impl<'de> Deserialize<'de> for Property {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = PropertyRecord::deserialize(deserializer)?;
        record
            .into_property(&placeholder_resolver)
            .map_err(serde::de::Error::custom)
    }
}
