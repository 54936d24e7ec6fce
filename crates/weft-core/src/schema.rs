//! Type tag registry and the record types built from it.
//!
//! Node interfaces whose shape is only known at configuration time are
//! described by a [`RecordSchema`] (field name → type tag name). The
//! [`build_schema`] function resolves each tag against the closed registry
//! and produces a [`RecordType`], which validates record values at every
//! node boundary.

use std::fmt;
use std::str::FromStr;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{FieldError, Result, ValidationErrors, WeftError};

/// A record value: the mapping form of a node's input or output.
pub type Record = Map<String, Value>;

/// Scalar element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scalar {
    Int,
    Float,
    Str,
    Bool,
}

impl Scalar {
    fn name(self) -> &'static str {
        match self {
            Scalar::Int => "int",
            Scalar::Float => "float",
            Scalar::Str => "str",
            Scalar::Bool => "bool",
        }
    }

    /// Check a single value, returning the coerced value on success.
    fn check(self, value: &Value) -> std::result::Result<Value, String> {
        match (self, value) {
            (Scalar::Str, Value::String(_)) => Ok(value.clone()),
            (Scalar::Bool, Value::Bool(_)) => Ok(value.clone()),
            (Scalar::Int, Value::Number(n)) => {
                if n.is_i64() || n.is_u64() {
                    Ok(value.clone())
                } else {
                    match n.as_f64() {
                        Some(f) if !f.is_finite() || f.fract() != 0.0 => {
                            Err("expected int, got float with fractional part".to_string())
                        }
                        Some(f) if f < i64::MIN as f64 || f >= i64::MAX as f64 => {
                            Err("value out of int range".to_string())
                        }
                        Some(f) => Ok(Value::from(f as i64)),
                        None => Err("expected int".to_string()),
                    }
                }
            }
            (Scalar::Float, Value::Number(n)) => n
                .as_f64()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| "expected float".to_string()),
            (scalar, other) => Err(format!(
                "expected {}, got {}",
                scalar.name(),
                json_kind(other)
            )),
        }
    }
}

/// One entry of the closed type vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Scalar(Scalar),
    /// `List<T>`
    List(Scalar),
    /// `Dict<str, T>`
    Dict(Scalar),
    /// `List<Dict<str, T>>`
    ListOfDict(Scalar),
    /// Unconstrained value; used by routing nodes.
    Any,
}

/// The registry: every tag name the engine understands.
const REGISTRY: &[(&str, TypeTag)] = &[
    ("int", TypeTag::Scalar(Scalar::Int)),
    ("float", TypeTag::Scalar(Scalar::Float)),
    ("str", TypeTag::Scalar(Scalar::Str)),
    ("bool", TypeTag::Scalar(Scalar::Bool)),
    ("List_int", TypeTag::List(Scalar::Int)),
    ("List_float", TypeTag::List(Scalar::Float)),
    ("List_str", TypeTag::List(Scalar::Str)),
    ("List_bool", TypeTag::List(Scalar::Bool)),
    ("Dict_str_int", TypeTag::Dict(Scalar::Int)),
    ("Dict_str_str", TypeTag::Dict(Scalar::Str)),
    ("Dict_str_float", TypeTag::Dict(Scalar::Float)),
    ("Dict_str_bool", TypeTag::Dict(Scalar::Bool)),
    ("List_Dict_str_float", TypeTag::ListOfDict(Scalar::Float)),
    ("List_Dict_str_int", TypeTag::ListOfDict(Scalar::Int)),
    ("List_Dict_str_str", TypeTag::ListOfDict(Scalar::Str)),
    ("List_Dict_str_bool", TypeTag::ListOfDict(Scalar::Bool)),
    ("any", TypeTag::Any),
];

impl TypeTag {
    pub const INT: TypeTag = TypeTag::Scalar(Scalar::Int);
    pub const FLOAT: TypeTag = TypeTag::Scalar(Scalar::Float);
    pub const STR: TypeTag = TypeTag::Scalar(Scalar::Str);
    pub const BOOL: TypeTag = TypeTag::Scalar(Scalar::Bool);

    /// All registered tags in registry order.
    pub fn all() -> impl Iterator<Item = TypeTag> {
        REGISTRY.iter().map(|(_, tag)| *tag)
    }

    /// Symbolic name of this tag, e.g. `List_Dict_str_float`.
    pub fn name(&self) -> &'static str {
        REGISTRY
            .iter()
            .find(|(_, tag)| tag == self)
            .map(|(name, _)| *name)
            .unwrap_or("any")
    }

    /// Validate `value` against this tag, pushing every failure onto `errors`.
    /// Returns the coerced value when it conforms.
    pub fn check(&self, path: &str, value: &Value, errors: &mut Vec<FieldError>) -> Option<Value> {
        match self {
            TypeTag::Any => Some(value.clone()),
            TypeTag::Scalar(s) => match s.check(value) {
                Ok(v) => Some(v),
                Err(msg) => {
                    errors.push(FieldError::new(path, msg));
                    None
                }
            },
            TypeTag::List(s) => {
                let items = expect_array(path, value, errors)?;
                let before = errors.len();
                let checked: Vec<Value> = items
                    .iter()
                    .enumerate()
                    .filter_map(|(i, item)| {
                        TypeTag::Scalar(*s).check(&format!("{}[{}]", path, i), item, errors)
                    })
                    .collect();
                (errors.len() == before).then_some(Value::Array(checked))
            }
            TypeTag::Dict(s) => {
                let obj = expect_object(path, value, errors)?;
                let before = errors.len();
                let mut checked = Map::new();
                for (k, v) in obj {
                    let item_path = format!("{}.{}", path, k);
                    if let Some(v) = TypeTag::Scalar(*s).check(&item_path, v, errors) {
                        checked.insert(k.clone(), v);
                    }
                }
                (errors.len() == before).then_some(Value::Object(checked))
            }
            TypeTag::ListOfDict(s) => {
                let items = expect_array(path, value, errors)?;
                let before = errors.len();
                let checked: Vec<Value> = items
                    .iter()
                    .enumerate()
                    .filter_map(|(i, item)| {
                        TypeTag::Dict(*s).check(&format!("{}[{}]", path, i), item, errors)
                    })
                    .collect();
                (errors.len() == before).then_some(Value::Array(checked))
            }
        }
    }

    /// Name the runtime shape of a value. Shapes outside the vocabulary infer `any`.
    pub fn infer(value: &Value) -> TypeTag {
        match value {
            Value::Bool(_) => TypeTag::BOOL,
            Value::Number(n) if n.is_i64() || n.is_u64() => TypeTag::INT,
            Value::Number(_) => TypeTag::FLOAT,
            Value::String(_) => TypeTag::STR,
            Value::Array(items) => match items.first() {
                None => TypeTag::List(Scalar::Str),
                Some(first) => match TypeTag::infer(first) {
                    TypeTag::Scalar(s) => TypeTag::List(s),
                    TypeTag::Dict(s) => TypeTag::ListOfDict(s),
                    _ => TypeTag::Any,
                },
            },
            Value::Object(obj) => match obj.values().next() {
                None => TypeTag::Dict(Scalar::Str),
                Some(first) => match TypeTag::infer(first) {
                    TypeTag::Scalar(s) => TypeTag::Dict(s),
                    _ => TypeTag::Any,
                },
            },
            Value::Null => TypeTag::Any,
        }
    }
}

impl FromStr for TypeTag {
    type Err = WeftError;

    fn from_str(s: &str) -> Result<Self> {
        REGISTRY
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, tag)| *tag)
            .ok_or_else(|| WeftError::UnknownTypeTag(s.to_string()))
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for TypeTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for TypeTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

fn expect_array<'a>(
    path: &str,
    value: &'a Value,
    errors: &mut Vec<FieldError>,
) -> Option<&'a Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        other => {
            errors.push(FieldError::new(path, format!("expected list, got {}", json_kind(other))));
            None
        }
    }
}

fn expect_object<'a>(
    path: &str,
    value: &'a Value,
    errors: &mut Vec<FieldError>,
) -> Option<&'a Map<String, Value>> {
    match value {
        Value::Object(obj) => Some(obj),
        other => {
            errors.push(FieldError::new(
                path,
                format!("expected mapping, got {}", json_kind(other)),
            ));
            None
        }
    }
}

/// Declarative field name → type tag name mapping, in declaration order.
///
/// Tag names are resolved against the registry only when a [`RecordType`]
/// is built from the schema, so a schema read from configuration may carry
/// an unknown tag until then.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSchema {
    fields: Vec<(String, String)>,
}

impl RecordSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a field. Replacing keeps its position.
    pub fn insert(&mut self, field: impl Into<String>, tag: impl Into<String>) {
        let field = field.into();
        let tag = tag.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some(entry) => entry.1 = tag,
            None => self.fields.push((field, tag)),
        }
    }

    /// Builder-style [`insert`](Self::insert) taking a resolved tag.
    pub fn with(mut self, field: impl Into<String>, tag: TypeTag) -> Self {
        self.insert(field, tag.name());
        self
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, tag)| tag.as_str())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, t)| (n.as_str(), t.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether every field of `other` is also a field of `self`.
    pub fn covers(&self, other: &RecordSchema) -> bool {
        other.field_names().all(|f| self.contains(f))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RecordSchema {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut schema = RecordSchema::new();
        for (k, v) in iter {
            schema.insert(k, v);
        }
        schema
    }
}

impl Serialize for RecordSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (field, tag) in &self.fields {
            map.serialize_entry(field, tag)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RecordSchema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct SchemaVisitor;

        impl<'de> Visitor<'de> for SchemaVisitor {
            type Value = RecordSchema;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of field name to type tag")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<RecordSchema, A::Error> {
                let mut schema = RecordSchema::new();
                while let Some((field, tag)) = access.next_entry::<String, String>()? {
                    if schema.contains(&field) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate field '{}'",
                            field
                        )));
                    }
                    schema.fields.push((field, tag));
                }
                Ok(schema)
            }
        }

        deserializer.deserialize_map(SchemaVisitor)
    }
}

/// A single resolved field of a [`RecordType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub tag: TypeTag,
    pub required: bool,
}

/// A named structural record type with resolved, typed fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordType {
    name: String,
    fields: Vec<FieldDef>,
}

impl RecordType {
    /// An empty record type; extend it with [`field`](Self::field).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a required field.
    pub fn field(mut self, name: impl Into<String>, tag: TypeTag) -> Self {
        self.push(name.into(), tag, true);
        self
    }

    /// Add a field that may be absent from a valid record.
    pub fn optional_field(mut self, name: impl Into<String>, tag: TypeTag) -> Self {
        self.push(name.into(), tag, false);
        self
    }

    fn push(&mut self, name: String, tag: TypeTag, required: bool) {
        self.fields.retain(|f| f.name != name);
        self.fields.push(FieldDef { name, tag, required });
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// The declarative form of this type.
    pub fn schema(&self) -> RecordSchema {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.tag.name()))
            .collect()
    }

    /// Validate a value against this type.
    ///
    /// Collects every field error. Unknown extra fields are dropped from
    /// the returned record.
    pub fn validate(&self, value: &Value) -> std::result::Result<Record, ValidationErrors> {
        match value {
            Value::Object(obj) => self.validate_record(obj),
            other => Err(ValidationErrors(vec![FieldError::new(
                &self.name,
                format!("expected mapping, got {}", json_kind(other)),
            )])),
        }
    }

    /// Validate a record (the "dump, then re-parse" path).
    pub fn validate_record(
        &self,
        record: &Record,
    ) -> std::result::Result<Record, ValidationErrors> {
        let mut errors = Vec::new();
        let mut out = Record::new();
        for field in &self.fields {
            match record.get(&field.name) {
                Some(v) => {
                    if let Some(v) = field.tag.check(&field.name, v, &mut errors) {
                        out.insert(field.name.clone(), v);
                    }
                }
                None if field.required => {
                    errors.push(FieldError::new(&field.name, "field required"))
                }
                None => {}
            }
        }
        if errors.is_empty() {
            Ok(out)
        } else {
            Err(ValidationErrors(errors))
        }
    }
}

/// Build a named record type from a schema. Every field is required.
///
/// Fails with [`WeftError::UnknownTypeTag`] on the first tag the registry
/// does not know.
pub fn build_schema(fields: &RecordSchema, name: &str) -> Result<RecordType> {
    let mut record = RecordType::new(name);
    for (field, tag) in fields.iter() {
        let tag: TypeTag = tag.parse()?;
        record = record.field(field, tag);
    }
    Ok(record)
}

/// Derive a schema from example values by naming each value's runtime shape.
pub fn infer_schema(example: &Record) -> RecordSchema {
    example
        .iter()
        .map(|(field, value)| (field.clone(), TypeTag::infer(value).name()))
        .collect()
}
