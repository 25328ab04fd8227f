//! Schema descriptors and the layout planner
//!
//! A [`Schema`] is the plain, declaration-order list of fields a record is
//! made of. [`plan`] turns it into a [`Layout`]: fixed-width fields plus runs
//! of consecutive booleans packed into whole bytes.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

use super::wire::{resolve, WireType};
use super::{CodecError, CodecResult};

/// Logical kind of a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Integer,
    Float,
    Boolean,
    /// Variable-length text; only encodable with an explicit wire override
    Text,
    /// Variable-length list; only encodable with an explicit wire override
    Sequence,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Boolean => "boolean",
            FieldKind::Text => "text",
            FieldKind::Sequence => "sequence",
        };
        f.write_str(name)
    }
}

/// One declared field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    /// Explicit wire type, overriding the kind's default
    #[serde(default, rename = "wire", skip_serializing_if = "Option::is_none")]
    pub wire_override: Option<WireType>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind, wire_override: Option<WireType>) -> Self {
        Self {
            name: name.into(),
            kind,
            wire_override,
        }
    }

    /// Booleans without an override are bit-packed
    fn is_packed_bool(&self) -> bool {
        self.kind == FieldKind::Boolean && self.wire_override.is_none()
    }
}

/// Ordered field list describing one record type
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: Vec<FieldDescriptor>,
}

impl Schema {
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        Self { fields }
    }

    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Builder for declaring a [`Schema`] in code
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: Vec<FieldDescriptor>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(
        mut self,
        name: impl Into<String>,
        kind: FieldKind,
        wire_override: Option<WireType>,
    ) -> Self {
        self.fields.push(FieldDescriptor::new(name, kind, wire_override));
        self
    }

    /// Integer field with the default `U32` encoding
    pub fn integer(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Integer, None)
    }

    pub fn integer_as(self, name: impl Into<String>, wire: WireType) -> Self {
        self.field(name, FieldKind::Integer, Some(wire))
    }

    /// Float field with the default `F32` encoding
    pub fn float(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Float, None)
    }

    pub fn float_as(self, name: impl Into<String>, wire: WireType) -> Self {
        self.field(name, FieldKind::Float, Some(wire))
    }

    pub fn boolean(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Boolean, None)
    }

    /// Inline another schema's fields in place as `prefix.field`.
    ///
    /// The nested fields are not a unit on the wire: a boolean run ending the
    /// outer declarations continues into the nested schema's leading booleans.
    pub fn nested(mut self, prefix: &str, schema: &Schema) -> Self {
        for field in schema.fields() {
            self.fields.push(FieldDescriptor {
                name: format!("{}.{}", prefix, field.name),
                kind: field.kind,
                wire_override: field.wire_override,
            });
        }
        self
    }

    pub fn build(self) -> Schema {
        Schema::new(self.fields)
    }
}

/// A non-boolean field with its resolved wire type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldSpec {
    pub name: String,
    pub wire_type: WireType,
    /// Declared kind, kept so an overridden boolean decodes back to a bool
    pub kind: FieldKind,
}

/// Consecutive booleans packed LSb-first into `ceil(n / 8)` bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoolGroup {
    fields: Vec<String>,
}

impl BoolGroup {
    /// Member field names; member `i` lives in bit `i % 8` of byte `i / 8`
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn size(&self) -> usize {
        self.fields.len().div_ceil(8)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LayoutElement {
    Field(FieldSpec),
    Bools(BoolGroup),
}

impl LayoutElement {
    pub fn size(&self) -> usize {
        match self {
            LayoutElement::Field(spec) => spec.wire_type.size(),
            LayoutElement::Bools(group) => group.size(),
        }
    }

    /// Number of schema fields this element covers
    pub fn field_count(&self) -> usize {
        match self {
            LayoutElement::Field(_) => 1,
            LayoutElement::Bools(group) => group.fields.len(),
        }
    }
}

/// Ordered wire layout of one schema
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Layout {
    elements: Vec<LayoutElement>,
    size: usize,
    field_count: usize,
}

impl Layout {
    pub fn elements(&self) -> &[LayoutElement] {
        &self.elements
    }

    /// Total payload size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn field_count(&self) -> usize {
        self.field_count
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Derive the wire layout of a schema.
///
/// Deterministic: the same schema always yields an equal layout.
pub fn plan(schema: &Schema) -> CodecResult<Layout> {
    let mut elements = Vec::new();
    let mut pending: Vec<String> = Vec::new();
    let mut seen = HashSet::with_capacity(schema.len());

    for field in schema.fields() {
        if !seen.insert(field.name.as_str()) {
            return Err(CodecError::DuplicateField(field.name.clone()));
        }

        if field.is_packed_bool() {
            pending.push(field.name.clone());
            continue;
        }

        flush_bools(&mut pending, &mut elements);

        let wire_type =
            resolve(field.kind, field.wire_override).map_err(|source| CodecError::Schema {
                field: field.name.clone(),
                source: Box::new(source),
            })?;

        elements.push(LayoutElement::Field(FieldSpec {
            name: field.name.clone(),
            wire_type,
            kind: field.kind,
        }));
    }
    flush_bools(&mut pending, &mut elements);

    let size = elements.iter().map(LayoutElement::size).sum();
    let field_count = elements.iter().map(LayoutElement::field_count).sum();

    debug!(
        fields = field_count,
        elements = elements.len(),
        size,
        "Planned layout"
    );

    Ok(Layout {
        elements,
        size,
        field_count,
    })
}

fn flush_bools(pending: &mut Vec<String>, elements: &mut Vec<LayoutElement>) {
    if !pending.is_empty() {
        elements.push(LayoutElement::Bools(BoolGroup {
            fields: std::mem::take(pending),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor_schema() -> Schema {
        Schema::builder()
            .integer("sensor_id")
            .float("temperature")
            .integer_as("humidity", WireType::U16)
            .boolean("alert_high")
            .boolean("alert_low")
            .build()
    }

    #[test]
    fn test_empty_schema() {
        let layout = plan(&Schema::default()).unwrap();
        assert!(layout.is_empty());
        assert_eq!(layout.size(), 0);
    }

    #[test]
    fn test_sensor_layout() {
        let layout = plan(&sensor_schema()).unwrap();

        assert_eq!(layout.size(), 4 + 4 + 2 + 1);
        assert_eq!(layout.field_count(), 5);
        assert_eq!(layout.elements().len(), 4);

        match &layout.elements()[3] {
            LayoutElement::Bools(group) => {
                assert_eq!(group.fields(), ["alert_high", "alert_low"]);
                assert_eq!(group.size(), 1);
            }
            other => panic!("expected bool group, got {:?}", other),
        }
    }

    #[test]
    fn test_lone_bool_takes_a_byte() {
        let layout = plan(&Schema::builder().boolean("on").build()).unwrap();
        assert_eq!(layout.size(), 1);
    }

    #[test]
    fn test_bool_runs_split_by_fields() {
        let schema = Schema::builder()
            .boolean("a")
            .boolean("b")
            .boolean("c")
            .integer_as("x", WireType::U16)
            .boolean("d")
            .build();
        let layout = plan(&schema).unwrap();

        let sizes: Vec<usize> = layout.elements().iter().map(LayoutElement::size).collect();
        assert_eq!(sizes, vec![1, 2, 1]);
        assert_eq!(layout.size(), 4);
    }

    #[test]
    fn test_nine_bools_take_two_bytes() {
        let mut builder = Schema::builder();
        for i in 0..9 {
            builder = builder.boolean(format!("b{}", i));
        }
        let layout = plan(&builder.build()).unwrap();
        assert_eq!(layout.elements().len(), 1);
        assert_eq!(layout.size(), 2);
    }

    #[test]
    fn test_overridden_bool_is_plain_field() {
        let schema = Schema::builder()
            .boolean("packed")
            .field("wide", FieldKind::Boolean, Some(WireType::U16))
            .build();
        let layout = plan(&schema).unwrap();

        assert_eq!(layout.size(), 1 + 2);
        assert!(matches!(
            &layout.elements()[1],
            LayoutElement::Field(FieldSpec { wire_type: WireType::U16, kind: FieldKind::Boolean, .. })
        ));
    }

    #[test]
    fn test_planning_is_idempotent() {
        let schema = sensor_schema();
        let first = plan(&schema).unwrap();
        let second = plan(&schema).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.size(), second.size());
    }

    #[test]
    fn test_unsupported_kind_is_schema_error() {
        let schema = Schema::builder()
            .integer("id")
            .field("name", FieldKind::Text, None)
            .build();

        match plan(&schema) {
            Err(CodecError::Schema { field, source }) => {
                assert_eq!(field, "name");
                assert_eq!(*source, CodecError::UnsupportedType(FieldKind::Text));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let schema = Schema::builder().integer("id").boolean("id").build();
        assert!(matches!(plan(&schema), Err(CodecError::DuplicateField(_))));
    }

    #[test]
    fn test_nested_bools_continue_run() {
        let inner = Schema::builder()
            .boolean("armed")
            .integer_as("mode", WireType::U8)
            .build();
        let schema = Schema::builder()
            .boolean("enabled")
            .nested("motor", &inner)
            .build();
        let layout = plan(&schema).unwrap();

        match &layout.elements()[0] {
            LayoutElement::Bools(group) => {
                assert_eq!(group.fields(), ["enabled", "motor.armed"]);
            }
            other => panic!("expected bool group, got {:?}", other),
        }
        assert_eq!(layout.size(), 2);
    }
}
