use std::collections::BTreeMap;

// ============================================================================
// SchemaNode Types
// ============================================================================

/// A literal value that a schema can require.
#[derive(Debug, Clone)]
pub enum LiteralValue {
    String(String),
    /// f64 literal. NaN is not representable in serde_json so we don't special-case it.
    Number(f64),
    Bool(bool),
}

impl PartialEq for LiteralValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LiteralValue::String(a), LiteralValue::String(b)) => a == b,
            (LiteralValue::Number(a), LiteralValue::Number(b)) => a.to_bits() == b.to_bits(),
            (LiteralValue::Bool(a), LiteralValue::Bool(b)) => a == b,
            _ => false,
        }
    }
}

/// A schema node describing the shape and type constraints of a JSON value.
///
/// `Object` checks only the listed properties; documents routinely carry
/// fields a schema does not mention, and those pass through untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    String,
    Number,
    /// Whole number (no fractional part), any sign.
    Integer,
    Boolean,
    Date,
    Bytes,
    Optional(Box<SchemaNode>),
    Array(Box<SchemaNode>),
    Record(Box<SchemaNode>),
    Object(BTreeMap<String, SchemaNode>),
    Literal(LiteralValue),
    Union(Vec<SchemaNode>),
}

// ============================================================================
// Schema Builder API (`t` module)
// ============================================================================

/// Schema builder helpers. Usage: `t::string()`, `t::integer()`,
/// `t::object([("title", t::string())])`, etc.
pub mod t {
    use super::{LiteralValue, SchemaNode};
    use std::collections::BTreeMap;

    pub fn string() -> SchemaNode {
        SchemaNode::String
    }

    pub fn number() -> SchemaNode {
        SchemaNode::Number
    }

    pub fn integer() -> SchemaNode {
        SchemaNode::Integer
    }

    pub fn boolean() -> SchemaNode {
        SchemaNode::Boolean
    }

    pub fn date() -> SchemaNode {
        SchemaNode::Date
    }

    pub fn bytes() -> SchemaNode {
        SchemaNode::Bytes
    }

    pub fn optional(inner: SchemaNode) -> SchemaNode {
        SchemaNode::Optional(Box::new(inner))
    }

    pub fn array(element: SchemaNode) -> SchemaNode {
        SchemaNode::Array(Box::new(element))
    }

    pub fn record(value: SchemaNode) -> SchemaNode {
        SchemaNode::Record(Box::new(value))
    }

    pub fn object<K: Into<String>>(
        properties: impl IntoIterator<Item = (K, SchemaNode)>,
    ) -> SchemaNode {
        SchemaNode::Object(
            properties
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    /// Object schema with no declared properties: accepts any JSON object.
    pub fn any_object() -> SchemaNode {
        SchemaNode::Object(BTreeMap::new())
    }

    pub fn literal_str(s: impl Into<String>) -> SchemaNode {
        SchemaNode::Literal(LiteralValue::String(s.into()))
    }

    pub fn literal_num(n: f64) -> SchemaNode {
        SchemaNode::Literal(LiteralValue::Number(n))
    }

    pub fn literal_bool(b: bool) -> SchemaNode {
        SchemaNode::Literal(LiteralValue::Bool(b))
    }

    /// Create a union schema. Panics if `variants` is empty.
    pub fn union(variants: Vec<SchemaNode>) -> SchemaNode {
        assert!(!variants.is_empty(), "Union must have at least one variant");
        SchemaNode::Union(variants)
    }
}
