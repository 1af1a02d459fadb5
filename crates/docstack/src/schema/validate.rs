use std::sync::OnceLock;

use base64::{engine::general_purpose::STANDARD, Engine};
use regex::Regex;
use serde_json::Value;

use crate::error::{ValidationError, ValidationErrors};

use super::node::{LiteralValue, SchemaNode};

// ============================================================================
// ISO 8601 Date Regex
// ============================================================================

/// Compiled once at first use.
fn iso_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d{1,6})?(?:Z|[+-]\d{2}:\d{2})?$")
            .expect("ISO date regex is valid")
    })
}

// ============================================================================
// Validation Context
// ============================================================================

struct ValidationContext {
    errors: Vec<ValidationError>,
    path: Vec<String>,
}

impl ValidationContext {
    fn new() -> Self {
        Self {
            errors: vec![],
            path: vec![],
        }
    }

    fn push_key(&mut self, key: impl Into<String>) {
        self.path.push(key.into());
    }

    fn push_index(&mut self, idx: usize) {
        self.path.push(format!("[{idx}]"));
    }

    fn pop(&mut self) {
        self.path.pop();
    }

    /// Join path segments, collapsing `".[0]"` → `"[0]"`.
    fn current_path(&self) -> String {
        self.path.join(".").replace(".[", "[")
    }

    fn add_error(&mut self, expected: impl Into<String>, received: impl Into<String>) {
        self.errors.push(ValidationError {
            path: self.current_path(),
            expected: expected.into(),
            received: received.into(),
        });
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Validate ISO 8601 format + semantic correctness via chrono.
fn is_valid_iso_date(s: &str) -> bool {
    if !iso_date_regex().is_match(s) {
        return false;
    }
    // chrono wants RFC 3339, which requires an explicit offset.
    let has_offset = s.ends_with('Z') || s[10..].contains('+') || s[10..].contains('-');
    let normalised = if has_offset {
        s.to_string()
    } else {
        format!("{s}Z")
    };
    chrono::DateTime::parse_from_rfc3339(&normalised).is_ok()
}

/// Validate base64: length divisible by 4, valid character set.
fn is_valid_base64(s: &str) -> bool {
    s.len() % 4 == 0 && STANDARD.decode(s).is_ok()
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0)
        }
        _ => false,
    }
}

fn literal_display(lit: &LiteralValue) -> String {
    match lit {
        LiteralValue::String(s) => format!("{s:?}"),
        LiteralValue::Number(n) => {
            if n.fract() == 0.0 && n.is_finite() {
                format!("{}", *n as i64)
            } else {
                format!("{n}")
            }
        }
        LiteralValue::Bool(b) => b.to_string(),
    }
}

fn value_display(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("{s:?}"),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}

const MAX_DEPTH: usize = 100;

// ============================================================================
// Core Walker
// ============================================================================

fn walk(schema: &SchemaNode, value: &Value, ctx: &mut ValidationContext, depth: usize) {
    if depth > MAX_DEPTH {
        ctx.add_error(
            format!("at most {MAX_DEPTH} levels of nesting"),
            "deeper value",
        );
        return;
    }

    match schema {
        SchemaNode::String => {
            if !value.is_string() {
                ctx.add_error("string", type_name(value));
            }
        }

        SchemaNode::Number => {
            if !value.is_number() {
                ctx.add_error("number", type_name(value));
            }
        }

        SchemaNode::Integer => {
            if !is_integer(value) {
                ctx.add_error("integer", value_display(value));
            }
        }

        SchemaNode::Boolean => {
            if !value.is_boolean() {
                ctx.add_error("boolean", type_name(value));
            }
        }

        SchemaNode::Date => match value.as_str() {
            Some(s) if is_valid_iso_date(s) => {}
            Some(s) => ctx.add_error("ISO 8601 date string", format!("{s:?}")),
            None => ctx.add_error("ISO 8601 date string", type_name(value)),
        },

        SchemaNode::Bytes => match value.as_str() {
            Some(s) if is_valid_base64(s) => {}
            _ => ctx.add_error("base64 string", type_name(value)),
        },

        SchemaNode::Literal(lit) => {
            let matches = match lit {
                LiteralValue::String(s) => value.as_str() == Some(s.as_str()),
                LiteralValue::Number(n) => value
                    .as_f64()
                    .map(|v| v.to_bits() == n.to_bits())
                    .unwrap_or(false),
                LiteralValue::Bool(b) => value.as_bool() == Some(*b),
            };
            if !matches {
                ctx.add_error(literal_display(lit), value_display(value));
            }
        }

        SchemaNode::Optional(inner) => {
            if !value.is_null() {
                walk(inner, value, ctx, depth + 1);
            }
        }

        SchemaNode::Array(element) => match value.as_array() {
            None => ctx.add_error("array", type_name(value)),
            Some(arr) => {
                for (i, item) in arr.iter().enumerate() {
                    ctx.push_index(i);
                    walk(element, item, ctx, depth + 1);
                    ctx.pop();
                }
            }
        },

        SchemaNode::Record(val_schema) => match value.as_object() {
            None => ctx.add_error("object", type_name(value)),
            Some(map) => {
                for (key, val) in map {
                    ctx.push_key(key);
                    if key.is_empty() || key.contains('.') || key.contains('[') || key.contains(']')
                    {
                        ctx.add_error(
                            "valid key (non-empty, no dots or brackets)",
                            format!("{key:?}"),
                        );
                    }
                    walk(val_schema, val, ctx, depth + 1);
                    ctx.pop();
                }
            }
        },

        SchemaNode::Object(props) => match value.as_object() {
            None => ctx.add_error("object", type_name(value)),
            Some(map) => {
                for (key, prop_schema) in props {
                    ctx.push_key(key);
                    let prop_value = map.get(key).unwrap_or(&Value::Null);
                    walk(prop_schema, prop_value, ctx, depth + 1);
                    ctx.pop();
                }
            }
        },

        SchemaNode::Union(variants) => {
            let mut best_errors: Option<Vec<ValidationError>> = None;

            for variant in variants {
                let mut temp_ctx = ValidationContext::new();
                temp_ctx.path = ctx.path.clone();
                walk(variant, value, &mut temp_ctx, depth + 1);
                if temp_ctx.errors.is_empty() {
                    return;
                }
                let better = best_errors
                    .as_ref()
                    .map_or(true, |best| temp_ctx.errors.len() < best.len());
                if better {
                    best_errors = Some(temp_ctx.errors);
                }
            }

            // All variants failed: report the closest variant's errors.
            if let Some(errors) = best_errors {
                ctx.errors.extend(errors);
            }
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Validate `value` against `schema`, collecting every field-level failure.
pub fn validate(schema: &SchemaNode, value: &Value) -> Result<(), ValidationErrors> {
    let mut ctx = ValidationContext::new();
    walk(schema, value, &mut ctx, 0);
    if ctx.errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(ctx.errors))
    }
}
