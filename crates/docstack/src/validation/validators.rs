//! Document validators: pure `(path, doc) -> Option<message>` checks.

use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::schema::{validate, SchemaRegistry};
use crate::types::{CollectionPath, Doc};

/// A named check applied to a document crossing a layer boundary.
///
/// Returns `None` when the document passes, or a message naming the violated
/// constraint.
pub trait Validator: Send + Sync {
    fn name(&self) -> &str;
    fn validate(&self, path: &CollectionPath, doc: &Doc) -> Option<String>;
}

/// First failure found by [`run_validators`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub validator: String,
    pub reason: String,
}

/// Run `validators` in order and stop at the first failure.
pub fn run_validators(
    validators: &[Arc<dyn Validator>],
    path: &CollectionPath,
    doc: &Doc,
) -> Option<Violation> {
    validators.iter().find_map(|v| {
        v.validate(path, doc).map(|reason| Violation {
            validator: v.name().to_string(),
            reason,
        })
    })
}

// ============================================================================
// ID
// ============================================================================

/// 4 to 64 characters of `[A-Za-z0-9-_.~]`: covers short manual ids, UUIDs in
/// any case, and ULIDs.
fn id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9\-_.~]{4,64}$").expect("id regex is valid"))
}

pub fn is_valid_id(id: &str) -> bool {
    id_regex().is_match(id)
}

/// Checks the path's bucket id and the document id against the id pattern.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdValidator;

impl Validator for IdValidator {
    fn name(&self) -> &str {
        "id"
    }

    fn validate(&self, path: &CollectionPath, doc: &Doc) -> Option<String> {
        if let Some(bucket_id) = path.bucket_id() {
            if !is_valid_id(bucket_id) {
                return Some(format!("invalid bucket id {bucket_id:?}"));
            }
        }
        if !is_valid_id(&doc.id) {
            return Some(format!("invalid document id {:?}", doc.id));
        }
        None
    }
}

// ============================================================================
// Revision
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct RevisionValidator;

impl Validator for RevisionValidator {
    fn name(&self) -> &str {
        "revision"
    }

    fn validate(&self, _path: &CollectionPath, doc: &Doc) -> Option<String> {
        (doc.rev < 0).then(|| format!("rev must be a non-negative integer, got {}", doc.rev))
    }
}

// ============================================================================
// Schema
// ============================================================================

/// Checks a document against the schema registered for its bucket or
/// sub-collection. Unregistered paths fail.
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    registry: Arc<SchemaRegistry>,
}

impl SchemaValidator {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }
}

impl Validator for SchemaValidator {
    fn name(&self) -> &str {
        "schema"
    }

    fn validate(&self, path: &CollectionPath, doc: &Doc) -> Option<String> {
        let schema = match self.registry.lookup(path) {
            Ok(schema) => schema,
            Err(miss) => return Some(miss.to_string()),
        };
        if doc.rev < 0 {
            return Some(format!(
                r#"Validation failed at "rev": expected non-negative integer, received {}"#,
                doc.rev
            ));
        }
        validate(schema, &doc.to_value()).err().map(|errs| errs.to_string())
    }
}

// ============================================================================
// Closures
// ============================================================================

/// Named closure validator for ad-hoc checks.
pub struct FnValidator<F> {
    name: String,
    check: F,
}

impl<F> FnValidator<F>
where
    F: Fn(&CollectionPath, &Doc) -> Option<String> + Send + Sync,
{
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }
}

impl<F> Validator for FnValidator<F>
where
    F: Fn(&CollectionPath, &Doc) -> Option<String> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, path: &CollectionPath, doc: &Doc) -> Option<String> {
        (self.check)(path, doc)
    }
}

// ============================================================================
// ValidatorSet
// ============================================================================

/// Ordered `get` and `put` validator lists for a
/// [`ValidationLayer`](super::ValidationLayer).
#[derive(Clone, Default)]
pub struct ValidatorSet {
    pub get: Vec<Arc<dyn Validator>>,
    pub put: Vec<Arc<dyn Validator>>,
}

impl ValidatorSet {
    /// No validation at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// Schema check only, on both paths.
    pub fn production(registry: Arc<SchemaRegistry>) -> Self {
        let schema: Arc<dyn Validator> = Arc::new(SchemaValidator::new(registry));
        Self {
            get: vec![Arc::clone(&schema)],
            put: vec![schema],
        }
    }

    /// Id, revision and schema checks, on both paths.
    pub fn development(registry: Arc<SchemaRegistry>) -> Self {
        let all: Vec<Arc<dyn Validator>> = vec![
            Arc::new(IdValidator),
            Arc::new(RevisionValidator),
            Arc::new(SchemaValidator::new(registry)),
        ];
        Self {
            get: all.clone(),
            put: all,
        }
    }

    /// [`development`](Self::development) in debug builds,
    /// [`production`](Self::production) otherwise.
    pub fn for_build(registry: Arc<SchemaRegistry>) -> Self {
        if cfg!(debug_assertions) {
            Self::development(registry)
        } else {
            Self::production(registry)
        }
    }

    pub fn with_get(mut self, validator: impl Validator + 'static) -> Self {
        self.get.push(Arc::new(validator));
        self
    }

    pub fn with_put(mut self, validator: impl Validator + 'static) -> Self {
        self.put.push(Arc::new(validator));
        self
    }
}

impl std::fmt::Debug for ValidatorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |list: &[Arc<dyn Validator>]| -> Vec<String> {
            list.iter().map(|v| v.name().to_string()).collect()
        };
        f.debug_struct("ValidatorSet")
            .field("get", &names(&self.get))
            .field("put", &names(&self.put))
            .finish()
    }
}
