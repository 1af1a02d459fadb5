pub mod node;
pub mod registry;
pub mod validate;

pub use node::{t, LiteralValue, SchemaNode};
pub use registry::{BucketSchema, LookupMiss, SchemaRegistry};
pub use validate::validate;
