/// Query DSL: the intermediate representation between language
/// understanding and SQL.
///
/// ```text
/// Front-end input
///       ↓
/// NLU adapter layer       (adapter.rs)
///       ↓
/// Provisional DslQuery    (types.rs, component.rs, value.rs)
///       ↓
/// Enhancement             (crate::enhance)
///       ↓
/// SQL compiler            (compiler.rs)
/// ```
pub mod adapter;
pub mod compiler;
pub mod component;
pub mod render;
pub mod types;
pub mod value;

pub use adapter::{AdapterRegistry, JsonAdapter, NluAdapter};
pub use compiler::{compile, GeneratorOptions, SqlGenerator};
pub use component::{ComponentKind, DslComponent};
pub use types::*;
pub use value::{FilterValue, Timeframe};
