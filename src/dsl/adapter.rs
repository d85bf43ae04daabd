/// Front-end adapter traits.
///
/// Each adapter turns some input format into a provisional [`DslQuery`].
/// Natural-language understanding lives outside this crate; it plugs in
/// here by implementing [`NluAdapter`].
use anyhow::{Context, Result};

use super::types::DslQuery;

/// Produces a provisional query from front-end input.
///
/// # Example
///
/// ```ignore
/// struct SpacyAdapter { client: HttpClient }
///
/// impl NluAdapter for SpacyAdapter {
///     fn name(&self) -> &str { "spaCy service" }
///     fn parse(&self, input: &str) -> Result<DslQuery> {
///         self.client.post_json("/parse", input)
///     }
///     fn can_handle(&self, _input: &str) -> bool { true }
/// }
/// ```
pub trait NluAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Parse input into a provisional query. Clauses may be left empty.
    fn parse(&self, input: &str) -> Result<DslQuery>;

    /// Used to pick an adapter when several are registered.
    fn can_handle(&self, input: &str) -> bool;
}

/// Accepts a provisional query already serialized as JSON.
pub struct JsonAdapter;

impl NluAdapter for JsonAdapter {
    fn name(&self) -> &str {
        "JSON"
    }

    fn parse(&self, input: &str) -> Result<DslQuery> {
        serde_json::from_str(input).context("Failed to parse provisional query JSON")
    }

    fn can_handle(&self, input: &str) -> bool {
        input.trim_start().starts_with('{')
    }
}

/// Ordered set of front-end adapters; the first one that accepts the input wins.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn NluAdapter>>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        let mut registry = Self {
            adapters: Vec::new(),
        };
        registry.register(Box::new(JsonAdapter));
        registry
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with no adapters at all.
    pub fn empty() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    pub fn register(&mut self, adapter: Box<dyn NluAdapter>) {
        self.adapters.push(adapter);
    }

    pub fn parse(&self, input: &str) -> Result<DslQuery> {
        for adapter in &self.adapters {
            if adapter.can_handle(input) {
                tracing::debug!(adapter = adapter.name(), "parsing input");
                return adapter.parse(input);
            }
        }
        anyhow::bail!("No adapter found that can handle this input")
    }

    pub fn adapter_names(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }
}
