//! The translation pipeline: front-end input → provisional query →
//! enhanced query → SQL → optional execution.

use std::sync::Arc;

use anyhow::Context;

use crate::catalog::{self, ComponentCatalog, SeedReport};
use crate::config::Settings;
use crate::db::{ExecutionSink, Row, SchemaProvider};
use crate::dsl::{AdapterRegistry, DslQuery, GeneratorOptions, SqlGenerator};
use crate::enhance::{EnhancementLimits, Enhancer, Substitution};
use crate::error::{Error, Result};

/// Every stage of one translation.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub provisional: DslQuery,
    pub enhanced: DslQuery,
    pub substitutions: Vec<Substitution>,
    pub sql: String,
}

/// Owns the handles a translation needs. Cheap to share behind an `Arc`;
/// concurrent translations only read from it.
pub struct Pipeline {
    adapters: AdapterRegistry,
    catalog: Arc<ComponentCatalog>,
    schema: Option<Arc<dyn SchemaProvider>>,
    enhancer: Enhancer,
    generator: SqlGenerator,
}

impl Pipeline {
    pub fn new(catalog: Arc<ComponentCatalog>) -> Self {
        Self {
            adapters: AdapterRegistry::default(),
            enhancer: Enhancer::new(catalog.clone(), EnhancementLimits::default()),
            catalog,
            schema: None,
            generator: SqlGenerator::default(),
        }
    }

    pub fn from_settings(settings: &Settings, catalog: Arc<ComponentCatalog>) -> Self {
        Self::new(catalog)
            .with_limits(settings.enhancement)
            .with_generator_options(settings.generator)
    }

    pub fn with_schema(mut self, schema: Arc<dyn SchemaProvider>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn with_limits(mut self, limits: EnhancementLimits) -> Self {
        self.enhancer = Enhancer::new(self.catalog.clone(), limits);
        self
    }

    pub fn with_generator_options(mut self, options: GeneratorOptions) -> Self {
        self.generator = SqlGenerator::new(options);
        self
    }

    pub fn catalog(&self) -> &Arc<ComponentCatalog> {
        &self.catalog
    }

    pub fn schema(&self) -> Option<&Arc<dyn SchemaProvider>> {
        self.schema.as_ref()
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    /// Parse `input` with the first adapter that accepts it, then enhance
    /// and compile.
    pub fn translate(&self, input: &str) -> anyhow::Result<Translation> {
        let provisional = self.adapters.parse(input)?;
        self.translate_query(provisional)
            .context("Failed to translate query")
    }

    pub fn translate_query(&self, provisional: DslQuery) -> Result<Translation> {
        let enhancement = self.enhancer.enhance(&provisional)?;
        let sql = self.generator.generate(&enhancement.query)?;
        tracing::info!(
            substitutions = enhancement.substitutions.len(),
            sql = %sql,
            "query translated"
        );
        Ok(Translation {
            provisional,
            enhanced: enhancement.query,
            substitutions: enhancement.substitutions,
            sql,
        })
    }

    /// Seed the catalog from the pipeline's schema provider.
    pub fn seed_catalog(&self) -> Result<SeedReport> {
        let schema = self
            .schema
            .as_ref()
            .ok_or_else(|| Error::Config("pipeline has no schema provider".to_string()))?;
        catalog::seed_from_schema(&self.catalog, schema.as_ref())
    }

    /// Run a translated statement. Sink failures come back unchanged as
    /// [`Error::Execution`].
    pub async fn execute<S: ExecutionSink>(
        &self,
        sink: &S,
        translation: &Translation,
    ) -> Result<Vec<Row>> {
        tracing::debug!(sink = sink.name(), "executing translated query");
        let rows = sink.execute(&translation.sql).await?;
        Ok(rows)
    }
}
