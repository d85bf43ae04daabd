//! Relational schema metadata consumed by catalog seeding.
//!
//! Snapshots use the same JSON layout the introspection query produces:
//! an object keyed by table name, each entry holding `columns`,
//! `primary_keys` and `foreign_keys`. Table order is preserved.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDetails {
    #[serde(alias = "column_name")]
    pub name: String,
    pub data_type: String,
    #[serde(default = "default_nullable", deserialize_with = "nullable_flag")]
    pub is_nullable: bool,
}

fn default_nullable() -> bool {
    true
}

/// Accepts `true`/`false` or the information_schema `"YES"`/`"NO"`.
fn nullable_flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::String(s) => Ok(s.eq_ignore_ascii_case("yes") || s.eq_ignore_ascii_case("true")),
        Value::Null => Ok(true),
        other => Err(serde::de::Error::custom(format!(
            "invalid is_nullable value {}",
            other
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column_name: String,
    pub foreign_table_name: String,
    pub foreign_column_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnDetails>,
    #[serde(default)]
    pub primary_keys: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
}

/// One foreign-key hop of a join path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinStep {
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_column: String,
}

/// Read access to table, column and foreign-key metadata.
pub trait SchemaProvider: Send + Sync {
    /// Table names in a stable order.
    fn tables(&self) -> Vec<String>;

    fn columns(&self, table: &str) -> Vec<ColumnDetails>;

    fn foreign_keys(&self, table: &str) -> Vec<ForeignKey>;

    /// Outgoing foreign-key hops from `table`.
    fn relationships(&self, table: &str) -> Vec<JoinStep> {
        self.foreign_keys(table)
            .into_iter()
            .map(|fk| JoinStep {
                source_table: table.to_string(),
                source_column: fk.column_name,
                target_table: fk.foreign_table_name,
                target_column: fk.foreign_column_name,
            })
            .collect()
    }

    /// First path found by depth-first search along foreign keys, or an
    /// empty list when `target` is unreachable. Tables visited by an
    /// abandoned branch are not revisited.
    fn join_path(&self, source: &str, target: &str) -> Vec<JoinStep> {
        if source == target {
            return Vec::new();
        }
        let mut visited = Vec::new();
        find_path(self, source, target, &mut visited, Vec::new()).unwrap_or_default()
    }

    /// Paths between every ordered pair of distinct tables.
    fn join_paths(&self) -> Vec<(String, String, Vec<JoinStep>)> {
        let tables = self.tables();
        let mut paths = Vec::new();
        for source in &tables {
            for target in &tables {
                if source != target {
                    paths.push((source.clone(), target.clone(), self.join_path(source, target)));
                }
            }
        }
        paths
    }
}

fn find_path<P: SchemaProvider + ?Sized>(
    provider: &P,
    source: &str,
    target: &str,
    visited: &mut Vec<String>,
    path: Vec<JoinStep>,
) -> Option<Vec<JoinStep>> {
    visited.push(source.to_string());

    for step in provider.relationships(source) {
        let next = step.target_table.clone();
        let mut extended = path.clone();
        extended.push(step);

        if next == target {
            return Some(extended);
        }
        if !visited.contains(&next) {
            if let Some(found) = find_path(provider, &next, target, visited, extended) {
                return Some(found);
            }
        }
    }
    None
}

/// An in-memory schema, usually loaded from a JSON snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaSnapshot {
    tables: Vec<TableSchema>,
}

impl SchemaSnapshot {
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self { tables }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let map: Map<String, Value> = serde_json::from_str(json)?;
        let mut tables = Vec::with_capacity(map.len());
        for (name, value) in map {
            let mut table: TableSchema = serde_json::from_value(value)?;
            table.name = name;
            tables.push(table);
        }
        Ok(Self { tables })
    }

    pub fn to_json(&self) -> Result<String> {
        let mut map = Map::new();
        for table in &self.tables {
            map.insert(table.name.clone(), serde_json::to_value(table)?);
        }
        Ok(serde_json::to_string_pretty(&Value::Object(map))?)
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }
}

impl SchemaProvider for SchemaSnapshot {
    fn tables(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    fn columns(&self, table: &str) -> Vec<ColumnDetails> {
        self.table(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default()
    }

    fn foreign_keys(&self, table: &str) -> Vec<ForeignKey> {
        self.table(table)
            .map(|t| t.foreign_keys.clone())
            .unwrap_or_default()
    }
}

#[cfg(feature = "postgres")]
mod pg {
    use anyhow::Result;
    use tokio_postgres::Client;

    use super::*;

    /// Read tables, columns and foreign keys of one schema.
    pub async fn introspect(client: &Client, schema: &str) -> Result<SchemaSnapshot> {
        let table_rows = client
            .query(
                r#"
                SELECT table_name
                FROM information_schema.tables
                WHERE table_schema = $1 AND table_type = 'BASE TABLE'
                ORDER BY table_name
                "#,
                &[&schema],
            )
            .await?;

        let mut tables = Vec::with_capacity(table_rows.len());
        for row in &table_rows {
            let name: String = row.get("table_name");
            tables.push(TableSchema {
                columns: get_columns(client, schema, &name).await?,
                primary_keys: get_primary_keys(client, schema, &name).await?,
                foreign_keys: get_foreign_keys(client, schema, &name).await?,
                name,
            });
        }
        tracing::info!(schema, tables = tables.len(), "schema introspected");
        Ok(SchemaSnapshot::new(tables))
    }

    async fn get_columns(client: &Client, schema: &str, table: &str) -> Result<Vec<ColumnDetails>> {
        let rows = client
            .query(
                r#"
                SELECT
                    column_name as name,
                    data_type,
                    is_nullable = 'YES' as is_nullable
                FROM information_schema.columns
                WHERE table_schema = $1 AND table_name = $2
                ORDER BY ordinal_position
                "#,
                &[&schema, &table],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| ColumnDetails {
                name: row.get("name"),
                data_type: row.get("data_type"),
                is_nullable: row.get("is_nullable"),
            })
            .collect())
    }

    async fn get_primary_keys(client: &Client, schema: &str, table: &str) -> Result<Vec<String>> {
        let rows = client
            .query(
                r#"
                SELECT kcu.column_name
                FROM information_schema.table_constraints tc
                JOIN information_schema.key_column_usage kcu
                    ON tc.constraint_name = kcu.constraint_name
                    AND tc.table_schema = kcu.table_schema
                WHERE tc.constraint_type = 'PRIMARY KEY'
                    AND tc.table_schema = $1 AND tc.table_name = $2
                ORDER BY kcu.ordinal_position
                "#,
                &[&schema, &table],
            )
            .await?;
        Ok(rows.iter().map(|row| row.get("column_name")).collect())
    }

    async fn get_foreign_keys(client: &Client, schema: &str, table: &str) -> Result<Vec<ForeignKey>> {
        let rows = client
            .query(
                r#"
                SELECT
                    kcu.column_name,
                    ccu.table_name AS foreign_table_name,
                    ccu.column_name AS foreign_column_name
                FROM information_schema.table_constraints AS tc
                JOIN information_schema.key_column_usage AS kcu
                    ON tc.constraint_name = kcu.constraint_name
                    AND tc.table_schema = kcu.table_schema
                JOIN information_schema.constraint_column_usage AS ccu
                    ON ccu.constraint_name = tc.constraint_name
                    AND ccu.table_schema = tc.table_schema
                WHERE tc.constraint_type = 'FOREIGN KEY'
                    AND tc.table_schema = $1 AND tc.table_name = $2
                "#,
                &[&schema, &table],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| ForeignKey {
                column_name: row.get("column_name"),
                foreign_table_name: row.get("foreign_table_name"),
                foreign_column_name: row.get("foreign_column_name"),
            })
            .collect())
    }
}

#[cfg(feature = "postgres")]
pub use pg::introspect;
