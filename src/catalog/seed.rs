//! Populating the catalog from schema metadata and component files.
//!
//! Every generated component carries several phrasings of the same clause
//! so that differently worded questions land near it.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde_json::Value;

use super::store::ComponentCatalog;
use crate::db::{ColumnDetails, JoinStep, SchemaProvider};
use crate::dsl::component::timeframe_filter;
use crate::dsl::*;
use crate::error::{Error, Result};

const NUMERIC_TYPES: [&str; 4] = ["int", "float", "numeric", "decimal"];

const TIME_PERIODS: [(&str, Timeframe); 10] = [
    ("today", Timeframe::Day),
    ("this week", Timeframe::Week),
    ("this month", Timeframe::Month),
    ("this quarter", Timeframe::Quarter),
    ("this year", Timeframe::Year),
    ("yesterday", Timeframe::LastDay),
    ("last week", Timeframe::LastWeek),
    ("last month", Timeframe::LastMonth),
    ("last quarter", Timeframe::LastQuarter),
    ("last year", Timeframe::LastYear),
];

const AGGREGATE_WORDS: [(AggregateFunction, &str, &str); 5] = [
    (AggregateFunction::Count, "count", "counting"),
    (AggregateFunction::Sum, "sum", "total"),
    (AggregateFunction::Avg, "average", "mean"),
    (AggregateFunction::Min, "minimum", "lowest"),
    (AggregateFunction::Max, "maximum", "highest"),
];

/// Components added per kind by one seeding run.
pub type SeedReport = BTreeMap<ComponentKind, usize>;

pub fn is_numeric_type(data_type: &str) -> bool {
    let lower = data_type.to_lowercase();
    NUMERIC_TYPES.iter().any(|t| lower.contains(t))
}

pub fn is_temporal_type(data_type: &str) -> bool {
    let lower = data_type.to_lowercase();
    lower.contains("date") || lower.contains("time")
}

fn natural(name: &str) -> String {
    name.replace('_', " ")
}

fn column_ref(table: &str, column: &str) -> Column {
    Column::qualified(table, column)
}

pub fn table_components(schema: &dyn SchemaProvider) -> Vec<DslComponent> {
    let mut components = Vec::new();
    for table in schema.tables() {
        let spoken = natural(&table);
        for name in [table.as_str(), spoken.as_str()] {
            for text in [
                format!("table {}", name),
                format!("data from {}", name),
                format!("information in {}", name),
                format!("{} records", name),
                format!("{} table", name),
            ] {
                components.push(DslComponent::Table(Table {
                    table_name: table.clone(),
                    alias: None,
                    text,
                }));
            }
        }
    }
    components
}

pub fn column_components(schema: &dyn SchemaProvider) -> Vec<DslComponent> {
    let mut components = Vec::new();
    for table in schema.tables() {
        let table_spoken = natural(&table);
        for column in schema.columns(&table) {
            let col = &column.name;
            let col_spoken = natural(col);
            let phrasings = [
                format!("{} in {}", col, table),
                format!("{}.{}", table, col),
                format!("{} from {}", col, table),
                format!("{} column in {} table", col, table),
                format!("{} in {}", col_spoken, table_spoken),
                format!("{} from {}", col_spoken, table_spoken),
                format!("{} column in {} table", col_spoken, table_spoken),
            ];
            for text in phrasings {
                components.push(DslComponent::Column(Column {
                    text,
                    ..column_ref(&table, col)
                }));
            }
        }
    }
    components
}

/// Three INNER join phrasings per distinct foreign-key hop on any
/// discovered join path.
pub fn join_components(schema: &dyn SchemaProvider) -> Vec<DslComponent> {
    let mut hops: Vec<JoinStep> = Vec::new();
    for (_, _, path) in schema.join_paths() {
        for step in path {
            if !hops.contains(&step) {
                hops.push(step);
            }
        }
    }

    let mut components = Vec::new();
    for hop in hops {
        let (src, dst) = (&hop.source_table, &hop.target_table);
        for text in [
            format!("Join {} with {}", src, dst),
            format!("Connect {} to {}", src, dst),
            format!("Link {} and {}", src, dst),
        ] {
            components.push(DslComponent::Join(Join {
                left_table: Table::named(src.as_str()),
                right_table: Table::named(dst.as_str()),
                join_type: JoinType::Inner,
                join_condition: vec![JoinCondition {
                    left_column: hop.source_column.clone(),
                    right_column: hop.target_column.clone(),
                }],
                alias: None,
                text,
            }));
        }
    }
    components
}

fn columns_where(
    schema: &dyn SchemaProvider,
    pred: impl Fn(&ColumnDetails) -> bool,
) -> Vec<(String, String)> {
    let mut found = Vec::new();
    for table in schema.tables() {
        for column in schema.columns(&table) {
            if pred(&column) {
                found.push((table.clone(), column.name));
            }
        }
    }
    found
}

/// Timeframe filters for date/time columns and comparison filters for
/// numeric columns.
pub fn filter_components(schema: &dyn SchemaProvider) -> Vec<DslComponent> {
    let mut components = Vec::new();

    for (table, col) in columns_where(schema, |c| is_temporal_type(&c.data_type)) {
        for (period, timeframe) in TIME_PERIODS {
            for text in [
                format!("Filter {} for {}", table, period),
                format!("Get {} data from {}", table, period),
                format!("Show {} records for {}", table, period),
            ] {
                components.push(DslComponent::Filter(timeframe_filter(
                    column_ref(&table, &col),
                    timeframe.name(),
                    text,
                )));
            }
        }
    }

    let comparisons: [(&str, Operator, FilterValue, &str); 6] = [
        ("greater than", Operator::GreaterThan, 100i64.into(), "100"),
        ("less than", Operator::LessThan, 50i64.into(), "50"),
        ("equal to", Operator::Equals, 75i64.into(), "75"),
        ("between", Operator::Between, FilterValue::list([10i64, 20]), "10 and 20"),
        ("at least", Operator::GreaterThanEquals, 30i64.into(), "30"),
        ("at most", Operator::LessThanEquals, 40i64.into(), "40"),
    ];

    for (table, col) in columns_where(schema, |c| is_numeric_type(&c.data_type)) {
        for (words, operator, value, spoken) in &comparisons {
            for text in [
                format!("Filter {} where {} is {} {}", table, col, words, spoken),
                format!("Get {} data with {} {} {}", table, col, words, spoken),
                format!("Show {} records where {} is {} {}", table, col, words, spoken),
            ] {
                components.push(DslComponent::Filter(Filter {
                    text,
                    ..Filter::new(column_ref(&table, &col), *operator, value.clone())
                }));
            }
        }
    }

    components
}

pub fn aggregate_components(schema: &dyn SchemaProvider) -> Vec<DslComponent> {
    let mut components = Vec::new();
    for (table, col) in columns_where(schema, |c| is_numeric_type(&c.data_type)) {
        for (function, name, alt) in AGGREGATE_WORDS {
            for text in [
                format!("Calculate {} of {} in {}", name, col, table),
                format!("Find {} {} for {}", alt, col, table),
                format!("Get {} {} from {}", name, col, table),
            ] {
                components.push(DslComponent::Aggregate(AggregateFn {
                    function,
                    column: column_ref(&table, &col),
                    alias: None,
                    text,
                }));
            }
        }
    }
    components
}

/// Group-bys for every column that is not an identifier.
pub fn group_by_components(schema: &dyn SchemaProvider) -> Vec<DslComponent> {
    let mut components = Vec::new();
    for (table, col) in columns_where(schema, |c| c.name != "id" && !c.name.ends_with("_id")) {
        for text in [
            format!("Group by {} in {}", col, table),
            format!("Aggregate data by {}", col),
            format!("Summarize {} by {}", table, col),
        ] {
            components.push(DslComponent::GroupBy(GroupBy {
                columns: vec![column_ref(&table, &col)],
                alias: None,
                text,
            }));
        }
    }
    components
}

/// Generate every component family from `schema` and add each family as
/// its own batch.
pub fn seed_from_schema(catalog: &ComponentCatalog, schema: &dyn SchemaProvider) -> Result<SeedReport> {
    let families: [(&str, fn(&dyn SchemaProvider) -> Vec<DslComponent>); 6] = [
        ("table", table_components),
        ("column", column_components),
        ("join", join_components),
        ("filter", filter_components),
        ("aggregate", aggregate_components),
        ("group_by", group_by_components),
    ];

    let mut report = SeedReport::new();
    for (family, generate) in families {
        let components = generate(schema);
        if components.is_empty() {
            continue;
        }
        tracing::info!(family, count = components.len(), "seeding components");
        tally(&mut report, &components);
        catalog.add_batch(components)?;
    }
    Ok(report)
}

/// Read `<kind>_components.json` files (arrays of components) from `dir`.
/// Entries without a `"type"` tag take the kind named by their file.
pub fn load_predefined(dir: &Path) -> Result<Vec<DslComponent>> {
    let mut components = Vec::new();
    for kind in ComponentKind::builtin() {
        let path = dir.join(format!(
            "{}_components.json",
            kind.as_str().to_lowercase()
        ));
        if !path.exists() {
            continue;
        }
        let storage_err = |source: io::Error| Error::Storage {
            kind: kind.clone(),
            path: path.clone(),
            source,
        };
        let data = fs::read_to_string(&path).map_err(storage_err)?;
        let items: Vec<Value> = serde_json::from_str(&data)?;
        tracing::info!(kind = %kind, count = items.len(), path = %path.display(), "loading predefined components");

        for mut item in items {
            if let Value::Object(map) = &mut item {
                map.entry("type")
                    .or_insert_with(|| Value::String(kind.as_str().to_string()));
            }
            components.push(DslComponent::from_value(item)?);
        }
    }
    Ok(components)
}

/// Load predefined component files into the catalog.
pub fn seed_predefined(catalog: &ComponentCatalog, dir: &Path) -> Result<SeedReport> {
    let components = load_predefined(dir)?;
    let mut report = SeedReport::new();
    tally(&mut report, &components);
    if !components.is_empty() {
        catalog.add_batch(components)?;
    }
    Ok(report)
}

fn tally(report: &mut SeedReport, components: &[DslComponent]) {
    for component in components {
        *report.entry(component.kind()).or_default() += 1;
    }
}
