//! Typed clause model for the query DSL.
//!
//! This module defines the intermediate representation shared by the
//! component catalog, the enhancement merger, and the SQL compiler. Every
//! clause kind is a plain struct; [`DslComponent`](super::DslComponent) is
//! the closed sum over them.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::value::FilterValue;

/// JOIN flavours supported by the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    pub fn keyword(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER",
            JoinType::Left => "LEFT",
            JoinType::Right => "RIGHT",
            JoinType::Full => "FULL",
        }
    }
}

/// How a filter attaches to the filter before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Conjunction {
    #[default]
    And,
    Or,
}

impl Conjunction {
    pub fn keyword(&self) -> &'static str {
        match self {
            Conjunction::And => "AND",
            Conjunction::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub const ALL: [AggregateFunction; 5] = [
        AggregateFunction::Count,
        AggregateFunction::Sum,
        AggregateFunction::Avg,
        AggregateFunction::Min,
        AggregateFunction::Max,
    ];

    pub fn sql_name(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Filter operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterThanEquals,
    LessThanEquals,
    Like,
    NotLike,
    In,
    NotIn,
    Between,
    NotBetween,
    IsNull,
    IsNotNull,
}

impl Operator {
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Equals => "EQUALS",
            Operator::NotEquals => "NOT_EQUALS",
            Operator::GreaterThan => "GREATER_THAN",
            Operator::LessThan => "LESS_THAN",
            Operator::GreaterThanEquals => "GREATER_THAN_EQUALS",
            Operator::LessThanEquals => "LESS_THAN_EQUALS",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT_LIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT_IN",
            Operator::Between => "BETWEEN",
            Operator::NotBetween => "NOT_BETWEEN",
            Operator::IsNull => "IS_NULL",
            Operator::IsNotNull => "IS_NOT_NULL",
        }
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self, Operator::Like | Operator::NotLike)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Table reference in a FROM list or on either side of a join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub table_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub text: String,
}

impl Table {
    /// A table whose label is its own name.
    pub fn named(name: impl Into<String>) -> Self {
        let table_name = name.into();
        Self {
            text: table_name.clone(),
            table_name,
            alias: None,
        }
    }
}

/// Column reference. An empty or missing `table_name` is unqualified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub column_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub text: String,
}

impl Column {
    pub fn named(name: impl Into<String>) -> Self {
        let column_name = name.into();
        Self {
            text: column_name.clone(),
            column_name,
            table_name: None,
            alias: None,
        }
    }

    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        let table_name = table.into();
        let column_name = name.into();
        Self {
            text: format!("{}.{}", table_name, column_name),
            column_name,
            table_name: Some(table_name),
            alias: None,
        }
    }

    /// The qualifier, if present and non-empty.
    pub fn qualifier(&self) -> Option<&str> {
        self.table_name.as_deref().filter(|t| !t.is_empty())
    }
}

/// One `left = right` equality of a join condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinCondition {
    pub left_column: String,
    pub right_column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub left_table: Table,
    pub right_table: Table,
    #[serde(default)]
    pub join_type: JoinType,
    pub join_condition: Vec<JoinCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: Column,
    pub operator: Operator,
    #[serde(default)]
    pub value: FilterValue,
    #[serde(default)]
    pub conjunction: Conjunction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub text: String,
}

impl Filter {
    pub fn new(column: Column, operator: Operator, value: impl Into<FilterValue>) -> Self {
        let value = value.into();
        let text = format!("{} {} {}", column.text, operator.name(), value.to_json());
        Self {
            column,
            operator,
            value,
            conjunction: Conjunction::And,
            alias: None,
            text,
        }
    }

    pub fn with_conjunction(mut self, conjunction: Conjunction) -> Self {
        self.conjunction = conjunction;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateFn {
    pub function: AggregateFunction,
    pub column: Column,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupBy {
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub columns: Vec<Column>,
    #[serde(default)]
    pub direction: SortDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limit {
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub text: String,
}

impl Limit {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            offset: 0,
            alias: None,
            text: format!("Limit to {} results", limit),
        }
    }
}

/// A catalog entry whose kind this build does not know. Only the tag and
/// label are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericComponent {
    pub kind: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// A single item in the SELECT list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Column(Column),
    Aggregate(AggregateFn),
}

impl SelectItem {
    pub fn text(&self) -> &str {
        match self {
            SelectItem::Column(c) => &c.text,
            SelectItem::Aggregate(a) => &a.text,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, SelectItem::Aggregate(_))
    }
}

impl From<Column> for SelectItem {
    fn from(c: Column) -> Self {
        SelectItem::Column(c)
    }
}

impl From<AggregateFn> for SelectItem {
    fn from(a: AggregateFn) -> Self {
        SelectItem::Aggregate(a)
    }
}

/// A SELECT statement in DSL form.
///
/// A provisional query may have any clause empty; `select` and `from` must
/// be non-empty before SQL can be generated. The canonical text is derived
/// on demand (see [`DslQuery::rendered_text`]) so it can never drift from
/// the clauses.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DslQuery {
    pub select: Vec<SelectItem>,
    pub from: Vec<Table>,
    pub joins: Vec<Join>,
    pub where_: Vec<Filter>,
    pub group_by: Option<GroupBy>,
    pub having: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<Limit>,
    pub original_text: String,
}

impl DslQuery {
    pub fn new(original_text: impl Into<String>) -> Self {
        Self {
            original_text: original_text.into(),
            ..Default::default()
        }
    }

    /// Canonical serialization of the clauses, used as the retrieval key.
    pub fn rendered_text(&self) -> String {
        super::render::render_text(self)
    }

    pub fn has_aggregate(&self) -> bool {
        self.select.iter().any(SelectItem::is_aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_query_is_empty() {
        let q = DslQuery::default();
        assert!(q.select.is_empty());
        assert!(q.from.is_empty());
        assert!(q.group_by.is_none());
        assert!(q.limit.is_none());
    }

    #[test]
    fn test_column_qualifier_ignores_empty_table() {
        let mut col = Column::named("revenue");
        assert_eq!(col.qualifier(), None);
        col.table_name = Some(String::new());
        assert_eq!(col.qualifier(), None);
        col.table_name = Some("sales".into());
        assert_eq!(col.qualifier(), Some("sales"));
    }

    #[test]
    fn test_operator_wire_names() {
        let json = serde_json::to_string(&Operator::GreaterThanEquals).unwrap();
        assert_eq!(json, "\"GREATER_THAN_EQUALS\"");
        let op: Operator = serde_json::from_str("\"NOT_BETWEEN\"").unwrap();
        assert_eq!(op, Operator::NotBetween);
    }

    #[test]
    fn test_defaults_on_deserialize() {
        let filter: Filter = serde_json::from_str(
            r#"{"column":{"column_name":"id","text":"id"},"operator":"IS_NULL","text":"id is null"}"#,
        )
        .unwrap();
        assert_eq!(filter.conjunction, Conjunction::And);
        assert!(filter.value.is_null());

        let limit: Limit = serde_json::from_str(r#"{"limit":10,"text":"top 10"}"#).unwrap();
        assert_eq!(limit.offset, 0);
    }

    #[test]
    fn test_has_aggregate() {
        let mut q = DslQuery::new("how many sales");
        q.select.push(Column::named("id").into());
        assert!(!q.has_aggregate());
        q.select.push(
            AggregateFn {
                function: AggregateFunction::Count,
                column: Column::named("id"),
                alias: None,
                text: "count of id".into(),
            }
            .into(),
        );
        assert!(q.has_aggregate());
    }
}
