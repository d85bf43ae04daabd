/// DSL → SQL compiler.
///
/// Renders a finished [`DslQuery`] into a single SELECT statement. The
/// output is a pure function of the query and the generator options, so
/// identical input always yields byte-identical SQL.
use serde::{Deserialize, Serialize};

use super::types::*;
use super::value::{FilterValue, Timeframe};
use crate::error::{Error, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Knobs for the SQL generator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorOptions {
    /// Fail with `InvalidFilterValue` instead of falling back to an
    /// equality comparison when a BETWEEN/IN value has the wrong shape,
    /// and with `InvalidClause` on a zero limit.
    pub strict_value_shapes: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SqlGenerator {
    options: GeneratorOptions,
}

impl SqlGenerator {
    pub fn new(options: GeneratorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> GeneratorOptions {
        self.options
    }

    /// Compile a query into SQL. Fails without emitting anything when
    /// `select` or `from` is empty.
    pub fn generate(&self, query: &DslQuery) -> Result<String> {
        if query.select.is_empty() {
            return Err(Error::QueryIncomplete { clause: "select" });
        }
        if query.from.is_empty() {
            return Err(Error::QueryIncomplete { clause: "from" });
        }

        let mut parts = Vec::new();

        let items: Vec<String> = query.select.iter().map(compile_select_item).collect();
        parts.push(format!("SELECT {}", items.join(", ")));

        let tables: Vec<String> = query.from.iter().map(compile_table).collect();
        parts.push(format!("FROM {}", tables.join(", ")));

        for join in &query.joins {
            parts.push(compile_join(join));
        }

        if !query.where_.is_empty() {
            parts.push(format!("WHERE {}", self.compile_filters(&query.where_)?));
        }

        if let Some(ref group_by) = query.group_by {
            let cols: Vec<String> = group_by.columns.iter().map(compile_column_ref).collect();
            parts.push(format!("GROUP BY {}", cols.join(", ")));
        }

        if !query.having.is_empty() {
            parts.push(format!("HAVING {}", self.compile_filters(&query.having)?));
        }

        if let Some(ref order_by) = query.order_by {
            let direction = order_by.direction.keyword();
            let cols: Vec<String> = order_by
                .columns
                .iter()
                .map(|c| format!("{} {}", compile_column_ref(c), direction))
                .collect();
            parts.push(format!("ORDER BY {}", cols.join(", ")));
        }

        if let Some(ref limit) = query.limit {
            if limit.limit == 0 {
                if self.options.strict_value_shapes {
                    return Err(Error::InvalidClause {
                        clause: "limit",
                        reason: "limit must be positive".to_string(),
                    });
                }
                tracing::warn!("limit of 0 emitted as-is");
            }
            if limit.offset > 0 {
                parts.push(format!("LIMIT {} OFFSET {}", limit.limit, limit.offset));
            } else {
                parts.push(format!("LIMIT {}", limit.limit));
            }
        }

        let sql = parts.join(" ");
        tracing::debug!(sql = %sql, "compiled query");
        Ok(sql)
    }

    fn compile_filters(&self, filters: &[Filter]) -> Result<String> {
        let mut conditions = Vec::with_capacity(filters.len());
        for (i, filter) in filters.iter().enumerate() {
            let condition = self.compile_filter(filter)?;
            if i == 0 {
                conditions.push(condition);
            } else {
                conditions.push(format!("{} {}", filter.conjunction.keyword(), condition));
            }
        }
        Ok(conditions.join(" "))
    }

    /// Render one filter condition.
    pub fn compile_filter(&self, filter: &Filter) -> Result<String> {
        let col = compile_column_ref(&filter.column);
        let op = filter.operator;

        match op {
            Operator::IsNull => return Ok(format!("{} IS NULL", col)),
            Operator::IsNotNull => return Ok(format!("{} IS NOT NULL", col)),
            Operator::Between | Operator::NotBetween => {
                let not_str = if op == Operator::NotBetween { "NOT " } else { "" };
                return match filter.value.as_list() {
                    Some([low, high]) => Ok(format!(
                        "{} {}BETWEEN {} AND {}",
                        col,
                        not_str,
                        format_bound(low),
                        format_bound(high)
                    )),
                    _ => self.fallback(filter, &col, "=", "expected a two-element list"),
                };
            }
            Operator::In | Operator::NotIn => {
                let not_str = if op == Operator::NotIn { "NOT " } else { "" };
                return match filter.value.as_list() {
                    Some(items) => {
                        let values: Vec<String> = items
                            .iter()
                            .map(|v| format_value(v, Operator::Equals))
                            .collect();
                        Ok(format!("{} {}IN ({})", col, not_str, values.join(", ")))
                    }
                    None => {
                        let eq = if op == Operator::NotIn { "!=" } else { "=" };
                        self.fallback(filter, &col, eq, "expected a list")
                    }
                };
            }
            _ => {}
        }

        if let FilterValue::Timeframe(name) = &filter.value {
            return Ok(compile_timeframe(&col, name));
        }

        Ok(format!(
            "{} {} {}",
            col,
            sql_operator(op),
            format_value(&filter.value, op)
        ))
    }

    fn fallback(&self, filter: &Filter, col: &str, sql_op: &str, reason: &str) -> Result<String> {
        if self.options.strict_value_shapes {
            return Err(Error::InvalidFilterValue {
                column: col.to_string(),
                operator: filter.operator,
                reason: reason.to_string(),
            });
        }
        tracing::warn!(
            column = %col,
            operator = %filter.operator,
            "{}, falling back to {}",
            reason,
            sql_op
        );
        Ok(format!(
            "{} {} {}",
            col,
            sql_op,
            format_value(&filter.value, filter.operator)
        ))
    }
}

/// Compile with default options.
pub fn compile(query: &DslQuery) -> Result<String> {
    SqlGenerator::default().generate(query)
}

fn compile_select_item(item: &SelectItem) -> String {
    let (expr, alias) = match item {
        SelectItem::Column(c) => (compile_column_ref(c), c.alias.as_deref()),
        SelectItem::Aggregate(a) => (
            format!("{}({})", a.function.sql_name(), compile_column_ref(&a.column)),
            a.alias.as_deref(),
        ),
    };
    match alias {
        Some(a) => format!("{} AS {}", expr, a),
        None => expr,
    }
}

fn compile_table(table: &Table) -> String {
    match table.alias {
        Some(ref a) => format!("{} AS {}", table.table_name, a),
        None => table.table_name.clone(),
    }
}

/// `table.column` when qualified by a plain table name, else the bare column.
pub fn compile_column_ref(column: &Column) -> String {
    match column.qualifier() {
        Some(t) if !t.contains('.') => format!("{}.{}", t, column.column_name),
        _ => column.column_name.clone(),
    }
}

fn compile_join(join: &Join) -> String {
    let conditions: Vec<String> = join
        .join_condition
        .iter()
        .map(|c| {
            format!(
                "{} = {}",
                qualify(&join.left_table.table_name, &c.left_column),
                qualify(&join.right_table.table_name, &c.right_column)
            )
        })
        .collect();

    format!(
        "{} JOIN {} ON {}",
        join.join_type.keyword(),
        compile_table(&join.right_table),
        conditions.join(" AND ")
    )
}

fn qualify(table: &str, column: &str) -> String {
    if column.contains('.') {
        column.to_string()
    } else {
        format!("{}.{}", table, column)
    }
}

fn sql_operator(op: Operator) -> &'static str {
    match op {
        Operator::Equals => "=",
        Operator::NotEquals => "!=",
        Operator::GreaterThan => ">",
        Operator::LessThan => "<",
        Operator::GreaterThanEquals => ">=",
        Operator::LessThanEquals => "<=",
        Operator::Like => "LIKE",
        Operator::NotLike => "NOT LIKE",
        Operator::In => "IN",
        Operator::NotIn => "NOT IN",
        Operator::Between => "BETWEEN",
        Operator::NotBetween => "NOT BETWEEN",
        Operator::IsNull => "IS NULL",
        Operator::IsNotNull => "IS NOT NULL",
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Format a literal for the given operator.
pub fn format_value(value: &FilterValue, op: Operator) -> String {
    match value {
        FilterValue::Null => "NULL".to_string(),
        FilterValue::Bool(b) => {
            if *b {
                "TRUE".to_string()
            } else {
                "FALSE".to_string()
            }
        }
        FilterValue::Integer(i) => i.to_string(),
        FilterValue::Float(f) => format!("{}", f),
        FilterValue::Text(s) => {
            if op.is_pattern() && !s.contains('%') {
                quote(&format!("%{}%", s))
            } else {
                quote(s)
            }
        }
        FilterValue::Date(d) => quote(&d.format(DATE_FORMAT).to_string()),
        FilterValue::DateTime(dt) => quote(&dt.format(DATETIME_FORMAT).to_string()),
        FilterValue::List(items) => {
            let values: Vec<String> = items.iter().map(|v| format_value(v, op)).collect();
            values.join(", ")
        }
        FilterValue::Timeframe(name) => quote(name),
    }
}

/// BETWEEN bounds: numeric strings are emitted as numeric literals.
fn format_bound(value: &FilterValue) -> String {
    if let FilterValue::Text(s) = value {
        let trimmed = s.trim();
        if trimmed.parse::<i64>().is_ok()
            || trimmed.parse::<f64>().map(f64::is_finite).unwrap_or(false)
        {
            return trimmed.to_string();
        }
    }
    format_value(value, Operator::Equals)
}

/// Expand a named relative window into a date predicate over `col`.
/// Unknown names degrade to a literal comparison against the name.
pub fn compile_timeframe(col: &str, name: &str) -> String {
    const NOW: &str = "CURRENT_DATE";
    let Some(timeframe) = Timeframe::from_name(name) else {
        return format!("{} = {}", col, quote(name));
    };

    match timeframe {
        Timeframe::Day | Timeframe::CurrentDay => format!("DATE({}) = {}", col, NOW),
        Timeframe::LastDay => format!("DATE({}) = ({} - INTERVAL '1 day')", col, NOW),
        Timeframe::Week | Timeframe::CurrentWeek => same_period(col, "WEEK", NOW),
        Timeframe::Month | Timeframe::CurrentMonth => same_period(col, "MONTH", NOW),
        Timeframe::Quarter | Timeframe::CurrentQuarter => same_period(col, "QUARTER", NOW),
        Timeframe::Year | Timeframe::CurrentYear => same_year(col, NOW),
        Timeframe::LastWeek => same_period(col, "WEEK", "CURRENT_DATE - INTERVAL '1 week'"),
        Timeframe::LastMonth => same_period(col, "MONTH", "CURRENT_DATE - INTERVAL '1 month'"),
        Timeframe::LastQuarter => {
            same_period(col, "QUARTER", "CURRENT_DATE - INTERVAL '3 months'")
        }
        Timeframe::LastYear => same_year(col, "CURRENT_DATE - INTERVAL '1 year'"),
    }
}

fn same_period(col: &str, unit: &str, anchor: &str) -> String {
    format!(
        "EXTRACT({unit} FROM {col}) = EXTRACT({unit} FROM {anchor}) AND {}",
        same_year(col, anchor)
    )
}

fn same_year(col: &str, anchor: &str) -> String {
    format!("EXTRACT(YEAR FROM {col}) = EXTRACT(YEAR FROM {anchor})")
}
