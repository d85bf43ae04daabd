use std::fmt;

use serde_json::{Map, Value};

/// One result row: column name → JSON value, in select-list order.
pub type Row = Map<String, Value>;

/// Runs generated SQL somewhere and hands back rows.
///
/// Errors are passed to the caller as-is; nothing in this crate retries
/// or rewrites a failed statement.
#[allow(async_fn_in_trait)]
pub trait ExecutionSink {
    fn name(&self) -> &str;

    async fn execute(&self, sql: &str) -> Result<Vec<Row>, ExecutionError>;
}

/// Broad class of an execution failure, derived from the SQLSTATE class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Syntax,
    /// Missing table/column, ambiguous reference.
    Semantic,
    /// Runtime failures such as division by zero or constraint violations.
    Execution,
    Transaction,
    Connection,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Syntax => write!(f, "Syntax Error"),
            ErrorCategory::Semantic => write!(f, "Semantic Error"),
            ErrorCategory::Execution => write!(f, "Execution Error"),
            ErrorCategory::Transaction => write!(f, "Transaction Error"),
            ErrorCategory::Connection => write!(f, "Connection Error"),
            ErrorCategory::Unknown => write!(f, "Error"),
        }
    }
}

/// A failure reported by the execution sink, kept verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionError {
    pub category: ErrorCategory,
    /// SQLSTATE code, empty when the failure did not come from the server.
    pub code: String,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    /// 1-based line and column of the server-reported error position.
    pub line: Option<usize>,
    pub col: Option<usize>,
}

impl ExecutionError {
    pub fn from_string(message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Unknown,
            code: String::new(),
            message: message.into(),
            detail: None,
            hint: None,
            line: None,
            col: None,
        }
    }

    /// Build from a server error code and message.
    pub fn from_sqlstate(code: &str, message: impl Into<String>) -> Self {
        Self {
            category: categorize_sqlstate(code),
            code: code.to_string(),
            ..Self::from_string(message)
        }
    }

    /// Multi-line rendering with every available field.
    pub fn display_full(&self) -> String {
        let mut lines = vec![format!("{}: {}", self.category, self.message)];
        if let (Some(line), Some(col)) = (self.line, self.col) {
            lines.push(format!("  at line {}, column {}", line, col));
        }
        if !self.code.is_empty() {
            lines.push(format!("  SQLSTATE: {}", self.code));
        }
        if let Some(detail) = &self.detail {
            lines.push(format!("  Detail: {}", detail));
        }
        if let Some(hint) = &self.hint {
            lines.push(format!("  Hint: {}", hint));
        }
        lines.join("\n")
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code.is_empty() {
            write!(f, "{}: {}", self.category, self.message)
        } else {
            write!(f, "{} [{}]: {}", self.category, self.code, self.message)
        }
    }
}

impl std::error::Error for ExecutionError {}

/// Convert a 1-based byte offset in `sql` to 1-based (line, column).
pub(crate) fn byte_offset_to_line_col(sql: &str, byte_pos: usize) -> (usize, usize) {
    if byte_pos == 0 || sql.is_empty() {
        return (1, 1);
    }
    let target = (byte_pos - 1).min(sql.len());
    let mut line = 1usize;
    let mut col = 1usize;
    for (i, ch) in sql.char_indices() {
        if i >= target {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

pub fn categorize_sqlstate(code: &str) -> ErrorCategory {
    if code.len() < 2 {
        return ErrorCategory::Unknown;
    }
    match &code[..2] {
        "42" => {
            if code == "42601" || code == "42000" {
                ErrorCategory::Syntax
            } else {
                ErrorCategory::Semantic
            }
        }
        "22" | "23" | "53" | "54" | "55" | "57" => ErrorCategory::Execution,
        "25" | "40" => ErrorCategory::Transaction,
        "08" => ErrorCategory::Connection,
        _ => ErrorCategory::Unknown,
    }
}

#[cfg(feature = "postgres")]
mod pg {
    use std::error::Error as StdError;
    use std::time::Instant;

    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use serde_json::{Number, Value};
    use tokio_postgres::{types::Type, Client};

    use super::*;

    impl ExecutionError {
        pub fn from_pg_error(err: &tokio_postgres::Error, sql: &str) -> Self {
            if let Some(db_err) = err.as_db_error() {
                let position = db_err.position().and_then(|p| match p {
                    tokio_postgres::error::ErrorPosition::Original(pos) => Some(*pos as usize),
                    tokio_postgres::error::ErrorPosition::Internal { .. } => None,
                });
                let (line, col) = match position.map(|p| byte_offset_to_line_col(sql, p)) {
                    Some((line, col)) => (Some(line), Some(col)),
                    None => (None, None),
                };
                ExecutionError {
                    detail: db_err.detail().map(str::to_string),
                    hint: db_err.hint().map(str::to_string),
                    line,
                    col,
                    ..ExecutionError::from_sqlstate(db_err.code().code(), db_err.message())
                }
            } else {
                let category = if err.source().is_some() {
                    ErrorCategory::Connection
                } else {
                    ErrorCategory::Unknown
                };
                ExecutionError {
                    category,
                    detail: err.source().map(|e| e.to_string()),
                    ..ExecutionError::from_string(err.to_string())
                }
            }
        }
    }

    /// Executes statements on a PostgreSQL client.
    pub struct PostgresSink {
        client: Client,
    }

    impl PostgresSink {
        pub fn new(client: Client) -> Self {
            Self { client }
        }
    }

    impl ExecutionSink for PostgresSink {
        fn name(&self) -> &str {
            "postgres"
        }

        async fn execute(&self, sql: &str) -> Result<Vec<Row>, ExecutionError> {
            let start = Instant::now();
            let rows = self
                .client
                .query(sql.trim(), &[])
                .await
                .map_err(|e| ExecutionError::from_pg_error(&e, sql))?;

            let result: Vec<Row> = rows
                .iter()
                .map(|row| {
                    row.columns()
                        .iter()
                        .enumerate()
                        .map(|(i, col)| (col.name().to_string(), extract_value(row, i, col.type_())))
                        .collect()
                })
                .collect();
            tracing::debug!(
                rows = result.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "statement executed"
            );
            Ok(result)
        }
    }

    fn get<'a, T>(row: &'a tokio_postgres::Row, idx: usize) -> Option<T>
    where
        T: tokio_postgres::types::FromSql<'a>,
    {
        row.try_get::<_, Option<T>>(idx).ok().flatten()
    }

    fn extract_value(row: &tokio_postgres::Row, idx: usize, pg_type: &Type) -> Value {
        let value = match *pg_type {
            Type::BOOL => get::<bool>(row, idx).map(Value::Bool),
            Type::INT2 => get::<i16>(row, idx).map(Value::from),
            Type::INT4 => get::<i32>(row, idx).map(Value::from),
            Type::INT8 => get::<i64>(row, idx).map(Value::from),
            Type::FLOAT4 => get::<f32>(row, idx)
                .and_then(|v| Number::from_f64(v as f64))
                .map(Value::Number),
            Type::FLOAT8 => get::<f64>(row, idx)
                .and_then(Number::from_f64)
                .map(Value::Number),
            Type::DATE => get::<NaiveDate>(row, idx).map(|d| Value::String(d.to_string())),
            Type::TIME => get::<NaiveTime>(row, idx).map(|t| Value::String(t.to_string())),
            Type::TIMESTAMP => {
                get::<NaiveDateTime>(row, idx).map(|dt| Value::String(dt.to_string()))
            }
            Type::TIMESTAMPTZ => {
                get::<DateTime<Utc>>(row, idx).map(|dt| Value::String(dt.to_rfc3339()))
            }
            Type::JSON | Type::JSONB => get::<Value>(row, idx),
            _ => get::<String>(row, idx).map(Value::String),
        };
        value.unwrap_or(Value::Null)
    }
}

#[cfg(feature = "postgres")]
pub use pg::PostgresSink;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::Syntax.to_string(), "Syntax Error");
        assert_eq!(ErrorCategory::Semantic.to_string(), "Semantic Error");
        assert_eq!(ErrorCategory::Connection.to_string(), "Connection Error");
        assert_eq!(ErrorCategory::Unknown.to_string(), "Error");
    }

    #[test]
    fn test_from_sqlstate() {
        let err = ExecutionError::from_sqlstate("42P01", "relation \"sales\" does not exist");
        assert_eq!(err.category, ErrorCategory::Semantic);
        assert_eq!(
            err.to_string(),
            "Semantic Error [42P01]: relation \"sales\" does not exist"
        );
    }

    #[test]
    fn test_display_full() {
        let err = ExecutionError {
            detail: None,
            hint: Some("Check the column name.".into()),
            line: Some(1),
            col: Some(8),
            ..ExecutionError::from_sqlstate("42703", "column \"revenu\" does not exist")
        };
        let full = err.display_full();
        assert!(full.contains("at line 1, column 8"));
        assert!(full.contains("SQLSTATE: 42703"));
        assert!(full.contains("Hint: Check the column name."));
    }

    #[test]
    fn test_byte_offset_to_line_col() {
        let sql = "SELECT *\nFROM users\nWHERE id = 1";
        assert_eq!(byte_offset_to_line_col(sql, 1), (1, 1));
        assert_eq!(byte_offset_to_line_col(sql, 10), (2, 1));
        assert_eq!(byte_offset_to_line_col(sql, 21), (3, 1));
    }

    #[test]
    fn test_categorize_sqlstate() {
        assert_eq!(categorize_sqlstate("42601"), ErrorCategory::Syntax);
        assert_eq!(categorize_sqlstate("42703"), ErrorCategory::Semantic);
        assert_eq!(categorize_sqlstate("23505"), ErrorCategory::Execution);
        assert_eq!(categorize_sqlstate("40001"), ErrorCategory::Transaction);
        assert_eq!(categorize_sqlstate("08006"), ErrorCategory::Connection);
        assert_eq!(categorize_sqlstate("XX000"), ErrorCategory::Unknown);
        assert_eq!(categorize_sqlstate(""), ErrorCategory::Unknown);
    }
}
