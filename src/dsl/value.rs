//! Literal values carried by filters, and the named relative timeframes.
//!
//! Values travel as plain JSON: scalars and arrays map directly, and the
//! three one-key objects `{"timeframe": ..}`, `{"date": ..}` and
//! `{"datetime": ..}` carry the non-JSON shapes.

use chrono::{NaiveDate, NaiveDateTime};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// The value side of a filter.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FilterValue {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    List(Vec<FilterValue>),
    /// A named relative calendar window. The name is kept verbatim so that
    /// unknown names survive a round trip.
    Timeframe(String),
}

impl FilterValue {
    pub fn text(s: impl Into<String>) -> Self {
        FilterValue::Text(s.into())
    }

    pub fn timeframe(name: impl Into<String>) -> Self {
        FilterValue::Timeframe(name.into())
    }

    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterValue>,
    {
        FilterValue::List(items.into_iter().map(Into::into).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FilterValue::Null)
    }

    pub fn as_list(&self) -> Option<&[FilterValue]> {
        match self {
            FilterValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// True for values allowed on comparison operators.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, FilterValue::List(_) | FilterValue::Null)
    }

    pub fn to_json(&self) -> Value {
        match self {
            FilterValue::Null => Value::Null,
            FilterValue::Bool(b) => Value::Bool(*b),
            FilterValue::Integer(i) => Value::Number((*i).into()),
            FilterValue::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            FilterValue::Text(s) => Value::String(s.clone()),
            FilterValue::Date(d) => one_key("date", d.format(DATE_FORMAT).to_string()),
            FilterValue::DateTime(dt) => {
                one_key("datetime", dt.format(DATETIME_FORMAT).to_string())
            }
            FilterValue::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            FilterValue::Timeframe(name) => one_key("timeframe", name.clone()),
        }
    }

    pub fn from_json(value: &Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(FilterValue::Null),
            Value::Bool(b) => Ok(FilterValue::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(FilterValue::Integer(i)),
                None => n
                    .as_f64()
                    .map(FilterValue::Float)
                    .ok_or_else(|| format!("unsupported number {}", n)),
            },
            Value::String(s) => Ok(FilterValue::Text(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Self::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(FilterValue::List),
            Value::Object(map) => from_one_key(map),
        }
    }
}

fn one_key(key: &str, value: String) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), Value::String(value));
    Value::Object(map)
}

fn from_one_key(map: &Map<String, Value>) -> Result<FilterValue, String> {
    let mut entries = map.iter();
    let (key, value) = match (entries.next(), entries.next()) {
        (Some(entry), None) => entry,
        _ => return Err("structured values must have exactly one key".to_string()),
    };
    let text = value
        .as_str()
        .ok_or_else(|| format!("`{}` must be a string", key))?;
    match key.as_str() {
        "timeframe" => Ok(FilterValue::Timeframe(text.to_string())),
        "date" => NaiveDate::parse_from_str(text, DATE_FORMAT)
            .map(FilterValue::Date)
            .map_err(|e| format!("invalid date `{}`: {}", text, e)),
        "datetime" => NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
            .map(FilterValue::DateTime)
            .map_err(|e| format!("invalid datetime `{}`: {}", text, e)),
        other => Err(format!("unknown structured value `{}`", other)),
    }
}

impl Serialize for FilterValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FilterValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        FilterValue::from_json(&value).map_err(de::Error::custom)
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Text(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        FilterValue::Text(s)
    }
}

impl From<i64> for FilterValue {
    fn from(i: i64) -> Self {
        FilterValue::Integer(i)
    }
}

impl From<f64> for FilterValue {
    fn from(f: f64) -> Self {
        FilterValue::Float(f)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        FilterValue::Bool(b)
    }
}

impl From<NaiveDate> for FilterValue {
    fn from(d: NaiveDate) -> Self {
        FilterValue::Date(d)
    }
}

impl From<NaiveDateTime> for FilterValue {
    fn from(dt: NaiveDateTime) -> Self {
        FilterValue::DateTime(dt)
    }
}

/// Relative calendar windows understood by the SQL generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    Day,
    Week,
    Month,
    Quarter,
    Year,
    LastDay,
    LastWeek,
    LastMonth,
    LastQuarter,
    LastYear,
    CurrentDay,
    CurrentWeek,
    CurrentMonth,
    CurrentQuarter,
    CurrentYear,
}

impl Timeframe {
    pub const ALL: [Timeframe; 15] = [
        Timeframe::Day,
        Timeframe::Week,
        Timeframe::Month,
        Timeframe::Quarter,
        Timeframe::Year,
        Timeframe::LastDay,
        Timeframe::LastWeek,
        Timeframe::LastMonth,
        Timeframe::LastQuarter,
        Timeframe::LastYear,
        Timeframe::CurrentDay,
        Timeframe::CurrentWeek,
        Timeframe::CurrentMonth,
        Timeframe::CurrentQuarter,
        Timeframe::CurrentYear,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Timeframe::Day => "DAY",
            Timeframe::Week => "WEEK",
            Timeframe::Month => "MONTH",
            Timeframe::Quarter => "QUARTER",
            Timeframe::Year => "YEAR",
            Timeframe::LastDay => "LAST_DAY",
            Timeframe::LastWeek => "LAST_WEEK",
            Timeframe::LastMonth => "LAST_MONTH",
            Timeframe::LastQuarter => "LAST_QUARTER",
            Timeframe::LastYear => "LAST_YEAR",
            Timeframe::CurrentDay => "CURRENT_DAY",
            Timeframe::CurrentWeek => "CURRENT_WEEK",
            Timeframe::CurrentMonth => "CURRENT_MONTH",
            Timeframe::CurrentQuarter => "CURRENT_QUARTER",
            Timeframe::CurrentYear => "CURRENT_YEAR",
        }
    }

    /// Case-insensitive lookup by name; `None` for unknown windows.
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|tf| tf.name() == upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_from_json() {
        assert_eq!(FilterValue::from_json(&Value::Null).unwrap(), FilterValue::Null);
        assert_eq!(
            FilterValue::from_json(&serde_json::json!(42)).unwrap(),
            FilterValue::Integer(42)
        );
        assert_eq!(
            FilterValue::from_json(&serde_json::json!(2.5)).unwrap(),
            FilterValue::Float(2.5)
        );
        assert_eq!(
            FilterValue::from_json(&serde_json::json!("x")).unwrap(),
            FilterValue::text("x")
        );
    }

    #[test]
    fn test_structured_values() {
        let tf: FilterValue = serde_json::from_str(r#"{"timeframe":"LAST_MONTH"}"#).unwrap();
        assert_eq!(tf, FilterValue::timeframe("LAST_MONTH"));

        let date: FilterValue = serde_json::from_str(r#"{"date":"2024-03-01"}"#).unwrap();
        assert_eq!(
            date,
            FilterValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
    }

    #[test]
    fn test_rejects_unknown_object() {
        assert!(serde_json::from_str::<FilterValue>(r#"{"range":"x"}"#).is_err());
        assert!(serde_json::from_str::<FilterValue>(r#"{"date":"a","b":"c"}"#).is_err());
    }

    #[test]
    fn test_datetime_survives_serialization() {
        let dt = NaiveDate::from_ymd_opt(2023, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 1)
            .unwrap();
        let value = FilterValue::list(vec![FilterValue::DateTime(dt), FilterValue::Float(1.5)]);
        let json = serde_json::to_string(&value).unwrap();
        let back: FilterValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_datetime_keeps_fractional_seconds() {
        let dt = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_milli_opt(12, 30, 0, 250)
            .unwrap();
        let value = FilterValue::DateTime(dt);
        assert_eq!(
            value.to_json(),
            serde_json::json!({"datetime": "2024-05-01T12:30:00.250"})
        );
        let back: FilterValue = serde_json::from_str(&serde_json::to_string(&value).unwrap()).unwrap();
        assert_eq!(back, value);

        let whole: FilterValue =
            serde_json::from_str(r#"{"datetime":"2024-05-01T12:30:00"}"#).unwrap();
        assert_eq!(
            whole,
            FilterValue::DateTime(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(12, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_timeframe_lookup_is_case_insensitive() {
        assert_eq!(Timeframe::from_name("last_quarter"), Some(Timeframe::LastQuarter));
        assert_eq!(Timeframe::from_name("Current_Year"), Some(Timeframe::CurrentYear));
        assert_eq!(Timeframe::from_name("fortnight"), None);
    }
}
