//! The closed sum over clause kinds, its wire form, and ingestion checks.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::{self, SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::*;
use super::value::FilterValue;
use crate::error::{Error, Result};

/// Tag identifying a clause kind. `Other` keeps tags this build does not
/// recognise so forward-compatible catalog entries still load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentKind {
    Table,
    Column,
    Join,
    Filter,
    Aggregate,
    GroupBy,
    OrderBy,
    Limit,
    Other(String),
}

impl ComponentKind {
    pub fn builtin() -> [ComponentKind; 8] {
        [
            ComponentKind::Table,
            ComponentKind::Column,
            ComponentKind::Join,
            ComponentKind::Filter,
            ComponentKind::Aggregate,
            ComponentKind::GroupBy,
            ComponentKind::OrderBy,
            ComponentKind::Limit,
        ]
    }

    pub fn as_str(&self) -> &str {
        match self {
            ComponentKind::Table => "TABLE",
            ComponentKind::Column => "COLUMN",
            ComponentKind::Join => "JOIN",
            ComponentKind::Filter => "FILTER",
            ComponentKind::Aggregate => "AGGREGATE",
            ComponentKind::GroupBy => "GROUP_BY",
            ComponentKind::OrderBy => "ORDER_BY",
            ComponentKind::Limit => "LIMIT",
            ComponentKind::Other(tag) => tag,
        }
    }

    /// Parse a tag; matching is case-insensitive and never fails.
    pub fn parse(tag: &str) -> Self {
        let upper = tag.trim().to_ascii_uppercase();
        Self::builtin()
            .into_iter()
            .find(|k| k.as_str() == upper)
            .unwrap_or_else(|| ComponentKind::Other(tag.trim().to_string()))
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ComponentKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ComponentKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(ComponentKind::parse(&tag))
    }
}

/// One reusable clause instance, as stored in the catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum DslComponent {
    Table(Table),
    Column(Column),
    Join(Join),
    Filter(Filter),
    Aggregate(AggregateFn),
    GroupBy(GroupBy),
    OrderBy(OrderBy),
    Limit(Limit),
    Generic(GenericComponent),
}

impl DslComponent {
    pub fn kind(&self) -> ComponentKind {
        match self {
            DslComponent::Table(_) => ComponentKind::Table,
            DslComponent::Column(_) => ComponentKind::Column,
            DslComponent::Join(_) => ComponentKind::Join,
            DslComponent::Filter(_) => ComponentKind::Filter,
            DslComponent::Aggregate(_) => ComponentKind::Aggregate,
            DslComponent::GroupBy(_) => ComponentKind::GroupBy,
            DslComponent::OrderBy(_) => ComponentKind::OrderBy,
            DslComponent::Limit(_) => ComponentKind::Limit,
            DslComponent::Generic(g) => ComponentKind::parse(&g.kind),
        }
    }

    /// The label used as retrieval key and when rendering query text.
    pub fn text(&self) -> &str {
        match self {
            DslComponent::Table(c) => &c.text,
            DslComponent::Column(c) => &c.text,
            DslComponent::Join(c) => &c.text,
            DslComponent::Filter(c) => &c.text,
            DslComponent::Aggregate(c) => &c.text,
            DslComponent::GroupBy(c) => &c.text,
            DslComponent::OrderBy(c) => &c.text,
            DslComponent::Limit(c) => &c.text,
            DslComponent::Generic(c) => &c.text,
        }
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            DslComponent::Table(c) => c.alias.as_deref(),
            DslComponent::Column(c) => c.alias.as_deref(),
            DslComponent::Join(c) => c.alias.as_deref(),
            DslComponent::Filter(c) => c.alias.as_deref(),
            DslComponent::Aggregate(c) => c.alias.as_deref(),
            DslComponent::GroupBy(c) => c.alias.as_deref(),
            DslComponent::OrderBy(c) => c.alias.as_deref(),
            DslComponent::Limit(c) => c.alias.as_deref(),
            DslComponent::Generic(c) => c.alias.as_deref(),
        }
    }

    /// Check the structural invariants of the component's kind.
    pub fn validate(&self) -> Result<()> {
        let malformed = |reason: &str| Error::MalformedComponent {
            kind: self.kind(),
            reason: reason.to_string(),
        };
        match self {
            DslComponent::Table(t) if t.table_name.is_empty() => Err(malformed("empty table_name")),
            DslComponent::Column(c) if c.column_name.is_empty() => {
                Err(malformed("empty column_name"))
            }
            DslComponent::Join(j) if j.join_condition.is_empty() => {
                Err(malformed("join_condition must not be empty"))
            }
            DslComponent::Filter(f) => check_filter_value(f).map_err(|r| malformed(&r)),
            DslComponent::GroupBy(g) if g.columns.is_empty() => {
                Err(malformed("group by needs at least one column"))
            }
            DslComponent::OrderBy(o) if o.columns.is_empty() => {
                Err(malformed("order by needs at least one column"))
            }
            DslComponent::Limit(l) if l.limit == 0 => Err(malformed("limit must be positive")),
            _ => Ok(()),
        }
    }

    /// Build a component from its tagged JSON form.
    pub fn from_value(value: Value) -> Result<Self> {
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::MalformedComponent {
                kind: ComponentKind::Other(String::new()),
                reason: "missing `type` tag".to_string(),
            })?;
        let kind = ComponentKind::parse(&tag);

        fn typed<T: serde::de::DeserializeOwned>(kind: &ComponentKind, value: Value) -> Result<T> {
            serde_json::from_value(value).map_err(|e| Error::MalformedComponent {
                kind: kind.clone(),
                reason: e.to_string(),
            })
        }

        let component = match kind {
            ComponentKind::Table => DslComponent::Table(typed(&kind, value)?),
            ComponentKind::Column => DslComponent::Column(typed(&kind, value)?),
            ComponentKind::Join => DslComponent::Join(typed(&kind, value)?),
            ComponentKind::Filter => DslComponent::Filter(typed(&kind, value)?),
            ComponentKind::Aggregate => DslComponent::Aggregate(typed(&kind, value)?),
            ComponentKind::GroupBy => DslComponent::GroupBy(typed(&kind, value)?),
            ComponentKind::OrderBy => DslComponent::OrderBy(typed(&kind, value)?),
            ComponentKind::Limit => DslComponent::Limit(typed(&kind, value)?),
            ComponentKind::Other(_) => DslComponent::Generic(GenericComponent {
                kind: tag,
                text: value
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                alias: value
                    .get("alias")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }),
        };
        Ok(component)
    }

    /// Tagged JSON form: the variant's fields plus `"type"`.
    pub fn to_value(&self) -> Result<Value> {
        let mut value = match self {
            DslComponent::Table(c) => serde_json::to_value(c)?,
            DslComponent::Column(c) => serde_json::to_value(c)?,
            DslComponent::Join(c) => serde_json::to_value(c)?,
            DslComponent::Filter(c) => serde_json::to_value(c)?,
            DslComponent::Aggregate(c) => serde_json::to_value(c)?,
            DslComponent::GroupBy(c) => serde_json::to_value(c)?,
            DslComponent::OrderBy(c) => serde_json::to_value(c)?,
            DslComponent::Limit(c) => serde_json::to_value(c)?,
            DslComponent::Generic(c) => {
                let mut map = serde_json::Map::new();
                map.insert("text".to_string(), Value::String(c.text.clone()));
                if let Some(alias) = &c.alias {
                    map.insert("alias".to_string(), Value::String(alias.clone()));
                }
                Value::Object(map)
            }
        };
        if let Value::Object(map) = &mut value {
            map.insert(
                "type".to_string(),
                Value::String(self.kind().as_str().to_string()),
            );
        }
        Ok(value)
    }
}

fn check_filter_value(filter: &Filter) -> std::result::Result<(), String> {
    match filter.operator {
        Operator::Between | Operator::NotBetween => match filter.value.as_list() {
            Some(items) if items.len() == 2 => Ok(()),
            _ => Err(format!("{} needs a two-element list", filter.operator)),
        },
        Operator::In | Operator::NotIn => match filter.value.as_list() {
            Some(items) if !items.is_empty() => Ok(()),
            _ => Err(format!("{} needs a non-empty list", filter.operator)),
        },
        Operator::IsNull | Operator::IsNotNull => {
            if filter.value.is_null() {
                Ok(())
            } else {
                Err(format!("{} takes no value", filter.operator))
            }
        }
        _ => {
            if filter.value.is_scalar() {
                Ok(())
            } else {
                Err(format!("{} needs a scalar value", filter.operator))
            }
        }
    }
}

impl Serialize for DslComponent {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value()
            .map_err(ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DslComponent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        DslComponent::from_value(value).map_err(de::Error::custom)
    }
}

macro_rules! impl_from_variant {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for DslComponent {
            fn from(c: $ty) -> Self {
                DslComponent::$variant(c)
            }
        })*
    };
}

impl_from_variant! {
    Table => Table,
    Column => Column,
    Join => Join,
    Filter => Filter,
    AggregateFn => Aggregate,
    GroupBy => GroupBy,
    OrderBy => OrderBy,
    Limit => Limit,
}

impl From<SelectItem> for DslComponent {
    fn from(item: SelectItem) -> Self {
        match item {
            SelectItem::Column(c) => DslComponent::Column(c),
            SelectItem::Aggregate(a) => DslComponent::Aggregate(a),
        }
    }
}

impl Serialize for SelectItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        DslComponent::from(self.clone()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SelectItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match DslComponent::deserialize(deserializer)? {
            DslComponent::Column(c) => Ok(SelectItem::Column(c)),
            DslComponent::Aggregate(a) => Ok(SelectItem::Aggregate(a)),
            other => Err(de::Error::custom(format!(
                "select items must be COLUMN or AGGREGATE, got {}",
                other.kind()
            ))),
        }
    }
}

/// Wire form of a query. `rendered_text` is accepted but ignored.
#[derive(Deserialize)]
struct DslQueryRepr {
    #[serde(default)]
    select: Vec<SelectItem>,
    #[serde(default, rename = "from")]
    from: Vec<Table>,
    #[serde(default)]
    joins: Vec<Join>,
    #[serde(default, rename = "where")]
    where_: Vec<Filter>,
    #[serde(default)]
    group_by: Option<GroupBy>,
    #[serde(default)]
    having: Vec<Filter>,
    #[serde(default)]
    order_by: Option<OrderBy>,
    #[serde(default)]
    limit: Option<Limit>,
    #[serde(default)]
    original_text: String,
}

impl Serialize for DslQuery {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DslQuery", 10)?;
        state.serialize_field("select", &self.select)?;
        state.serialize_field("from", &self.from)?;
        state.serialize_field("joins", &self.joins)?;
        state.serialize_field("where", &self.where_)?;
        state.serialize_field("group_by", &self.group_by)?;
        state.serialize_field("having", &self.having)?;
        state.serialize_field("order_by", &self.order_by)?;
        state.serialize_field("limit", &self.limit)?;
        state.serialize_field("original_text", &self.original_text)?;
        state.serialize_field("rendered_text", &self.rendered_text())?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for DslQuery {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let repr = DslQueryRepr::deserialize(deserializer)?;
        Ok(DslQuery {
            select: repr.select,
            from: repr.from,
            joins: repr.joins,
            where_: repr.where_,
            group_by: repr.group_by,
            having: repr.having,
            order_by: repr.order_by,
            limit: repr.limit,
            original_text: repr.original_text,
        })
    }
}

/// Convenience for filters built in tests and seeders.
pub(crate) fn timeframe_filter(column: Column, timeframe: &str, text: String) -> Filter {
    Filter {
        column,
        operator: Operator::Equals,
        value: FilterValue::timeframe(timeframe),
        conjunction: Conjunction::And,
        alias: None,
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(component: DslComponent) {
        let json = serde_json::to_string(&component).unwrap();
        let back: DslComponent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, component, "round trip changed {}", json);
    }

    fn sample_join() -> Join {
        Join {
            left_table: Table::named("orders"),
            right_table: Table {
                table_name: "customers".into(),
                alias: Some("c".into()),
                text: "customers".into(),
            },
            join_type: JoinType::Left,
            join_condition: vec![JoinCondition {
                left_column: "customer_id".into(),
                right_column: "id".into(),
            }],
            alias: None,
            text: "Join orders with customers".into(),
        }
    }

    #[test]
    fn test_every_variant_round_trips() {
        let col = Column::qualified("sales", "amount");
        round_trip(Table::named("sales").into());
        round_trip(
            Column {
                alias: Some("amt".into()),
                ..col.clone()
            }
            .into(),
        );
        round_trip(sample_join().into());
        round_trip(
            Filter::new(col.clone(), Operator::Between, FilterValue::list(["10", "20"]))
                .with_conjunction(Conjunction::Or)
                .into(),
        );
        round_trip(
            AggregateFn {
                function: AggregateFunction::Avg,
                column: col.clone(),
                alias: Some("avg_amount".into()),
                text: "average amount".into(),
            }
            .into(),
        );
        round_trip(
            GroupBy {
                columns: vec![col.clone(), Column::named("region")],
                alias: None,
                text: "Group by region".into(),
            }
            .into(),
        );
        round_trip(
            OrderBy {
                columns: vec![col],
                direction: SortDirection::Desc,
                alias: None,
                text: "Order by amount DESC".into(),
            }
            .into(),
        );
        round_trip(
            Limit {
                limit: 25,
                offset: 50,
                alias: None,
                text: "page 3".into(),
            }
            .into(),
        );
        round_trip(DslComponent::Generic(GenericComponent {
            kind: "WINDOW".into(),
            text: "rolling window".into(),
            alias: None,
        }));
    }

    #[test]
    fn test_unknown_kind_becomes_generic() {
        let component: DslComponent =
            serde_json::from_str(r#"{"type":"PIVOT","text":"pivot by month","extra":1}"#).unwrap();
        assert_eq!(component.kind(), ComponentKind::Other("PIVOT".into()));
        assert_eq!(component.text(), "pivot by month");
    }

    #[test]
    fn test_known_kind_with_bad_fields_is_malformed() {
        let err = DslComponent::from_value(serde_json::json!({
            "type": "JOIN",
            "text": "broken join"
        }))
        .unwrap_err();
        match err {
            Error::MalformedComponent { kind, .. } => assert_eq!(kind, ComponentKind::Join),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_missing_tag_is_malformed() {
        let err = DslComponent::from_value(serde_json::json!({"text": "x"})).unwrap_err();
        assert!(matches!(err, Error::MalformedComponent { .. }));
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!(ComponentKind::parse("group_by"), ComponentKind::GroupBy);
        assert_eq!(ComponentKind::parse("Aggregate"), ComponentKind::Aggregate);
        assert_eq!(
            ComponentKind::parse("HINT"),
            ComponentKind::Other("HINT".into())
        );
    }

    #[test]
    fn test_validate_filter_shapes() {
        let col = Column::named("price");
        let ok = Filter::new(col.clone(), Operator::Between, FilterValue::list([1i64, 5]));
        assert!(DslComponent::from(ok).validate().is_ok());

        let bad = Filter::new(col.clone(), Operator::Between, FilterValue::Integer(1));
        assert!(DslComponent::from(bad).validate().is_err());

        let empty_in = Filter::new(col.clone(), Operator::In, FilterValue::List(vec![]));
        assert!(DslComponent::from(empty_in).validate().is_err());

        let null_check = Filter::new(col.clone(), Operator::IsNull, FilterValue::Null);
        assert!(DslComponent::from(null_check).validate().is_ok());

        let tf = timeframe_filter(col, "LAST_MONTH", "price last month".into());
        assert!(DslComponent::from(tf).validate().is_ok());
    }

    #[test]
    fn test_validate_structural_rules() {
        let mut join = sample_join();
        join.join_condition.clear();
        assert!(DslComponent::from(join).validate().is_err());

        let limit = Limit::new(0);
        assert!(DslComponent::from(limit).validate().is_err());

        let group = GroupBy {
            columns: vec![],
            alias: None,
            text: "group".into(),
        };
        assert!(DslComponent::from(group).validate().is_err());
    }

    #[test]
    fn test_select_item_rejects_other_kinds() {
        let json = r#"{"type":"TABLE","table_name":"t","text":"t"}"#;
        assert!(serde_json::from_str::<SelectItem>(json).is_err());
    }

    #[test]
    fn test_query_round_trip_recomputes_rendered_text() {
        let mut q = DslQuery::new("revenue in north america");
        q.select.push(Column::named("revenue").into());
        q.from.push(Table::named("sales"));
        q.where_.push(Filter::new(
            Column::named("region"),
            Operator::Equals,
            "North America",
        ));
        q.limit = Some(Limit::new(10));

        let mut json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["rendered_text"], Value::String(q.rendered_text()));
        json["rendered_text"] = Value::String("stale".into());

        let back: DslQuery = serde_json::from_value(json).unwrap();
        assert_eq!(back, q);
        assert_eq!(back.rendered_text(), q.rendered_text());
    }
}
