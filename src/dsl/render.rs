//! Canonical text of a query, built from the component labels.
//!
//! Sections are emitted in SQL clause order and joined with `" ; "`.
//! Empty clauses are left out, so a query with no clauses renders as the
//! empty string.

use super::types::{DslQuery, Filter, SelectItem};

pub fn render_text(query: &DslQuery) -> String {
    let mut parts = Vec::new();

    if !query.select.is_empty() {
        let items: Vec<&str> = query.select.iter().map(SelectItem::text).collect();
        parts.push(format!("SELECT {}", items.join(", ")));
    }

    if !query.from.is_empty() {
        let tables: Vec<&str> = query.from.iter().map(|t| t.text.as_str()).collect();
        parts.push(format!("FROM {}", tables.join(", ")));
    }

    if !query.joins.is_empty() {
        let joins: Vec<&str> = query.joins.iter().map(|j| j.text.as_str()).collect();
        parts.push(format!("JOIN {}", joins.join(" AND ")));
    }

    if !query.where_.is_empty() {
        parts.push(format!("WHERE {}", filter_labels(&query.where_)));
    }

    if let Some(group_by) = &query.group_by {
        parts.push(group_by.text.clone());
    }

    if !query.having.is_empty() {
        parts.push(format!("HAVING {}", filter_labels(&query.having)));
    }

    if let Some(order_by) = &query.order_by {
        parts.push(order_by.text.clone());
    }

    if let Some(limit) = &query.limit {
        parts.push(limit.text.clone());
    }

    parts.join(" ; ")
}

fn filter_labels(filters: &[Filter]) -> String {
    let labels: Vec<&str> = filters.iter().map(|f| f.text.as_str()).collect();
    labels.join(" AND ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::types::*;

    #[test]
    fn test_empty_query_renders_empty() {
        assert_eq!(render_text(&DslQuery::default()), "");
    }

    #[test]
    fn test_sections_in_clause_order() {
        let mut q = DslQuery::new("top regions");
        q.limit = Some(Limit::new(5));
        q.from.push(Table::named("sales"));
        q.select.push(Column::named("region").into());
        q.select.push(Column::named("revenue").into());
        q.order_by = Some(OrderBy {
            columns: vec![Column::named("revenue")],
            direction: SortDirection::Desc,
            alias: None,
            text: "Order by revenue DESC".into(),
        });

        assert_eq!(
            render_text(&q),
            "SELECT region, revenue ; FROM sales ; Order by revenue DESC ; Limit to 5 results"
        );
    }

    #[test]
    fn test_filters_joined_with_and() {
        let mut q = DslQuery::new("");
        q.where_.push(Filter {
            text: "recent".into(),
            ..Filter::new(Column::named("day"), Operator::Equals, "x")
        });
        q.where_.push(Filter {
            text: "cheap".into(),
            ..Filter::new(Column::named("price"), Operator::LessThan, 5i64)
        });
        assert_eq!(render_text(&q), "WHERE recent AND cheap");
    }
}
