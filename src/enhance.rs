/// Retrieval-based enhancement of provisional queries.
///
/// Runs a fixed, ordered list of rules over a provisional [`DslQuery`].
/// Each rule checks one gap in the provisional query and, when the gap is
/// present, fills it from the component catalog. Rules only populate empty
/// clauses, except [`Rule::Aggregates`] which replaces the select list when
/// the text asks for an aggregate the front end did not detect.
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::ComponentCatalog;
use crate::dsl::*;
use crate::error::Result;

const AGGREGATE_WORDS: [&str; 3] = ["aggregate", "count", "sum"];
const ORDER_WORDS: [&str; 2] = ["order", "sort"];

/// The enhancement rules, in the order they are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    Tables,
    Columns,
    Joins,
    Filters,
    Aggregates,
    GroupBy,
    OrderBy,
}

impl Rule {
    pub const ALL: [Rule; 7] = [
        Rule::Tables,
        Rule::Columns,
        Rule::Joins,
        Rule::Filters,
        Rule::Aggregates,
        Rule::GroupBy,
        Rule::OrderBy,
    ];

    /// The catalog kind this rule retrieves.
    pub fn kind(&self) -> ComponentKind {
        match self {
            Rule::Tables => ComponentKind::Table,
            Rule::Columns => ComponentKind::Column,
            Rule::Joins => ComponentKind::Join,
            Rule::Filters => ComponentKind::Filter,
            Rule::Aggregates => ComponentKind::Aggregate,
            Rule::GroupBy => ComponentKind::GroupBy,
            Rule::OrderBy => ComponentKind::OrderBy,
        }
    }

    /// The query clause this rule writes.
    pub fn clause(&self) -> &'static str {
        match self {
            Rule::Tables => "from",
            Rule::Columns | Rule::Aggregates => "select",
            Rule::Joins => "joins",
            Rule::Filters => "where",
            Rule::GroupBy => "group_by",
            Rule::OrderBy => "order_by",
        }
    }

    /// Whether the rule fires for `query`. `key` is the lowercased
    /// retrieval key.
    fn applies(&self, query: &DslQuery, key: &str) -> bool {
        match self {
            Rule::Tables => query.from.is_empty(),
            Rule::Columns => query.select.is_empty(),
            Rule::Joins => query.from.len() >= 2 && query.joins.is_empty(),
            Rule::Filters => query.where_.is_empty(),
            Rule::Aggregates => {
                AGGREGATE_WORDS.iter().any(|w| key.contains(w)) && !query.has_aggregate()
            }
            Rule::GroupBy => key.contains("group") && query.group_by.is_none(),
            Rule::OrderBy => ORDER_WORDS.iter().any(|w| key.contains(w)) && query.order_by.is_none(),
        }
    }
}

/// How many components each rule retrieves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementLimits {
    pub tables: usize,
    pub columns: usize,
    pub joins: usize,
    pub filters: usize,
    pub aggregates: usize,
    pub group_by: usize,
    pub order_by: usize,
}

impl Default for EnhancementLimits {
    fn default() -> Self {
        Self {
            tables: 3,
            columns: 5,
            joins: 3,
            filters: 3,
            aggregates: 3,
            group_by: 2,
            order_by: 2,
        }
    }
}

impl EnhancementLimits {
    pub fn top_k(&self, rule: Rule) -> usize {
        match rule {
            Rule::Tables => self.tables,
            Rule::Columns => self.columns,
            Rule::Joins => self.joins,
            Rule::Filters => self.filters,
            Rule::Aggregates => self.aggregates,
            Rule::GroupBy => self.group_by,
            Rule::OrderBy => self.order_by,
        }
    }
}

/// One clause filled from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub rule: Rule,
    pub clause: &'static str,
    pub kind: ComponentKind,
    pub count: usize,
}

/// The enhanced query and what was changed to get there.
#[derive(Debug, Clone, PartialEq)]
pub struct Enhancement {
    pub query: DslQuery,
    pub substitutions: Vec<Substitution>,
}

pub struct Enhancer {
    catalog: Arc<ComponentCatalog>,
    limits: EnhancementLimits,
}

impl Enhancer {
    pub fn new(catalog: Arc<ComponentCatalog>, limits: EnhancementLimits) -> Self {
        Self { catalog, limits }
    }

    pub fn limits(&self) -> &EnhancementLimits {
        &self.limits
    }

    /// Build an enhanced copy of `provisional`.
    ///
    /// All rule conditions are checked against `provisional` itself, then
    /// the fills are applied in rule order. A retrieval miss leaves the
    /// clause as it was.
    pub fn enhance(&self, provisional: &DslQuery) -> Result<Enhancement> {
        let key = retrieval_key(provisional);
        let lowered = key.to_lowercase();

        let mut query = provisional.clone();
        let mut substitutions = Vec::new();

        for rule in Rule::ALL {
            if !rule.applies(provisional, &lowered) {
                continue;
            }
            let kind = rule.kind();
            let hits = self.catalog.search(&key, &kind, self.limits.top_k(rule))?;
            let count = apply(rule, &mut query, hits);
            if count == 0 {
                tracing::debug!(rule = ?rule, kind = %kind, "no catalog match");
                continue;
            }
            tracing::debug!(rule = ?rule, clause = rule.clause(), count, "clause filled from catalog");
            substitutions.push(Substitution {
                rule,
                clause: rule.clause(),
                kind,
                count,
            });
        }

        Ok(Enhancement {
            query,
            substitutions,
        })
    }
}

/// Canonical text of the query, or its source text when no clause is set.
pub fn retrieval_key(query: &DslQuery) -> String {
    let rendered = query.rendered_text();
    if rendered.is_empty() {
        query.original_text.clone()
    } else {
        rendered
    }
}

/// Write `hits` into the clause owned by `rule`; returns how many
/// components were used.
fn apply(rule: Rule, query: &mut DslQuery, hits: Vec<DslComponent>) -> usize {
    match rule {
        Rule::Tables => {
            let tables: Vec<Table> = hits
                .into_iter()
                .filter_map(|c| match c {
                    DslComponent::Table(t) => Some(t),
                    _ => None,
                })
                .collect();
            fill(&mut query.from, tables)
        }
        Rule::Columns => {
            let columns: Vec<SelectItem> = hits
                .into_iter()
                .filter_map(|c| match c {
                    DslComponent::Column(col) => Some(SelectItem::Column(col)),
                    _ => None,
                })
                .collect();
            fill(&mut query.select, columns)
        }
        Rule::Joins => {
            let joins: Vec<Join> = hits
                .into_iter()
                .filter_map(|c| match c {
                    DslComponent::Join(j) => Some(j),
                    _ => None,
                })
                .collect();
            fill(&mut query.joins, joins)
        }
        Rule::Filters => {
            let filters: Vec<Filter> = hits
                .into_iter()
                .filter_map(|c| match c {
                    DslComponent::Filter(f) => Some(f),
                    _ => None,
                })
                .collect();
            fill(&mut query.where_, filters)
        }
        Rule::Aggregates => {
            let aggregates: Vec<SelectItem> = hits
                .into_iter()
                .filter_map(|c| match c {
                    DslComponent::Aggregate(a) => Some(SelectItem::Aggregate(a)),
                    _ => None,
                })
                .collect();
            fill(&mut query.select, aggregates)
        }
        Rule::GroupBy => {
            let best = hits.into_iter().find_map(|c| match c {
                DslComponent::GroupBy(g) => Some(g),
                _ => None,
            });
            set_best(&mut query.group_by, best)
        }
        Rule::OrderBy => {
            let best = hits.into_iter().find_map(|c| match c {
                DslComponent::OrderBy(o) => Some(o),
                _ => None,
            });
            set_best(&mut query.order_by, best)
        }
    }
}

fn fill<T>(clause: &mut Vec<T>, items: Vec<T>) -> usize {
    if items.is_empty() {
        return 0;
    }
    let count = items.len();
    *clause = items;
    count
}

fn set_best<T>(clause: &mut Option<T>, best: Option<T>) -> usize {
    match best {
        Some(item) => {
            *clause = Some(item);
            1
        }
        None => 0,
    }
}
