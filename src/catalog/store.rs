//! The component catalog: per-kind entry lists searched by cosine similarity.
//!
//! Each kind owns a writer mutex and an immutable snapshot behind a
//! read-write lock. Writers embed and flush without touching the snapshot
//! lock, then swap a new snapshot in. Readers clone the snapshot handle and
//! scan without holding any lock, so searches never wait on embedding or
//! disk I/O.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::embedding::{cosine_similarity, Embedder, EmbeddingError};
use super::storage::{CatalogEntry, CatalogStorage};
use crate::dsl::{ComponentKind, DslComponent};
use crate::error::{Error, Result};

#[derive(Default)]
struct KindStore {
    write_lock: Mutex<()>,
    entries: RwLock<Arc<Vec<CatalogEntry>>>,
}

impl KindStore {
    fn with_entries(entries: Vec<CatalogEntry>) -> Self {
        Self {
            write_lock: Mutex::new(()),
            entries: RwLock::new(Arc::new(entries)),
        }
    }

    fn snapshot(&self) -> Arc<Vec<CatalogEntry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace(&self, entries: Vec<CatalogEntry>) {
        *self.entries.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(entries);
    }
}

/// A search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredComponent {
    pub component: DslComponent,
    pub text: String,
    pub score: f32,
}

/// Catalog of reusable components keyed by kind.
pub struct ComponentCatalog {
    embedder: Arc<dyn Embedder>,
    storage: Option<Box<dyn CatalogStorage>>,
    kinds: RwLock<HashMap<ComponentKind, Arc<KindStore>>>,
}

impl ComponentCatalog {
    /// A catalog that lives only in memory.
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            storage: None,
            kinds: RwLock::new(HashMap::new()),
        }
    }

    /// Open a persistent catalog, reloading every stored kind.
    pub fn open(embedder: Arc<dyn Embedder>, storage: Box<dyn CatalogStorage>) -> Result<Self> {
        let mut kinds = HashMap::new();
        let mut total = 0;
        for (kind, entries) in storage.load_all()? {
            total += entries.len();
            if kinds.contains_key(&kind) {
                return Err(Error::DuplicateKind {
                    kind,
                    path: None,
                });
            }
            kinds.insert(kind, Arc::new(KindStore::with_entries(entries)));
        }
        tracing::info!(
            kinds = kinds.len(),
            entries = total,
            embedder = embedder.name(),
            "opened component catalog"
        );
        Ok(Self {
            embedder,
            storage: Some(storage),
            kinds: RwLock::new(kinds),
        })
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    fn store(&self, kind: &ComponentKind) -> Option<Arc<KindStore>> {
        self.kinds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .cloned()
    }

    fn store_or_insert(&self, kind: &ComponentKind) -> Arc<KindStore> {
        if let Some(store) = self.store(kind) {
            return store;
        }
        self.kinds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind.clone())
            .or_default()
            .clone()
    }

    pub fn add(&self, component: DslComponent) -> Result<()> {
        self.add_batch(vec![component])
    }

    /// Add components, grouped by kind.
    ///
    /// Every component is validated before anything is embedded; a
    /// malformed one rejects the whole call. Each kind's group is then
    /// committed on its own: an embedding or storage failure leaves that
    /// kind exactly as it was, while groups committed earlier in the same
    /// call stay committed.
    pub fn add_batch(&self, components: Vec<DslComponent>) -> Result<()> {
        for component in &components {
            component.validate()?;
        }

        let mut groups: BTreeMap<ComponentKind, Vec<DslComponent>> = BTreeMap::new();
        for component in components {
            groups.entry(component.kind()).or_default().push(component);
        }

        for (kind, group) in groups {
            self.commit_kind(&kind, group)?;
        }
        Ok(())
    }

    fn commit_kind(&self, kind: &ComponentKind, components: Vec<DslComponent>) -> Result<()> {
        let store = self.store_or_insert(kind);
        let _writer = store.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let texts: Vec<&str> = components.iter().map(DslComponent::text).collect();
        let vectors = self
            .embedder
            .embed_batch(&texts)
            .and_then(|vectors| self.check_dimensions(vectors, texts.len()))
            .map_err(|source| Error::EmbeddingUnavailable {
                kind: kind.clone(),
                source,
            })?;

        let current = store.snapshot();
        let mut next = Vec::with_capacity(current.len() + components.len());
        next.extend(current.iter().cloned());
        let added = components.len();
        next.extend(
            components
                .into_iter()
                .zip(vectors)
                .map(|(component, vector)| CatalogEntry {
                    text: component.text().to_string(),
                    vector,
                    component,
                }),
        );

        if let Some(storage) = &self.storage {
            storage.flush(kind, &next)?;
        }
        let total = next.len();
        store.replace(next);
        tracing::info!(kind = %kind, added, total, "catalog entries committed");
        Ok(())
    }

    fn check_dimensions(
        &self,
        vectors: Vec<Vec<f32>>,
        expected_len: usize,
    ) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
        if vectors.len() != expected_len {
            return Err(EmbeddingError::Unavailable(format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                expected_len
            )));
        }
        let expected = self.embedder.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }
        Ok(vectors)
    }

    /// Up to `top_k` components of `kind`, most similar to `query` first.
    ///
    /// Ties keep insertion order. Entries with a zero-norm vector or a
    /// vector of the wrong length are never returned. An unknown or empty
    /// kind yields an empty list without calling the embedder.
    pub fn search(&self, query: &str, kind: &ComponentKind, top_k: usize) -> Result<Vec<DslComponent>> {
        Ok(self
            .search_scored(query, kind, top_k)?
            .into_iter()
            .map(|hit| hit.component)
            .collect())
    }

    pub fn search_scored(
        &self,
        query: &str,
        kind: &ComponentKind,
        top_k: usize,
    ) -> Result<Vec<ScoredComponent>> {
        let entries = match self.store(kind) {
            Some(store) => store.snapshot(),
            None => return Ok(Vec::new()),
        };
        if entries.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self
            .embedder
            .embed(query)
            .map_err(|source| Error::EmbeddingUnavailable {
                kind: kind.clone(),
                source,
            })?;

        let mut skipped = 0usize;
        let mut scored: Vec<(f32, &CatalogEntry)> = Vec::with_capacity(entries.len());
        for entry in entries.iter() {
            match cosine_similarity(&query_vector, &entry.vector) {
                Some(score) if !score.is_nan() => scored.push((score, entry)),
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::warn!(kind = %kind, skipped, "entries with unusable vectors skipped");
        }

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        scored.truncate(top_k);

        tracing::debug!(kind = %kind, hits = scored.len(), query, "catalog search");
        Ok(scored
            .into_iter()
            .map(|(score, entry)| ScoredComponent {
                component: entry.component.clone(),
                text: entry.text.clone(),
                score,
            })
            .collect())
    }

    /// Search every non-empty kind; kinds with no hits are left out.
    pub fn search_all(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<BTreeMap<ComponentKind, Vec<DslComponent>>> {
        let mut results = BTreeMap::new();
        for kind in self.kinds() {
            let hits = self.search(query, &kind, top_k)?;
            if !hits.is_empty() {
                results.insert(kind, hits);
            }
        }
        Ok(results)
    }

    /// Remove the entries of one kind, or of every kind.
    pub fn clear(&self, kind: Option<&ComponentKind>) -> Result<()> {
        let targets: Vec<(ComponentKind, Arc<KindStore>)> = {
            let kinds = self.kinds.read().unwrap_or_else(PoisonError::into_inner);
            match kind {
                Some(k) => kinds
                    .get(k)
                    .map(|s| vec![(k.clone(), s.clone())])
                    .unwrap_or_default(),
                None => kinds.iter().map(|(k, s)| (k.clone(), s.clone())).collect(),
            }
        };

        for (kind, store) in targets {
            let _writer = store.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(storage) = &self.storage {
                storage.remove(&kind)?;
            }
            store.replace(Vec::new());
            tracing::info!(kind = %kind, "catalog kind cleared");
        }
        Ok(())
    }

    pub fn len(&self, kind: &ComponentKind) -> usize {
        self.store(kind).map_or(0, |s| s.snapshot().len())
    }

    pub fn is_empty(&self) -> bool {
        self.kinds().is_empty()
    }

    /// Kinds that currently hold at least one entry, sorted.
    pub fn kinds(&self) -> Vec<ComponentKind> {
        let kinds = self.kinds.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<ComponentKind> = kinds
            .iter()
            .filter(|(_, store)| !store.snapshot().is_empty())
            .map(|(kind, _)| kind.clone())
            .collect();
        names.sort();
        names
    }

    /// Snapshot of every entry of `kind` in insertion order.
    pub fn entries(&self, kind: &ComponentKind) -> Vec<CatalogEntry> {
        self.store(kind)
            .map(|s| s.snapshot().as_ref().clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::embedding::HashingEmbedder;
    use crate::catalog::storage::JsonDirStorage;
    use crate::dsl::types::GenericComponent;
    use crate::dsl::{Column, Filter, GroupBy, JoinCondition, Operator, Table};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use tempfile::TempDir;

    fn hashing() -> Arc<dyn Embedder> {
        Arc::new(HashingEmbedder::new(128))
    }

    fn table(name: &str, text: &str) -> DslComponent {
        DslComponent::Table(Table {
            table_name: name.into(),
            alias: None,
            text: text.into(),
        })
    }

    fn column(name: &str) -> DslComponent {
        DslComponent::Column(Column::named(name))
    }

    /// Embeds everything to the same vector.
    struct ConstantEmbedder;

    impl Embedder for ConstantEmbedder {
        fn name(&self) -> &str {
            "constant"
        }
        fn dimension(&self) -> usize {
            2
        }
        fn embed(&self, _text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
            Ok(vec![1.0, 1.0])
        }
    }

    /// Fails on any text containing "boom".
    struct FlakyEmbedder {
        inner: HashingEmbedder,
        calls: AtomicUsize,
    }

    impl Embedder for FlakyEmbedder {
        fn name(&self) -> &str {
            "flaky"
        }
        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
        fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            if text.contains("boom") {
                return Err(EmbeddingError::Unavailable("model offline".into()));
            }
            self.inner.embed(text)
        }
    }

    #[test]
    fn test_exact_match_ranks_first() {
        let catalog = ComponentCatalog::in_memory(hashing());
        catalog
            .add_batch(vec![
                table("customers", "customer contact details"),
                table("inventory", "warehouse stock levels"),
                table("sales", "sales revenue by region"),
                table("staff", "employee payroll records"),
            ])
            .unwrap();

        let hits = catalog
            .search_scored("sales revenue by region", &ComponentKind::Table, 3)
            .unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].text, "sales revenue by region");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let catalog = ComponentCatalog::in_memory(Arc::new(ConstantEmbedder));
        catalog
            .add_batch(vec![column("first"), column("second"), column("third")])
            .unwrap();

        let hits = catalog.search("anything", &ComponentKind::Column, 2).unwrap();
        assert_eq!(hits, vec![column("first"), column("second")]);
    }

    #[test]
    fn test_unknown_or_cleared_kind_returns_empty() {
        let catalog = ComponentCatalog::in_memory(hashing());
        assert!(catalog
            .search("anything", &ComponentKind::Column, 5)
            .unwrap()
            .is_empty());

        catalog.add(column("revenue")).unwrap();
        catalog.clear(Some(&ComponentKind::Column)).unwrap();
        assert!(catalog
            .search("anything", &ComponentKind::Column, 5)
            .unwrap()
            .is_empty());
        assert_eq!(catalog.len(&ComponentKind::Column), 0);
        assert!(catalog.kinds().is_empty());
    }

    #[test]
    fn test_empty_kind_never_calls_embedder() {
        let embedder = Arc::new(FlakyEmbedder {
            inner: HashingEmbedder::new(32),
            calls: AtomicUsize::new(0),
        });
        let catalog = ComponentCatalog::in_memory(embedder.clone());
        catalog.search("boom", &ComponentKind::Filter, 3).unwrap();
        assert_eq!(embedder.calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn test_failed_batch_commits_nothing_for_kind() {
        let temp_dir = TempDir::new().unwrap();
        let embedder = Arc::new(FlakyEmbedder {
            inner: HashingEmbedder::new(64),
            calls: AtomicUsize::new(0),
        });
        let storage = JsonDirStorage::open(temp_dir.path()).unwrap();
        let catalog = ComponentCatalog::open(embedder, Box::new(storage)).unwrap();
        catalog.add(table("sales", "sales table")).unwrap();

        let err = catalog
            .add_batch(vec![
                table("orders", "orders table"),
                table("broken", "boom table"),
            ])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::EmbeddingUnavailable {
                kind: ComponentKind::Table,
                ..
            }
        ));
        assert_eq!(catalog.len(&ComponentKind::Table), 1);

        let reopened = ComponentCatalog::open(
            hashing(),
            Box::new(JsonDirStorage::open(temp_dir.path()).unwrap()),
        )
        .unwrap();
        assert_eq!(reopened.len(&ComponentKind::Table), 1);
    }

    #[test]
    fn test_malformed_component_rejects_call() {
        let catalog = ComponentCatalog::in_memory(hashing());
        let bad_join = DslComponent::Join(crate::dsl::Join {
            left_table: Table::named("a"),
            right_table: Table::named("b"),
            join_type: Default::default(),
            join_condition: Vec::<JoinCondition>::new(),
            alias: None,
            text: "a with b".into(),
        });
        let err = catalog
            .add_batch(vec![column("ok"), bad_join])
            .unwrap_err();
        assert!(matches!(err, Error::MalformedComponent { .. }));
        assert_eq!(catalog.len(&ComponentKind::Column), 0);
    }

    #[test]
    fn test_reload_restores_identical_state() {
        let temp_dir = TempDir::new().unwrap();
        let filter = DslComponent::Filter(Filter::new(
            Column::qualified("orders", "total"),
            Operator::GreaterThan,
            100i64,
        ));
        {
            let storage = JsonDirStorage::open(temp_dir.path()).unwrap();
            let catalog = ComponentCatalog::open(hashing(), Box::new(storage)).unwrap();
            catalog
                .add_batch(vec![
                    table("orders", "orders table"),
                    column("total"),
                    filter.clone(),
                ])
                .unwrap();
        }

        let storage = JsonDirStorage::open(temp_dir.path()).unwrap();
        let catalog = ComponentCatalog::open(hashing(), Box::new(storage)).unwrap();
        assert_eq!(
            catalog.kinds(),
            vec![
                ComponentKind::Table,
                ComponentKind::Column,
                ComponentKind::Filter
            ]
        );
        let entries = catalog.entries(&ComponentKind::Filter);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].component, filter);
        assert_eq!(
            entries[0].vector,
            HashingEmbedder::new(128).embed(filter.text()).unwrap()
        );
    }

    #[test]
    fn test_lookalike_generic_kind_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let lookalike = ComponentKind::Other("group-by".into());
        let group_by = DslComponent::GroupBy(GroupBy {
            columns: vec![Column::named("region")],
            alias: None,
            text: "Group by region".into(),
        });
        let generic = DslComponent::Generic(GenericComponent {
            kind: "group-by".into(),
            text: "group by region, hyphenated".into(),
            alias: None,
        });
        {
            let storage = JsonDirStorage::open(temp_dir.path()).unwrap();
            let catalog = ComponentCatalog::open(hashing(), Box::new(storage)).unwrap();
            catalog.add(group_by.clone()).unwrap();
            catalog.add(generic.clone()).unwrap();
            assert_eq!(catalog.len(&ComponentKind::GroupBy), 1);
            assert_eq!(catalog.len(&lookalike), 1);
        }

        let storage = JsonDirStorage::open(temp_dir.path()).unwrap();
        let catalog = ComponentCatalog::open(hashing(), Box::new(storage)).unwrap();
        assert_eq!(catalog.entries(&ComponentKind::GroupBy)[0].component, group_by);
        assert_eq!(catalog.entries(&lookalike)[0].component, generic);
    }

    /// Reports the same kind twice.
    struct DoubledStorage;

    impl CatalogStorage for DoubledStorage {
        fn load_all(&self) -> Result<Vec<(ComponentKind, Vec<CatalogEntry>)>> {
            Ok(vec![
                (ComponentKind::Limit, Vec::new()),
                (ComponentKind::Limit, Vec::new()),
            ])
        }
        fn flush(&self, _kind: &ComponentKind, _entries: &[CatalogEntry]) -> Result<()> {
            Ok(())
        }
        fn remove(&self, _kind: &ComponentKind) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_open_rejects_duplicate_kinds() {
        assert!(matches!(
            ComponentCatalog::open(hashing(), Box::new(DoubledStorage)),
            Err(Error::DuplicateKind {
                kind: ComponentKind::Limit,
                ..
            })
        ));
    }

    #[test]
    fn test_clear_all_removes_files() {
        let temp_dir = TempDir::new().unwrap();
        let storage = JsonDirStorage::open(temp_dir.path()).unwrap();
        let catalog = ComponentCatalog::open(hashing(), Box::new(storage)).unwrap();
        catalog
            .add_batch(vec![table("t", "t table"), column("c")])
            .unwrap();
        catalog.clear(None).unwrap();

        assert!(catalog.is_empty());
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_search_all_groups_by_kind() {
        let catalog = ComponentCatalog::in_memory(hashing());
        catalog
            .add_batch(vec![table("sales", "sales table"), column("region")])
            .unwrap();
        let results = catalog.search_all("sales by region", 1).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[&ComponentKind::Table].len(), 1);
    }

    #[test]
    fn test_dimension_mismatch_is_embedding_error() {
        struct ShortEmbedder;
        impl Embedder for ShortEmbedder {
            fn name(&self) -> &str {
                "short"
            }
            fn dimension(&self) -> usize {
                4
            }
            fn embed(&self, _text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
                Ok(vec![1.0])
            }
        }
        let catalog = ComponentCatalog::in_memory(Arc::new(ShortEmbedder));
        assert!(matches!(
            catalog.add(column("x")),
            Err(Error::EmbeddingUnavailable { .. })
        ));
    }

    #[test]
    fn test_concurrent_writers_keep_lists_aligned() {
        let catalog = Arc::new(ComponentCatalog::in_memory(hashing()));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let catalog = catalog.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        catalog.add(column(&format!("c_{}_{}", t, i))).unwrap();
                        catalog.search("c_1", &ComponentKind::Column, 3).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let entries = catalog.entries(&ComponentKind::Column);
        assert_eq!(entries.len(), 100);
        assert!(entries.iter().all(|e| e.text == e.component.text()));
    }
}
