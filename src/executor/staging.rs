//! Staging-mode query store.
//!
//! Answers queries from the in-memory dataset snapshot instead of Postgres.
//! The `FROM` table picks a collection through the table map and the
//! materialized SELECT is evaluated over it, so literal predicates,
//! ordering and limits behave as they do in the database.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::evaluate::run_select;
use super::{QueryStore, RawRow};
use crate::dataset::{Collection, SharedDataset};
use crate::error::StoreError;

/// Table name → snapshot collection.
#[derive(Debug, Clone)]
pub struct TableMap(HashMap<String, Collection>);

impl Default for TableMap {
    fn default() -> Self {
        let entries = [
            ("inventory", Collection::Inventory),
            ("inventory_data", Collection::Inventory),
            ("batch_records", Collection::Inventory),
            ("inspection", Collection::Inspection),
            ("lab_tests", Collection::Inspection),
            ("test_tracking", Collection::Inspection),
            ("production", Collection::Production),
            ("online_tracking", Collection::Production),
            ("production_tracking", Collection::Production),
        ];
        Self(
            entries
                .into_iter()
                .map(|(table, c)| (table.to_string(), c))
                .collect(),
        )
    }
}

impl TableMap {
    /// Default map extended (or overridden) by `extra`.
    pub fn with_overrides(extra: impl IntoIterator<Item = (String, Collection)>) -> Self {
        let mut map = Self::default();
        for (table, collection) in extra {
            map.0.insert(table.to_lowercase(), collection);
        }
        map
    }

    /// Resolve a table name, ignoring case and any schema prefix.
    pub fn resolve(&self, table: &str) -> Option<Collection> {
        let table = table.to_lowercase();
        let bare = table.rsplit('.').next().unwrap_or(&table);
        self.0
            .get(table.as_str())
            .or_else(|| self.0.get(bare))
            .copied()
    }
}

pub struct SnapshotQueryStore {
    dataset: Arc<SharedDataset>,
    tables: TableMap,
}

impl SnapshotQueryStore {
    pub fn new(dataset: Arc<SharedDataset>) -> Self {
        Self::with_tables(dataset, TableMap::default())
    }

    pub fn with_tables(dataset: Arc<SharedDataset>, tables: TableMap) -> Self {
        Self { dataset, tables }
    }
}

#[async_trait]
impl QueryStore for SnapshotQueryStore {
    fn name(&self) -> &str {
        "staging"
    }

    async fn run_query(&self, sql: &str, params: &[String]) -> Result<Vec<RawRow>, StoreError> {
        // Pin one generation for the whole query.
        let snapshot = self.dataset.snapshot();
        let rows = run_select(sql, params, &snapshot, &self.tables)?;

        debug!(
            "Staging query (generation {}): {} rows",
            snapshot.generation,
            rows.len()
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intent_router_types::DatasetUpdate;
    use serde_json::{json, Value};

    fn dataset() -> Arc<SharedDataset> {
        let records = |v: Value| -> Vec<RawRow> {
            v.as_array()
                .unwrap()
                .iter()
                .map(|r| r.as_object().unwrap().clone())
                .collect()
        };
        let ds = Arc::new(SharedDataset::new());
        ds.replace(DatasetUpdate {
            inventory: records(json!([
                {"storage_location": "深圳工厂", "material_name": "电池盖", "supplier": "聚龙", "quantity": 500, "inbound_time": "2026-09-01 08:30:00"},
                {"storage_location": "重庆工厂", "material_name": "电池盖", "supplier": "欣旺达", "quantity": 120, "inbound_time": "2026-09-05 09:00:00"},
                {"storage_location": "深圳工厂", "material_name": "LCD显示屏", "supplier": "BOE", "quantity": 80, "inbound_time": "2026-09-03 14:10:00"}
            ])),
            inspection: vec![],
            production: vec![],
        });
        ds
    }

    #[tokio::test]
    async fn test_filters_by_bound_values() {
        let store = SnapshotQueryStore::new(dataset());
        let rows = store
            .run_query(
                "SELECT * FROM inventory WHERE storage_location LIKE '%' || $1 || '%' AND supplier LIKE '%' || $2 || '%'",
                &["深圳工厂".to_string(), String::new()],
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r["storage_location"] == json!("深圳工厂")));
    }

    #[tokio::test]
    async fn test_literal_predicates_and_ordering_apply() {
        let store = SnapshotQueryStore::new(dataset());
        let rows = store
            .run_query(
                "SELECT * FROM public.inventory WHERE supplier IN ('聚龙', 'BOE') ORDER BY quantity DESC LIMIT 5",
                &[],
            )
            .await
            .unwrap();
        let quantities: Vec<_> = rows.iter().map(|r| r["quantity"].clone()).collect();
        assert_eq!(quantities, vec![json!(500), json!(80)]);
    }

    #[tokio::test]
    async fn test_function_before_from_does_not_pick_the_table() {
        let store = SnapshotQueryStore::new(dataset());
        let rows = store
            .run_query(
                "SELECT EXTRACT(YEAR FROM inbound_time) AS y FROM inventory WHERE quantity > 100",
                &[],
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r["y"] == json!(2026)));
    }

    #[tokio::test]
    async fn test_unknown_table_is_rejected() {
        let store = SnapshotQueryStore::new(dataset());
        let err = store.run_query("SELECT * FROM orders", &[]).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
    }

    #[test]
    fn test_table_overrides() {
        let map = TableMap::with_overrides([("Quality_Events".to_string(), Collection::Inspection)]);
        assert_eq!(map.resolve("quality_events"), Some(Collection::Inspection));
        assert_eq!(map.resolve("INVENTORY"), Some(Collection::Inventory));
    }
}
