//! Shared Dataset Snapshot
//!
//! The staging dataset pushed by the front end: three collections of JSON
//! records. Starts empty, is replaced wholesale on every update and is
//! never mutated in place, so a query that loaded a snapshot sees all of
//! one update or none of it.

use std::sync::Arc;

use intent_router_types::{DatasetUpdate, Record};
use tracing::info;

use crate::snapshot::SwapCell;

/// Named collection inside the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Inventory,
    Inspection,
    Production,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::Inventory,
        Collection::Inspection,
        Collection::Production,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Inventory => "inventory",
            Collection::Inspection => "inspection",
            Collection::Production => "production",
        }
    }

    pub fn parse(name: &str) -> Option<Collection> {
        match name.trim().to_lowercase().as_str() {
            "inventory" => Some(Collection::Inventory),
            "inspection" | "test" | "lab" => Some(Collection::Inspection),
            "production" | "online" => Some(Collection::Production),
            _ => None,
        }
    }
}

/// One immutable generation of the staging dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetSnapshot {
    pub inventory: Vec<Record>,
    pub inspection: Vec<Record>,
    pub production: Vec<Record>,
    /// Monotonic generation; 0 is the empty start-up snapshot.
    pub generation: u64,
}

impl DatasetSnapshot {
    pub fn collection(&self, collection: Collection) -> &[Record] {
        match collection {
            Collection::Inventory => &self.inventory,
            Collection::Inspection => &self.inspection,
            Collection::Production => &self.production,
        }
    }

    pub fn total_records(&self) -> usize {
        self.inventory.len() + self.inspection.len() + self.production.len()
    }
}

/// Process-wide handle to the current dataset snapshot.
#[derive(Debug, Default)]
pub struct SharedDataset {
    cell: SwapCell<DatasetSnapshot>,
}

impl SharedDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<DatasetSnapshot> {
        self.cell.load()
    }

    /// Replace the whole dataset. Collections missing from the update become empty.
    pub fn replace(&self, update: DatasetUpdate) -> Arc<DatasetSnapshot> {
        let next = self.cell.update(move |current| DatasetSnapshot {
            inventory: update.inventory,
            inspection: update.inspection,
            production: update.production,
            generation: current.generation + 1,
        });
        info!(
            "Staging dataset replaced (generation {}): {} inventory, {} inspection, {} production records",
            next.generation,
            next.inventory.len(),
            next.inspection.len(),
            next.production.len()
        );
        next
    }
}
