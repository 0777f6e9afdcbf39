//! In-memory CPC lookup, built once per run from the `cpc` table.

use crate::{error::PlanResult, store::{CpcRow, PlanStore}, types::EntityId};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
pub struct CpcIndex {
    by_key: HashMap<(String, String), EntityId>,
    by_id: BTreeMap<EntityId, CpcRow>,
}

impl CpcIndex {
    pub fn load(store: &PlanStore) -> PlanResult<Self> {
        let index = Self::from_rows(store.all_cpcs()?);
        log::debug!("CPC index loaded with {} entries", index.by_id.len());
        Ok(index)
    }

    pub fn from_rows(rows: impl IntoIterator<Item = CpcRow>) -> Self {
        let mut index = Self::default();
        for row in rows {
            index.insert(row);
        }
        index
    }

    pub fn insert(&mut self, row: CpcRow) {
        self.by_key
            .insert((row.client_group.clone(), row.profit_center.clone()), row.id);
        self.by_id.insert(row.id, row);
    }

    pub fn resolve(&self, client_group: &str, profit_center: &str) -> Option<EntityId> {
        self.by_key
            .get(&(client_group.to_string(), profit_center.to_string()))
            .copied()
    }

    /// Entries in ascending id order.
    pub fn entries(&self) -> impl Iterator<Item = &CpcRow> {
        self.by_id.values()
    }
}
