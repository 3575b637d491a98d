//! Fixed-answer topology reader
//!
//! Returns the same records for every key it was given, ignoring the store.
//! Useful for driving the resolver through contradictory or foreign records
//! that a real store would never return.

use async_trait::async_trait;
use std::collections::HashMap;
use topo_core::effects::{StoredMapping, TopologyReadEffects};
use topo_core::mapping::UniqueKey;
use topo_core::{Result, StoreId, TopologyError};

/// Reader answering from a fixed table
#[derive(Debug, Clone, Default)]
pub struct StaticTopologyReader {
    records: HashMap<UniqueKey, Vec<StoredMapping>>,
    failure: Option<TopologyError>,
}

impl StaticTopologyReader {
    /// Reader with no records
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `records` for `unique_key`
    pub fn with_records(mut self, unique_key: UniqueKey, records: Vec<StoredMapping>) -> Self {
        self.records.insert(unique_key, records);
        self
    }

    /// Fail every read with `error`
    pub fn failing(error: TopologyError) -> Self {
        Self {
            records: HashMap::new(),
            failure: Some(error),
        }
    }
}

#[async_trait]
impl TopologyReadEffects for StaticTopologyReader {
    async fn list_mappings(
        &self,
        _store: &StoreId,
        unique_key: &UniqueKey,
    ) -> Result<Vec<StoredMapping>> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        Ok(self.records.get(unique_key).cloned().unwrap_or_default())
    }
}
