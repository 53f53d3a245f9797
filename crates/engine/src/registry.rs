// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of known builders.
//!
//! Holds every builder by id plus an index from connection id to builder id.
//! The manager keeps it behind a single mutex; both indices are only ever
//! updated together through `&mut self`.

use std::collections::HashMap;
use std::sync::Arc;

use abp_core::{ConnectionId, Purpose, WorkerId};

use crate::builder::{Builder, BuilderRef};

#[derive(Debug, Default)]
pub struct BuilderList {
    builders: HashMap<WorkerId, Arc<Builder>>,
    by_connection: HashMap<ConnectionId, WorkerId>,
}

impl BuilderList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    pub fn contains(&self, id: WorkerId) -> bool {
        self.builders.contains_key(&id)
    }

    /// Ids of all registered builders, sorted.
    pub fn builder_ids(&self) -> Vec<WorkerId> {
        let mut ids: Vec<_> = self.builders.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Snapshot of all registered builders, sorted by id.
    pub fn builders(&self) -> Vec<Arc<Builder>> {
        let mut builders: Vec<_> = self.builders.values().cloned().collect();
        builders.sort_by_key(|b| b.id());
        builders
    }

    /// Register a builder. Returns false (and leaves the list alone) if its id
    /// is already taken.
    pub fn add_builder(&mut self, builder: Arc<Builder>) -> bool {
        let id = builder.id();
        if self.builders.contains_key(&id) {
            return false;
        }
        if let Some(conn) = builder.connection() {
            self.by_connection.insert(conn, id);
        }
        self.builders.insert(id, builder);
        true
    }

    pub fn find(&self, id: WorkerId) -> Option<Arc<Builder>> {
        self.builders.get(&id).cloned()
    }

    pub fn find_by_connection(&self, conn: ConnectionId) -> Option<Arc<Builder>> {
        self.by_connection.get(&conn).and_then(|id| self.find(*id))
    }

    /// Bind `conn` to a registered builder, on both the builder and the index.
    /// False if the builder is unknown or already connected.
    pub fn connect(&mut self, id: WorkerId, conn: ConnectionId) -> bool {
        let Some(builder) = self.builders.get(&id) else { return false };
        if !builder.connect(conn) {
            return false;
        }
        self.by_connection.insert(conn, id);
        true
    }

    pub fn remove_by_uuid(&mut self, id: WorkerId) -> bool {
        let Some(builder) = self.builders.remove(&id) else { return false };
        if let Some(conn) = builder.connection() {
            self.by_connection.remove(&conn);
        }
        self.by_connection.retain(|_, bound| *bound != id);
        true
    }

    /// Remove whichever builder is bound to `conn`, returning its id.
    pub fn remove_by_connection_id(&mut self, conn: ConnectionId) -> Option<WorkerId> {
        let id = self.by_connection.remove(&conn)?;
        self.builders.remove(&id);
        Some(id)
    }

    /// Check out a free, connected builder for `purpose`.
    pub fn get_first(&self, purpose: Purpose) -> Option<BuilderRef> {
        let mut candidates: Vec<_> =
            self.builders.values().filter(|b| b.purpose() == purpose).collect();
        // Deterministic pick; HashMap order is not.
        candidates.sort_by_key(|b| b.id());
        candidates.into_iter().find_map(BuilderRef::claim)
    }

    /// Drain buffered output of builders that are not running a job.
    pub fn pump_idle_builders(&self) -> usize {
        self.builders.values().filter(|b| !b.is_busy()).map(|b| b.pump()).sum()
    }

    /// Drop builders that were retired and are no longer checked out.
    pub fn remove_retired(&mut self) -> Vec<WorkerId> {
        let retired: Vec<_> = self
            .builders
            .values()
            .filter(|b| b.is_retired() && !b.is_busy())
            .map(|b| b.id())
            .collect();
        for id in &retired {
            self.remove_by_uuid(*id);
        }
        retired
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
