// Copyright Rouven Bauer
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use log::{debug, error, warn};
use parking_lot::{Condvar, Mutex, RwLock};

use super::rediscovery::Rediscovery;
use super::registry::RoutingTableRegistry;
use super::table::RoutingTable;
use crate::address_::Address;
use crate::driver::io::{AccessMode, ServerPool};
use crate::error_::{DriverError, Result};

/// Keeps one database's [`RoutingTable`] fresh.
///
/// At most one rediscovery is in flight per handler; callers that request a
/// refresh while one is running block until it settles and share its
/// outcome.
#[derive(Debug)]
pub(crate) struct RoutingTableHandler {
    database: Option<Arc<String>>,
    table: RwLock<RoutingTable>,
    refresh: Mutex<RefreshSlot>,
    refreshed: Condvar,
    rediscovery: Arc<dyn Rediscovery>,
    pool: Arc<dyn ServerPool>,
    registry: Weak<RoutingTableRegistry>,
    purge_timeout: Duration,
}

/// The single in-flight refresh slot, guarded by the handler's monitor.
///
/// `generation` bumps whenever a refresh settles, so waiters can tell their
/// refresh's outcome from that of an older one.
#[derive(Debug, Default)]
struct RefreshSlot {
    in_flight: bool,
    generation: u64,
    last_error: Option<DriverError>,
}

impl RoutingTableHandler {
    pub(crate) fn new(
        database: Option<Arc<String>>,
        initial_router: Arc<Address>,
        rediscovery: Arc<dyn Rediscovery>,
        pool: Arc<dyn ServerPool>,
        registry: Weak<RoutingTableRegistry>,
        purge_timeout: Duration,
    ) -> Self {
        let table = RoutingTable::new(initial_router);
        Self {
            database,
            table: RwLock::new(table),
            refresh: Mutex::new(RefreshSlot::default()),
            refreshed: Condvar::new(),
            rediscovery,
            pool,
            registry,
            purge_timeout,
        }
    }

    /// Return a table that is fresh for `mode`, refreshing it if necessary.
    ///
    /// Note that a refresh can legitimately produce a table that is still
    /// missing servers for `mode` (e.g., no writers during a leader switch);
    /// it is up to the caller to treat that as an error or not.
    pub(crate) fn ensure_fresh(&self, mode: AccessMode) -> Result<RoutingTable> {
        let mut slot = self.refresh.lock();
        if slot.in_flight {
            let entered = slot.generation;
            while slot.in_flight && slot.generation == entered {
                self.refreshed.wait(&mut slot);
            }
            return match &slot.last_error {
                Some(error) => Err(error.clone()),
                None => Ok(self.table.read().clone()),
            };
        }
        if !self.table.read().is_stale_for(mode) {
            return Ok(self.table.read().clone());
        }
        slot.in_flight = true;
        drop(slot);
        self.refresh_table()
    }

    /// Runs the rediscovery. Must only be called by the thread that set
    /// `in_flight`; the slot is not locked while the lookup runs.
    fn refresh_table(&self) -> Result<RoutingTable> {
        let snapshot = self.table.read().clone();
        debug!("refreshing routing table for {:?}", self.database);
        let result = self
            .rediscovery
            .lookup_cluster_composition(&snapshot, self.pool.as_ref());
        match result {
            Ok(composition) => {
                self.table.write().update(composition);
                if let Some(registry) = self.registry.upgrade() {
                    registry.purge_aged();
                    let servers = registry.all_servers();
                    debug!("instructing pool to retain {} servers", servers.len());
                    if let Err(error) = self.pool.retain_all(&servers) {
                        warn!("failed to prune connection pool: {error}");
                    }
                }
                self.settle_refresh(None);
                Ok(self.table.read().clone())
            }
            Err(refresh_error) => {
                error!(
                    "failed to refresh routing table for {:?}: {refresh_error}",
                    self.database
                );
                if let Some(registry) = self.registry.upgrade() {
                    registry.remove(&self.database);
                }
                self.settle_refresh(Some(refresh_error.clone()));
                Err(refresh_error)
            }
        }
    }

    fn settle_refresh(&self, error: Option<DriverError>) {
        let mut slot = self.refresh.lock();
        slot.in_flight = false;
        slot.generation = slot.generation.wrapping_add(1);
        slot.last_error = error;
        self.refreshed.notify_all();
    }

    /// The server could not be reached; forget it in every role.
    pub(crate) fn on_connection_failure(&self, address: &Address) {
        debug!("forgetting {address} for {:?}", self.database);
        self.table.write().forget(address);
    }

    /// The server rejected a write; it is no longer the writer.
    pub(crate) fn on_write_failure(&self, address: &Address) {
        debug!("forgetting writer {address} for {:?}", self.database);
        self.table.write().forget_writer(address);
    }

    pub(crate) fn servers(&self) -> HashSet<Arc<Address>> {
        self.table.read().servers()
    }

    #[cfg(test)]
    pub(crate) fn table(&self) -> RoutingTable {
        self.table.read().clone()
    }

    /// Whether the registry may drop this handler: nothing is refreshing it
    /// and its table has been stale past the purge timeout.
    pub(crate) fn is_routing_table_aged(&self) -> bool {
        let slot = self.refresh.lock();
        !slot.in_flight && self.table.read().has_been_stale_for(self.purge_timeout)
    }

    #[cfg(test)]
    pub(crate) fn age_table_by(&self, duration: Duration) {
        self.table.write().age_by(duration);
    }
}
