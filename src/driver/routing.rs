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

//! Cluster routing: per-database routing tables, their refresh coordination,
//! and the connection provider that resolves an [`AccessMode`] to a concrete
//! server.

mod handler;
mod registry;
pub(crate) mod rediscovery;
pub(crate) mod table;

use std::collections::HashSet;
use std::sync::Arc;

use itertools::Itertools;

use crate::address_::Address;
use crate::driver::io::{AccessMode, Connection, ConnectionProvider, ServerPool};
use crate::error_::{DriverError, ErrorKind, Result};

pub use rediscovery::{Rediscovery, RoutedRediscovery, RoutingProcedure};
pub use table::{ClusterComposition, ClusterCompositionParseError, RoutingTable};

pub(crate) use registry::{RoutingTableRegistry, DEFAULT_PURGE_TIMEOUT};

/// [`ConnectionProvider`] for cluster deployments.
///
/// Resolves the requested [`AccessMode`] through the routing-table registry,
/// then connects to the least loaded suitable server, falling back across
/// servers that turn out to be unreachable.
#[derive(Debug)]
pub(crate) struct RoutingConnectionProvider {
    registry: Arc<RoutingTableRegistry>,
    pool: Arc<dyn ServerPool>,
}

impl RoutingConnectionProvider {
    pub(crate) fn new(registry: Arc<RoutingTableRegistry>, pool: Arc<dyn ServerPool>) -> Self {
        Self { registry, pool }
    }
}

impl ConnectionProvider for RoutingConnectionProvider {
    fn acquire(
        &self,
        mode: AccessMode,
        database: Option<&Arc<String>>,
    ) -> Result<Box<dyn Connection>> {
        let database = database.map(Arc::clone);
        let table = self.registry.ensure_fresh(&database, mode)?;
        let targets = table
            .servers_for_mode(mode)
            .iter()
            .sorted_unstable_by_key(|address| self.pool.in_use(address))
            .collect::<Vec<_>>();
        if targets.is_empty() {
            return Err(DriverError::session_expired(format!(
                "no servers available for {mode:?} access"
            )));
        }
        let mut last_error = None;
        for address in targets {
            match self.pool.acquire(address) {
                Ok(connection) => return Ok(connection),
                Err(error) if error.kind() == ErrorKind::ServiceUnavailable => {
                    if let Some(handler) = self.registry.handler(&database) {
                        handler.on_connection_failure(address);
                    }
                    last_error = Some(error);
                }
                Err(error) => return Err(error),
            }
        }
        Err(last_error.expect("at least one target was attempted"))
    }

    fn retain_all(&self, addresses: &HashSet<Arc<Address>>) -> Result<()> {
        self.pool.retain_all(addresses)
    }

    fn close(&self) -> Result<()> {
        self.pool.close()
    }
}
