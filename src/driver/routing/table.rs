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
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use thiserror::Error;

use crate::address_::Address;
use crate::driver::io::{AccessMode, ResponseMeta};
use crate::time::Instant;
use crate::value::Value;

/// Per-database directory of the cluster's servers, with freshness metadata.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    pub(crate) routers: Vec<Arc<Address>>,
    pub(crate) readers: Vec<Arc<Address>>,
    pub(crate) writers: Vec<Arc<Address>>,
    created: Instant,
    ttl: Duration,
}

impl RoutingTable {
    /// A table that only knows the initial router and is immediately stale,
    /// forcing a refresh before first use.
    pub(crate) fn new(initial_router: Arc<Address>) -> Self {
        Self {
            routers: vec![initial_router],
            readers: Vec::new(),
            writers: Vec::new(),
            created: Instant::now(),
            ttl: Duration::ZERO,
        }
    }

    pub(crate) fn routers(&self) -> &[Arc<Address>] {
        &self.routers
    }

    pub(crate) fn servers_for_mode(&self, mode: AccessMode) -> &[Arc<Address>] {
        match mode {
            AccessMode::Read => &self.readers,
            AccessMode::Write => &self.writers,
        }
    }

    /// The union of routers, readers, and writers.
    pub(crate) fn servers(&self) -> HashSet<Arc<Address>> {
        [&self.routers, &self.readers, &self.writers]
            .into_iter()
            .flat_map(|addresses| addresses.iter().map(Arc::clone))
            .collect()
    }

    /// A table is stale for a mode when it has no servers for that mode, no
    /// routers to refresh itself from, or its time-to-live has passed.
    pub(crate) fn is_stale_for(&self, mode: AccessMode) -> bool {
        if self.routers.is_empty() {
            debug!("routing table stale: no routers left {self:?}");
            return true;
        }
        if self.servers_for_mode(mode).is_empty() {
            debug!("routing table stale: no servers for {mode:?} mode left {self:?}");
            return true;
        }
        if self.created.elapsed() > self.ttl {
            debug!(
                "routing table stale: ttl ({:?}) < age ({:?}) {:?}",
                self.ttl,
                self.created.elapsed(),
                self
            );
            return true;
        }
        false
    }

    /// Whether the table has been past its time-to-live for at least `extra`.
    pub(crate) fn has_been_stale_for(&self, extra: Duration) -> bool {
        self.created.elapsed() > self.ttl + extra
    }

    pub(crate) fn update(&mut self, composition: ClusterComposition) {
        self.routers = composition.routers;
        self.readers = composition.readers;
        self.writers = composition.writers;
        self.ttl = composition.ttl;
        self.created = Instant::now();
    }

    /// Forget a server entirely, e.g., after failing to connect to it.
    pub(crate) fn forget(&mut self, address: &Address) {
        self.routers = mem::take(&mut self.routers)
            .into_iter()
            .filter(|a| **a != *address)
            .collect();
        self.readers = mem::take(&mut self.readers)
            .into_iter()
            .filter(|a| **a != *address)
            .collect();
        self.forget_writer(address);
    }

    /// Forget a server's writer role only, e.g., after a leader switch.
    pub(crate) fn forget_writer(&mut self, address: &Address) {
        self.writers = mem::take(&mut self.writers)
            .into_iter()
            .filter(|a| **a != *address)
            .collect();
    }

    #[cfg(test)]
    pub(crate) fn age_by(&mut self, duration: Duration) {
        self.created = self
            .created
            .checked_sub(duration)
            .expect("cannot back-date table this far");
    }
}

/// What a router replied when asked for the cluster's layout.
#[derive(Debug, Clone)]
pub struct ClusterComposition {
    pub ttl: Duration,
    pub routers: Vec<Arc<Address>>,
    pub readers: Vec<Arc<Address>>,
    pub writers: Vec<Arc<Address>>,
    pub database: Option<Arc<String>>,
}

impl ClusterComposition {
    /// Parse the metadata map of a routing procedure response.
    pub fn try_parse(mut meta: ResponseMeta) -> Result<Self, ClusterCompositionParseError> {
        let ttl = meta.remove("ttl").ok_or(ClusterCompositionParseError {
            reason: "missing \"ttl\"",
        })?;
        let ttl: i64 = ttl
            .try_into_int()
            .map_err(|_| ClusterCompositionParseError {
                reason: "\"ttl\" was not an integer",
            })?;
        if ttl < 0 {
            return Err(ClusterCompositionParseError {
                reason: "negative \"ttl\"",
            });
        }
        let ttl = Duration::from_secs(ttl as u64);
        let database = match meta.remove("db") {
            None | Some(Value::Null) => None,
            Some(Value::String(db)) => Some(Arc::new(db)),
            Some(_) => {
                return Err(ClusterCompositionParseError {
                    reason: "\"db\" was not a string",
                })
            }
        };
        let servers = meta.remove("servers").ok_or(ClusterCompositionParseError {
            reason: "missing \"servers\"",
        })?;
        let servers = servers
            .try_into_list()
            .map_err(|_| ClusterCompositionParseError {
                reason: "\"servers\" was not a list",
            })?;
        let mut routers = Vec::new();
        let mut readers = Vec::new();
        let mut writers = Vec::new();
        for server in servers {
            match Self::parse_server(server)? {
                (ServerRole::Router, addresses) => routers = addresses,
                (ServerRole::Reader, addresses) => readers = addresses,
                (ServerRole::Writer, addresses) => writers = addresses,
                (ServerRole::Unknown, _) => {}
            }
        }
        Ok(Self {
            ttl,
            routers,
            readers,
            writers,
            database,
        })
    }

    fn parse_server(
        server: Value,
    ) -> Result<(ServerRole, Vec<Arc<Address>>), ClusterCompositionParseError> {
        let mut server = server
            .try_into_map()
            .map_err(|_| ClusterCompositionParseError {
                reason: "\"servers\" entry was not a map",
            })?;
        let role = server.remove("role").ok_or(ClusterCompositionParseError {
            reason: "\"servers\" entry missing \"role\"",
        })?;
        let role: String = role
            .try_into_string()
            .map_err(|_| ClusterCompositionParseError {
                reason: "\"servers\" entry \"role\" was not a string",
            })?;
        let role = match role.as_str().into() {
            ServerRole::Unknown => {
                warn!("ignoring unknown server role {role}");
                return Ok((ServerRole::Unknown, vec![]));
            }
            role => role,
        };
        let addresses = server
            .remove("addresses")
            .ok_or(ClusterCompositionParseError {
                reason: "\"servers\" entry missing \"addresses\"",
            })?;
        let addresses = addresses
            .try_into_list()
            .map_err(|_| ClusterCompositionParseError {
                reason: "\"servers\" entry \"addresses\" was not a list",
            })?;
        let addresses = addresses
            .into_iter()
            .map(|address| {
                let address =
                    address
                        .try_into_string()
                        .map_err(|_| ClusterCompositionParseError {
                            reason: "\"servers\" entry \"addresses\" contained a non-string",
                        })?;
                Ok(Arc::new(Address::from(&*address)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok((role, addresses))
    }
}

#[derive(Error, Debug)]
#[error("failed to parse cluster composition: {reason}")]
pub struct ClusterCompositionParseError {
    reason: &'static str,
}

enum ServerRole {
    Router,
    Reader,
    Writer,
    Unknown,
}

impl From<&str> for ServerRole {
    fn from(s: &str) -> Self {
        match s {
            "ROUTE" => ServerRole::Router,
            "READ" => ServerRole::Reader,
            "WRITE" => ServerRole::Writer,
            _ => ServerRole::Unknown,
        }
    }
}
