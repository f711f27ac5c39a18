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

pub(crate) mod config;
pub mod embedded;
pub mod io;
pub(crate) mod record;
pub mod result_cursor;
pub mod routing;
pub(crate) mod session;
pub(crate) mod summary;
pub(crate) mod transaction;

use std::collections::HashMap;
use std::sync::Arc;

use embedded::CypherRunner;
use io::{ConnectionProvider, ServerPool};
use routing::{Rediscovery, RoutingConnectionProvider, RoutingTableRegistry};
use session::retry::ExponentialBackoff;
use session::{Session, SessionConfig};
use crate::address_::Address;
use crate::error_::{DriverError, Result};
use crate::value::Value;

pub use config::auth::AuthToken;
pub use config::{ConnectionConfig, ConnectionTarget, DriverConfig, EmbeddedTarget};
pub use io::AccessMode;
pub use record::Record;

/// A statement to be executed: text plus named parameters.
///
/// # Example
/// ```
/// use graphium::driver::Statement;
/// use graphium::value_map;
///
/// let plain: Statement = "MATCH (n) RETURN n".into();
/// let with_parameters =
///     Statement::new("CREATE (n:Node {id: $id})").with_parameters(value_map!({"id": 1}));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    text: String,
    parameters: HashMap<String, Value>,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: HashMap::new(),
        }
    }

    /// Replace the statement's parameters.
    ///
    /// Always prefer parameters over string interpolation: they rule out
    /// injection and allow the server to cache the statement plan.
    pub fn with_parameters(mut self, parameters: HashMap<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parameters(&self) -> &HashMap<String, Value> {
        &self.parameters
    }
}

impl From<&str> for Statement {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Statement {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// The pluggable half a [`Driver`] executes against.
///
/// Which variant is required follows from the [`ConnectionTarget`] the
/// driver is built for.
#[derive(Debug)]
pub enum DriverBackend {
    /// A ready-made connection provider, for direct single-server targets.
    Provider(Arc<dyn ConnectionProvider>),
    /// An address-keyed pool plus a rediscovery strategy; the driver builds
    /// the routing layer on top.
    Pooled {
        pool: Arc<dyn ServerPool>,
        rediscovery: Arc<dyn Rediscovery>,
    },
    /// An in-process engine, for embedded `file://` targets.
    Engine(Arc<dyn CypherRunner>),
}

#[derive(Debug)]
pub(crate) enum DriverExecutor {
    Network { provider: Arc<dyn ConnectionProvider> },
    Embedded { runner: Arc<dyn CypherRunner> },
}

/// The entry point of the crate: spawns [`Session`]s against one database
/// deployment.
///
/// A driver (and the connection pool behind it) is meant to be shared;
/// create it once per application and spawn a short-lived session per unit
/// of work.
#[derive(Debug)]
pub struct Driver {
    config: DriverConfig,
    executor: DriverExecutor,
}

impl Driver {
    /// Dispatch a parsed [`ConnectionConfig`] to the matching driver
    /// flavour.
    ///
    /// Fails when the backend does not fit the connection target, or when
    /// the target is embedded and the configuration carries authentication
    /// (other than the `"none"` token) or encryption.
    pub fn new(
        connection_config: ConnectionConfig,
        config: DriverConfig,
        backend: DriverBackend,
    ) -> Result<Self> {
        match (connection_config.target, backend) {
            (ConnectionTarget::Direct { .. }, DriverBackend::Provider(provider)) => {
                Ok(Self::direct(provider, config))
            }
            (ConnectionTarget::Routing { address, .. }, DriverBackend::Pooled { pool, rediscovery }) => {
                Ok(Self::routed(address, pool, rediscovery, config))
            }
            (ConnectionTarget::Embedded(_), DriverBackend::Engine(runner)) => {
                Self::embedded(runner, config)
            }
            (target, _) => Err(DriverError::client(format!(
                "the supplied backend cannot serve the connection target {target:?}"
            ))),
        }
    }

    /// A driver talking to a single server through `provider`.
    pub fn direct(provider: Arc<dyn ConnectionProvider>, config: DriverConfig) -> Self {
        Self {
            config,
            executor: DriverExecutor::Network { provider },
        }
    }

    /// A driver talking to a cluster, keeping per-database routing tables
    /// fresh through `rediscovery` and pruning `pool` to the servers the
    /// cluster reports.
    pub fn routed(
        initial_router: Address,
        pool: Arc<dyn ServerPool>,
        rediscovery: Arc<dyn Rediscovery>,
        config: DriverConfig,
    ) -> Self {
        let registry = RoutingTableRegistry::new(
            Arc::new(initial_router),
            rediscovery,
            Arc::clone(&pool),
            config.routing_purge_timeout,
        );
        let provider = Arc::new(RoutingConnectionProvider::new(registry, pool));
        Self {
            config,
            executor: DriverExecutor::Network { provider },
        }
    }

    /// A driver running statements against an in-process engine.
    ///
    /// The embedded engine supports neither authentication (beyond the
    /// explicit `"none"` token) nor encryption.
    pub fn embedded(runner: Arc<dyn CypherRunner>, config: DriverConfig) -> Result<Self> {
        if let Some(auth) = &config.auth {
            if !auth.is_none_auth() {
                return Err(DriverError::client(format!(
                    "embedded stores do not support authentication, found scheme {:?}",
                    auth.scheme()
                )));
            }
        }
        if config.encrypted {
            return Err(DriverError::client(
                "embedded stores do not support encryption",
            ));
        }
        Ok(Self {
            config,
            executor: DriverExecutor::Embedded { runner },
        })
    }

    /// Spawn a session.
    pub fn session(&self, config: SessionConfig) -> Session<'_> {
        let retry_policy = ExponentialBackoff::new().with_max_retry_time(self.config.max_retry_time);
        Session::new(config, &self.executor, retry_policy)
    }

    /// Close the driver, shutting down the connection layer behind it.
    pub fn close(&self) -> Result<()> {
        match &self.executor {
            DriverExecutor::Network { provider } => provider.close(),
            DriverExecutor::Embedded { .. } => Ok(()),
        }
    }
}
