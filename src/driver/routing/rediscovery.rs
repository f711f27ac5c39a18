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

use std::fmt::Debug;
use std::sync::Arc;

use log::{debug, info};

use super::table::{ClusterComposition, RoutingTable};
use crate::address_::Address;
use crate::driver::io::ServerPool;
use crate::error_::{DriverError, Result};

/// Produces a fresh [`ClusterComposition`] for a routing table that has gone
/// stale.
pub trait Rediscovery: Debug + Send + Sync {
    fn lookup_cluster_composition(
        &self,
        table: &RoutingTable,
        pool: &dyn ServerPool,
    ) -> Result<ClusterComposition>;
}

/// Fetches the cluster composition from one specific router.
///
/// This is the wire-level half of rediscovery; how the routing procedure is
/// phrased on the wire is up to the connection layer.
pub trait RoutingProcedure: Debug + Send + Sync {
    fn fetch_composition(
        &self,
        router: &Arc<Address>,
        pool: &dyn ServerPool,
    ) -> Result<ClusterComposition>;
}

/// [`Rediscovery`] that walks the known routers in table order, falling back
/// to the next one until a usable composition is found.
///
/// Per-router failures stay internal; only running out of routers surfaces
/// to the caller, with the last failure attached as a suppressed error.
#[derive(Debug)]
pub struct RoutedRediscovery {
    procedure: Arc<dyn RoutingProcedure>,
}

impl RoutedRediscovery {
    pub fn new(procedure: Arc<dyn RoutingProcedure>) -> Self {
        Self { procedure }
    }
}

impl Rediscovery for RoutedRediscovery {
    fn lookup_cluster_composition(
        &self,
        table: &RoutingTable,
        pool: &dyn ServerPool,
    ) -> Result<ClusterComposition> {
        let mut last_error: Option<DriverError> = None;
        for router in table.routers() {
            debug!("fetching cluster composition from {router}");
            match self.procedure.fetch_composition(router, pool) {
                Ok(composition) => {
                    if composition.routers.is_empty() || composition.readers.is_empty() {
                        // a composition one cannot route with; try the next
                        // router as if this one had failed
                        info!("discarding composition without routers or readers from {router}");
                        last_error = Some(DriverError::protocol_violation(format!(
                            "router {router} sent a cluster composition without routers or readers"
                        )));
                        continue;
                    }
                    // missing writers are tolerated; this is usually a
                    // temporary state such as an ongoing leader switch
                    return Ok(composition);
                }
                Err(error) if error.is_fatal_during_discovery() => return Err(error),
                Err(error) => {
                    info!("ignored error during discovery from {router}: {error}");
                    last_error = Some(error);
                }
            }
        }
        let mut error =
            DriverError::service_unavailable("unable to retrieve routing information from any router");
        if let Some(last_error) = last_error {
            error.add_suppressed(last_error);
        }
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::time::Duration;

    use rstest::*;

    use crate::driver::io::MockServerPool;
    use crate::error_::ErrorKind;

    fn addr(host: &str) -> Arc<Address> {
        Arc::new(Address::from((host, 7687)))
    }

    fn composition(routers: &[&str], readers: &[&str], writers: &[&str]) -> ClusterComposition {
        ClusterComposition {
            ttl: Duration::from_secs(300),
            routers: routers.iter().map(|a| addr(a)).collect(),
            readers: readers.iter().map(|a| addr(a)).collect(),
            writers: writers.iter().map(|a| addr(a)).collect(),
            database: None,
        }
    }

    fn table_with_routers(routers: &[&str]) -> RoutingTable {
        let mut table = RoutingTable::new(addr("unused"));
        table.update(composition(routers, &[], &[]));
        table
    }

    /// Scripted per-router responses.
    #[derive(Debug)]
    struct ScriptedProcedure {
        responses: HashMap<String, std::sync::Mutex<Option<Result<ClusterComposition>>>>,
    }

    impl ScriptedProcedure {
        fn new(responses: Vec<(&str, Result<ClusterComposition>)>) -> Self {
            Self {
                responses: responses
                    .into_iter()
                    .map(|(host, response)| {
                        (String::from(host), std::sync::Mutex::new(Some(response)))
                    })
                    .collect(),
            }
        }
    }

    impl RoutingProcedure for ScriptedProcedure {
        fn fetch_composition(
            &self,
            router: &Arc<Address>,
            _pool: &dyn ServerPool,
        ) -> Result<ClusterComposition> {
            self.responses
                .get(router.host())
                .expect("unexpected router consulted")
                .lock()
                .unwrap()
                .take()
                .expect("router consulted twice")
        }
    }

    fn rediscovery(responses: Vec<(&str, Result<ClusterComposition>)>) -> RoutedRediscovery {
        RoutedRediscovery::new(Arc::new(ScriptedProcedure::new(responses)))
    }

    #[rstest]
    fn falls_back_to_the_next_router() {
        let rediscovery = rediscovery(vec![
            ("r1", Err(DriverError::service_unavailable("r1 is down"))),
            ("r2", Ok(composition(&["r2"], &["rd1"], &["w1"]))),
        ]);
        let table = table_with_routers(&["r1", "r2"]);

        let composition = rediscovery
            .lookup_cluster_composition(&table, &MockServerPool::new())
            .unwrap();
        assert_eq!(composition.routers, vec![addr("r2")]);
    }

    #[rstest]
    fn total_failure_surfaces_service_unavailable() {
        let rediscovery = rediscovery(vec![
            ("r1", Err(DriverError::service_unavailable("r1 is down"))),
            ("r2", Err(DriverError::transient("r2 is busy"))),
        ]);
        let table = table_with_routers(&["r1", "r2"]);

        let error = rediscovery
            .lookup_cluster_composition(&table, &MockServerPool::new())
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ServiceUnavailable);
        assert_eq!(error.suppressed().len(), 1);
    }

    #[rstest]
    #[case(composition(&[], &["rd1"], &["w1"]))]
    #[case(composition(&["r2"], &[], &["w1"]))]
    fn unroutable_compositions_are_discarded(#[case] bad: ClusterComposition) {
        let rediscovery = rediscovery(vec![
            ("r1", Ok(bad)),
            ("r2", Ok(composition(&["r2"], &["rd1"], &[]))),
        ]);
        let table = table_with_routers(&["r1", "r2"]);

        // note: the second composition has no writers, which is tolerated
        let composition = rediscovery
            .lookup_cluster_composition(&table, &MockServerPool::new())
            .unwrap();
        assert!(composition.writers.is_empty());
    }

    #[rstest]
    fn client_errors_abort_discovery() {
        let rediscovery = rediscovery(vec![(
            "r1",
            Err(DriverError::client("invalid bookmark")),
        )]);
        let table = table_with_routers(&["r1", "r2"]);

        let error = rediscovery
            .lookup_cluster_composition(&table, &MockServerPool::new())
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Client);
    }
}
