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

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use log::debug;
use parking_lot::RwLock;

use super::handler::RoutingTableHandler;
use super::rediscovery::Rediscovery;
use super::table::RoutingTable;
use crate::address_::Address;
use crate::driver::io::{AccessMode, ServerPool};
use crate::error_::Result;

pub(crate) const DEFAULT_PURGE_TIMEOUT: Duration = Duration::from_secs(30);

type Handlers = HashMap<Option<Arc<String>>, Arc<RoutingTableHandler>>;

/// Indexes [`RoutingTableHandler`]s by database name.
///
/// Shared by every session of a routing-enabled driver. Handlers are created
/// lazily on first use, removed when their lookup fails, and purged once
/// their table has been stale past the purge timeout.
///
/// The map itself is only lock-guarded; the expensive coordination (at most
/// one rediscovery in flight, waiters sharing its outcome) lives in each
/// handler's refresh slot.
#[derive(Debug)]
pub(crate) struct RoutingTableRegistry {
    handlers: RwLock<Handlers>,
    initial_router: Arc<Address>,
    rediscovery: Arc<dyn Rediscovery>,
    pool: Arc<dyn ServerPool>,
    purge_timeout: Duration,
    me: Weak<RoutingTableRegistry>,
}

impl RoutingTableRegistry {
    pub(crate) fn new(
        initial_router: Arc<Address>,
        rediscovery: Arc<dyn Rediscovery>,
        pool: Arc<dyn ServerPool>,
        purge_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            handlers: RwLock::new(HashMap::new()),
            initial_router,
            rediscovery,
            pool,
            purge_timeout,
            me: me.clone(),
        })
    }

    /// Return a table for `database` that is fresh for `mode`, driving a
    /// refresh through the database's handler if necessary.
    pub(crate) fn ensure_fresh(
        &self,
        database: &Option<Arc<String>>,
        mode: AccessMode,
    ) -> Result<RoutingTable> {
        self.ensure_handler(database).ensure_fresh(mode)
    }

    pub(crate) fn handler(
        &self,
        database: &Option<Arc<String>>,
    ) -> Option<Arc<RoutingTableHandler>> {
        self.handlers.read().get(database).map(Arc::clone)
    }

    fn ensure_handler(&self, database: &Option<Arc<String>>) -> Arc<RoutingTableHandler> {
        if let Some(handler) = self.handlers.read().get(database) {
            return Arc::clone(handler);
        }
        let mut handlers = self.handlers.write();
        // the handler may have appeared while we were upgrading the lock
        Arc::clone(handlers.entry(database.clone()).or_insert_with(|| {
            debug!("creating routing table handler for {database:?}");
            Arc::new(RoutingTableHandler::new(
                database.clone(),
                Arc::clone(&self.initial_router),
                Arc::clone(&self.rediscovery),
                Arc::clone(&self.pool),
                self.me.clone(),
                self.purge_timeout,
            ))
        }))
    }

    /// Best-effort snapshot of the union of all handlers' servers.
    pub(crate) fn all_servers(&self) -> HashSet<Arc<Address>> {
        self.handlers
            .read()
            .values()
            .flat_map(|handler| handler.servers())
            .collect()
    }

    /// Drop the handler for `database`, e.g., after its lookup failed. The
    /// next caller recreates it.
    pub(crate) fn remove(&self, database: &Option<Arc<String>>) {
        debug!("removing routing table handler for {database:?}");
        self.handlers.write().remove(database);
    }

    /// Drop every handler whose table has been stale past the purge timeout.
    pub(crate) fn purge_aged(&self) {
        self.handlers.write().retain(|database, handler| {
            let aged = handler.is_routing_table_aged();
            if aged {
                debug!("purging aged routing table handler for {database:?}");
            }
            !aged
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    use rstest::*;

    use super::super::table::ClusterComposition;
    use crate::error_::DriverError;

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

    /// Counts lookups, optionally stalling each one to force overlap.
    #[derive(Debug)]
    struct CountingRediscovery {
        calls: AtomicUsize,
        delay: Duration,
        composition: ClusterComposition,
    }

    impl CountingRediscovery {
        fn new(delay: Duration, composition: ClusterComposition) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                composition,
            })
        }
    }

    impl Rediscovery for CountingRediscovery {
        fn lookup_cluster_composition(
            &self,
            _table: &RoutingTable,
            _pool: &dyn ServerPool,
        ) -> Result<ClusterComposition> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            Ok(self.composition.clone())
        }
    }

    /// Records every `retain_all` it is asked to perform.
    #[derive(Debug, Default)]
    struct RecordingPool {
        retained: Mutex<Vec<HashSet<Arc<Address>>>>,
    }

    impl ServerPool for RecordingPool {
        fn acquire(&self, _address: &Arc<Address>) -> Result<Box<dyn crate::driver::io::Connection>> {
            panic!("acquire is not expected in these tests")
        }

        fn in_use(&self, _address: &Arc<Address>) -> usize {
            0
        }

        fn retain_all(&self, addresses: &HashSet<Arc<Address>>) -> Result<()> {
            self.retained.lock().unwrap().push(addresses.clone());
            Ok(())
        }

        fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn registry(
        rediscovery: Arc<dyn Rediscovery>,
        pool: Arc<RecordingPool>,
    ) -> Arc<RoutingTableRegistry> {
        RoutingTableRegistry::new(addr("initial"), rediscovery, pool, DEFAULT_PURGE_TIMEOUT)
    }

    #[rstest]
    fn concurrent_refreshes_coalesce_into_one_rediscovery() {
        let rediscovery = CountingRediscovery::new(
            Duration::from_millis(100),
            composition(&["r1"], &["rd1"], &["w1"]),
        );
        let pool = Arc::new(RecordingPool::default());
        let registry = registry(Arc::clone(&rediscovery) as Arc<dyn Rediscovery>, Arc::clone(&pool));

        let tables = thread::scope(|scope| {
            let workers = (0..2)
                .map(|_| {
                    let registry = &registry;
                    scope.spawn(move || registry.ensure_fresh(&None, AccessMode::Read).unwrap())
                })
                .collect::<Vec<_>>();
            workers
                .into_iter()
                .map(|worker| worker.join().unwrap())
                .collect::<Vec<_>>()
        });

        assert_eq!(rediscovery.calls.load(Ordering::SeqCst), 1);
        for table in &tables {
            assert_eq!(table.servers_for_mode(AccessMode::Read), [addr("rd1")]);
        }
        // exactly one pruning pass, retaining the union of all known servers
        let retained = pool.retained.lock().unwrap();
        assert_eq!(retained.len(), 1);
        assert_eq!(
            retained[0],
            [addr("r1"), addr("rd1"), addr("w1")].into_iter().collect()
        );
    }

    #[rstest]
    fn failed_lookup_removes_the_handler() {
        #[derive(Debug)]
        struct FailingRediscovery;

        impl Rediscovery for FailingRediscovery {
            fn lookup_cluster_composition(
                &self,
                _table: &RoutingTable,
                _pool: &dyn ServerPool,
            ) -> Result<ClusterComposition> {
                Err(DriverError::service_unavailable("nope"))
            }
        }

        let pool = Arc::new(RecordingPool::default());
        let registry = registry(Arc::new(FailingRediscovery), pool);

        registry.ensure_fresh(&None, AccessMode::Read).unwrap_err();
        assert!(registry.handler(&None).is_none());
    }

    #[rstest]
    fn purge_drops_only_aged_handlers() {
        let rediscovery = CountingRediscovery::new(
            Duration::ZERO,
            composition(&["r1"], &["rd1"], &["w1"]),
        );
        let pool = Arc::new(RecordingPool::default());
        let registry = registry(rediscovery, pool);

        let fresh_db = Some(Arc::new(String::from("fresh")));
        let aged_db = Some(Arc::new(String::from("aged")));
        registry.ensure_fresh(&fresh_db, AccessMode::Read).unwrap();
        registry.ensure_fresh(&aged_db, AccessMode::Read).unwrap();

        registry
            .handler(&aged_db)
            .unwrap()
            .age_table_by(Duration::from_secs(300) + DEFAULT_PURGE_TIMEOUT + Duration::from_secs(1));
        registry.purge_aged();

        assert!(registry.handler(&fresh_db).is_some());
        assert!(registry.handler(&aged_db).is_none());
    }

    #[rstest]
    fn all_servers_spans_every_handler() {
        let rediscovery = CountingRediscovery::new(
            Duration::ZERO,
            composition(&["r1"], &["rd1"], &["w1"]),
        );
        let pool = Arc::new(RecordingPool::default());
        let registry = registry(rediscovery, pool);

        registry.ensure_fresh(&None, AccessMode::Read).unwrap();
        let db = Some(Arc::new(String::from("movies")));
        registry.ensure_fresh(&db, AccessMode::Read).unwrap();

        assert_eq!(
            registry.all_servers(),
            [addr("r1"), addr("rd1"), addr("w1")].into_iter().collect()
        );
    }
}
