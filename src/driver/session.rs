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

pub(crate) mod bookmarks;
pub(crate) mod config;
pub(crate) mod retry;

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;
use std::result::Result as StdResult;
use std::sync::Arc;

use atomic_refcell::AtomicRefCell;
use log::{debug, info};

use super::io::{AccessMode, Connection};
use super::result_cursor::{CursorCore, EmbeddedRecordSource, NetworkRecordSource, ResultCursor};
use super::transaction::{
    EmbeddedTransaction, NetworkTransaction, Transaction, TransactionConfig, TxStateMachine,
};
use super::{DriverExecutor, Statement};
use crate::error_::{DriverError, Result};
use bookmarks::{Bookmarks, SharedBookmarks};
pub use config::SessionConfig;
use retry::{ExponentialBackoff, RetryError, RetryPolicy};

// imports for docs
#[allow(unused)]
use super::Driver;

/// Where the session currently is in its serial pipeline.
///
/// A session performs one piece of work at a time; every new operation first
/// settles the previous entry: a finished cursor is drained (re-throwing its
/// unconsumed failure), an open transaction blocks the operation.
#[derive(Debug)]
enum SessionPipeline {
    Idle,
    /// An auto-commit statement's cursor may still be streaming.
    Running(Rc<RefCell<CursorCore>>),
    /// An explicit transaction has been handed to the caller; the shared
    /// state machine tells whether it is still open.
    InTransaction(Arc<TxStateMachine>),
}

/// A session is a serial scope for running statements and transactions.
///
/// At most one transaction is open per session at any time, and each
/// successful commit feeds the session's [bookmarks](Bookmarks) forward, so
/// work within one session forms a causal chain.
///
/// Sessions are cheap to create; see [`Driver::session()`].
#[derive(Debug)]
pub struct Session<'driver> {
    config: SessionConfig,
    executor: &'driver DriverExecutor,
    retry_policy: ExponentialBackoff,
    bookmarks: SharedBookmarks,
    pipeline: SessionPipeline,
    connection: Option<Rc<RefCell<Box<dyn Connection>>>>,
    open: bool,
}

impl<'driver> Session<'driver> {
    pub(crate) fn new(
        config: SessionConfig,
        executor: &'driver DriverExecutor,
        retry_policy: ExponentialBackoff,
    ) -> Self {
        let bookmarks = Arc::new(AtomicRefCell::new(
            config.bookmarks.clone().unwrap_or_default(),
        ));
        Session {
            config,
            executor,
            retry_policy,
            bookmarks,
            pipeline: SessionPipeline::Idle,
            connection: None,
            open: true,
        }
    }

    /// Run a statement in an auto-commit transaction and return a cursor
    /// over its records.
    ///
    /// Fails if another transaction is open on this session.
    pub fn run(&mut self, statement: impl Into<Statement>) -> Result<ResultCursor> {
        self.run_with_config(statement, &TransactionConfig::default())
    }

    /// Like [`Session::run()`] with an explicit [`TransactionConfig`].
    pub fn run_with_config(
        &mut self,
        statement: impl Into<Statement>,
        config: &TransactionConfig,
    ) -> Result<ResultCursor> {
        let statement = statement.into();
        let mode = self.config.default_access_mode;
        self.ensure_open()?;
        self.reject_open_transaction()?;
        self.drain_previous_cursor()?;
        match self.executor {
            DriverExecutor::Network { .. } => {
                let connection = self.acquire_connection(mode)?;
                let bookmarks = self.current_bookmarks();
                let run_result =
                    connection
                        .borrow_mut()
                        .run_auto_commit(&statement, &bookmarks, config, mode);
                let handle = match run_result {
                    Ok(handle) => handle,
                    Err(error) => {
                        self.forget_closed_connection();
                        return Err(error);
                    }
                };
                let source = NetworkRecordSource::new(Rc::clone(&connection), handle);
                let core = Rc::new(RefCell::new(CursorCore::new(
                    source.into(),
                    Some(Arc::clone(&self.bookmarks)),
                )));
                self.pipeline = SessionPipeline::Running(Rc::clone(&core));
                Ok(ResultCursor::new(statement, core))
            }
            DriverExecutor::Embedded { runner } => {
                self.ensure_no_bookmarks_for_embedded()?;
                let result = runner.execute(&statement, config)?;
                let source = EmbeddedRecordSource::new(result);
                let core = Rc::new(RefCell::new(CursorCore::new(source.into(), None)));
                self.pipeline = SessionPipeline::Running(Rc::clone(&core));
                Ok(ResultCursor::new(statement, core))
            }
        }
    }

    /// Open a transaction under caller control.
    ///
    /// Fails if another transaction is open on this session.
    pub fn begin_transaction(&mut self, config: &TransactionConfig) -> Result<Transaction> {
        let mode = self.config.default_access_mode;
        self.begin_transaction_with_mode(mode, config)
    }

    fn begin_transaction_with_mode(
        &mut self,
        mode: AccessMode,
        config: &TransactionConfig,
    ) -> Result<Transaction> {
        self.ensure_open()?;
        self.reject_open_transaction()?;
        self.drain_previous_cursor()?;
        match self.executor {
            DriverExecutor::Network { .. } => {
                let connection = self.acquire_connection(mode)?;
                let bookmarks = self.current_bookmarks();
                let begin_result = connection.borrow_mut().begin(&bookmarks, config, mode);
                if let Err(error) = begin_result {
                    self.forget_closed_connection();
                    return Err(error);
                }
                let state = Arc::new(TxStateMachine::new());
                self.pipeline = SessionPipeline::InTransaction(Arc::clone(&state));
                Ok(Transaction::new(
                    state,
                    NetworkTransaction::new(connection).into(),
                    Arc::clone(&self.bookmarks),
                ))
            }
            DriverExecutor::Embedded { runner } => {
                self.ensure_no_bookmarks_for_embedded()?;
                let handle = runner.begin_transaction(config)?;
                let state = Arc::new(TxStateMachine::new());
                self.pipeline = SessionPipeline::InTransaction(Arc::clone(&state));
                Ok(Transaction::new(
                    state,
                    EmbeddedTransaction::new(handle).into(),
                    Arc::clone(&self.bookmarks),
                ))
            }
        }
    }

    /// Run `work` in a transaction routed to a reader, retrying retryable
    /// failures with the driver's retry policy.
    ///
    /// The transaction commits when `work` returns `Ok` (unless it marked
    /// the transaction failed) and rolls back when `work` returns an error.
    pub fn read_transaction<R>(
        &mut self,
        config: &TransactionConfig,
        work: impl FnMut(&mut Transaction) -> Result<R>,
    ) -> StdResult<R, RetryError> {
        let policy = self.retry_policy;
        self.read_transaction_with_retry(config, policy, work)
    }

    /// Like [`Session::read_transaction()`] with a caller-supplied
    /// [`RetryPolicy`].
    pub fn read_transaction_with_retry<R, P: RetryPolicy>(
        &mut self,
        config: &TransactionConfig,
        retry_policy: P,
        mut work: impl FnMut(&mut Transaction) -> Result<R>,
    ) -> StdResult<R, P::Error> {
        retry_policy.execute(|| self.run_transaction_once(AccessMode::Read, config, &mut work))
    }

    /// Run `work` in a transaction routed to a writer, retrying retryable
    /// failures with the driver's retry policy.
    ///
    /// See [`Session::read_transaction()`].
    pub fn write_transaction<R>(
        &mut self,
        config: &TransactionConfig,
        work: impl FnMut(&mut Transaction) -> Result<R>,
    ) -> StdResult<R, RetryError> {
        let policy = self.retry_policy;
        self.write_transaction_with_retry(config, policy, work)
    }

    /// Like [`Session::write_transaction()`] with a caller-supplied
    /// [`RetryPolicy`].
    pub fn write_transaction_with_retry<R, P: RetryPolicy>(
        &mut self,
        config: &TransactionConfig,
        retry_policy: P,
        mut work: impl FnMut(&mut Transaction) -> Result<R>,
    ) -> StdResult<R, P::Error> {
        retry_policy.execute(|| self.run_transaction_once(AccessMode::Write, config, &mut work))
    }

    fn run_transaction_once<R>(
        &mut self,
        mode: AccessMode,
        config: &TransactionConfig,
        work: &mut impl FnMut(&mut Transaction) -> Result<R>,
    ) -> Result<R> {
        let mut tx = self.begin_transaction_with_mode(mode, config)?;
        match work(&mut tx) {
            Ok(value) => {
                tx.success();
                tx.close()?;
                Ok(value)
            }
            Err(error) => {
                tx.failure();
                if let Err(close_error) = tx.close() {
                    info!(
                        "while propagating user code error: \
                        ignored tx.close() error: {close_error}"
                    );
                }
                Err(error)
            }
        }
    }

    /// Best-effort cancellation of whatever the session is doing.
    ///
    /// An open transaction is marked terminated (it can only be rolled back
    /// afterwards), a streaming cursor will surface a termination error, and
    /// the connection is asked to wipe its state.
    pub fn reset(&mut self) -> Result<()> {
        match &self.pipeline {
            SessionPipeline::Idle => {}
            SessionPipeline::Running(core) => {
                core.borrow_mut().terminate(DriverError::terminated());
            }
            SessionPipeline::InTransaction(state) => state.mark_terminated(),
        }
        if let Some(connection) = self.connection.take() {
            let reset_result = connection.borrow_mut().reset();
            if let Err(error) = reset_result {
                connection
                    .borrow_mut()
                    .terminate_and_release("reset failed");
                return Err(error);
            }
            self.connection = Some(connection);
        }
        Ok(())
    }

    /// Close the session, releasing its connection.
    ///
    /// A still-streaming cursor is drained first and its unconsumed error is
    /// returned after the cleanup finished. An open transaction is
    /// terminated. Closing an already closed session is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let mut first_error = None;
        match mem::replace(&mut self.pipeline, SessionPipeline::Idle) {
            SessionPipeline::Idle => {}
            SessionPipeline::Running(core) => {
                if let Err(error) = core.borrow_mut().drain() {
                    first_error = Some(error);
                }
            }
            SessionPipeline::InTransaction(state) => {
                if !state.current().is_terminal() {
                    debug!("closing session with open transaction; terminating it");
                    state.mark_terminated();
                    if let Some(connection) = &self.connection {
                        let _ = connection.borrow_mut().reset();
                    }
                }
            }
        }
        if let Some(connection) = self.connection.take() {
            if let Err(error) = connection.borrow_mut().release() {
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            None => Ok(()),
            Some(error) => Err(error),
        }
    }

    /// Whether the session has not been closed yet.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// The last bookmark received by the session, or the last one it was
    /// initialized with.
    pub fn last_bookmark(&self) -> Option<String> {
        self.bookmarks.borrow().last_bookmark().map(String::from)
    }

    /// The bookmarks last received by the session or the ones it was
    /// initialized with.
    ///
    /// This can be used to causally chain sessions together.
    #[inline]
    pub fn last_bookmarks(&self) -> Arc<Bookmarks> {
        Arc::clone(&self.bookmarks.borrow())
    }

    fn ensure_open(&self) -> Result<()> {
        if !self.open {
            return Err(DriverError::client("session closed"));
        }
        Ok(())
    }

    fn reject_open_transaction(&mut self) -> Result<()> {
        if let SessionPipeline::InTransaction(state) = &self.pipeline {
            if !state.current().is_terminal() {
                return Err(DriverError::client(
                    "the session has an open transaction; commit, roll back, or close it before \
                    running more work",
                ));
            }
            self.pipeline = SessionPipeline::Idle;
        }
        Ok(())
    }

    /// Settle the cursor of the previous statement. A failure nothing has
    /// consumed yet fails this (new) operation instead of leaking a poisoned
    /// connection into it.
    fn drain_previous_cursor(&mut self) -> Result<()> {
        if let SessionPipeline::Running(core) = &self.pipeline {
            let result = core.borrow_mut().drain();
            self.pipeline = SessionPipeline::Idle;
            result?;
        }
        Ok(())
    }

    fn acquire_connection(&mut self, mode: AccessMode) -> Result<Rc<RefCell<Box<dyn Connection>>>> {
        if let Some(connection) = &self.connection {
            if connection.borrow().is_open() {
                return Ok(Rc::clone(connection));
            }
        }
        // a dead connection must not leak into the new acquisition
        self.forget_closed_connection();
        debug_assert!(self.connection.is_none());
        let DriverExecutor::Network { provider } = self.executor else {
            return Err(DriverError::client(
                "the embedded engine has no connections to acquire",
            ));
        };
        debug!("acquiring {mode:?} connection for {:?}", self.config.database);
        let connection = provider.acquire(mode, self.config.database.as_ref())?;
        let connection = Rc::new(RefCell::new(connection));
        self.connection = Some(Rc::clone(&connection));
        Ok(connection)
    }

    fn forget_closed_connection(&mut self) {
        let closed = self
            .connection
            .as_ref()
            .map(|connection| !connection.borrow().is_open())
            .unwrap_or(false);
        if closed {
            self.connection = None;
        }
    }

    fn current_bookmarks(&self) -> Arc<Bookmarks> {
        Arc::clone(&self.bookmarks.borrow())
    }

    fn ensure_no_bookmarks_for_embedded(&self) -> Result<()> {
        if !self.bookmarks.borrow().is_empty() {
            return Err(DriverError::unsupported(
                "bookmarks are not supported with an embedded engine",
            ));
        }
        Ok(())
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            info!("swallowed error while closing dropped session: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use rstest::*;

    use crate::driver::embedded::{EmbeddedResult, MockCypherRunner};
    use crate::driver::io::{Fetched, MockConnection, MockConnectionProvider, StreamHandle};
    use crate::driver::summary::StatementType;
    use crate::error_::ErrorKind;
    use crate::value::Value;
    use crate::value_map;

    fn executor_with(connections: Vec<MockConnection>) -> DriverExecutor {
        let connections = Mutex::new(connections.into_iter().collect::<VecDeque<_>>());
        let mut provider = MockConnectionProvider::new();
        provider.expect_acquire().returning(move |_, _| {
            let connection = connections
                .lock()
                .unwrap()
                .pop_front()
                .expect("acquired more connections than prepared");
            Ok(Box::new(connection))
        });
        DriverExecutor::Network {
            provider: Arc::new(provider),
        }
    }

    fn session(executor: &DriverExecutor) -> Session<'_> {
        Session::new(SessionConfig::new(), executor, ExponentialBackoff::new())
    }

    fn stream_handle(keys: &[&str]) -> StreamHandle {
        StreamHandle {
            stream_id: 1,
            keys: keys.iter().map(|k| Arc::new(String::from(*k))).collect(),
        }
    }

    /// A connection that goes through one auto-commit statement returning
    /// the given rows and summary metadata.
    fn auto_commit_connection(
        rows: Vec<Vec<Value>>,
        meta: crate::driver::io::ResponseMeta,
    ) -> MockConnection {
        let mut connection = MockConnection::new();
        connection.expect_is_open().return_const(true);
        connection
            .expect_run_auto_commit()
            .times(1)
            .returning(|_, _, _, _| Ok(stream_handle(&["n"])));
        let mut responses = rows.into_iter().map(Fetched::Record).collect::<VecDeque<_>>();
        responses.push_back(Fetched::Summary(meta));
        let responses = Mutex::new(responses);
        connection.expect_fetch().returning(move |_| {
            Ok(responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("fetched past the end of the stream"))
        });
        connection.expect_discard().returning(|_| Ok(Default::default()));
        connection.expect_release().returning(|| Ok(()));
        connection
    }

    /// A retry policy for tests that retries immediately without sleeping.
    struct EagerRetry {
        max_attempts: usize,
    }

    impl RetryPolicy for EagerRetry {
        type Error = DriverError;

        fn execute<R>(&self, mut work: impl FnMut() -> Result<R>) -> StdResult<R, Self::Error> {
            let mut attempts = 0;
            loop {
                match work() {
                    Ok(value) => return Ok(value),
                    Err(error) => {
                        attempts += 1;
                        if !error.is_retryable() || attempts >= self.max_attempts {
                            return Err(error);
                        }
                    }
                }
            }
        }
    }

    #[rstest]
    fn auto_commit_happy_path() {
        let meta = value_map!({"type": "r", "bookmark": "bm-1"});
        let executor = executor_with(vec![auto_commit_connection(
            vec![vec![Value::Integer(1)]],
            meta,
        )]);
        let mut session = session(&executor);

        let mut cursor = session.run("RETURN 1").unwrap();
        let record = cursor.single().unwrap();
        assert_eq!(record.value_at(0), Some(&Value::Integer(1)));

        let summary = cursor.consume().unwrap();
        assert_eq!(summary.statement_type, Some(StatementType::ReadOnly));
        assert_eq!(summary.counters, Default::default());

        assert_eq!(session.last_bookmark(), Some(String::from("bm-1")));
    }

    #[rstest]
    fn run_rejects_open_transaction() {
        let mut connection = MockConnection::new();
        connection.expect_is_open().return_const(true);
        connection
            .expect_begin()
            .times(1)
            .returning(|_, _, _| Ok(()));
        connection.expect_commit().times(1).returning(|| Ok(None));
        connection.expect_release().returning(|| Ok(()));
        let executor = executor_with(vec![connection]);
        let mut session = session(&executor);

        let mut tx = session
            .begin_transaction(&TransactionConfig::default())
            .unwrap();
        let error = session.run("RETURN 1").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Client);
        assert!(error.message().contains("open transaction"));

        // the transaction is unaffected
        assert!(tx.is_open());
        tx.commit().unwrap();
    }

    #[rstest]
    fn finished_transaction_unblocks_the_session() {
        let mut connection = MockConnection::new();
        connection.expect_is_open().return_const(true);
        connection
            .expect_begin()
            .times(1)
            .returning(|_, _, _| Ok(()));
        connection.expect_rollback().times(1).returning(|| Ok(()));
        connection
            .expect_run_auto_commit()
            .times(1)
            .returning(|_, _, _, _| Ok(stream_handle(&["n"])));
        connection
            .expect_fetch()
            .returning(|_| Ok(Fetched::Summary(Default::default())));
        connection.expect_discard().returning(|_| Ok(Default::default()));
        connection.expect_release().returning(|| Ok(()));
        let executor = executor_with(vec![connection]);
        let mut session = session(&executor);

        let mut tx = session
            .begin_transaction(&TransactionConfig::default())
            .unwrap();
        tx.rollback().unwrap();
        drop(tx);
        session.run("RETURN 1").unwrap();
    }

    #[rstest]
    fn write_transaction_rethrows_user_error_after_rollback() {
        let mut connection = MockConnection::new();
        connection.expect_is_open().return_const(true);
        connection
            .expect_begin()
            .times(1)
            .returning(|_, _, _| Ok(()));
        connection.expect_rollback().times(1).returning(|| Ok(()));
        connection.expect_commit().times(0);
        connection.expect_release().returning(|| Ok(()));
        let executor = executor_with(vec![connection]);
        let mut session = session(&executor);

        let mut calls = 0;
        let error = session
            .write_transaction_with_retry(
                &TransactionConfig::default(),
                EagerRetry { max_attempts: 5 },
                |_tx| {
                    calls += 1;
                    Err::<(), _>(DriverError::client("x"))
                },
            )
            .unwrap_err();
        assert_eq!(calls, 1);
        assert_eq!(error.kind(), ErrorKind::Client);
        assert_eq!(error.message(), "x");
    }

    #[rstest]
    fn write_transaction_retries_until_success() {
        // the connection survives the failures, so all attempts reuse it
        let mut connection = MockConnection::new();
        connection.expect_is_open().return_const(true);
        connection
            .expect_begin()
            .times(13)
            .returning(|_, _, _| Ok(()));
        connection.expect_rollback().times(12).returning(|| Ok(()));
        connection.expect_commit().times(1).returning(|| Ok(None));
        connection.expect_release().returning(|| Ok(()));
        let executor = executor_with(vec![connection]);
        let mut session = session(&executor);

        let mut invocations = 0;
        let value = session
            .write_transaction_with_retry(
                &TransactionConfig::default(),
                EagerRetry { max_attempts: 20 },
                |_tx| {
                    invocations += 1;
                    if invocations <= 12 {
                        Err(DriverError::session_expired("leader moved"))
                    } else {
                        Ok(42)
                    }
                },
            )
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(invocations, 13);
    }

    #[rstest]
    fn reset_terminates_the_open_transaction() {
        let mut connection = MockConnection::new();
        connection.expect_is_open().return_const(true);
        connection
            .expect_begin()
            .times(1)
            .returning(|_, _, _| Ok(()));
        connection.expect_reset().times(1).returning(|| Ok(()));
        connection.expect_release().returning(|| Ok(()));
        let executor = executor_with(vec![connection]);
        let mut session = session(&executor);

        let mut tx = session
            .begin_transaction(&TransactionConfig::default())
            .unwrap();
        session.reset().unwrap();

        let error = tx.commit().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Client);
        assert!(error.message().contains("terminated"));
        tx.rollback().unwrap();
    }

    #[rstest]
    fn close_is_idempotent() {
        let executor = executor_with(vec![auto_commit_connection(
            vec![],
            Default::default(),
        )]);
        let mut session = session(&executor);
        session.run("RETURN 1").unwrap();

        session.close().unwrap();
        assert!(!session.is_open());
        session.close().unwrap();

        let error = session.run("RETURN 1").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Client);
        assert!(error.message().contains("session closed"));
    }

    #[rstest]
    fn open_connection_is_reused_across_statements() {
        let mut connection = MockConnection::new();
        connection.expect_is_open().return_const(true);
        connection
            .expect_run_auto_commit()
            .times(2)
            .returning(|_, _, _, _| Ok(stream_handle(&["n"])));
        connection
            .expect_fetch()
            .returning(|_| Ok(Fetched::Summary(Default::default())));
        connection.expect_discard().returning(|_| Ok(Default::default()));
        connection.expect_release().returning(|| Ok(()));
        // only one connection prepared: a second acquisition would panic
        let executor = executor_with(vec![connection]);
        let mut session = session(&executor);

        session.run("RETURN 1").unwrap();
        session.run("RETURN 2").unwrap();
    }

    #[rstest]
    fn failed_acquisition_leaves_the_session_usable() {
        let mut provider = MockConnectionProvider::new();
        let mut attempts = 0;
        provider.expect_acquire().times(2).returning(move |_, _| {
            attempts += 1;
            if attempts == 1 {
                Err(DriverError::service_unavailable("no one home"))
            } else {
                Ok(Box::new(auto_commit_connection(vec![], Default::default())))
            }
        });
        let executor = DriverExecutor::Network {
            provider: Arc::new(provider),
        };
        let mut session = session(&executor);

        let error = session.run("RETURN 1").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ServiceUnavailable);
        session.run("RETURN 1").unwrap();
    }

    #[rstest]
    fn unconsumed_cursor_failure_fails_the_next_statement() {
        let mut connection = MockConnection::new();
        connection.expect_is_open().return_const(true);
        connection
            .expect_run_auto_commit()
            .times(2)
            .returning(|_, _, _, _| Ok(stream_handle(&["n"])));
        let mut discards = 0;
        connection.expect_discard().returning(move |_| {
            discards += 1;
            if discards == 1 {
                Err(DriverError::database("statement blew up"))
            } else {
                Ok(Default::default())
            }
        });
        connection
            .expect_fetch()
            .returning(|_| Ok(Fetched::Summary(Default::default())));
        connection.expect_release().returning(|| Ok(()));
        let executor = executor_with(vec![connection]);
        let mut session = session(&executor);

        let _unconsumed = session.run("RETURN 1").unwrap();
        let error = session.run("RETURN 2").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Database);

        // the poisoned cursor is settled; the session works again
        session.run("RETURN 3").unwrap();
    }

    #[rstest]
    fn embedded_sessions_execute_through_the_runner() {
        let mut runner = MockCypherRunner::new();
        runner.expect_execute().times(1).returning(|statement, _| {
            assert_eq!(statement.text(), "RETURN 1");
            Ok(EmbeddedResult {
                keys: vec![Arc::new(String::from("n"))],
                records: vec![vec![Value::Integer(1)]],
                metadata: value_map!({"type": "r"}),
            })
        });
        let executor = DriverExecutor::Embedded {
            runner: Arc::new(runner),
        };
        let mut session = session(&executor);

        let mut cursor = session.run("RETURN 1").unwrap();
        let record = cursor.single().unwrap();
        assert_eq!(record.value("n"), Some(&Value::Integer(1)));
    }

    #[rstest]
    fn embedded_sessions_reject_bookmarks() {
        let runner = MockCypherRunner::new();
        let executor = DriverExecutor::Embedded {
            runner: Arc::new(runner),
        };
        let config = SessionConfig::new().with_bookmarks(Arc::new(Bookmarks::from_raw([
            String::from("bm-1"),
        ])));
        let mut session = Session::new(config, &executor, ExponentialBackoff::new());

        let error = session.run("RETURN 1").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Client);
        assert!(error.message().contains("unsupported"));
    }
}
