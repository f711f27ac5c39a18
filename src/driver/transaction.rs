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

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use atomic_refcell::AtomicRefCell;
use duplicate::duplicate_item;
use enum_dispatch::enum_dispatch;
use log::info;

use super::embedded::EmbeddedTransactionHandle;
use super::io::Connection;
use super::result_cursor::{
    CursorCore, EmbeddedRecordSource, NetworkRecordSource, RecordSource, ResultCursor,
};
use super::session::bookmarks::{Bookmarks, SharedBookmarks};
use super::Statement;
use crate::error_::{DriverError, Result};
use crate::value::Value;

// imports for docs
#[allow(unused)]
use super::session::Session;

/// Configuration applying to a single transaction (explicit or auto-commit).
#[derive(Debug, Clone, Default)]
pub struct TransactionConfig {
    pub(crate) timeout: Option<Duration>,
    pub(crate) metadata: HashMap<String, Value>,
}

impl TransactionConfig {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Instruct the server to abort the transaction after the given timeout.
    ///
    /// The timeout is forwarded with millisecond precision.
    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach metadata to the transaction.
    ///
    /// The metadata is forwarded to the server verbatim; it typically shows
    /// up in the server's statement log and monitoring views.
    #[inline]
    pub fn with_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    #[inline]
    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }
}

/// Lifecycle of a [`Transaction`].
///
/// [`TransactionState::Committed`] and [`TransactionState::RolledBack`] are
/// terminal. [`TransactionState::Terminated`] only permits a rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    MarkedSuccess,
    MarkedFailure,
    Terminated,
    Committed,
    RolledBack,
}

impl TransactionState {
    #[allow(dead_code)] // cover all states
    #[duplicate_item(
        fn_name                variant;
        [ is_active ]          [ Active ];
        [ is_marked_success ]  [ MarkedSuccess ];
        [ is_marked_failure ]  [ MarkedFailure ];
        [ is_terminated ]      [ Terminated ];
        [ is_committed ]       [ Committed ];
        [ is_rolled_back ]     [ RolledBack ];
    )]
    pub fn fn_name(&self) -> bool {
        matches!(self, TransactionState::variant)
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::RolledBack
        )
    }
}

/// The state machine itself, shared between a [`Transaction`] and the
/// [`Session`] that spawned it (the session consults it for the
/// one-transaction-per-session guard and flips it to
/// [`TransactionState::Terminated`] on reset).
#[derive(Debug)]
pub(crate) struct TxStateMachine {
    state: AtomicRefCell<TransactionState>,
}

impl TxStateMachine {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicRefCell::new(TransactionState::Active),
        }
    }

    pub(crate) fn current(&self) -> TransactionState {
        *self.state.borrow()
    }

    /// `Active → MarkedSuccess`; no-op in every other state.
    pub(crate) fn mark_success(&self) {
        let mut state = self.state.borrow_mut();
        if state.is_active() {
            *state = TransactionState::MarkedSuccess;
        }
    }

    /// `{Active, MarkedSuccess} → MarkedFailure`; no-op in every other state.
    pub(crate) fn mark_failure(&self) {
        let mut state = self.state.borrow_mut();
        if state.is_active() || state.is_marked_success() {
            *state = TransactionState::MarkedFailure;
        }
    }

    /// Any non-terminal state `→ Terminated`; no-op on terminal states.
    pub(crate) fn mark_terminated(&self) {
        let mut state = self.state.borrow_mut();
        if !state.is_terminal() {
            *state = TransactionState::Terminated;
        }
    }

    fn set_committed(&self) {
        *self.state.borrow_mut() = TransactionState::Committed;
    }

    fn set_rolled_back(&self) {
        *self.state.borrow_mut() = TransactionState::RolledBack;
    }
}

/// What a concrete transaction variant must supply on top of the shared
/// state machine.
#[enum_dispatch]
pub(crate) trait TransactionIo {
    fn run(&mut self, statement: &Statement) -> Result<RecordSource>;

    /// Perform the actual commit, returning the new bookmark if one was
    /// issued.
    fn commit(&mut self) -> Result<Option<String>>;

    fn rollback(&mut self) -> Result<()>;
}

#[enum_dispatch(TransactionIo)]
#[derive(Debug)]
pub(crate) enum TransactionBackend {
    Network(NetworkTransaction),
    Embedded(EmbeddedTransaction),
}

/// Explicit transaction whose begin/commit/rollback are protocol messages on
/// a connection.
#[derive(Debug)]
pub(crate) struct NetworkTransaction {
    connection: Rc<RefCell<Box<dyn Connection>>>,
}

impl NetworkTransaction {
    pub(crate) fn new(connection: Rc<RefCell<Box<dyn Connection>>>) -> Self {
        Self { connection }
    }
}

impl TransactionIo for NetworkTransaction {
    fn run(&mut self, statement: &Statement) -> Result<RecordSource> {
        let handle = self.connection.borrow_mut().run(statement)?;
        Ok(NetworkRecordSource::new(Rc::clone(&self.connection), handle).into())
    }

    fn commit(&mut self) -> Result<Option<String>> {
        self.connection.borrow_mut().commit()
    }

    fn rollback(&mut self) -> Result<()> {
        self.connection.borrow_mut().rollback()
    }
}

/// Transaction backed by an in-process engine handle. There is no network
/// stream to coordinate; results arrive fully materialised.
#[derive(Debug)]
pub(crate) struct EmbeddedTransaction {
    handle: Box<dyn EmbeddedTransactionHandle>,
}

impl EmbeddedTransaction {
    pub(crate) fn new(handle: Box<dyn EmbeddedTransactionHandle>) -> Self {
        Self { handle }
    }
}

impl TransactionIo for EmbeddedTransaction {
    fn run(&mut self, statement: &Statement) -> Result<RecordSource> {
        let result = self.handle.execute(statement)?;
        Ok(EmbeddedRecordSource::new(result).into())
    }

    fn commit(&mut self) -> Result<Option<String>> {
        self.handle.commit()?;
        Ok(None)
    }

    fn rollback(&mut self) -> Result<()> {
        self.handle.rollback()
    }
}

/// Ordered, append-only collection of the cursors a transaction has spawned.
///
/// Before a commit or rollback, every held cursor is drained in order; the
/// first failure that has not already reached a consumer is reported.
#[derive(Debug, Default)]
pub(crate) struct ResultCursorsHolder {
    cursors: Vec<Rc<RefCell<CursorCore>>>,
}

impl ResultCursorsHolder {
    fn append(&mut self, cursor: Rc<RefCell<CursorCore>>) {
        self.cursors.push(cursor);
    }

    fn retrieve_not_consumed_error(&mut self) -> Option<DriverError> {
        let mut first_error = None;
        for cursor in &self.cursors {
            if let Err(error) = cursor.borrow_mut().drain() {
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }
        first_error
    }
}

/// A transaction under caller control.
///
/// Obtained from [`Session::begin_transaction()`]. The transaction tracks
/// every cursor it spawns; their errors resurface on
/// [`Transaction::commit()`] / [`Transaction::rollback()`] if nothing
/// consumed them earlier.
#[derive(Debug)]
pub struct Transaction {
    state: Arc<TxStateMachine>,
    backend: TransactionBackend,
    cursors: ResultCursorsHolder,
    session_bookmarks: SharedBookmarks,
}

impl Transaction {
    pub(crate) fn new(
        state: Arc<TxStateMachine>,
        backend: TransactionBackend,
        session_bookmarks: SharedBookmarks,
    ) -> Self {
        Self {
            state,
            backend,
            cursors: ResultCursorsHolder::default(),
            session_bookmarks,
        }
    }

    /// The current lifecycle state.
    pub fn state(&self) -> TransactionState {
        self.state.current()
    }

    /// Whether the transaction has not reached a terminal state yet.
    pub fn is_open(&self) -> bool {
        !self.state.current().is_terminal()
    }

    /// Mark the transaction to be committed on [`Transaction::close()`].
    ///
    /// No-op unless the transaction is in its initial state.
    pub fn success(&mut self) {
        self.state.mark_success();
    }

    /// Mark the transaction to be rolled back on [`Transaction::close()`],
    /// overriding a previous [`Transaction::success()`].
    pub fn failure(&mut self) {
        self.state.mark_failure();
    }

    /// Run a statement inside this transaction.
    ///
    /// Fails once the transaction has been committed, rolled back, marked
    /// failed, or terminated.
    pub fn run(&mut self, statement: impl Into<Statement>) -> Result<ResultCursor> {
        let statement = statement.into();
        self.ensure_can_run()?;
        let source = self.backend.run(&statement)?;
        let core = Rc::new(RefCell::new(CursorCore::new(source, None)));
        self.cursors.append(Rc::clone(&core));
        Ok(ResultCursor::new(statement, core))
    }

    /// Commit the transaction.
    ///
    ///  * Fails if the transaction has been rolled back or terminated.
    ///  * No-op if it is already committed.
    ///  * An error from a cursor that nothing consumed earlier takes
    ///    precedence over a commit error; the latter is attached as a
    ///    suppressed error.
    ///
    /// The transaction ends in [`TransactionState::Committed`] even when the
    /// commit fails: the acknowledgement may have been lost while the server
    /// went through with the commit, so the driver must not pretend it knows
    /// the transaction was rolled back.
    pub fn commit(&mut self) -> Result<()> {
        match self.state.current() {
            TransactionState::Committed => return Ok(()),
            TransactionState::RolledBack => {
                return Err(DriverError::client(
                    "transaction can't be committed; it has already been rolled back",
                ))
            }
            TransactionState::Terminated => {
                return Err(DriverError::client(
                    "transaction can't be committed; it has been terminated",
                ))
            }
            _ => {}
        }
        let cursor_error = self.cursors.retrieve_not_consumed_error();
        let commit_result = self.backend.commit();
        self.state.set_committed();
        if let Ok(Some(bookmark)) = &commit_result {
            *self.session_bookmarks.borrow_mut() =
                Arc::new(Bookmarks::from_raw([bookmark.clone()]));
        }
        match (cursor_error, commit_result) {
            (None, Ok(_)) => Ok(()),
            (None, Err(commit_error)) => Err(commit_error),
            (Some(error), Ok(_)) => Err(error),
            (Some(error), Err(commit_error)) => Err(error.with_suppressed(commit_error)),
        }
    }

    /// Roll back the transaction.
    ///
    ///  * Fails if the transaction has been committed.
    ///  * No-op if it is already rolled back or terminated (a terminated
    ///    transaction is conceptually rolled back already).
    pub fn rollback(&mut self) -> Result<()> {
        match self.state.current() {
            TransactionState::RolledBack => return Ok(()),
            TransactionState::Committed => {
                return Err(DriverError::client(
                    "transaction can't be rolled back; it has already been committed",
                ))
            }
            TransactionState::Terminated => {
                self.state.set_rolled_back();
                return Ok(());
            }
            _ => {}
        }
        let cursor_error = self.cursors.retrieve_not_consumed_error();
        let rollback_result = self.backend.rollback();
        self.state.set_rolled_back();
        match (cursor_error, rollback_result) {
            (None, Ok(())) => Ok(()),
            (None, Err(rollback_error)) => Err(rollback_error),
            (Some(error), Ok(())) => Err(error),
            (Some(error), Err(rollback_error)) => Err(error.with_suppressed(rollback_error)),
        }
    }

    /// Finish the transaction: commit if it has been marked successful, roll
    /// back otherwise. No-op if it is already terminal.
    pub fn close(&mut self) -> Result<()> {
        match self.state.current() {
            TransactionState::Committed | TransactionState::RolledBack => Ok(()),
            TransactionState::MarkedSuccess => self.commit(),
            _ => self.rollback(),
        }
    }

    fn ensure_can_run(&self) -> Result<()> {
        match self.state.current() {
            TransactionState::Active | TransactionState::MarkedSuccess => Ok(()),
            TransactionState::MarkedFailure => Err(DriverError::client(
                "cannot run statement in a transaction marked for failure",
            )),
            TransactionState::Terminated => Err(DriverError::client(
                "cannot run statement in a terminated transaction",
            )),
            TransactionState::Committed => Err(DriverError::client(
                "cannot run statement in a committed transaction",
            )),
            TransactionState::RolledBack => Err(DriverError::client(
                "cannot run statement in a rolled back transaction",
            )),
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            info!("swallowed error while closing dropped transaction: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::*;

    use crate::driver::io::{Fetched, MockConnection, StreamHandle};
    use crate::error_::ErrorKind;

    fn shared_bookmarks() -> SharedBookmarks {
        Arc::new(AtomicRefCell::new(Arc::new(Bookmarks::empty())))
    }

    fn network_transaction(connection: MockConnection) -> Transaction {
        let connection: Rc<RefCell<Box<dyn Connection>>> =
            Rc::new(RefCell::new(Box::new(connection)));
        Transaction::new(
            Arc::new(TxStateMachine::new()),
            NetworkTransaction::new(connection).into(),
            shared_bookmarks(),
        )
    }

    #[rstest]
    fn state_machine_success_only_from_active() {
        let machine = TxStateMachine::new();
        machine.mark_success();
        assert!(machine.current().is_marked_success());
        machine.mark_failure();
        assert!(machine.current().is_marked_failure());
        // no way back
        machine.mark_success();
        assert!(machine.current().is_marked_failure());
    }

    #[rstest]
    fn state_machine_terminated_is_not_terminal() {
        let machine = TxStateMachine::new();
        machine.mark_terminated();
        assert!(machine.current().is_terminated());
        assert!(!machine.current().is_terminal());
        machine.set_rolled_back();
        assert!(machine.current().is_terminal());
        machine.mark_terminated();
        assert!(machine.current().is_rolled_back());
    }

    #[rstest]
    fn commit_after_terminated_is_a_client_error() {
        let mut tx = network_transaction(MockConnection::new());
        tx.state.mark_terminated();
        let error = tx.commit().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Client);
        assert!(error.message().contains("can't be committed"));
    }

    #[rstest]
    fn rollback_after_terminated_is_a_no_op() {
        let mut tx = network_transaction(MockConnection::new());
        tx.state.mark_terminated();
        tx.rollback().unwrap();
        assert!(tx.state().is_rolled_back());
        // second rollback stays fine
        tx.rollback().unwrap();
    }

    #[rstest]
    fn commit_is_idempotent_and_blocks_rollback() {
        let mut connection = MockConnection::new();
        connection
            .expect_commit()
            .times(1)
            .returning(|| Ok(Some(String::from("bm-1"))));
        let mut tx = network_transaction(connection);
        tx.commit().unwrap();
        assert!(tx.state().is_committed());
        assert_eq!(
            tx.session_bookmarks.borrow().last_bookmark(),
            Some("bm-1")
        );
        // no second protocol commit
        tx.commit().unwrap();
        let error = tx.rollback().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Client);
    }

    #[rstest]
    fn close_commits_iff_marked_success(#[values(true, false)] mark_failure_after: bool) {
        let mut connection = MockConnection::new();
        if mark_failure_after {
            connection.expect_rollback().times(1).returning(|| Ok(()));
        } else {
            connection.expect_commit().times(1).returning(|| Ok(None));
        }
        let mut tx = network_transaction(connection);
        tx.success();
        if mark_failure_after {
            tx.failure();
        }
        tx.close().unwrap();
        assert_eq!(tx.state().is_committed(), !mark_failure_after);
    }

    #[rstest]
    fn run_is_rejected_after_failure_marking() {
        let mut connection = MockConnection::new();
        connection.expect_rollback().times(1).returning(|| Ok(()));
        let mut tx = network_transaction(connection);
        tx.failure();
        let error = tx.run("RETURN 1").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Client);
    }

    #[rstest]
    fn unconsumed_cursor_error_is_primary_on_commit() {
        let mut connection = MockConnection::new();
        connection.expect_run().times(1).returning(|_| {
            Ok(StreamHandle {
                stream_id: 1,
                keys: vec![Arc::new(String::from("n"))],
            })
        });
        connection
            .expect_discard()
            .times(1)
            .returning(|_| Err(DriverError::database("statement blew up")));
        connection
            .expect_commit()
            .times(1)
            .returning(|| Err(DriverError::service_unavailable("connection gone")));
        let mut tx = network_transaction(connection);
        let _cursor = tx.run("RETURN 1").unwrap();

        let error = tx.commit().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Database);
        assert_eq!(error.suppressed().len(), 1);
        assert_eq!(error.suppressed()[0].kind(), ErrorKind::ServiceUnavailable);
        assert!(tx.state().is_committed());
    }

    #[rstest]
    fn failed_commit_still_ends_in_committed() {
        let mut connection = MockConnection::new();
        connection
            .expect_commit()
            .times(1)
            .returning(|| Err(DriverError::service_unavailable("ack lost")));
        let mut tx = network_transaction(connection);

        let error = tx.commit().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ServiceUnavailable);
        // whether the server went through with the commit is unknown; the
        // transaction must not present itself as rolled back
        assert!(tx.state().is_committed());
        tx.rollback().unwrap_err();
        // and a repeated commit does not hit the protocol again
        tx.commit().unwrap();
    }

    #[rstest]
    fn consumed_cursor_error_does_not_resurface() {
        let mut connection = MockConnection::new();
        connection.expect_run().times(1).returning(|_| {
            Ok(StreamHandle {
                stream_id: 1,
                keys: vec![Arc::new(String::from("n"))],
            })
        });
        connection
            .expect_fetch()
            .times(1)
            .returning(|_| Err(DriverError::database("statement blew up")));
        connection.expect_commit().times(1).returning(|| Ok(None));
        let mut tx = network_transaction(connection);
        let mut cursor = tx.run("RETURN 1").unwrap();
        cursor.next().unwrap().unwrap_err();

        tx.commit().unwrap();
        assert!(tx.state().is_committed());
    }

    #[rstest]
    fn dropped_transaction_rolls_back() {
        let mut connection = MockConnection::new();
        connection.expect_rollback().times(1).returning(|| Ok(()));
        let tx = network_transaction(connection);
        drop(tx);
    }

    #[rstest]
    fn run_in_order_streams_fetch_independently() {
        let mut connection = MockConnection::new();
        let mut stream_id = 0;
        connection.expect_run().times(2).returning(move |_| {
            stream_id += 1;
            Ok(StreamHandle {
                stream_id,
                keys: vec![Arc::new(String::from("x"))],
            })
        });
        connection.expect_fetch().returning(|handle| {
            Ok(Fetched::Record(vec![crate::value::Value::Integer(
                handle.stream_id,
            )]))
        });
        connection.expect_discard().returning(|_| Ok(Default::default()));
        connection.expect_rollback().returning(|| Ok(()));
        let mut tx = network_transaction(connection);
        let mut first = tx.run("RETURN 1").unwrap();
        let mut second = tx.run("RETURN 2").unwrap();
        assert_eq!(
            first.next().unwrap().unwrap().value("x"),
            Some(&crate::value::Value::Integer(1))
        );
        assert_eq!(
            second.next().unwrap().unwrap().value("x"),
            Some(&crate::value::Value::Integer(2))
        );
    }
}
