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

//! The seams through which the session core talks to the connection layer.
//!
//! The concrete connection pool, socket handling, and wire protocol live
//! outside this crate; the core only relies on the traits below.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use crate::address_::Address;
use crate::driver::session::bookmarks::Bookmarks;
use crate::driver::transaction::TransactionConfig;
use crate::driver::Statement;
use crate::error_::Result;
use crate::value::Value;

/// Metadata map attached to server responses (statement summaries, routing
/// procedure results, commit acknowledgements).
pub type ResponseMeta = HashMap<String, Value>;

/// Whether work should be routed to a server that accepts writes or whether
/// any read replica will do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Read,
    Write,
}

/// Identifies one running statement's record stream on a connection.
///
/// A connection can multiplex several streams inside an explicit transaction;
/// the handle tells it which one a [`Connection::fetch()`] call refers to.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    pub stream_id: i64,
    pub keys: Vec<Arc<String>>,
}

/// One step of progress on a record stream.
#[derive(Debug)]
pub enum Fetched {
    /// The next record's values, in key order.
    Record(Vec<Value>),
    /// The stream is exhausted; the metadata describes the statement's
    /// outcome (summary counters, bookmark, ...).
    Summary(ResponseMeta),
}

/// Hands out live connections for a unit of work.
#[cfg_attr(test, automock)]
pub trait ConnectionProvider: Debug + Send + Sync {
    /// Acquire a connection suitable for `mode` against `database`.
    fn acquire<'a>(
        &self,
        mode: AccessMode,
        database: Option<&'a Arc<String>>,
    ) -> Result<Box<dyn Connection>>;

    /// Drop pooled connections to every server not in `addresses`.
    fn retain_all(&self, addresses: &HashSet<Arc<Address>>) -> Result<()>;

    fn close(&self) -> Result<()>;
}

/// A single live connection to one server.
///
/// All statement dispatch, transaction control, and stream consumption of the
/// core goes through this trait.
#[cfg_attr(test, automock)]
pub trait Connection: Debug {
    fn server_address(&self) -> Arc<Address>;

    fn is_open(&self) -> bool;

    /// Open an explicit transaction.
    fn begin(
        &mut self,
        bookmarks: &Bookmarks,
        config: &TransactionConfig,
        mode: AccessMode,
    ) -> Result<()>;

    /// Run a statement in its own server-managed transaction.
    fn run_auto_commit(
        &mut self,
        statement: &Statement,
        bookmarks: &Bookmarks,
        config: &TransactionConfig,
        mode: AccessMode,
    ) -> Result<StreamHandle>;

    /// Run a statement inside the currently open explicit transaction.
    fn run(&mut self, statement: &Statement) -> Result<StreamHandle>;

    /// Advance the given record stream by one response.
    fn fetch(&mut self, stream: &StreamHandle) -> Result<Fetched>;

    /// Throw away the rest of the given record stream, returning the
    /// summary metadata.
    fn discard(&mut self, stream: &StreamHandle) -> Result<ResponseMeta>;

    /// Commit the open explicit transaction, returning the new bookmark, if
    /// the server issued one.
    fn commit(&mut self) -> Result<Option<String>>;

    /// Roll back the open explicit transaction.
    fn rollback(&mut self) -> Result<()>;

    /// Wipe all connection state so it can be reused.
    fn reset(&mut self) -> Result<()>;

    /// Return the connection to its pool.
    fn release(&mut self) -> Result<()>;

    /// Kill the connection and return it to the pool, ignoring all errors.
    fn terminate_and_release(&mut self, reason: &str);
}

/// Address-keyed connection pool as used by the routing layer.
///
/// In contrast to [`ConnectionProvider`], which resolves an [`AccessMode`] to
/// a suitable server by itself, a `ServerPool` is told exactly which server
/// to connect to.
#[cfg_attr(test, automock)]
pub trait ServerPool: Debug + Send + Sync {
    fn acquire(&self, address: &Arc<Address>) -> Result<Box<dyn Connection>>;

    /// Number of connections to `address` currently handed out.
    fn in_use(&self, address: &Arc<Address>) -> usize;

    /// Drop pooled connections to every server not in `addresses`.
    fn retain_all(&self, addresses: &HashSet<Arc<Address>>) -> Result<()>;

    fn close(&self) -> Result<()>;
}
