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

//! # Graphium
//!
//! Session and transaction client core for graph databases.
//!
//! This crate contains the coordination half of a graph database driver: it
//! runs parameterised statements through sessions, manages the transaction
//! lifecycle, streams result records through lazy cursors, retries transient
//! failures, and keeps cluster routing tables fresh. The connection layer
//! (sockets, TLS, wire protocol, pooling) is supplied from outside through
//! the traits in [`driver::io`]; an in-process engine can be plugged in
//! through [`driver::embedded`] instead.
//!
//! ## Concepts
//!
//! ### The Driver
//! The fundamental type of this crate is the [`Driver`]. It is created once
//! per deployment and shared; where to connect to is described by a
//! [`ConnectionConfig`], typically parsed from a URI:
//!
//! ```
//! use graphium::driver::{ConnectionConfig, ConnectionTarget};
//!
//! let config: ConnectionConfig = "bolt+routing://db.example.com:7687".parse().unwrap();
//! assert!(matches!(config.target(), ConnectionTarget::Routing { .. }));
//! ```
//!
//! ### Sessions
//! Sessions are spawned from the driver, see [`Driver::session()`]. A
//! session runs one thing at a time: a statement in an auto-commit
//! transaction ([`Session::run()`]), a transaction under caller control
//! ([`Session::begin_transaction()`]), or a retried transaction function
//! ([`Session::read_transaction()`], [`Session::write_transaction()`]).
//!
//! ### Causal Consistency
//! Clusters are eventually consistent; to read your own writes across
//! sessions, pass [`Bookmarks`] from one session to the next. Within a
//! session, bookmarks are chained automatically: every successful commit
//! replaces the session's bookmarks with those the server handed back.
//!
//! ## Logging
//! The driver uses the [`log`] crate for logging.
//!
//! **Important Notes on Usage:**
//!  * Log messages are *not* considered part of the driver's API.
//!    They may change at any time and don't follow semantic versioning.
//!  * The driver's logs are meant for debugging the driver itself.
//!    If there are problems the user-code needs to be aware of, they will be
//!    reported via [`Result`]s, not log messages.

mod address_;
pub mod driver;
mod error_;
mod macros;
mod time;
pub mod value;

// imports for docs
#[allow(unused)]
use bookmarks::Bookmarks;
#[allow(unused)]
use driver::{ConnectionConfig, Driver};
#[allow(unused)]
use session::Session;

pub use error_::{DriverError, ErrorKind, Result};
pub use value::Value;

/// Server addresses.
pub mod address {
    pub use super::address_::*;
}
/// Bookmarks for causal chaining between sessions.
pub mod bookmarks {
    pub use super::driver::session::bookmarks::*;
}
/// Error and result types.
pub mod error {
    pub use super::error_::*;
}
/// Retry policies.
pub mod retry {
    pub use super::driver::session::retry::*;
}
/// Session and session configuration.
pub mod session {
    pub use super::driver::session::*;
}
/// Statement summary structs (metadata) received via
/// [`ResultCursor::consume()`](crate::driver::result_cursor::ResultCursor::consume).
pub mod summary {
    pub use super::driver::summary::*;
}
/// Transactions and associated types.
pub mod transaction {
    pub use super::driver::transaction::*;
}
