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

//! The seam towards an in-process graph engine.
//!
//! When the driver is constructed from a `file://` URI, statements are not
//! shipped over a socket but handed to a [`CypherRunner`]. The engine itself
//! (storage, query execution) lives outside this crate.

use std::fmt::Debug;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use crate::driver::io::ResponseMeta;
use crate::driver::transaction::TransactionConfig;
use crate::driver::Statement;
use crate::error_::Result;
use crate::value::Value;

/// A fully materialised result as produced by the embedded engine.
///
/// The engine has no lazy record stream to offer; it returns all rows at
/// once and the cursor layer re-exposes them incrementally.
#[derive(Debug)]
pub struct EmbeddedResult {
    pub keys: Vec<Arc<String>>,
    /// Row values, each in key order.
    pub records: Vec<Vec<Value>>,
    /// Summary metadata in the same shape a server would send.
    pub metadata: ResponseMeta,
}

/// Executes statements against an in-process graph engine.
#[cfg_attr(test, automock)]
pub trait CypherRunner: Debug + Send + Sync {
    /// Run a single statement in its own engine-managed transaction.
    fn execute(&self, statement: &Statement, config: &TransactionConfig) -> Result<EmbeddedResult>;

    /// Open an engine transaction under caller control.
    fn begin_transaction(
        &self,
        config: &TransactionConfig,
    ) -> Result<Box<dyn EmbeddedTransactionHandle>>;
}

/// An open transaction inside the embedded engine.
#[cfg_attr(test, automock)]
pub trait EmbeddedTransactionHandle: Debug {
    fn execute(&mut self, statement: &Statement) -> Result<EmbeddedResult>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;
}
