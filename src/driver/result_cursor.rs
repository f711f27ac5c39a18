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
use std::collections::VecDeque;
use std::iter::FusedIterator;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use atomic_refcell::AtomicRefCell;
use enum_dispatch::enum_dispatch;

use super::embedded::EmbeddedResult;
use super::io::{Connection, Fetched, ResponseMeta, StreamHandle};
use super::record::Record;
use super::session::bookmarks::{Bookmarks, SharedBookmarks};
use super::summary::Summary;
use super::Statement;
use crate::error_::{DriverError, NoSuchRecordError, Result};

/// Where a cursor's records come from.
#[enum_dispatch]
pub(crate) trait RecordFetch {
    fn keys(&self) -> &[Arc<String>];

    /// Produce the next response of the stream.
    fn fetch_next(&mut self) -> Result<Fetched>;

    /// Throw away the rest of the stream, returning the summary metadata.
    fn discard_rest(&mut self) -> Result<ResponseMeta>;
}

#[enum_dispatch(RecordFetch)]
#[derive(Debug)]
pub(crate) enum RecordSource {
    Network(NetworkRecordSource),
    Embedded(EmbeddedRecordSource),
}

/// Pulls records lazily over the connection the statement ran on.
#[derive(Debug)]
pub(crate) struct NetworkRecordSource {
    connection: Rc<RefCell<Box<dyn Connection>>>,
    handle: StreamHandle,
}

impl NetworkRecordSource {
    pub(crate) fn new(connection: Rc<RefCell<Box<dyn Connection>>>, handle: StreamHandle) -> Self {
        Self { connection, handle }
    }
}

impl RecordFetch for NetworkRecordSource {
    fn keys(&self) -> &[Arc<String>] {
        &self.handle.keys
    }

    fn fetch_next(&mut self) -> Result<Fetched> {
        self.connection.borrow_mut().fetch(&self.handle)
    }

    fn discard_rest(&mut self) -> Result<ResponseMeta> {
        self.connection.borrow_mut().discard(&self.handle)
    }
}

/// Re-exposes the embedded engine's materialised rows one by one.
#[derive(Debug)]
pub(crate) struct EmbeddedRecordSource {
    keys: Vec<Arc<String>>,
    records: VecDeque<Vec<crate::value::Value>>,
    metadata: Option<ResponseMeta>,
}

impl EmbeddedRecordSource {
    pub(crate) fn new(result: EmbeddedResult) -> Self {
        let EmbeddedResult {
            keys,
            records,
            metadata,
        } = result;
        Self {
            keys,
            records: records.into(),
            metadata: Some(metadata),
        }
    }
}

impl RecordFetch for EmbeddedRecordSource {
    fn keys(&self) -> &[Arc<String>] {
        &self.keys
    }

    fn fetch_next(&mut self) -> Result<Fetched> {
        Ok(match self.records.pop_front() {
            Some(values) => Fetched::Record(values),
            None => Fetched::Summary(self.metadata.take().unwrap_or_default()),
        })
    }

    fn discard_rest(&mut self) -> Result<ResponseMeta> {
        self.records.clear();
        Ok(self.metadata.take().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Streaming,
    Done,
}

/// The part of a cursor that the owning session and transaction keep a
/// reference to, so they can drain it before reusing the connection.
#[derive(Debug)]
pub(crate) struct CursorCore {
    source: RecordSource,
    keys: Vec<Arc<String>>,
    state: StreamState,
    failure: Option<DriverError>,
    end_meta: Option<ResponseMeta>,
    bookmark_sink: Option<SharedBookmarks>,
}

impl CursorCore {
    pub(crate) fn new(source: RecordSource, bookmark_sink: Option<SharedBookmarks>) -> Self {
        let keys = source.keys().to_vec();
        Self {
            source,
            keys,
            state: StreamState::Streaming,
            failure: None,
            end_meta: None,
            bookmark_sink,
        }
    }

    pub(crate) fn keys(&self) -> &[Arc<String>] {
        &self.keys
    }

    fn next_record(&mut self) -> Option<Result<Record>> {
        if self.state == StreamState::Done {
            return self.failure.take().map(Err);
        }
        match self.source.fetch_next() {
            Ok(Fetched::Record(values)) => Some(Ok(Record::new(&self.keys, values))),
            Ok(Fetched::Summary(meta)) => {
                self.finish(meta);
                None
            }
            Err(error) => {
                self.state = StreamState::Done;
                Some(Err(error))
            }
        }
    }

    fn finish(&mut self, mut meta: ResponseMeta) {
        self.state = StreamState::Done;
        if let Some(crate::value::Value::String(bookmark)) = meta.remove("bookmark") {
            if let Some(sink) = &self.bookmark_sink {
                *sink.borrow_mut() = Arc::new(Bookmarks::from_raw([bookmark]));
            }
        }
        self.end_meta = Some(meta);
    }

    /// Exhaust the stream, discarding records. The first failure (from the
    /// stream or recorded earlier and not yet handed to a consumer) is
    /// returned.
    pub(crate) fn drain(&mut self) -> Result<()> {
        if self.state == StreamState::Streaming {
            match self.source.discard_rest() {
                Ok(meta) => self.finish(meta),
                Err(error) => {
                    self.state = StreamState::Done;
                    return Err(error);
                }
            }
        }
        match self.failure.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Force-fail the stream, e.g., because the session was reset underneath
    /// it. The error is surfaced on the next consumption attempt.
    pub(crate) fn terminate(&mut self, error: DriverError) {
        if self.state == StreamState::Streaming {
            self.state = StreamState::Done;
            self.failure = Some(error);
        }
    }

    fn take_end_meta(&mut self) -> ResponseMeta {
        self.end_meta.take().unwrap_or_default()
    }
}

/// Lazy, single-consumer stream of [`Record`]s produced by one statement.
///
/// The cursor implements [`Iterator`]; additionally it supports a one-record
/// look-ahead via [`ResultCursor::peek()`] and materialises the statement's
/// [`Summary`] via [`ResultCursor::consume()`].
#[derive(Debug)]
pub struct ResultCursor {
    statement: Statement,
    keys: Vec<Arc<String>>,
    core: Rc<RefCell<CursorCore>>,
    peeked: AtomicBool,
    peek_slot: AtomicRefCell<Option<Record>>,
    summary: AtomicRefCell<Option<Arc<Summary>>>,
}

impl ResultCursor {
    pub(crate) fn new(statement: Statement, core: Rc<RefCell<CursorCore>>) -> Self {
        let keys = core.borrow().keys().to_vec();
        Self {
            statement,
            keys,
            core,
            peeked: AtomicBool::new(false),
            peek_slot: AtomicRefCell::new(None),
            summary: AtomicRefCell::new(None),
        }
    }

    /// The column names of the result, in statement order.
    pub fn keys(&self) -> Vec<Arc<String>> {
        self.keys.iter().map(Arc::clone).collect()
    }

    /// The statement this cursor belongs to.
    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    /// Whether another call to `next()` would produce a record.
    ///
    /// Fetches (and buffers) the next record if necessary.
    pub fn has_next(&mut self) -> Result<bool> {
        self.fill_peek_slot()
    }

    /// Return the next record without consuming it.
    ///
    /// The following `next()` returns the same record.
    /// Fails with a no-such-record error when the stream is exhausted.
    pub fn peek(&mut self) -> Result<Record> {
        if !self.fill_peek_slot()? {
            return Err(NoSuchRecordError::NoRecords.into());
        }
        Ok(self
            .peek_slot
            .borrow()
            .as_ref()
            .expect("peek slot filled above")
            .clone())
    }

    /// Return the only record of the result.
    ///
    /// Fails with a no-such-record error when the stream is empty or holds
    /// more than one record. In the latter case the rest of the stream is
    /// discarded.
    pub fn single(&mut self) -> Result<Record> {
        let Some(record) = self.next().transpose()? else {
            return Err(NoSuchRecordError::NoRecords.into());
        };
        match self.next().transpose()? {
            None => Ok(record),
            Some(_) => {
                self.core.borrow_mut().drain()?;
                Err(NoSuchRecordError::TooManyRecords.into())
            }
        }
    }

    /// Collect all remaining records into a [`Vec`].
    pub fn list(&mut self) -> Result<Vec<Record>> {
        self.by_ref().collect()
    }

    /// Collect all remaining records, passing each through `mapper`.
    pub fn list_with<T>(&mut self, mut mapper: impl FnMut(Record) -> Result<T>) -> Result<Vec<T>> {
        self.by_ref()
            .map(|record| record.and_then(&mut mapper))
            .collect()
    }

    /// Discard all remaining records and return the statement's [`Summary`].
    ///
    /// The summary is computed at most once: repeated calls return the same
    /// [`Arc`].
    pub fn consume(&mut self) -> Result<Arc<Summary>> {
        if let Some(summary) = self.summary.borrow().as_ref() {
            return Ok(Arc::clone(summary));
        }
        self.clear_peek_slot();
        let meta = {
            let mut core = self.core.borrow_mut();
            core.drain()?;
            core.take_end_meta()
        };
        let summary = Arc::new(Summary::parse(self.statement.text(), meta)?);
        *self.summary.borrow_mut() = Some(Arc::clone(&summary));
        Ok(summary)
    }

    /// The already materialised summary, if [`ResultCursor::consume()`] has
    /// been called before.
    pub fn summary(&self) -> Option<Arc<Summary>> {
        self.summary.borrow().as_ref().map(Arc::clone)
    }

    fn fill_peek_slot(&mut self) -> Result<bool> {
        if self.peeked.load(Ordering::Acquire) {
            return Ok(true);
        }
        match self.core.borrow_mut().next_record() {
            Some(Ok(record)) => {
                *self.peek_slot.borrow_mut() = Some(record);
                self.peeked.store(true, Ordering::Release);
                Ok(true)
            }
            Some(Err(error)) => Err(error),
            None => Ok(false),
        }
    }

    fn clear_peek_slot(&mut self) {
        if self
            .peeked
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.peek_slot.borrow_mut().take();
        }
    }
}

impl Iterator for ResultCursor {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self
            .peeked
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return self.peek_slot.borrow_mut().take().map(Ok);
        }
        self.core.borrow_mut().next_record()
    }
}

impl FusedIterator for ResultCursor {}
