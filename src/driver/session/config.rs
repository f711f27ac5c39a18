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

use std::sync::Arc;

use crate::driver::io::AccessMode;
use crate::driver::session::bookmarks::Bookmarks;

/// Configure how a session should behave.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub(crate) database: Option<Arc<String>>,
    pub(crate) bookmarks: Option<Arc<Bookmarks>>,
    pub(crate) default_access_mode: AccessMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            database: None,
            bookmarks: None,
            default_access_mode: AccessMode::Write,
        }
    }
}

impl SessionConfig {
    /// Create a new session configuration with default values.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Target a specific database.
    ///
    /// When omitted, the server-side default database is used. Always
    /// specify the database when you can; it saves round trips in a cluster.
    #[inline]
    pub fn with_database(mut self, database: Arc<String>) -> Self {
        self.database = Some(database);
        self
    }

    /// Use the default database.
    ///
    /// This is the *default*.
    #[inline]
    pub fn with_default_database(mut self) -> Self {
        self.database = None;
        self
    }

    /// Initial bookmarks to chain this session's first transaction after.
    #[inline]
    pub fn with_bookmarks(mut self, bookmarks: Arc<Bookmarks>) -> Self {
        self.bookmarks = Some(bookmarks);
        self
    }

    /// Start without any bookmarks.
    ///
    /// This is the *default*.
    #[inline]
    pub fn without_bookmarks(mut self) -> Self {
        self.bookmarks = None;
        self
    }

    /// Whether statements run outside a caller-controlled transaction should
    /// target a reader or a writer.
    ///
    /// *Default*: [`AccessMode::Write`].
    #[inline]
    pub fn with_default_access_mode(mut self, mode: AccessMode) -> Self {
        self.default_access_mode = mode;
        self
    }
}

impl AsRef<SessionConfig> for SessionConfig {
    #[inline]
    fn as_ref(&self) -> &SessionConfig {
        self
    }
}
