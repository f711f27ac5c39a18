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

use atomic_refcell::AtomicRefCell;

/// The session's current bookmarks, shared with the transactions and cursors
/// that replace them on commit.
pub(crate) type SharedBookmarks = Arc<AtomicRefCell<Arc<Bookmarks>>>;

/// Container for bookmarks that can be used to build a causal chain between
/// sessions.
///
/// Bookmarks are opaque tokens handed out by the server. They are ordered:
/// the most recently received token comes last (see
/// [`Bookmarks::last_bookmark()`]). Joining two causal chains preserves the
/// order of the left-hand side and appends the unseen tokens of the
/// right-hand side.
///
/// # Example
/// ```
/// use graphium::bookmarks::Bookmarks;
///
/// fn create_bookmarks<const N: usize>(raw: [&str; N]) -> Bookmarks {
///     Bookmarks::from_raw(raw.into_iter().map(String::from))
/// }
///
/// let bm1 = create_bookmarks(["a", "b"]);
/// let bm2 = create_bookmarks(["b", "c"]);
///
/// let joined = bm1 + &bm2;
/// assert_eq!(joined.raw().collect::<Vec<_>>(), vec!["a", "b", "c"]);
/// assert_eq!(joined.last_bookmark(), Some("c"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bookmarks {
    bookmarks: Vec<Arc<String>>,
}

impl Bookmarks {
    /// Creates a new [`Bookmarks`] instance from the given raw bookmarks.
    ///
    /// Duplicates are dropped, keeping the first occurrence.
    pub fn from_raw(raw: impl IntoIterator<Item = String>) -> Self {
        let mut bookmarks = Self::default();
        for bookmark in raw {
            bookmarks.push(Arc::new(bookmark));
        }
        bookmarks
    }

    /// Creates a new [`Bookmarks`] containing no bookmarks.
    ///
    /// This is equivalent to [`Bookmarks::default()`].
    #[inline]
    pub fn empty() -> Self {
        Default::default()
    }

    /// Return the count of contained bookmarks.
    pub fn len(&self) -> usize {
        self.bookmarks.len()
    }

    /// Returns `true` if this [`Bookmarks`] contains no bookmarks.
    pub fn is_empty(&self) -> bool {
        self.bookmarks.is_empty()
    }

    /// The most recently appended bookmark, or [`None`] when empty.
    pub fn last_bookmark(&self) -> Option<&str> {
        self.bookmarks.last().map(|bm| bm.as_str())
    }

    /// Turn these [`Bookmarks`] into an iterator over the raw contained
    /// bookmarks.
    pub fn into_raw(self) -> impl Iterator<Item = String> {
        self.bookmarks
            .into_iter()
            .map(|bm| Arc::try_unwrap(bm).unwrap_or_else(|bm| String::from(&*bm)))
    }

    /// Return an iterator over the raw contained bookmarks.
    pub fn raw(&self) -> impl Iterator<Item = &str> {
        self.bookmarks.iter().map(|bm| bm.as_str())
    }

    fn push(&mut self, bookmark: Arc<String>) {
        if !self.bookmarks.contains(&bookmark) {
            self.bookmarks.push(bookmark);
        }
    }
}

impl std::ops::Add for Bookmarks {
    type Output = Bookmarks;

    fn add(mut self, rhs: Self) -> Self::Output {
        for bookmark in rhs.bookmarks {
            self.push(bookmark);
        }
        self
    }
}

impl std::ops::Add<&Bookmarks> for Bookmarks {
    type Output = Bookmarks;

    fn add(mut self, rhs: &Bookmarks) -> Self::Output {
        for bookmark in &rhs.bookmarks {
            self.push(Arc::clone(bookmark));
        }
        self
    }
}

impl std::ops::Add<&Bookmarks> for &Bookmarks {
    type Output = Bookmarks;

    fn add(self, rhs: &Bookmarks) -> Self::Output {
        self.clone() + rhs
    }
}

impl std::ops::AddAssign<Bookmarks> for Bookmarks {
    fn add_assign(&mut self, rhs: Bookmarks) {
        for bookmark in rhs.bookmarks {
            self.push(bookmark);
        }
    }
}

impl std::ops::AddAssign<&Bookmarks> for Bookmarks {
    fn add_assign(&mut self, rhs: &Bookmarks) {
        for bookmark in &rhs.bookmarks {
            self.push(Arc::clone(bookmark));
        }
    }
}
