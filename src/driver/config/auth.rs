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

use std::fmt::{Debug, Formatter};

const SCHEME_NONE: &str = "none";
const SCHEME_BASIC: &str = "basic";

/// Credentials handed to the connection layer on handshake.
///
/// The driver core only inspects the scheme (the embedded engine accepts
/// nothing but the `"none"` token); everything else is forwarded opaquely.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken {
    scheme: String,
    principal: Option<String>,
    credentials: Option<String>,
}

impl AuthToken {
    /// An explicit "no authentication" token.
    pub fn new_none_auth() -> Self {
        Self {
            scheme: String::from(SCHEME_NONE),
            principal: None,
            credentials: None,
        }
    }

    /// Username and password authentication.
    pub fn new_basic_auth(principal: impl Into<String>, credentials: impl Into<String>) -> Self {
        Self {
            scheme: String::from(SCHEME_BASIC),
            principal: Some(principal.into()),
            credentials: Some(credentials.into()),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    pub fn credentials(&self) -> Option<&str> {
        self.credentials.as_deref()
    }

    pub(crate) fn is_none_auth(&self) -> bool {
        self.scheme == SCHEME_NONE
    }
}

impl Debug for AuthToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("scheme", &self.scheme)
            .field("principal", &self.principal)
            .field("credentials", &self.credentials.as_ref().map(|_| "..."))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_does_not_leak_credentials() {
        let token = AuthToken::new_basic_auth("alice", "super secret");
        let rendered = format!("{token:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("super secret"));
    }

    #[test]
    fn none_auth_is_recognised() {
        assert!(AuthToken::new_none_auth().is_none_auth());
        assert!(!AuthToken::new_basic_auth("a", "b").is_none_auth());
    }
}
