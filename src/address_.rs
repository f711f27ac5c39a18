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

use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

pub(crate) const DEFAULT_PORT: u16 = 7687;
const COLON_BYTES: usize = ':'.len_utf8();

/// A server address.
///
/// # Example
/// ```
/// use graphium::address::Address;
///
/// // can be constructed from (&str, u16)
/// let address = Address::from(("localhost", 1234));
/// assert_eq!(address.host(), "localhost");
/// assert_eq!(address.port(), 1234);
///
/// // can be constructed from &str
/// let address = Address::from("example.com:5678");
/// assert_eq!(address.host(), "example.com");
/// assert_eq!(address.port(), 5678);
///
/// // or using the default port
/// let address = Address::from("localhost");
/// assert_eq!(address.host(), "localhost");
/// assert_eq!(address.port(), 7687);
///
/// // as well as IPv6 addresses
/// let address = Address::from("[::1]:4321");
/// assert_eq!(address.host(), "[::1]");
/// assert_eq!(address.port(), 4321);
/// ```
#[derive(Debug, Clone)]
pub struct Address {
    host: String,
    port: u16,
}

impl PartialEq for Address {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
    }
}

impl Address {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl From<(String, u16)> for Address {
    fn from((host, port): (String, u16)) -> Self {
        Self { host, port }
    }
}

impl From<(&str, u16)> for Address {
    fn from((host, port): (&str, u16)) -> Self {
        Self {
            host: String::from(host),
            port,
        }
    }
}

impl From<&str> for Address {
    fn from(host_port: &str) -> Self {
        // IPv6 hosts are bracketed, so only a colon after the closing bracket
        // can start a port
        let port_boundary = match host_port.rfind(']') {
            Some(bracket_end) => bracket_end + COLON_BYTES,
            None => 0,
        };
        match host_port[port_boundary..].rfind(':') {
            Some(colon) => {
                let colon = port_boundary + colon;
                let port = &host_port[colon + COLON_BYTES..];
                match port.parse() {
                    Ok(port) => Self {
                        host: String::from(&host_port[..colon]),
                        port,
                    },
                    Err(_) => Self {
                        host: String::from(host_port),
                        port: DEFAULT_PORT,
                    },
                }
            }
            None => Self {
                host: String::from(host_port),
                port: DEFAULT_PORT,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::*;

    #[rstest]
    #[case("localhost", "localhost", DEFAULT_PORT)]
    #[case("localhost:1234", "localhost", 1234)]
    #[case("127.0.0.1:7687", "127.0.0.1", 7687)]
    #[case("[::1]", "[::1]", DEFAULT_PORT)]
    #[case("[::1]:4321", "[::1]", 4321)]
    fn parse_from_str(#[case] input: &str, #[case] host: &str, #[case] port: u16) {
        let address = Address::from(input);
        assert_eq!(address.host(), host);
        assert_eq!(address.port(), port);
    }

    #[rstest]
    fn equality_ignores_nothing() {
        assert_eq!(Address::from("a:1"), Address::from(("a", 1)));
        assert_ne!(Address::from("a:1"), Address::from(("a", 2)));
        assert_ne!(Address::from("a:1"), Address::from(("b", 1)));
    }
}
