use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_id!(
    /// Identifies one live connection. Derived from the transport peer address.
    ConnectionId
);
string_id!(
    /// Key of a driver's track in the location store.
    DriverId
);

impl From<SocketAddr> for ConnectionId {
    fn from(addr: SocketAddr) -> Self {
        Self(addr.to_string())
    }
}

/// A connection publishes under its own identifier.
impl From<&ConnectionId> for DriverId {
    fn from(id: &ConnectionId) -> Self {
        Self(id.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_from_peer_address() {
        let addr: SocketAddr = "10.0.0.7:51234".parse().unwrap();
        let id = ConnectionId::from(addr);
        assert_eq!(id.as_str(), "10.0.0.7:51234");
    }

    #[test]
    fn ipv6_peer_address_keeps_brackets() {
        let addr: SocketAddr = "[::1]:9000".parse().unwrap();
        assert_eq!(ConnectionId::from(addr).as_str(), "[::1]:9000");
    }

    #[test]
    fn driver_id_follows_connection_id() {
        let conn = ConnectionId::from_raw("127.0.0.1:4000");
        let driver = DriverId::from(&conn);
        assert_eq!(driver.as_str(), conn.as_str());
    }

    #[test]
    fn display_and_from_str_agree() {
        let id = DriverId::from_raw("d1");
        let parsed: DriverId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = DriverId::from("d1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"d1\"");
    }
}
