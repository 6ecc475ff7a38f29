//! Connection providers.
//!
//! A connection provider is a factory yielding a held connection: either a
//! fresh one per call ([`ConnectionInfo`]) or a lease from a pool (see the
//! pool crate). The request pipeline programs against the
//! [`ConnectionProvider`] trait and releases whatever it was handed by
//! dropping the handle.

use async_trait::async_trait;

use crate::connection::Connection;
use crate::deadline::TimeConstraint;
use crate::error::Result;

/// A factory yielding a held [`Connection`].
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// The handle type through which the connection is held; dropping it
    /// returns the connection to its owner.
    type Handle: ConnectionHandle;

    /// Obtain a connection, bounded by `t`.
    async fn get(&self, t: TimeConstraint) -> Result<Self::Handle>;
}

/// A held connection.
///
/// Implementations decide what "release" means on drop: an ephemeral
/// connection simply closes, a pool lease returns to the pool.
pub trait ConnectionHandle: Send {
    /// The held connection.
    fn conn(&self) -> &Connection;

    /// The held connection, mutably.
    fn conn_mut(&mut self) -> &mut Connection;
}

impl ConnectionHandle for Connection {
    fn conn(&self) -> &Connection {
        self
    }

    fn conn_mut(&mut self) -> &mut Connection {
        self
    }
}

/// Connection-string provider: a fresh connection per call.
///
/// The connection string is passed to the native client opaquely. Registered
/// type names are resolved into the connection's [`OidMap`] as part of every
/// connect.
///
/// [`OidMap`]: crate::OidMap
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    conninfo: String,
    registered_types: Vec<String>,
}

impl ConnectionInfo {
    /// Create a provider from a native connection string.
    #[must_use]
    pub fn new(conninfo: impl Into<String>) -> Self {
        Self {
            conninfo: conninfo.into(),
            registered_types: Vec::new(),
        }
    }

    /// Register a user-defined type name to resolve on every connect.
    #[must_use]
    pub fn register_type(mut self, type_name: impl Into<String>) -> Self {
        self.registered_types.push(type_name.into());
        self
    }

    /// The connection string.
    #[must_use]
    pub fn conninfo(&self) -> &str {
        &self.conninfo
    }

    /// Establish a new connection, bounded by `t`.
    pub async fn connect(&self, t: TimeConstraint) -> Result<Connection> {
        Connection::establish(&self.conninfo, t, &self.registered_types).await
    }
}

#[async_trait]
impl ConnectionProvider for ConnectionInfo {
    type Handle = Connection;

    async fn get(&self, t: TimeConstraint) -> Result<Self::Handle> {
        self.connect(t).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_info_builder() {
        let info = ConnectionInfo::new("host=localhost dbname=test")
            .register_type("hstore")
            .register_type("citext");
        assert_eq!(info.conninfo(), "host=localhost dbname=test");
        assert_eq!(info.registered_types, vec!["hstore", "citext"]);
    }

    #[test]
    fn test_connection_info_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConnectionInfo>();
    }
}
