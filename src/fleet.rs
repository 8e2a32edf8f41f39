//! The set of monitored servers.

use std::fmt;
use std::sync::Arc;

use crate::collector::ServerAdapter;

/// Port assumed when a server address does not name one.
pub const DEFAULT_PORT: u16 = 27017;

/// A named, monitored server and the adapter used to reach it.
#[derive(Clone)]
pub struct Server {
    name: String,
    address: String,
    adapter: Arc<dyn ServerAdapter>,
}

impl Server {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        adapter: Arc<dyn ServerAdapter>,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            adapter,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn adapter(&self) -> &Arc<dyn ServerAdapter> {
        &self.adapter
    }

    /// Returns `true` if `label` names this server.
    ///
    /// Accepts the configured name, the address as configured, or the
    /// address with the default port appended when none was configured.
    pub fn matches(&self, label: &str) -> bool {
        if label == self.name || label == self.address {
            return true;
        }
        !self.address.contains(':') && label == format!("{}:{}", self.address, DEFAULT_PORT)
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("name", &self.name)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Monitored servers, ordered by name.
#[derive(Debug, Clone, Default)]
pub struct Fleet {
    servers: Vec<Server>,
}

impl Fleet {
    pub fn new(mut servers: Vec<Server>) -> Self {
        servers.sort_by(|a, b| a.name.cmp(&b.name));
        Self { servers }
    }

    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Looks a server up by its exact name.
    pub fn get(&self, name: &str) -> Option<&Server> {
        self.servers.iter().find(|s| s.name == name)
    }

    /// Looks a server up by name or address.
    pub fn resolve(&self, label: &str) -> Option<&Server> {
        self.get(label)
            .or_else(|| self.servers.iter().find(|s| s.matches(label)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockServer;

    fn server(name: &str, address: &str) -> Server {
        Server::new(name, address, Arc::new(MockServer::new()))
    }

    #[test]
    fn test_fleet_sorted_by_name() {
        let fleet = Fleet::new(vec![server("b", "10.0.0.2"), server("a", "10.0.0.1")]);
        let names: Vec<&str> = fleet.servers().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_server_matches_name_and_address() {
        let s = server("MongoDB01", "10.42.2.121");
        assert!(s.matches("MongoDB01"));
        assert!(s.matches("10.42.2.121"));
        assert!(s.matches("10.42.2.121:27017"));
        assert!(!s.matches("10.42.2.121:27018"));
        assert!(!s.matches("MongoDB02"));

        let with_port = server("MongoDB02", "10.42.2.122:27018");
        assert!(with_port.matches("10.42.2.122:27018"));
        assert!(!with_port.matches("10.42.2.122:27018:27017"));
    }

    #[test]
    fn test_fleet_resolve() {
        let fleet = Fleet::new(vec![server("a", "10.0.0.1"), server("b", "10.0.0.2")]);
        assert_eq!(fleet.resolve("b").unwrap().name(), "b");
        assert_eq!(fleet.resolve("10.0.0.1:27017").unwrap().name(), "a");
        assert!(fleet.resolve("c").is_none());
    }
}
