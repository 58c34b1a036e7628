//! Routing table and routing decisions.
//!
//! A routing table generation maps a virtual hostname to one backend.
//!
//! - Exact, case-sensitive hostname match
//! - A generation is built in one pass and never mutated after publishing
//! - Reload publishes a whole new generation with a single pointer swap
//! - A failed reload leaves the current generation in place

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, info, warn};

use super::backend::Backend;
use crate::routes::{RouteConfigError, RouteSource};

/// One configured virtual host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub hostname: String,
    pub backend: Backend,
}

impl RouteEntry {
    pub fn new(hostname: impl Into<String>, backend: Backend) -> Self {
        Self {
            hostname: hostname.into(),
            backend,
        }
    }
}

/// Result of a routing decision.
#[derive(Debug, Clone)]
pub enum RoutingDecision {
    /// Route found, proceed with connection.
    Matched { backend: Backend },
    /// No matching route found.
    NoMatch { reason: String },
}

/// Immutable snapshot of the hostname to backend mapping.
#[derive(Debug, Default)]
pub struct RoutingTable {
    generation: u64,
    by_hostname: HashMap<String, Backend>,
}

impl RoutingTable {
    /// Build a table from route entries. Later duplicates replace earlier ones.
    pub fn build(entries: impl IntoIterator<Item = RouteEntry>) -> Self {
        let mut by_hostname = HashMap::new();

        for entry in entries {
            if let Some(previous) = by_hostname.insert(entry.hostname.clone(), entry.backend) {
                debug!(
                    hostname = %entry.hostname,
                    replaced = %previous,
                    "Duplicate hostname, last entry wins"
                );
            }
        }

        Self {
            generation: 0,
            by_hostname,
        }
    }

    /// Look up the backend for an exact hostname.
    pub fn lookup(&self, hostname: &str) -> Option<&Backend> {
        self.by_hostname.get(hostname)
    }

    /// Generation number assigned when this table was published (0 if never).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.by_hostname.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hostname.is_empty()
    }

    /// All configured hostnames, in no particular order.
    pub fn hostnames(&self) -> impl Iterator<Item = &str> {
        self.by_hostname.keys().map(String::as_str)
    }
}

/// The currently published routing table generation.
///
/// Uses ArcSwap for lock-free reads. Each connection loads the current
/// snapshot once; a reload swaps in a fresh one without waiting on readers.
pub struct SharedRoutingTable {
    current: ArcSwap<RoutingTable>,
    last_generation: AtomicU64,
}

impl SharedRoutingTable {
    /// Create a shared table and publish `table` as generation 1.
    pub fn new(table: RoutingTable) -> Self {
        let shared = Self {
            current: ArcSwap::from_pointee(RoutingTable::default()),
            last_generation: AtomicU64::new(0),
        };
        shared.publish(table);
        shared
    }

    /// Load the initial generation from `source`.
    ///
    /// Unlike [`reload`](Self::reload), there is no previous table to fall
    /// back on, so the error is returned to the caller as-is.
    pub fn load(source: &dyn RouteSource) -> Result<Self, RouteConfigError> {
        let entries = source.load()?;
        let shared = Self::new(RoutingTable::build(entries));

        info!(
            source = %source.describe(),
            route_count = shared.snapshot().len(),
            "Routing table loaded"
        );

        Ok(shared)
    }

    /// Stamp `table` with the next generation number and publish it.
    pub fn publish(&self, mut table: RoutingTable) -> u64 {
        let generation = self.last_generation.fetch_add(1, Ordering::SeqCst) + 1;
        table.generation = generation;
        let route_count = table.len();

        self.current.store(Arc::new(table));

        info!(generation, route_count, "Routing table published");
        generation
    }

    /// Rebuild the table from `source` and publish it.
    ///
    /// On error the current generation stays published.
    pub fn reload(&self, source: &dyn RouteSource) -> Result<u64, RouteConfigError> {
        match source.load() {
            Ok(entries) => Ok(self.publish(RoutingTable::build(entries))),
            Err(e) => {
                warn!(
                    source = %source.describe(),
                    generation = self.generation(),
                    error = %e,
                    "Routing reload failed, keeping previous table"
                );
                Err(e)
            }
        }
    }

    /// The current table, held for as long as the caller needs it.
    pub fn snapshot(&self) -> Arc<RoutingTable> {
        self.current.load_full()
    }

    /// Generation number of the current table.
    pub fn generation(&self) -> u64 {
        self.current.load().generation
    }

    /// Look up the backend for `hostname` in the current generation.
    pub fn resolve(&self, hostname: &str) -> Option<Backend> {
        self.current.load().lookup(hostname).cloned()
    }

    /// Make a routing decision for a parsed hostname.
    pub fn route(&self, hostname: &str) -> RoutingDecision {
        let table = self.current.load();

        match table.lookup(hostname) {
            Some(backend) => {
                debug!(
                    hostname = %hostname,
                    backend_addr = %backend,
                    generation = table.generation,
                    "Route matched"
                );
                RoutingDecision::Matched {
                    backend: backend.clone(),
                }
            }
            None => RoutingDecision::NoMatch {
                reason: format!(
                    "No route for hostname '{}' in generation {}",
                    hostname, table.generation
                ),
            },
        }
    }
}

impl Default for SharedRoutingTable {
    fn default() -> Self {
        Self::new(RoutingTable::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource(Result<Vec<RouteEntry>, &'static str>);

    impl RouteSource for FixedSource {
        fn load(&self) -> Result<Vec<RouteEntry>, RouteConfigError> {
            self.0.clone().map_err(|reason| RouteConfigError::InvalidEntry {
                index: 0,
                reason: reason.to_string(),
            })
        }

        fn describe(&self) -> String {
            "fixed".to_string()
        }
    }

    fn entries() -> Vec<RouteEntry> {
        vec![
            RouteEntry::new("a.example.com", Backend::new("10.0.0.1", 25565)),
            RouteEntry::new("b.example.com", Backend::new("10.0.0.2", 25566)),
        ]
    }

    #[test]
    fn test_lookup_exact_match() {
        let table = RoutingTable::build(entries());

        assert_eq!(table.len(), 2);
        assert_eq!(
            table.lookup("a.example.com"),
            Some(&Backend::new("10.0.0.1", 25565))
        );
        assert_eq!(
            table.lookup("b.example.com"),
            Some(&Backend::new("10.0.0.2", 25566))
        );
        assert!(table.lookup("c.example.com").is_none());
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let table = RoutingTable::build(entries());
        assert!(table.lookup("A.example.com").is_none());
        assert!(table.lookup("a.example.com.").is_none());
    }

    #[test]
    fn test_duplicate_last_write_wins() {
        let table = RoutingTable::build(vec![
            RouteEntry::new("a.example.com", Backend::new("10.0.0.1", 1)),
            RouteEntry::new("a.example.com", Backend::new("10.0.0.9", 9)),
        ]);

        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup("a.example.com").unwrap().port, 9);
    }

    #[test]
    fn test_route_decision() {
        let shared = SharedRoutingTable::new(RoutingTable::build(entries()));

        match shared.route("a.example.com") {
            RoutingDecision::Matched { backend } => {
                assert_eq!(backend, Backend::new("10.0.0.1", 25565));
            }
            other => panic!("Expected Matched, got {:?}", other),
        }

        match shared.route("c.example.com") {
            RoutingDecision::NoMatch { reason } => assert!(reason.contains("c.example.com")),
            other => panic!("Expected NoMatch, got {:?}", other),
        }
    }

    #[test]
    fn test_publish_increments_generation() {
        let shared = SharedRoutingTable::default();
        assert_eq!(shared.generation(), 1);

        let generation = shared.publish(RoutingTable::build(entries()));
        assert_eq!(generation, 2);
        assert_eq!(shared.generation(), 2);
        assert_eq!(shared.snapshot().len(), 2);
    }

    #[test]
    fn test_old_snapshot_unchanged_after_publish() {
        let shared = SharedRoutingTable::new(RoutingTable::build(entries()));
        let before = shared.snapshot();

        shared.publish(RoutingTable::default());

        assert_eq!(before.len(), 2);
        assert!(before.lookup("a.example.com").is_some());
        assert!(shared.resolve("a.example.com").is_none());
    }

    #[test]
    fn test_reload_success() {
        let shared = SharedRoutingTable::default();
        let generation = shared.reload(&FixedSource(Ok(entries()))).unwrap();

        assert_eq!(generation, 2);
        assert!(shared.resolve("b.example.com").is_some());
    }

    #[test]
    fn test_failed_reload_keeps_previous_generation() {
        let shared = SharedRoutingTable::new(RoutingTable::build(entries()));

        assert!(shared.reload(&FixedSource(Err("broken"))).is_err());

        assert_eq!(shared.generation(), 1);
        assert_eq!(shared.snapshot().len(), 2);
        assert!(shared.resolve("a.example.com").is_some());
    }

    #[test]
    fn test_initial_load_failure_is_returned() {
        assert!(SharedRoutingTable::load(&FixedSource(Err("broken"))).is_err());
    }
}
