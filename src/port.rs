//! Port allocation over a persisted port→owner map.
//!
//! The persisted map records ownership; the live bind-then-release probe is
//! the actual correctness mechanism. The map can desync from reality (a
//! crash before a previous run released a port, or an unrelated process
//! squatting on it), so every candidate is probed before assignment.

use crate::error::{Error, Result};
use crate::store::{PortMap, StateStore};
use std::net::TcpListener;
use std::str::FromStr;
use std::sync::Arc;

/// Inclusive port range scanned for automatic allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl Default for PortRange {
    fn default() -> Self {
        Self { start: 5000, end: 5999 }
    }
}

impl FromStr for PortRange {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| format!("invalid port range '{}' (expected START-END)", s))?;
        let start: u16 = start
            .trim()
            .parse()
            .map_err(|_| format!("invalid range start '{}'", start))?;
        let end: u16 = end
            .trim()
            .parse()
            .map_err(|_| format!("invalid range end '{}'", end))?;
        if start == 0 || start > end {
            return Err(format!("invalid port range {}-{}", start, end));
        }
        Ok(Self { start, end })
    }
}

/// Allocator over the persisted port map.
///
/// Reads the whole map at construction and writes it back after every
/// mutation, matching the single-shot process model: no state survives in
/// memory between invocations.
pub struct PortAllocator {
    range: PortRange,
    allocations: PortMap,
    store: Arc<dyn StateStore>,
}

impl PortAllocator {
    pub fn load(store: Arc<dyn StateStore>, range: PortRange) -> Result<Self> {
        let allocations = store.load_ports()?;
        Ok(Self {
            range,
            allocations,
            store,
        })
    }

    /// Allocate a port for `owner`.
    ///
    /// A preferred port is honored iff it is absent from the persisted map
    /// and passes the live probe; otherwise the configured range is scanned
    /// ascending, skipping persisted entries and probing each remaining
    /// candidate. A preferred port outside the range is honored (explicit
    /// operator choice) with a warning.
    pub fn allocate(&mut self, owner: &str, preferred: Option<u16>) -> Result<u16> {
        if let Some(port) = preferred {
            if port == 0 {
                return Err(Error::Validation {
                    what: "port",
                    reason: "port 0 cannot be requested explicitly".to_string(),
                });
            }
            if !self.allocations.contains_key(&port) && probe(port) {
                if port < self.range.start || port > self.range.end {
                    tracing::warn!(
                        "Port {} is outside the configured range {}-{} and will not be protected from automatic reuse checks",
                        port,
                        self.range.start,
                        self.range.end
                    );
                }
                return self.assign(port, owner);
            }
            tracing::warn!(
                "Preferred port {} for '{}' is unavailable, scanning range {}-{}",
                port,
                owner,
                self.range.start,
                self.range.end
            );
        }

        for port in self.range.start..=self.range.end {
            if self.allocations.contains_key(&port) {
                continue;
            }
            if probe(port) {
                return self.assign(port, owner);
            }
        }

        Err(Error::PortExhaustion {
            start: self.range.start,
            end: self.range.end,
        })
    }

    /// Release a port. Idempotent: unknown ports are a no-op and the map is
    /// only rewritten when something actually changed.
    pub fn deallocate(&mut self, port: u16) -> Result<()> {
        if self.allocations.remove(&port).is_some() {
            self.store.save_ports(&self.allocations)?;
        }
        Ok(())
    }

    pub fn owner_of(&self, port: u16) -> Option<&str> {
        self.allocations.get(&port).map(String::as_str)
    }

    pub fn allocations(&self) -> &PortMap {
        &self.allocations
    }

    fn assign(&mut self, port: u16, owner: &str) -> Result<u16> {
        self.allocations.insert(port, owner.to_string());
        self.store.save_ports(&self.allocations)?;
        Ok(port)
    }
}

/// Live bind-then-release probe.
///
/// Binds 127.0.0.1 (required) and 0.0.0.0 (advisory: on Linux the loopback
/// bind already covers the port, so a failure there is ignored), then drops
/// both listeners immediately.
fn probe(port: u16) -> bool {
    let Ok(_loopback) = TcpListener::bind(("127.0.0.1", port)) else {
        return false;
    };
    let _any = TcpListener::bind(("0.0.0.0", port)).ok();
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tempfile::TempDir;

    fn allocator(range: PortRange) -> (PortAllocator, Arc<MemoryStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new(dir.path()));
        let alloc = PortAllocator::load(store.clone() as Arc<dyn StateStore>, range).unwrap();
        (alloc, store, dir)
    }

    #[test]
    fn test_range_parsing() {
        assert_eq!(
            "5000-5999".parse::<PortRange>().unwrap(),
            PortRange { start: 5000, end: 5999 }
        );
        assert!("5999-5000".parse::<PortRange>().is_err());
        assert!("0-10".parse::<PortRange>().is_err());
        assert!("nope".parse::<PortRange>().is_err());
    }

    #[test]
    fn test_allocates_ascending_and_persists() {
        let (mut alloc, store, _dir) = allocator(PortRange { start: 50110, end: 50119 });

        let a = alloc.allocate("one", None).unwrap();
        let b = alloc.allocate("two", None).unwrap();
        assert!(a < b, "expected ascending assignment, got {} then {}", a, b);

        let persisted = store.ports_snapshot();
        assert_eq!(persisted.get(&a).unwrap(), "one");
        assert_eq!(persisted.get(&b).unwrap(), "two");
    }

    #[test]
    fn test_skips_persisted_entries() {
        let (mut alloc, _store, _dir) = allocator(PortRange { start: 50120, end: 50129 });
        let a = alloc.allocate("one", None).unwrap();
        let b = alloc.allocate("two", None).unwrap();
        assert_ne!(a, b);
        assert_eq!(alloc.owner_of(a), Some("one"));
        assert_eq!(alloc.owner_of(b), Some("two"));
    }

    #[test]
    fn test_preferred_port_honored_when_free() {
        let (mut alloc, _store, _dir) = allocator(PortRange { start: 50130, end: 50139 });
        let port = alloc.allocate("one", Some(50135)).unwrap();
        assert_eq!(port, 50135);
    }

    #[test]
    fn test_preferred_port_taken_falls_back_to_scan() {
        let (mut alloc, _store, _dir) = allocator(PortRange { start: 50140, end: 50149 });
        let first = alloc.allocate("one", Some(50141)).unwrap();
        assert_eq!(first, 50141);

        // Same preference again: the map entry forces a range scan.
        let second = alloc.allocate("two", Some(50141)).unwrap();
        assert_ne!(second, 50141);
        assert_eq!(second, 50140);
    }

    #[test]
    fn test_preferred_port_bound_by_live_process_falls_back() {
        let (mut alloc, _store, _dir) = allocator(PortRange { start: 50150, end: 50159 });
        let blocker = TcpListener::bind("127.0.0.1:0").unwrap();
        let occupied = blocker.local_addr().unwrap().port();

        let port = alloc.allocate("one", Some(occupied)).unwrap();
        assert_ne!(port, occupied);
        drop(blocker);
    }

    #[test]
    fn test_exhaustion_over_fully_allocated_range() {
        let (mut alloc, _store, _dir) = allocator(PortRange { start: 50160, end: 50162 });
        alloc.allocate("a", None).unwrap();
        alloc.allocate("b", None).unwrap();
        alloc.allocate("c", None).unwrap();

        match alloc.allocate("d", None) {
            Err(Error::PortExhaustion { start, end }) => {
                assert_eq!((start, end), (50160, 50162));
            }
            other => panic!("expected PortExhaustion, got {:?}", other),
        }
    }

    #[test]
    fn test_deallocate_is_idempotent_and_frees_for_reuse() {
        let (mut alloc, store, _dir) = allocator(PortRange { start: 50170, end: 50170 });
        let port = alloc.allocate("one", None).unwrap();
        assert_eq!(port, 50170);

        alloc.deallocate(port).unwrap();
        alloc.deallocate(port).unwrap(); // no-op
        assert!(store.ports_snapshot().is_empty());

        let again = alloc.allocate("two", None).unwrap();
        assert_eq!(again, port);
    }

    #[test]
    fn test_preferred_outside_range_is_honored() {
        let (mut alloc, _store, _dir) = allocator(PortRange { start: 50180, end: 50189 });
        let port = alloc.allocate("one", Some(51999)).unwrap();
        assert_eq!(port, 51999);
        assert_eq!(alloc.owner_of(51999), Some("one"));
    }
}
