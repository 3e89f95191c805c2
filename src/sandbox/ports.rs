//! Local port allocation for sandbox endpoints

use std::collections::HashSet;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};

use crate::utils::{AuditError, Result};

/// Hands out ports from a half-open range, never the same one twice at once.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    start: u16,
    end: u16,
    host: String,
    in_use: Arc<Mutex<HashSet<u16>>>,
}

impl PortAllocator {
    pub fn new(host: impl Into<String>, start: u16, end: u16) -> Self {
        Self {
            start,
            end,
            host: host.into(),
            in_use: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Reserve the first port that is neither leased nor bound by another process.
    pub fn allocate(&self) -> Result<PortLease> {
        let mut in_use = self
            .in_use
            .lock()
            .map_err(|_| AuditError::SandboxStartupFailed("port allocator lock poisoned".into()))?;

        for port in self.start..self.end {
            if in_use.contains(&port) {
                continue;
            }
            if TcpListener::bind((self.host.as_str(), port)).is_err() {
                tracing::debug!("Port {} busy outside the allocator, skipping", port);
                continue;
            }
            in_use.insert(port);
            return Ok(PortLease {
                port,
                in_use: self.in_use.clone(),
            });
        }

        Err(AuditError::PortExhausted {
            start: self.start,
            end: self.end,
        })
    }

    pub fn leased(&self) -> usize {
        self.in_use.lock().map(|set| set.len()).unwrap_or(0)
    }
}

/// Returns its port to the allocator when dropped.
#[derive(Debug)]
pub struct PortLease {
    port: u16,
    in_use: Arc<Mutex<HashSet<u16>>>,
}

impl PortLease {
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        if let Ok(mut in_use) = self.in_use.lock() {
            in_use.remove(&self.port);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_port_handed_out_twice() {
        let allocator = PortAllocator::new("127.0.0.1", 38100, 38110);
        let a = allocator.allocate().unwrap();
        let b = allocator.allocate().unwrap();
        assert_ne!(a.port(), b.port());
        assert_eq!(allocator.leased(), 2);
    }

    #[test]
    fn test_drop_releases_port() {
        let allocator = PortAllocator::new("127.0.0.1", 38120, 38121);
        let lease = allocator.allocate().unwrap();
        assert!(matches!(
            allocator.allocate(),
            Err(AuditError::PortExhausted { start: 38120, end: 38121 })
        ));

        drop(lease);
        assert_eq!(allocator.leased(), 0);
        assert!(allocator.allocate().is_ok());
    }

    #[test]
    fn test_skips_externally_bound_port() {
        let _held = TcpListener::bind(("127.0.0.1", 38130)).unwrap();
        let allocator = PortAllocator::new("127.0.0.1", 38130, 38132);
        let lease = allocator.allocate().unwrap();
        assert_eq!(lease.port(), 38131);
    }
}
