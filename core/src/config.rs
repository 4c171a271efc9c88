//! Configuration structs for every tunable named in the system's external
//! interface.
//!
//! These are plain, `Deserialize`-able value types with defaults matching
//! the external interface's documented defaults. No loader (env vars,
//! config files, CLI flags) is built here — wiring a concrete source is a
//! concern of whatever binary embeds this workspace, not of the core
//! library.

use serde::{Deserialize, Serialize};

/// Connection pool tuning for the Postgres-backed eventstore and projection
/// stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres connection string.
    pub url: String,
    /// Maximum number of pooled connections.
    pub max_connections: u32,
    /// Minimum number of pooled connections kept warm.
    pub min_connections: u32,
    /// How long to wait for a connection before giving up, in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_ms: 5_000,
        }
    }
}

/// Eventstore tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventstoreConfig {
    /// The largest number of events a single `push` call may append atomically.
    pub max_push_batch_size: usize,
}

impl Default for EventstoreConfig {
    fn default() -> Self {
        Self {
            max_push_batch_size: 500,
        }
    }
}

/// Projection manager tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    /// How long to sleep between polls when there is no new work, in milliseconds.
    pub poll_interval_ms: u64,
    /// How many events to fetch per `read_since` call.
    pub batch_size: u32,
    /// How long a worker's claim on a projection's catch-up loop lasts before
    /// another worker may take over, in milliseconds.
    pub lock_ttl_ms: u64,
    /// Consecutive apply failures before a projection is left in `Error`
    /// status for an operator rather than retried indefinitely.
    pub max_consecutive_errors: u32,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            batch_size: 200,
            lock_ttl_ms: 30_000,
            max_consecutive_errors: 10,
        }
    }
}

/// Snowflake-style ID generator tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdGeneratorConfig {
    /// This process's machine id (0..1024), must be unique per live process
    /// sharing an epoch to avoid collisions.
    pub machine_id: u16,
}

impl Default for IdGeneratorConfig {
    fn default() -> Self {
        Self { machine_id: 0 }
    }
}

/// Password hashing and secret-signing tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Argon2 memory cost in KiB.
    pub argon2_memory_kib: u32,
    /// Argon2 iteration count.
    pub argon2_iterations: u32,
    /// Argon2 parallelism (lanes).
    pub argon2_parallelism: u32,
    /// The currently active AES-GCM key id in the key catalog, used for new
    /// encryptions (existing ciphertext keeps referencing whichever key id
    /// it was encrypted under).
    pub active_key_id: u32,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            argon2_memory_kib: 19_456,
            argon2_iterations: 2,
            argon2_parallelism: 1,
            active_key_id: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        assert_eq!(ProjectionConfig::default().poll_interval_ms, 1_000);
        assert_eq!(EventstoreConfig::default().max_push_batch_size, 500);
    }

    #[test]
    fn configs_round_trip_through_json() {
        let cfg = ProjectionConfig::default();
        let json = serde_json::to_string(&cfg).expect("serializes");
        let back: ProjectionConfig = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(cfg, back);
    }
}
