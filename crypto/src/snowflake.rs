//! Time-ordered 64-bit ID generation.
//!
//! Bit layout, high to low: 41 bits of milliseconds since [`EPOCH_MS`], 10
//! bits of machine id, 12 bits of per-millisecond sequence. IDs generated by
//! the same process sort the same way numerically as they were generated;
//! IDs generated by different machine ids never collide as long as each
//! machine id is unique among concurrently running processes.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use iamcore_core::config::IdGeneratorConfig;

const TIMESTAMP_BITS: u32 = 41;
const MACHINE_ID_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;

const MAX_MACHINE_ID: u16 = (1 << MACHINE_ID_BITS) - 1;
const MAX_SEQUENCE: u16 = (1 << SEQUENCE_BITS) - 1;

/// A fixed epoch so the 41-bit timestamp field has headroom; this is the
/// number of milliseconds between the Unix epoch and 2024-01-01T00:00:00Z.
const EPOCH_MS: u64 = 1_704_067_200_000;

struct State {
    last_timestamp_ms: u64,
    sequence: u16,
}

/// A Snowflake-style, time-ordered 64-bit ID generator.
///
/// Generation is internally synchronized so `Snowflake` can be shared across
/// tasks behind an `Arc` without external locking.
pub struct Snowflake {
    machine_id: u16,
    state: Mutex<State>,
}

impl Snowflake {
    /// Build a generator for this process's configured machine id.
    ///
    /// # Panics
    ///
    /// Panics if `config.machine_id` exceeds the 10-bit machine id space
    /// (1023); this is a startup-time configuration error, not a runtime
    /// condition callers should handle.
    #[must_use]
    pub fn new(config: IdGeneratorConfig) -> Self {
        assert!(
            config.machine_id <= MAX_MACHINE_ID,
            "machine_id {} exceeds the 10-bit machine id space (max {MAX_MACHINE_ID})",
            config.machine_id
        );
        Self {
            machine_id: config.machine_id,
            state: Mutex::new(State { last_timestamp_ms: 0, sequence: 0 }),
        }
    }

    /// Generate the next id, blocking briefly (via a tight loop, not a sleep
    /// syscall) if the per-millisecond sequence space is exhausted.
    #[must_use]
    #[allow(clippy::missing_panics_doc)]
    pub fn next_id(&self) -> u64 {
        let mut guard = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut now = current_millis();
        if now < guard.last_timestamp_ms {
            // Clock moved backwards (NTP step); stall until it catches up
            // rather than emitting a timestamp smaller than one already issued.
            now = guard.last_timestamp_ms;
        }

        if now == guard.last_timestamp_ms {
            guard.sequence = (guard.sequence + 1) & MAX_SEQUENCE;
            if guard.sequence == 0 {
                now = next_millis(guard.last_timestamp_ms);
            }
        } else {
            guard.sequence = 0;
        }
        guard.last_timestamp_ms = now;

        assemble(now, self.machine_id, guard.sequence)
    }
}

fn current_millis() -> u64 {
    #[allow(clippy::cast_possible_truncation)]
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    now_ms.saturating_sub(EPOCH_MS)
}

fn next_millis(after: u64) -> u64 {
    let mut now = current_millis();
    while now <= after {
        std::thread::yield_now();
        now = current_millis();
    }
    now
}

fn assemble(timestamp_ms: u64, machine_id: u16, sequence: u16) -> u64 {
    let timestamp_part = (timestamp_ms & ((1 << TIMESTAMP_BITS) - 1)) << (MACHINE_ID_BITS + SEQUENCE_BITS);
    let machine_part = u64::from(machine_id & MAX_MACHINE_ID) << SEQUENCE_BITS;
    let sequence_part = u64::from(sequence & MAX_SEQUENCE);
    timestamp_part | machine_part | sequence_part
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_strictly_increasing() {
        let gen = Snowflake::new(IdGeneratorConfig { machine_id: 5 });
        let mut previous = gen.next_id();
        for _ in 0..1000 {
            let id = gen.next_id();
            assert!(id > previous, "{id} should be greater than {previous}");
            previous = id;
        }
    }

    #[test]
    fn different_machine_ids_never_collide_within_the_same_millisecond() {
        let a = Snowflake::new(IdGeneratorConfig { machine_id: 1 });
        let b = Snowflake::new(IdGeneratorConfig { machine_id: 2 });
        let ids_a: std::collections::HashSet<u64> = (0..200).map(|_| a.next_id()).collect();
        let ids_b: std::collections::HashSet<u64> = (0..200).map(|_| b.next_id()).collect();
        assert!(ids_a.is_disjoint(&ids_b));
    }

    #[test]
    #[should_panic(expected = "exceeds the 10-bit machine id space")]
    fn machine_id_out_of_range_panics() {
        Snowflake::new(IdGeneratorConfig { machine_id: 2000 });
    }
}
