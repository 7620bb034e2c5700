//! Globally unique, roughly time-ordered 64-bit identifiers.
//!
//! Layout of a snowflake id, most significant bit first:
//!
//! | bits | field                                   |
//! |------|-----------------------------------------|
//! | 1    | sign, always 0                          |
//! | 41   | milliseconds since the project epoch    |
//! | 10   | worker id                               |
//! | 12   | sequence within the millisecond         |

use crate::core::{Result, ShardError};
use chrono::{DateTime, Utc};
use std::sync::Mutex;

pub const WORKER_ID_BITS: u32 = 10;
pub const SEQUENCE_BITS: u32 = 12;
pub const MAX_WORKER_ID: i64 = (1 << WORKER_ID_BITS) - 1;
pub const MAX_SEQUENCE: i64 = (1 << SEQUENCE_BITS) - 1;

/// 2020-01-01T00:00:00Z
pub const DEFAULT_EPOCH_MS: i64 = 1_577_836_800_000;

/// Source of unique row ids, typically used when inserting into a shard.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> Result<i64>;
}

/// Parts of a decoded snowflake id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnowflakeParts {
    pub timestamp_ms: i64,
    pub worker_id: i64,
    pub sequence: i64,
}

#[derive(Debug)]
struct SnowflakeState {
    last_ms: i64,
    sequence: i64,
}

pub struct SnowflakeIdGenerator {
    worker_id: i64,
    epoch_ms: i64,
    clock: fn() -> i64,
    state: Mutex<SnowflakeState>,
}

fn system_clock() -> i64 {
    Utc::now().timestamp_millis()
}

impl SnowflakeIdGenerator {
    pub fn new(worker_id: i64) -> Result<Self> {
        Self::build(worker_id, DEFAULT_EPOCH_MS, system_clock)
    }

    pub fn with_epoch(worker_id: i64, epoch: DateTime<Utc>) -> Result<Self> {
        Self::build(worker_id, epoch.timestamp_millis(), system_clock)
    }

    fn build(worker_id: i64, epoch_ms: i64, clock: fn() -> i64) -> Result<Self> {
        if !(0..=MAX_WORKER_ID).contains(&worker_id) {
            return Err(ShardError::Config(format!(
                "worker_id must be in 0..={}, got {}",
                MAX_WORKER_ID, worker_id
            )));
        }
        Ok(Self {
            worker_id,
            epoch_ms,
            clock,
            state: Mutex::new(SnowflakeState {
                last_ms: -1,
                sequence: 0,
            }),
        })
    }

    pub fn worker_id(&self) -> i64 {
        self.worker_id
    }

    /// Milliseconds elapsed since the project epoch.
    ///
    /// Used as a soft-delete marker so deleted rows never collide on a
    /// `(name, delete_time)` unique key.
    pub fn project_timestamp(&self) -> i64 {
        (self.clock)() - self.epoch_ms
    }

    pub fn decompose(&self, id: i64) -> SnowflakeParts {
        SnowflakeParts {
            timestamp_ms: (id >> (WORKER_ID_BITS + SEQUENCE_BITS)) + self.epoch_ms,
            worker_id: (id >> SEQUENCE_BITS) & MAX_WORKER_ID,
            sequence: id & MAX_SEQUENCE,
        }
    }
}

impl IdGenerator for SnowflakeIdGenerator {
    fn next_id(&self) -> Result<i64> {
        let mut state = self.state.lock()?;
        let mut now = (self.clock)();

        if now < state.last_ms {
            return Err(ShardError::ClockMovedBackwards(state.last_ms - now));
        }

        if now == state.last_ms {
            state.sequence = (state.sequence + 1) & MAX_SEQUENCE;
            if state.sequence == 0 {
                // Sequence exhausted for this millisecond.
                while now <= state.last_ms {
                    std::hint::spin_loop();
                    now = (self.clock)();
                }
            }
        } else {
            state.sequence = 0;
        }
        state.last_ms = now;

        Ok(((now - self.epoch_ms) << (WORKER_ID_BITS + SEQUENCE_BITS))
            | (self.worker_id << SEQUENCE_BITS)
            | state.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicI64, Ordering};

    #[test]
    fn test_worker_id_bounds() {
        assert!(SnowflakeIdGenerator::new(-1).is_err());
        assert!(SnowflakeIdGenerator::new(MAX_WORKER_ID + 1).is_err());
        assert_eq!(SnowflakeIdGenerator::new(MAX_WORKER_ID).unwrap().worker_id(), MAX_WORKER_ID);
    }

    #[test]
    fn test_ids_increase_and_carry_worker() {
        let generator = SnowflakeIdGenerator::new(7).unwrap();
        let mut last = 0;
        for _ in 0..10_000 {
            let id = generator.next_id().unwrap();
            assert!(id > last);
            assert_eq!(generator.decompose(id).worker_id, 7);
            last = id;
        }
    }

    #[test]
    fn test_decompose_recovers_timestamp() {
        let generator = SnowflakeIdGenerator::new(1).unwrap();
        let before = Utc::now().timestamp_millis();
        let id = generator.next_id().unwrap();
        let after = Utc::now().timestamp_millis();
        let parts = generator.decompose(id);
        assert!(parts.timestamp_ms >= before && parts.timestamp_ms <= after);
    }

    #[test]
    fn test_unique_across_threads() {
        let generator = Arc::new(SnowflakeIdGenerator::new(3).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = Arc::clone(&generator);
                std::thread::spawn(move || {
                    (0..2_000)
                        .map(|_| generator.next_id().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {}", id);
            }
        }
        assert_eq!(seen.len(), 8_000);
    }

    static FAKE_NOW: AtomicI64 = AtomicI64::new(DEFAULT_EPOCH_MS + 10_000);

    fn fake_clock() -> i64 {
        FAKE_NOW.load(Ordering::SeqCst)
    }

    #[test]
    fn test_clock_moving_backwards_is_rejected() {
        let generator = SnowflakeIdGenerator::build(0, DEFAULT_EPOCH_MS, fake_clock).unwrap();
        generator.next_id().unwrap();
        FAKE_NOW.fetch_sub(5, Ordering::SeqCst);
        assert!(matches!(
            generator.next_id(),
            Err(ShardError::ClockMovedBackwards(5))
        ));
        assert_eq!(generator.project_timestamp(), 9_995);
    }
}
