use std::fmt;

/// Index of a shard inside a router, dense in `0..shard_count`.
pub type ShardIndex = u32;

/// Bounded non-negative integer derived from an identifying string.
///
/// Historically called the "gene" of a user: `gene % shard_count` picks the
/// data center that owns the user's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(u128);

impl Fingerprint {
    pub(crate) const fn new(value: u128) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u128 {
        self.0
    }

    /// Reduces the fingerprint into `0..shard_count`.
    ///
    /// Returns `None` for a zero shard count instead of dividing by zero.
    pub fn shard_index(self, shard_count: u32) -> Option<ShardIndex> {
        if shard_count == 0 {
            return None;
        }
        Some((self.0 % u128::from(shard_count)) as ShardIndex)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Fingerprint> for u128 {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_index_is_modulo() {
        assert_eq!(Fingerprint::new(311).shard_index(2), Some(1));
        assert_eq!(Fingerprint::new(312).shard_index(2), Some(0));
        assert_eq!(Fingerprint::new(7).shard_index(1), Some(0));
    }

    #[test]
    fn test_shard_index_rejects_zero_shards() {
        assert_eq!(Fingerprint::new(42).shard_index(0), None);
    }
}
