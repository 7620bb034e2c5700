use crate::core::ShardIndex;
use std::fmt;
use tracing::warn;

/// Outcome of running one query against every shard.
///
/// Successful shards contribute their rows even when other shards fail, so
/// callers never lose results they already paid for. The error reported by
/// [`ScatterGather::first_error`] is the one from the lowest failing shard
/// index.
#[derive(Debug)]
pub struct ScatterGather<T, E> {
    rows: Vec<T>,
    failures: Vec<(ShardIndex, E)>,
}

impl<T, E> ScatterGather<T, E> {
    /// Folds per-shard outcomes, given in shard order.
    pub fn collect<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = (ShardIndex, Result<Vec<T>, E>)>,
        E: fmt::Display,
    {
        let mut rows = Vec::new();
        let mut failures = Vec::new();
        for (shard, outcome) in outcomes {
            match outcome {
                Ok(mut shard_rows) => rows.append(&mut shard_rows),
                Err(err) => {
                    warn!("Scatter-gather query failed on shard {}: {}", shard, err);
                    failures.push((shard, err));
                }
            }
        }
        Self { rows, failures }
    }

    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    /// True when every shard answered.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_shards(&self) -> Vec<ShardIndex> {
        self.failures.iter().map(|(shard, _)| *shard).collect()
    }

    pub fn first_error(&self) -> Option<&E> {
        self.failures.first().map(|(_, err)| err)
    }

    /// Splits into the gathered rows and the first error, if any.
    pub fn into_result(self) -> (Vec<T>, Option<E>) {
        let first = self.failures.into_iter().next().map(|(_, err)| err);
        (self.rows, first)
    }

    /// Fails on the first error, discarding partial rows.
    pub fn into_strict(self) -> Result<Vec<T>, E> {
        match self.into_result() {
            (_, Some(err)) => Err(err),
            (rows, None) => Ok(rows),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_keeps_partial_rows() {
        let gathered: ScatterGather<u32, String> = ScatterGather::collect(vec![
            (0, Ok(vec![1, 2])),
            (1, Err("shard 1 down".to_string())),
            (2, Ok(vec![3])),
            (3, Err("shard 3 down".to_string())),
        ]);

        assert_eq!(gathered.rows(), &[1, 2, 3]);
        assert!(!gathered.is_complete());
        assert_eq!(gathered.failed_shards(), vec![1, 3]);
        assert_eq!(gathered.first_error().map(String::as_str), Some("shard 1 down"));

        let (rows, err) = gathered.into_result();
        assert_eq!(rows, vec![1, 2, 3]);
        assert_eq!(err.as_deref(), Some("shard 1 down"));
    }

    #[test]
    fn test_collect_all_succeeded() {
        let gathered: ScatterGather<&str, String> =
            ScatterGather::collect(vec![(0, Ok(vec!["a"])), (1, Ok(vec![]))]);
        assert!(gathered.is_complete());
        assert!(gathered.first_error().is_none());
        assert_eq!(gathered.into_strict().unwrap(), vec!["a"]);
    }

    #[test]
    fn test_into_strict_reports_error() {
        let gathered: ScatterGather<u8, String> =
            ScatterGather::collect(vec![(0, Ok(vec![1])), (1, Err("boom".to_string()))]);
        assert_eq!(gathered.into_strict().unwrap_err(), "boom");
    }
}
