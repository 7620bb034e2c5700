pub mod fingerprint;
pub mod router;
pub mod scatter;

pub use fingerprint::{DEFAULT_MAX_DIGITS, FingerprintDeriver, fingerprint};
pub use router::ShardRouter;
pub use scatter::ScatterGather;
