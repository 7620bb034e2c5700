pub mod error;
pub mod types;

pub use error::{Result, ShardError};
pub use types::{Fingerprint, ShardIndex};
