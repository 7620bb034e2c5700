use crate::core::{Fingerprint, Result, ShardError};

/// Default maximum number of decimal digits kept in a fingerprint.
pub const DEFAULT_MAX_DIGITS: usize = 32;

/// Widest fingerprint that always fits in a `u128`.
pub const MAX_SUPPORTED_DIGITS: usize = 38;

/// Derives shard fingerprints from identifying strings (user names, phone
/// numbers, e-mail addresses).
///
/// The derivation is deliberately weak: a purely numeric input is its own
/// seed, anything else is seeded with the sum of its bytes. The seed is then
/// clipped to its lowest `max_digits` decimal digits. Existing rows were
/// placed with exactly these values, so the hash must not be "improved".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerprintDeriver {
    max_digits: usize,
}

impl FingerprintDeriver {
    /// Creates a deriver keeping at most `max_digits` decimal digits.
    pub fn new(max_digits: usize) -> Result<Self> {
        if max_digits == 0 || max_digits > MAX_SUPPORTED_DIGITS {
            return Err(ShardError::Config(format!(
                "fingerprint width must be in 1..={}, got {}",
                MAX_SUPPORTED_DIGITS, max_digits
            )));
        }
        Ok(Self { max_digits })
    }

    pub fn max_digits(&self) -> usize {
        self.max_digits
    }

    /// Derives the fingerprint of `input`.
    ///
    /// Only unsigned decimal literals take the numeric path; `-12` or `+12`
    /// are summed byte by byte like any other string.
    pub fn derive(&self, input: &str) -> Result<Fingerprint> {
        if input.is_empty() {
            return Err(ShardError::EmptyInput);
        }

        if input.bytes().all(|b| b.is_ascii_digit()) {
            // Clipping the literal directly also covers numbers wider than u128.
            return self.clip(input);
        }

        let seed: u128 = input.bytes().map(u128::from).sum();
        self.clip(&seed.to_string())
    }

    /// Keeps the rightmost `max_digits` digits of a decimal string.
    fn clip(&self, digits: &str) -> Result<Fingerprint> {
        let start = digits.len().saturating_sub(self.max_digits);
        let value = digits[start..].parse::<u128>()?;
        Ok(Fingerprint::new(value))
    }
}

impl Default for FingerprintDeriver {
    fn default() -> Self {
        Self {
            max_digits: DEFAULT_MAX_DIGITS,
        }
    }
}

/// Derives a fingerprint with the default width.
pub fn fingerprint(input: &str) -> Result<Fingerprint> {
    FingerprintDeriver::default().derive(input)
}
