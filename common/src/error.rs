//! Error types shared across Ratekeeper crates.

use thiserror::Error;

/// A currency code that cannot be used as a [`crate::Currency`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CurrencyCodeError {
    /// The code is empty or whitespace.
    #[error("Currency code is empty")]
    Empty,

    /// The code is longer than any supported code.
    #[error("Currency code {code} is longer than {max} characters")]
    TooLong { code: String, max: usize },

    /// The code contains something other than ASCII letters and digits.
    #[error("Currency code {code} contains invalid character {character:?}")]
    InvalidCharacter { code: String, character: char },
}
