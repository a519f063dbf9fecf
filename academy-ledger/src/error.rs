use thiserror::Error;

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors surfaced by ledger reads, decoding, and transaction assembly.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// Account bytes did not match the expected layout. Fatal for the
    /// current request; callers must not substitute defaults.
    #[error("malformed account data: {0}")]
    MalformedAccount(String),

    /// The mint is owned by neither known token-program variant.
    #[error("mint {0} could not be resolved to a token program variant")]
    MintNotResolved(String),

    /// Transient RPC failure. Call sites apply their own degrade policy;
    /// this is never equivalent to "account does not exist".
    #[error("ledger rpc unavailable: {0}")]
    Unavailable(String),

    /// A text address failed base58/length validation.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Signing key material failed validation.
    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    /// No off-curve bump was found for a program-derived address.
    #[error("no viable program-derived address for the given seeds")]
    NoViableBump,
}
