use thiserror::Error;

/// Failure taxonomy of the harness.
///
/// One variant per failure class a scenario can observe. None of these are
/// retried internally: a failure fails the enclosing scenario. Several
/// messages are asserted verbatim by consuming scenarios, so no variant is
/// allowed to swallow the distinguishing text of an underlying error.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Malformed PEM or DER material.
    #[error("Failed to decode PEM/DER data: {0}")]
    Decode(String),

    /// Invalid certificate request parameters. The message is the full
    /// user-visible text, including the enumerated-values sentences for
    /// unsupported key usage values.
    #[error("{0}")]
    Issuance(String),

    /// Missing or unreadable key material. Raised before any network
    /// attempt is made.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Handshake or transport failure, with the underlying transport
    /// message preserved (e.g. containing "unknown certificate").
    #[error("{0}")]
    Network(String),

    /// A verification predicate did not hold. Names the specific link or
    /// attribute that failed.
    #[error("Chain verification failed: {0}")]
    ChainVerification(String),
}

pub type Result<T> = std::result::Result<T, HarnessError>;

impl From<der::Error> for HarnessError {
    fn from(err: der::Error) -> Self {
        HarnessError::Decode(err.to_string())
    }
}

impl From<pem::PemError> for HarnessError {
    fn from(err: pem::PemError) -> Self {
        HarnessError::Decode(err.to_string())
    }
}

impl From<rsa::pkcs1::Error> for HarnessError {
    fn from(err: rsa::pkcs1::Error) -> Self {
        HarnessError::Decode(err.to_string())
    }
}
