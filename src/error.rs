use thiserror::Error;

/// Unified error type for the Carousel engine
#[derive(Error, Debug)]
pub enum CarouselError {
    // Capacity errors (expected operating conditions)
    #[error("No eligible proxy in pool")]
    PoolExhausted,

    #[error("No proxy available for request")]
    NoProxyAvailable,

    // State-transition errors (bugs in the calling code path)
    #[error("Unknown proxy: {address}")]
    UnknownProxy { address: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid proxy address: {0}")]
    InvalidProxyAddress(String),

    // I/O errors (proxy list file loading)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Carousel operations
pub type Result<T> = std::result::Result<T, CarouselError>;

impl CarouselError {
    /// Check if this error is a recoverable capacity condition.
    ///
    /// Recoverable errors (`PoolExhausted`, `NoProxyAvailable`) are expected
    /// during operation and can be handled by delaying or queueing requests.
    /// Everything else indicates a bug or misconfiguration and should
    /// propagate to the caller.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CarouselError::PoolExhausted | CarouselError::NoProxyAvailable
        )
    }
}

// Convert from URL parse errors
impl From<url::ParseError> for CarouselError {
    fn from(err: url::ParseError) -> Self {
        CarouselError::InvalidProxyAddress(err.to_string())
    }
}
