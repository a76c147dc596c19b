use thiserror::Error;

/// Every failure the crate can surface to a caller.
///
/// The variants separate configuration mistakes from paths that are not
/// implemented and from numeric breakdowns, so a front-end can react to each
/// one differently (and map them onto process exit codes).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AppError {
    /// Rejected input: bad parameter values, grids, shapes or settings.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A feature path that exists in the interface but is not implemented.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// The model or optimizer produced NaN/Inf or could not recover.
    #[error("Numeric failure: {0}")]
    NumericFailure(String),

    /// Reading or writing an input/output file failed.
    #[error("I/O error: {0}")]
    Io(String),
}

impl AppError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported(message.into())
    }

    pub fn numeric(message: impl Into<String>) -> Self {
        Self::NumericFailure(message.into())
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::InvalidConfig(_) | AppError::Io(_) => 2,
            AppError::NumericFailure(_) => 4,
            AppError::NotSupported(_) => 5,
        }
    }

    /// True for errors that a fit loop may absorb as a rejected iterate.
    pub fn is_recoverable_in_fit(&self) -> bool {
        matches!(self, AppError::InvalidConfig(_) | AppError::NumericFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_per_category() {
        assert_eq!(AppError::invalid("x").exit_code(), 2);
        assert_eq!(AppError::numeric("x").exit_code(), 4);
        assert_eq!(AppError::not_supported("x").exit_code(), 5);
    }

    #[test]
    fn display_carries_category_and_message() {
        let err = AppError::not_supported("batch fitting");
        assert_eq!(err.to_string(), "Not supported: batch fitting");
    }
}
