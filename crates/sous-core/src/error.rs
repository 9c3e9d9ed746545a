use thiserror::Error;

/// Top-level error type for the Sous workspace.
///
/// Covers the concerns shared by every crate: configuration loading, file
/// I/O and (de)serialization. The chat engine wraps these in its own
/// `ChatError` so that `?` works across the crate boundary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SousError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Logging setup failed: {0}")]
    Telemetry(String),
}

impl From<toml::de::Error> for SousError {
    fn from(err: toml::de::Error) -> Self {
        SousError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for SousError {
    fn from(err: toml::ser::Error) -> Self {
        SousError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SousError {
    fn from(err: serde_json::Error) -> Self {
        SousError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Sous operations.
pub type Result<T> = std::result::Result<T, SousError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SousError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(SousError, &str)> = vec![
            (
                SousError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                SousError::Serialization("invalid json".to_string()),
                "Serialization error: invalid json",
            ),
            (
                SousError::Telemetry("already set".to_string()),
                "Logging setup failed: already set",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SousError = io_err.into();
        assert!(matches!(err, SousError::Io(_)));
        assert!(err.to_string().starts_with("I/O error:"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let bad_toml = "invalid = [[[";
        let err: std::result::Result<toml::Value, _> = toml::from_str(bad_toml);
        let sous_err: SousError = err.unwrap_err().into();
        assert!(matches!(sous_err, SousError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let sous_err: SousError = err.unwrap_err().into();
        assert!(matches!(sous_err, SousError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(value.to_string())
        }

        assert_eq!(inner().unwrap(), "42");
    }
}
