use thiserror::Error;

/// Dependency resolution error types
#[derive(Error, Debug)]
pub enum DepsError {
    /// The build file could not be opened or read
    #[error("Failed to open build file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Malformed instruction syntax
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// An ONBUILD trigger inherited from a base image could not be replayed
    #[error("ONBUILD trigger '{trigger}' from {image}: {message}")]
    Trigger {
        image: String,
        trigger: String,
        message: String,
    },

    /// Malformed shell quoting or substitution in a word
    #[error("Failed to expand '{word}': {message}")]
    Expansion { word: String, message: String },

    /// Dependency paths could not be expanded to concrete files
    #[error("Path expansion error: {0}")]
    PathExpansion(String),

    /// The ignore file could not be read or contains an invalid pattern
    #[error("Ignore file error: {path} - {message}")]
    Ignore { path: String, message: String },

    /// Base image metadata could not be retrieved
    #[error("Image lookup failed: {reference} - {message}")]
    ImageLookup { reference: String, message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<serde_json::Error> for DepsError {
    fn from(err: serde_json::Error) -> Self {
        DepsError::SerializationError(err.to_string())
    }
}

impl DepsError {
    /// Whether this error only degrades completeness when it happens while
    /// inspecting a base image.
    pub fn is_lookup(&self) -> bool {
        matches!(self, DepsError::ImageLookup { .. })
    }
}

/// Result type alias for dependency resolution
pub type Result<T> = std::result::Result<T, DepsError>;
