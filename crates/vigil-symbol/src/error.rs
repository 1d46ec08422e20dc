/// Error type of this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No scope matches the requested name.
    #[error("invalid scope: {0}")]
    InvalidScope(String),

    /// The compiler collaborator failed to produce debug metadata.
    #[error("failed to compile {filename}")]
    Compile {
        /// File that was being compiled.
        filename: String,

        /// Error reported by the compiler.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The debug metadata of a file contains no scope.
    #[error("no scope found in {0}")]
    EmptyUnit(String),
}

/// Result type of this crate.
pub type Result<T> = core::result::Result<T, Error>;
