use thiserror::Error;

/// Caller-visible failures of the recommendation engine.
///
/// Malformed catalog fields never surface here; the loader degrades them to
/// defaults and logs a warning instead.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// No catalog entry scored above the resolve threshold for this name.
    #[error("Restaurant not found: {name}")]
    NotFound { name: String },

    /// Fewer selections resolved than the configured minimum.
    #[error("Please select at least {required} restaurants ({resolved} matched)")]
    InsufficientInput {
        required: usize,
        resolved: usize,
        /// The names that failed to resolve, in request order.
        failed: Vec<String>,
    },

    /// The engine cannot be built over an empty catalog.
    #[error("catalog contains no restaurants")]
    EmptyCatalog,
}
