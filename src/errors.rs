use thiserror::Error;

/// Errors surfaced by template compilation, rendering and the posting cycle.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// Rendering referenced a field absent from the merged context.
    /// Fatal to that render attempt only; the pipeline skips the pair.
    #[error("missing field `{0}` in context")]
    MissingField(String),

    /// The template cannot be turned into a matcher (malformed placeholder
    /// or a field override that breaks the regex). Raised at pattern
    /// construction, before any cycle starts.
    #[error("ambiguous template `{template}`: {reason}")]
    AmbiguousTemplate { template: String, reason: String },

    /// A collaborator (recent-message listing or posting) failed.
    #[error("channel error: {0}")]
    Channel(String),
}

pub type Result<T> = std::result::Result<T, ComposeError>;
