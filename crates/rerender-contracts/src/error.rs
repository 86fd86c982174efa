use std::fmt;

/// The three collaborator-call families guarded by busy flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Decode,
    Generate,
    Edit,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Decode => "decode",
            Self::Generate => "generation",
            Self::Edit => "edit",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures surfaced by the pipeline controller.
///
/// `Display` is the operator-facing message stored as the session's last
/// error. Collaborator detail is kept in the variant for logs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("Input Error: could not read {path}: {reason}")]
    UnreadableFile { path: String, reason: String },

    #[error("Engine: Decoding failed. Check connection.")]
    DecodeFailure { detail: String },

    #[error("Input Error: Missing image data.")]
    MissingInput,

    #[error("Engine: Waiting for prompt reconstruction...")]
    MetadataNotReady,

    #[error("{message}")]
    GenerationFailure { message: String },

    #[error("{message}")]
    EditFailure { message: String },

    #[error("Engine: {operation} already in progress.")]
    Busy { operation: Operation },

    #[error("Engine: {operation} was cancelled.")]
    Cancelled { operation: Operation },
}

impl PipelineError {
    pub const NO_GENERATED_IMAGE: &'static str = "Re-rendering engine failed to produce image.";
    pub const NO_EDITED_IMAGE: &'static str = "Failed to edit image";

    pub fn no_generated_image() -> Self {
        Self::GenerationFailure {
            message: Self::NO_GENERATED_IMAGE.to_string(),
        }
    }

    pub fn no_edited_image() -> Self {
        Self::EditFailure {
            message: Self::NO_EDITED_IMAGE.to_string(),
        }
    }

    /// Whether the failure belongs in the session's error slot.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, Self::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::{Operation, PipelineError};

    #[test]
    fn messages_match_operator_wording() {
        assert_eq!(
            PipelineError::MissingInput.to_string(),
            "Input Error: Missing image data."
        );
        assert_eq!(
            PipelineError::MetadataNotReady.to_string(),
            "Engine: Waiting for prompt reconstruction..."
        );
        assert_eq!(
            PipelineError::DecodeFailure {
                detail: "timeout".to_string()
            }
            .to_string(),
            "Engine: Decoding failed. Check connection."
        );
        assert_eq!(
            PipelineError::no_generated_image().to_string(),
            "Re-rendering engine failed to produce image."
        );
        assert_eq!(
            PipelineError::Busy {
                operation: Operation::Edit
            }
            .to_string(),
            "Engine: edit already in progress."
        );
    }

    #[test]
    fn cancellation_is_not_reportable() {
        assert!(!PipelineError::Cancelled {
            operation: Operation::Generate
        }
        .is_reportable());
        assert!(PipelineError::no_edited_image().is_reportable());
    }
}
