use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while sampling, training or evaluating.
#[derive(Error, Debug)]
pub enum CovidNetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to load image at '{}': {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Invalid label record at line {line}: {reason}")]
    LabelParse { line: usize, reason: String },

    #[error("Unknown class name '{0}'")]
    UnknownClass(String),

    #[error("No {0} records to sample from")]
    EmptyClassPool(&'static str),

    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    #[error("Tensor name mismatch for {role}: expected '{expected}', found '{found}'")]
    TensorNameMismatch {
        role: &'static str,
        expected: String,
        found: String,
    },

    #[error("Checkpoint error at '{}': {reason}", .path.display())]
    Checkpoint { path: PathBuf, reason: String },

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CovidNetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_parse_display() {
        let err = CovidNetError::LabelParse {
            line: 4,
            reason: "expected 3 fields".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid label record at line 4: expected 3 fields"
        );
    }

    #[test]
    fn test_mismatch_names_role() {
        let err = CovidNetError::TensorNameMismatch {
            role: "input",
            expected: "input_1:0".to_string(),
            found: "input_2:0".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("input"));
        assert!(msg.contains("input_2:0"));
    }
}
