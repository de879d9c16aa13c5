use std::path::PathBuf;
use thiserror::Error;

/// Error taxonomy for the generation pipeline.
///
/// Per-candidate failures (`Packaging`, `DifficultyUnreachable`) are isolated
/// by the candidate selector; the variants only surface at the top level when
/// every candidate in a bundle failed.
#[derive(Debug, Error)]
pub enum GenError {
    /// The input audio could not be decoded. Fatal, no retry.
    #[error("failed to decode audio: {0}")]
    Decode(String),

    /// The requested star rating could not be realized within tolerance
    /// after the retry budget; carries the closest achieved value.
    #[error("target star rating {requested:.2} unreachable (closest achieved: {achieved:.2})")]
    DifficultyUnreachable { requested: f32, achieved: f32 },

    /// Every attempt for a candidate failed the pattern sanity checks;
    /// carries the reason the last attempt was rejected.
    #[error("no attempt produced a valid pattern: {reason}")]
    PatternInvalid { reason: String },

    /// Every pattern type is disabled and no default map type applies.
    #[error("no active style: all pattern types disabled and no default map type")]
    NoActiveStyle,

    /// Writing a chart package failed.
    #[error("failed to write chart package {path}: {source}")]
    Packaging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generation was cancelled between candidates.
    #[error("generation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, GenError>;
