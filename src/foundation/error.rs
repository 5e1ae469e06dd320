use std::fmt;

pub type FxResult<T> = Result<T, FxError>;

#[derive(thiserror::Error, Debug)]
pub enum FxError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("load error: {0}")]
    Load(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    PostProcess(#[from] PostProcessError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FxError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

/// Which kind of command encoder could not be allocated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncoderKind {
    Blit,
    Compute,
}

impl fmt::Display for EncoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blit => f.write_str("blit"),
            Self::Compute => f.write_str("compute"),
        }
    }
}

/// Role of a transient texture inside one blur-clip invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScratchRole {
    /// Unblurred copy of the source.
    Original,
    /// Output of the horizontal pass.
    HorizontalBlur,
    /// Output of the vertical pass, used as the alpha mask.
    Blurred,
}

impl fmt::Display for ScratchRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Original => f.write_str("original copy"),
            Self::HorizontalBlur => f.write_str("horizontal blur"),
            Self::Blurred => f.write_str("blurred"),
        }
    }
}

/// Failure conditions of the blur-clip post-process. Each one aborts the pass before
/// anything is written to the destination.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PostProcessError {
    #[error("post-process source texture is missing")]
    MissingSourceTexture,

    #[error("compute program library is missing")]
    MissingProgramLibrary,

    #[error("could not resolve compute program '{entry_point}': {reason}")]
    ProgramResolution {
        entry_point: &'static str,
        reason: String,
    },

    #[error("could not allocate {kind} command encoder")]
    EncoderAllocation { kind: EncoderKind },

    #[error("could not allocate {role} texture ({width}x{height})")]
    TextureAllocation {
        role: ScratchRole,
        width: u32,
        height: u32,
    },

    #[error("render target mismatch: {0}")]
    TargetMismatch(String),

    #[error("unsupported pixel format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid blur radius {0}: must be >= 1")]
    InvalidRadius(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            FxError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(FxError::load("x").to_string().contains("load error:"));
        assert!(FxError::render("x").to_string().contains("render error:"));
        assert!(
            FxError::serde("x")
                .to_string()
                .contains("serialization error:")
        );
    }

    #[test]
    fn post_process_errors_are_distinct_and_transparent() {
        let err = FxError::from(PostProcessError::EncoderAllocation {
            kind: EncoderKind::Compute,
        });
        assert_eq!(err.to_string(), "could not allocate compute command encoder");

        let tex = PostProcessError::TextureAllocation {
            role: ScratchRole::Blurred,
            width: 4,
            height: 2,
        };
        assert!(tex.to_string().contains("blurred texture (4x2)"));
        assert_ne!(tex, PostProcessError::MissingSourceTexture);
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = FxError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
