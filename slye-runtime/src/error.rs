use slye_scenegraph::error::SlyeSceneGraphError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SlyeRuntimeError {
    #[error("Internal runtime error: {0}")]
    InternalError(String),

    #[error("Not found: `{0}`")]
    NotFound(String),

    #[error("Dangling reference: `{0}`")]
    DanglingReference(String),

    #[error("Render failure: `{0}`")]
    RenderFailure(String),

    #[error("Action listener already bound: `{0}`")]
    ListenerAlreadyBound(String),

    #[error("Protocol error: `{0}`")]
    ProtocolError(String),

    #[error("Scene graph error: `{0}`")]
    SceneGraphError(#[from] SlyeSceneGraphError),

    #[error("JSON error: `{0}`")]
    JsonError(#[from] serde_json::Error),
}

pub trait DuplicateResult {
    fn duplicate(&self) -> Self;
}

impl<T: Clone> DuplicateResult for Result<T, SlyeRuntimeError> {
    fn duplicate(&self) -> Self {
        match self {
            Ok(v) => Ok(v.clone()),
            Err(err) => Err(err.duplicate()),
        }
    }
}

impl SlyeRuntimeError {
    /// Duplicate an error, returning the same error type if possible
    /// For wrapped error types that don't support cloning, the error is
    /// converted to a generic internal error
    pub fn duplicate(&self) -> Self {
        match self {
            Self::InternalError(e) => Self::InternalError(e.clone()),
            Self::NotFound(e) => Self::NotFound(e.clone()),
            Self::DanglingReference(e) => Self::DanglingReference(e.clone()),
            Self::RenderFailure(e) => Self::RenderFailure(e.clone()),
            Self::ListenerAlreadyBound(e) => Self::ListenerAlreadyBound(e.clone()),
            Self::ProtocolError(e) => Self::ProtocolError(e.clone()),
            Self::SceneGraphError(e) => Self::SceneGraphError(e.clone()),
            Self::JsonError(e) => Self::InternalError(e.to_string()),
        }
    }
}
