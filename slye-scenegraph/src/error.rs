use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SlyeSceneGraphError {
    #[error("Not found: `{0}`")]
    NotFound(String),

    #[error("Duplicate id: `{0}`")]
    DuplicateId(String),

    #[error("Unsupported value for prop `{0}`")]
    UnsupportedPropType(String),

    #[error("Invalid reparent: `{0}`")]
    InvalidReparent(String),
}
