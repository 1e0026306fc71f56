use std::sync::Arc;

use crate::props::File;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SceneImageMark {
    pub file: Arc<File>,
    pub width: f64,
    pub height: f64,
    pub byte_len: usize,
}
