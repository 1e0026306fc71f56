use std::sync::Arc;

use crate::props::Font;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SceneTextMark {
    pub text: String,
    pub font: Arc<Font>,
    pub font_size: f64,
    /// Packed `0xRRGGBB` color.
    pub color: u32,
    /// Size of the font file backing `font`, in bytes.
    pub font_bytes: usize,
}
