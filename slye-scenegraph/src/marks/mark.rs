use std::sync::Arc;

use crate::marks::image::SceneImageMark;
use crate::marks::text::SceneTextMark;
use crate::marks::video::SceneVideoMark;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SceneMark {
    Text(Arc<SceneTextMark>),
    Image(Arc<SceneImageMark>),
    Video(Arc<SceneVideoMark>),
}

/// The visual representation produced by one component render.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneFragment {
    pub marks: Vec<SceneMark>,
}

impl SceneFragment {
    pub fn new(marks: Vec<SceneMark>) -> Self {
        Self { marks }
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }
}

impl From<SceneMark> for SceneFragment {
    fn from(mark: SceneMark) -> Self {
        Self { marks: vec![mark] }
    }
}
