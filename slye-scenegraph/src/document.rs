//! The portable JSON presentation document, used for save/open and for
//! bootstrapping remote sessions.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use slye_common::types::{Transform, Vec3};

use crate::scene_graph::Template;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<Template>,
    /// Steps keyed by uuid, in presentation order.
    pub steps: IndexMap<String, DocumentStep>,
}

impl Document {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn num_components(&self) -> usize {
        self.steps.values().map(|s| s.components.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentStep {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
    #[serde(default)]
    pub components: Vec<DocumentComponent>,
}

impl DocumentStep {
    pub fn transform(&self) -> Transform {
        Transform {
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentComponent {
    pub uuid: String,
    pub module_name: String,
    pub component: String,
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
    #[serde(default)]
    pub props: IndexMap<String, DocumentPropValue>,
}

impl DocumentComponent {
    pub fn transform(&self) -> Transform {
        Transform {
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentPropValue {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Ref(DocumentRef),
}

impl DocumentPropValue {
    /// Whole numbers are stored as JSON integers. `None` for NaN and
    /// infinities, which JSON cannot hold.
    pub fn number(value: f64) -> Option<Self> {
        // Largest range where every integer is exact in an f64
        const EXACT: f64 = 9_007_199_254_740_992.0;
        if value.fract() == 0.0 && value.abs() <= EXACT {
            Some(Self::Number(serde_json::Number::from(value as i64)))
        } else {
            serde_json::Number::from_f64(value).map(Self::Number)
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DocumentRef {
    #[serde(rename = "FILE")]
    File {
        uuid: String,
        #[serde(rename = "moduleId", default, skip_serializing_if = "Option::is_none")]
        module_id: Option<String>,
    },
    #[serde(rename = "FONT")]
    Font {
        font: String,
        #[serde(rename = "moduleName")]
        module_name: String,
    },
}
