use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Ordered, string-keyed component configuration.
pub type Props = IndexMap<String, PropValue>;

/// A font provided by a module, identified by `(module_name, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Font {
    pub module_name: String,
    pub name: String,
}

impl Font {
    pub fn new(module_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            name: name.into(),
        }
    }
}

/// A binary asset. Files without a module belong to the presentation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_name: Option<String>,
}

impl File {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            module_name: None,
        }
    }

    pub fn from_module(uuid: impl Into<String>, module_name: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            module_name: Some(module_name.into()),
        }
    }

    pub fn is_module_asset(&self) -> bool {
        self.module_name.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Bool(bool),
    Number(f64),
    String(String),
    Font(Arc<Font>),
    File(Arc<File>),
    Map(Props),
}

impl PropValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_font(&self) -> Option<&Arc<Font>> {
        match self {
            Self::Font(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&Arc<File>> {
        match self {
            Self::File(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Props> {
        match self {
            Self::Map(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Arc<Font>> for PropValue {
    fn from(value: Arc<Font>) -> Self {
        Self::Font(value)
    }
}

impl From<Font> for PropValue {
    fn from(value: Font) -> Self {
        Self::Font(Arc::new(value))
    }
}

impl From<Arc<File>> for PropValue {
    fn from(value: Arc<File>) -> Self {
        Self::File(value)
    }
}

impl From<File> for PropValue {
    fn from(value: File) -> Self {
        Self::File(Arc::new(value))
    }
}

impl From<Props> for PropValue {
    fn from(value: Props) -> Self {
        Self::Map(value)
    }
}

/// Build a [`Props`] map from `key => value` pairs.
#[macro_export]
macro_rules! props {
    () => {
        $crate::props::Props::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut props = $crate::props::Props::new();
        $(props.insert(($key).to_string(), $crate::props::PropValue::from($value));)+
        props
    }};
}

/// Shallow merge: keys of `patch` overwrite keys of `base`, new keys are appended.
pub fn merge_props(base: &Props, patch: &Props) -> Props {
    let mut merged = base.clone();
    for (key, value) in patch {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
