//! The `slye` module shipped with every runtime: text, picture and video
//! components plus the bundled fonts.
use crate::error::SlyeRuntimeError;
use crate::module::{ComponentKind, Module};
use crate::update::RenderContext;
use async_trait::async_trait;
use slye_scenegraph::marks::image::SceneImageMark;
use slye_scenegraph::marks::mark::{SceneFragment, SceneMark};
use slye_scenegraph::marks::text::SceneTextMark;
use slye_scenegraph::marks::video::SceneVideoMark;
use slye_scenegraph::props::{Font, PropValue, Props};
use std::sync::Arc;

pub const MODULE_NAME: &str = "slye";

pub const FONTS: [(&str, &str); 4] = [
    ("Homa", "homa.ttf"),
    ("Sahel", "sahel.ttf"),
    ("Shellia", "shellia.ttf"),
    ("Emoji", "emoji.ttf"),
];

const DEFAULT_FONT: &str = "Homa";
const DEFAULT_TEXT_SIZE: f64 = 10.0;
const DEFAULT_TEXT_COLOR: u32 = 0x896215;
const DEFAULT_PICTURE_SCALE: f64 = 0.05;
const VIDEO_PIXEL_SCALE: f64 = 0.05;

pub fn slye_module() -> Module {
    let mut module = Module::new(MODULE_NAME);
    for (name, key) in FONTS {
        module.register_font(name, key);
    }
    module.register_component("text", Arc::new(Text));
    module.register_component("picture", Arc::new(Picture));
    module.register_component("video", Arc::new(Video));
    module
}

fn set_default(props: &mut Props, key: &str, value: PropValue) {
    props.entry(key.to_string()).or_insert(value);
}

pub struct Text;

#[async_trait]
impl ComponentKind for Text {
    fn init(&self, props: &mut Props) {
        set_default(props, "text", PropValue::from("Write..."));
        set_default(props, "size", PropValue::Number(DEFAULT_TEXT_SIZE));
        set_default(props, "color", PropValue::Number(DEFAULT_TEXT_COLOR as f64));
        set_default(props, "font", PropValue::from(Font::new(MODULE_NAME, DEFAULT_FONT)));
    }

    async fn render(
        &self,
        ctx: &RenderContext,
        props: &Props,
    ) -> Result<SceneFragment, SlyeRuntimeError> {
        let font = match props.get("font").and_then(PropValue::as_font) {
            Some(font) => font.clone(),
            None => Arc::new(Font::new(MODULE_NAME, DEFAULT_FONT)),
        };
        let data = ctx.font_data(&font).await?;
        let mark = SceneTextMark {
            text: props
                .get("text")
                .and_then(PropValue::as_str)
                .unwrap_or_default()
                .to_string(),
            font,
            font_size: props
                .get("size")
                .and_then(PropValue::as_number)
                .unwrap_or(DEFAULT_TEXT_SIZE),
            color: props
                .get("color")
                .and_then(PropValue::as_number)
                .map(|c| c as u32)
                .unwrap_or(DEFAULT_TEXT_COLOR),
            font_bytes: data.len(),
        };
        Ok(SceneMark::Text(Arc::new(mark)).into())
    }
}

pub struct Picture;

#[async_trait]
impl ComponentKind for Picture {
    fn init(&self, props: &mut Props) {
        set_default(props, "scale", PropValue::Number(DEFAULT_PICTURE_SCALE));
    }

    async fn render(
        &self,
        ctx: &RenderContext,
        props: &Props,
    ) -> Result<SceneFragment, SlyeRuntimeError> {
        let Some(file) = props.get("file").and_then(PropValue::as_file) else {
            return Ok(SceneFragment::default());
        };
        let data = ctx.file_data(file).await?;
        let scale = props
            .get("scale")
            .and_then(PropValue::as_number)
            .unwrap_or(DEFAULT_PICTURE_SCALE);
        let mark = SceneImageMark {
            file: file.clone(),
            width: scale,
            height: scale,
            byte_len: data.len(),
        };
        Ok(SceneMark::Image(Arc::new(mark)).into())
    }
}

pub struct Video;

#[async_trait]
impl ComponentKind for Video {
    async fn render(
        &self,
        ctx: &RenderContext,
        props: &Props,
    ) -> Result<SceneFragment, SlyeRuntimeError> {
        let file = props.get("file").and_then(PropValue::as_file).cloned();
        if let Some(file) = &file {
            // Fail early on missing media
            ctx.file_data(file).await?;
        }
        let pixels = |key: &str| {
            props
                .get(key)
                .and_then(PropValue::as_number)
                .unwrap_or(0.0)
                * VIDEO_PIXEL_SCALE
        };
        let mark = SceneVideoMark {
            file,
            width: pixels("width"),
            height: pixels("height"),
            autoplay: props
                .get("autoplay")
                .and_then(PropValue::as_bool)
                .unwrap_or(false),
        };
        Ok(SceneMark::Video(Arc::new(mark)).into())
    }
}
