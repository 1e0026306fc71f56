#![allow(dead_code)]

use async_trait::async_trait;
use slye_runtime::action_stack::ActionListener;
use slye_runtime::actions::{ActionData, ActionKind};
use slye_runtime::asset::{AssetFetch, MemoryFetch};
use slye_runtime::builtin::slye_module;
use slye_runtime::cache::CacheConfig;
use slye_runtime::error::SlyeRuntimeError;
use slye_runtime::module::{ComponentKind, Module, ModuleRegistry};
use slye_runtime::session::{Session, SessionConfig};
use slye_runtime::update::RenderContext;
use slye_scenegraph::document::Document;
use slye_scenegraph::marks::mark::SceneFragment;
use slye_scenegraph::props::Props;
use slye_scenegraph::scene_graph::{RenderMode, SceneGraph};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

pub const DOCUMENT: &str = r#"{
    "template": {"moduleName": "slye", "component": "text"},
    "steps": {
        "a1": {
            "position": [0, 0, 0], "rotation": [0, 0, 0], "scale": [1, 1, 1],
            "components": [
                {"uuid": "b1", "moduleName": "slye", "component": "text",
                 "position": [10, 20, 0], "rotation": [0, 0.5, 0], "scale": [1, 1, 1],
                 "props": {"text": "Hello", "size": 12, "color": 9003541,
                           "font": {"kind": "FONT", "font": "Sahel", "moduleName": "slye"}}},
                {"uuid": "b2", "moduleName": "slye", "component": "picture",
                 "position": [0, 0, 0], "rotation": [0, 0, 0], "scale": [2, 2, 2],
                 "props": {"scale": 0.05, "file": {"kind": "FILE", "uuid": "cat.png"}}}
            ]
        },
        "a2": {
            "position": [100, 0, 0], "rotation": [0, 0, 0], "scale": [1, 1, 1],
            "components": []
        }
    }
}"#;

pub fn document() -> Document {
    Document::from_json(DOCUMENT).unwrap()
}

pub fn fetch() -> Arc<MemoryFetch> {
    Arc::new(
        MemoryFetch::new()
            .with_asset("slye", "homa.ttf", vec![1u8; 32])
            .with_asset("slye", "sahel.ttf", vec![2u8; 32])
            .with_asset("p", "cat.png", vec![3u8; 8]),
    )
}

pub fn registry(fetch: Arc<dyn AssetFetch>) -> Arc<ModuleRegistry> {
    let modules = ModuleRegistry::new(fetch, CacheConfig::default());
    modules.register(slye_module());
    Arc::new(modules)
}

pub fn config(render_mode: RenderMode) -> SessionConfig {
    SessionConfig {
        render_mode,
        ..Default::default()
    }
}

pub async fn open_session(render_mode: RenderMode) -> Session {
    let fetch = fetch();
    let mut session = Session::new("p".into(), registry(fetch.clone()), fetch, config(render_mode)).unwrap();
    session.open(&document()).await.unwrap();
    session
}

/// Fetcher that counts calls and answers after a delay.
#[derive(Default)]
pub struct CountingFetch {
    pub calls: AtomicUsize,
}

#[async_trait]
impl AssetFetch for CountingFetch {
    async fn fetch(&self, _owner: &str, key: &str) -> Result<Vec<u8>, SlyeRuntimeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(key.as_bytes().to_vec())
    }
}

/// Component kind whose renders block until the test releases them.
pub struct GatedKind {
    pub gate: Semaphore,
    pub renders: Mutex<Vec<Props>>,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl GatedKind {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            renders: Default::default(),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn release(&self, renders: usize) {
        self.gate.add_permits(renders);
    }

    pub fn renders(&self) -> Vec<Props> {
        self.renders.lock().unwrap().clone()
    }
}

#[async_trait]
impl ComponentKind for GatedKind {
    async fn render(&self, _ctx: &RenderContext, props: &Props) -> Result<SceneFragment, SlyeRuntimeError> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        self.renders.lock().unwrap().push(props.clone());
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|err| SlyeRuntimeError::InternalError(err.to_string()))?;
        permit.forget();
        self.active.fetch_sub(1, Ordering::SeqCst);
        if props.contains_key("fail") {
            return Err(SlyeRuntimeError::InternalError("asked to fail".to_string()));
        }
        Ok(SceneFragment::default())
    }
}

pub fn gated_module(kind: Arc<GatedKind>) -> Module {
    let mut module = Module::new("test");
    module.register_component("gated", kind);
    module
}

/// Listener recording every notification.
#[derive(Default)]
pub struct RecordingListener {
    pub events: Mutex<Vec<(bool, ActionKind)>>,
}

impl ActionListener for RecordingListener {
    fn on_action(
        &self,
        _graph: &SceneGraph,
        forward: bool,
        kind: ActionKind,
        _data: &ActionData,
    ) -> Result<(), SlyeRuntimeError> {
        self.events.lock().unwrap().push((forward, kind));
        Ok(())
    }
}
