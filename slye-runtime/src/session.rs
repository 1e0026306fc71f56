use crate::action_stack::{ActionListener, ActionStack};
use crate::actions::Action;
use crate::asset::{AssetFetch, AssetStore};
use crate::cache::CacheConfig;
use crate::decode::resolve_document;
use crate::error::SlyeRuntimeError;
use crate::module::{ComponentProvider, ModuleRegistry};
use crate::sync::{SyncChannel, SyncPeer, SyncTarget};
use crate::update::{lock_graph, shared_graph, SharedGraph, UpdateEngine};
use serde::{Deserialize, Serialize};
use slye_common::id::{ComponentId, IdGenerator, PresentationId, StepId};
use slye_common::types::{TransformMode, Vec3};
use slye_scenegraph::document::Document;
use slye_scenegraph::encode::encode;
use slye_scenegraph::props::Props;
use slye_scenegraph::scene_graph::{PresentationNode, RenderMode, SceneGraph, StepNode, TransformTarget};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of actions kept for undo; `None` keeps everything.
    pub history_limit: Option<usize>,
    pub id_seed: Option<u64>,
    pub render_mode: RenderMode,
    pub asset_cache: CacheConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_limit: Some(17),
            id_seed: None,
            render_mode: RenderMode::Live,
            asset_cache: CacheConfig::default(),
        }
    }
}

/// One presentation open for editing.
///
/// Edits go through the action stack so they can be undone and mirrored to a
/// bound [`SyncPeer`].
#[derive(Debug)]
pub struct Session {
    presentation: PresentationId,
    graph: SharedGraph,
    assets: Arc<AssetStore>,
    modules: Arc<ModuleRegistry>,
    engine: UpdateEngine,
    ids: Arc<Mutex<IdGenerator>>,
    stack: ActionStack,
}

impl Session {
    /// Session for an empty presentation.
    pub fn new(
        presentation: PresentationId,
        modules: Arc<ModuleRegistry>,
        fetcher: Arc<dyn AssetFetch>,
        config: SessionConfig,
    ) -> Result<Self, SlyeRuntimeError> {
        let mut ids = match config.id_seed {
            Some(seed) => IdGenerator::with_seed(seed),
            None => IdGenerator::new(),
        };
        ids.reserve(presentation.as_str());

        let mut graph = SceneGraph::new(config.render_mode);
        graph.insert_presentation(PresentationNode::new(presentation.clone()))?;
        let graph = shared_graph(graph);

        let assets = Arc::new(AssetStore::new(
            presentation.as_str(),
            fetcher,
            config.asset_cache,
        ));
        let engine = UpdateEngine::new(graph.clone(), assets.clone(), modules.clone());
        Ok(Self {
            presentation,
            graph,
            assets,
            modules,
            engine,
            ids: Arc::new(Mutex::new(ids)),
            stack: ActionStack::new(config.history_limit),
        })
    }

    /// Join a presentation hosted on the other end of `channel`. The returned
    /// peer must be served for the snapshot to arrive.
    pub fn join(
        presentation: PresentationId,
        modules: Arc<ModuleRegistry>,
        fetcher: Arc<dyn AssetFetch>,
        config: SessionConfig,
        channel: Arc<dyn SyncChannel>,
    ) -> Result<(Self, Arc<SyncPeer>), SlyeRuntimeError> {
        let mut session = Self::new(presentation, modules, fetcher, config)?;
        let peer = Arc::new(SyncPeer::client(session.sync_target(), channel)?);
        session.bind_sync(peer.clone())?;
        Ok((session, peer))
    }

    pub fn presentation(&self) -> &PresentationId {
        &self.presentation
    }

    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    pub fn lock(&self) -> MutexGuard<'_, SceneGraph> {
        lock_graph(&self.graph)
    }

    pub fn assets(&self) -> &Arc<AssetStore> {
        &self.assets
    }

    pub fn modules(&self) -> &Arc<ModuleRegistry> {
        &self.modules
    }

    pub fn engine(&self) -> &UpdateEngine {
        &self.engine
    }

    pub fn stack(&self) -> &ActionStack {
        &self.stack
    }

    fn next_id<T: From<String>>(&self) -> T {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_id()
    }

    /// Load `document` into the presentation. Modules and fonts are resolved
    /// before the graph is touched.
    pub async fn open(&mut self, document: &Document) -> Result<(), SlyeRuntimeError> {
        let resolved =
            resolve_document(document, self.modules.as_ref(), self.modules.as_ref()).await?;
        {
            let mut graph = lock_graph(&self.graph);
            let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
            resolved.apply(&mut graph, &self.presentation, &mut ids)?;
        }
        log::info!(
            "Opened presentation {}: {} steps, {} components",
            self.presentation,
            document.steps.len(),
            document.num_components()
        );
        self.engine.schedule();
        Ok(())
    }

    pub fn save(&self) -> Result<Document, SlyeRuntimeError> {
        Ok(encode(&lock_graph(&self.graph), &self.presentation)?)
    }

    fn execute(&mut self, action: Action) -> Result<(), SlyeRuntimeError> {
        let kind = action.kind();
        let result = {
            let mut graph = lock_graph(&self.graph);
            self.stack.execute(&mut graph, kind, action.into_data())
        };
        self.engine.schedule();
        result
    }

    /// Create a step and insert it at `index` (default: append).
    pub fn new_step(&mut self, index: Option<usize>) -> Result<StepId, SlyeRuntimeError> {
        let step: StepId = self.next_id();
        lock_graph(&self.graph).insert_step(StepNode::new(step.clone()))?;
        self.execute(Action::InsertStep {
            presentation: self.presentation.clone(),
            step: step.clone(),
            index,
        })?;
        Ok(step)
    }

    /// Create a component of `module_name/component_name` and append it to
    /// `step`.
    pub async fn new_component(
        &mut self,
        step: &StepId,
        module_name: &str,
        component_name: &str,
        props: Props,
    ) -> Result<ComponentId, SlyeRuntimeError> {
        let component: ComponentId = self.next_id();
        let node = self
            .modules
            .resolve(component.clone(), module_name, component_name, props)
            .await?;
        lock_graph(&self.graph).insert_component(node)?;
        self.execute(Action::InsertComponent {
            step: step.clone(),
            component: component.clone(),
        })?;
        Ok(component)
    }

    pub fn delete_step(&mut self, step: &StepId) -> Result<(), SlyeRuntimeError> {
        self.execute(Action::DeleteStep { step: step.clone() })
    }

    pub fn delete_component(&mut self, component: &ComponentId) -> Result<(), SlyeRuntimeError> {
        self.execute(Action::DeleteComponent {
            component: component.clone(),
        })
    }

    pub fn transform(
        &mut self,
        object: impl Into<TransformTarget>,
        mode: TransformMode,
        value: Vec3,
    ) -> Result<(), SlyeRuntimeError> {
        self.execute(Action::Transform {
            mode,
            object: object.into(),
            value,
            previous: None,
        })
    }

    /// Merge `patch` into the component's props as one undoable action.
    pub fn update_props(
        &mut self,
        component: &ComponentId,
        patch: Props,
    ) -> Result<(), SlyeRuntimeError> {
        self.execute(Action::UpdateProps {
            component: component.clone(),
            patch,
        })
    }

    pub fn undo(&mut self) -> Result<bool, SlyeRuntimeError> {
        let result = self.stack.undo(&mut lock_graph(&self.graph));
        self.engine.schedule();
        result
    }

    pub fn redo(&mut self) -> Result<bool, SlyeRuntimeError> {
        let result = self.stack.redo(&mut lock_graph(&self.graph));
        self.engine.schedule();
        result
    }

    /// Wait for every queued render to finish.
    pub async fn settle(&self) -> Result<(), SlyeRuntimeError> {
        self.engine.settle().await
    }

    pub fn sync_target(&self) -> SyncTarget {
        SyncTarget {
            presentation: self.presentation.clone(),
            graph: self.graph.clone(),
            components: self.modules.clone(),
            fonts: self.modules.clone(),
            ids: self.ids.clone(),
            engine: Some(self.engine.clone()),
        }
    }

    /// Attach the listener notified of every executed, undone and redone
    /// action.
    pub fn bind_listener(&mut self, listener: Arc<dyn ActionListener>) -> Result<(), SlyeRuntimeError> {
        self.stack.bind(listener)
    }

    /// Mirror this session's actions to `peer`.
    pub fn bind_sync(&mut self, peer: Arc<SyncPeer>) -> Result<(), SlyeRuntimeError> {
        self.bind_listener(peer)
    }

    /// Share this session with the other end of `channel`.
    pub fn host(&mut self, channel: Arc<dyn SyncChannel>) -> Result<Arc<SyncPeer>, SlyeRuntimeError> {
        let peer = Arc::new(SyncPeer::host(self.sync_target(), channel));
        self.bind_sync(peer.clone())?;
        Ok(peer)
    }
}
