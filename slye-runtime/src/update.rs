use crate::asset::{AssetData, AssetStore};
use crate::error::SlyeRuntimeError;
use crate::module::ModuleRegistry;
use slye_common::id::ComponentId;
use slye_scenegraph::marks::mark::SceneFragment;
use slye_scenegraph::props::{File, Font, Props};
use slye_scenegraph::scene_graph::{RenderRequest, SceneGraph, UpdateOutcome};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;

pub type SharedGraph = Arc<Mutex<SceneGraph>>;

pub fn shared_graph(graph: SceneGraph) -> SharedGraph {
    Arc::new(Mutex::new(graph))
}

pub fn lock_graph(graph: &SharedGraph) -> MutexGuard<'_, SceneGraph> {
    graph.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What a component kind can reach while rendering.
#[derive(Debug, Clone)]
pub struct RenderContext {
    component: ComponentId,
    assets: Arc<AssetStore>,
    modules: Arc<ModuleRegistry>,
}

impl RenderContext {
    pub fn new(component: ComponentId, assets: Arc<AssetStore>, modules: Arc<ModuleRegistry>) -> Self {
        Self {
            component,
            assets,
            modules,
        }
    }

    pub fn component(&self) -> &ComponentId {
        &self.component
    }

    /// Asset store of the presentation being rendered.
    pub fn assets(&self) -> &Arc<AssetStore> {
        &self.assets
    }

    pub fn modules(&self) -> &Arc<ModuleRegistry> {
        &self.modules
    }

    pub async fn file_data(&self, file: &File) -> Result<AssetData, SlyeRuntimeError> {
        match &file.module_name {
            None => self.assets.load_data(&file.uuid).await,
            Some(module) => {
                let module = self.modules.module(module).await?;
                module.assets().load_data(&file.uuid).await
            }
        }
    }

    pub async fn font_data(&self, font: &Font) -> Result<AssetData, SlyeRuntimeError> {
        let module = self.modules.module(&font.module_name).await?;
        let key = module
            .module()
            .lookup_font(&font.name)
            .ok_or_else(|| {
                SlyeRuntimeError::NotFound(format!("font {}/{}", font.module_name, font.name))
            })?
            .to_string();
        module.assets().load_data(&key).await
    }
}

/// Drives component renders queued on a live graph.
///
/// Each component has at most one render in flight. A render that fails is
/// logged and leaves the component without a fragment; props stashed while
/// it ran are rendered next either way. Render tasks are detached, so
/// dropping a `settle` future never cancels them.
#[derive(Debug, Clone)]
pub struct UpdateEngine {
    graph: SharedGraph,
    assets: Arc<AssetStore>,
    modules: Arc<ModuleRegistry>,
    in_flight: Arc<watch::Sender<usize>>,
}

impl UpdateEngine {
    pub fn new(graph: SharedGraph, assets: Arc<AssetStore>, modules: Arc<ModuleRegistry>) -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            graph,
            assets,
            modules,
            in_flight: Arc::new(in_flight),
        }
    }

    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    pub fn update_props(
        &self,
        component: &ComponentId,
        props: Props,
    ) -> Result<UpdateOutcome, SlyeRuntimeError> {
        let outcome = lock_graph(&self.graph).update_props(component, props)?;
        self.schedule();
        Ok(outcome)
    }

    pub fn patch_props(
        &self,
        component: &ComponentId,
        patch: &Props,
    ) -> Result<UpdateOutcome, SlyeRuntimeError> {
        let outcome = lock_graph(&self.graph).patch_props(component, patch)?;
        self.schedule();
        Ok(outcome)
    }

    /// Spawn a task for every render request queued on the graph. Requests
    /// stay queued when called outside of a tokio runtime.
    pub fn schedule(&self) -> usize {
        let Ok(handle) = Handle::try_current() else {
            return 0;
        };
        let requests = lock_graph(&self.graph).take_render_requests();
        let count = requests.len();
        for request in requests {
            let guard = InFlight::new(self.clone(), request.component.clone());
            handle.spawn(async move { guard.drive(request).await });
        }
        count
    }

    /// Number of render tasks currently running.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    pub async fn render(&self, request: &RenderRequest) -> Result<SceneFragment, SlyeRuntimeError> {
        let failure = |err: SlyeRuntimeError| {
            SlyeRuntimeError::RenderFailure(format!(
                "{}/{} {}: {err}",
                request.module_name, request.component_name, request.component
            ))
        };
        let kind = self
            .modules
            .kind(&request.module_name, &request.component_name)
            .await
            .map_err(failure)?;
        let ctx = RenderContext::new(
            request.component.clone(),
            self.assets.clone(),
            self.modules.clone(),
        );
        kind.render(&ctx, &request.props).await.map_err(failure)
    }

    /// Wait until no render is queued or in flight.
    pub async fn settle(&self) -> Result<(), SlyeRuntimeError> {
        let mut in_flight = self.in_flight.subscribe();
        loop {
            self.schedule();
            let running = *in_flight.borrow_and_update();
            if running == 0 && !lock_graph(&self.graph).has_pending_renders() {
                return Ok(());
            }
            in_flight
                .wait_for(|n| *n == 0)
                .await
                .map_err(|_| SlyeRuntimeError::InternalError("render tracker closed".to_string()))?;
        }
    }
}

/// Counts one render task for as long as it lives. A task dropped before
/// `drive` returns hands the component back to the graph with
/// `cancel_render`.
struct InFlight {
    engine: UpdateEngine,
    component: ComponentId,
    finished: bool,
}

impl InFlight {
    fn new(engine: UpdateEngine, component: ComponentId) -> Self {
        engine.in_flight.send_modify(|n| *n += 1);
        Self {
            engine,
            component,
            finished: false,
        }
    }

    async fn drive(mut self, request: RenderRequest) {
        let mut request = request;
        loop {
            let fragment = match self.engine.render(&request).await {
                Ok(fragment) => Some(fragment),
                Err(err) => {
                    log::error!("{err}");
                    None
                }
            };
            let next = lock_graph(&self.engine.graph).finish_render(&request.component, fragment);
            match next {
                Ok(Some(next)) => request = next,
                Ok(None) => break,
                Err(err) => {
                    log::error!("Failed to finish render of {}: {err}", request.component);
                    break;
                }
            }
        }
        self.finished = true;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!("Render of {} was cancelled", self.component);
            let cancelled = lock_graph(&self.engine.graph).cancel_render(&self.component);
            if let Err(err) = cancelled {
                log::error!("Failed to cancel render of {}: {err}", self.component);
            }
        }
        self.engine.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }
}
