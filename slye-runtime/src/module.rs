use crate::asset::{AssetFetch, AssetStore};
use crate::cache::{CacheConfig, CoalescingCache};
use crate::error::SlyeRuntimeError;
use crate::update::RenderContext;
use async_trait::async_trait;
use indexmap::IndexMap;
use slye_common::id::ComponentId;
use slye_scenegraph::marks::mark::SceneFragment;
use slye_scenegraph::props::{Font, Props};
use slye_scenegraph::scene_graph::ComponentNode;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Behavior of one component kind, selected by `(module, component)`.
#[async_trait]
pub trait ComponentKind: Send + Sync {
    /// Fill in defaults for props the caller left out.
    fn init(&self, _props: &mut Props) {}

    async fn render(
        &self,
        ctx: &RenderContext,
        props: &Props,
    ) -> Result<SceneFragment, SlyeRuntimeError>;
}

/// A named set of component kinds and fonts.
#[derive(Clone, Default)]
pub struct Module {
    name: String,
    components: HashMap<String, Arc<dyn ComponentKind>>,
    /// Font name to the asset key of its font file.
    fonts: IndexMap<String, String>,
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .field("fonts", &self.fonts)
            .finish()
    }
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn register_component(&mut self, name: &str, kind: Arc<dyn ComponentKind>) {
        self.components.insert(name.to_string(), kind);
    }

    pub fn register_font(&mut self, name: &str, asset_key: &str) {
        self.fonts.insert(name.to_string(), asset_key.to_string());
    }

    pub fn lookup_component(&self, name: &str) -> Option<Arc<dyn ComponentKind>> {
        self.components.get(name).cloned()
    }

    pub fn lookup_font(&self, name: &str) -> Option<&str> {
        self.fonts.get(name).map(String::as_str)
    }

    pub fn font_names(&self) -> impl Iterator<Item = &str> {
        self.fonts.keys().map(String::as_str)
    }

    pub fn component_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.components.keys().map(String::as_str).collect();
        names.sort();
        names
    }
}

/// A module together with the asset store serving its files.
#[derive(Debug)]
pub struct LoadedModule {
    module: Module,
    assets: Arc<AssetStore>,
}

impl LoadedModule {
    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn assets(&self) -> &Arc<AssetStore> {
        &self.assets
    }

    pub fn kind(&self, component: &str) -> Result<Arc<dyn ComponentKind>, SlyeRuntimeError> {
        self.module.lookup_component(component).ok_or_else(|| {
            SlyeRuntimeError::NotFound(format!("component {}/{component}", self.module.name))
        })
    }
}

/// Loads modules that were not registered up front.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self, name: &str) -> Result<Module, SlyeRuntimeError>;
}

/// Resolves a `(module, component)` pair into a component node.
#[async_trait]
pub trait ComponentProvider: Send + Sync {
    async fn resolve(
        &self,
        uuid: ComponentId,
        module_name: &str,
        component_name: &str,
        props: Props,
    ) -> Result<ComponentNode, SlyeRuntimeError>;
}

#[async_trait]
pub trait FontProvider: Send + Sync {
    async fn resolve_font(&self, module_name: &str, name: &str) -> Result<Font, SlyeRuntimeError>;
}

/// Registry of modules, constructed once and passed to whoever needs it.
pub struct ModuleRegistry {
    registered: RwLock<HashMap<String, Arc<LoadedModule>>>,
    loaded: CoalescingCache<String, Arc<LoadedModule>>,
    loader: Option<Arc<dyn ModuleLoader>>,
    fetcher: Arc<dyn AssetFetch>,
    asset_cache: CacheConfig,
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("registered", &self.module_names())
            .field("has_loader", &self.loader.is_some())
            .finish_non_exhaustive()
    }
}

impl ModuleRegistry {
    pub fn new(fetcher: Arc<dyn AssetFetch>, asset_cache: CacheConfig) -> Self {
        Self {
            registered: Default::default(),
            loaded: CoalescingCache::new(CacheConfig::default()),
            loader: None,
            fetcher,
            asset_cache,
        }
    }

    pub fn with_loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn register(&self, module: Module) {
        let name = module.name.clone();
        let loaded = Arc::new(self.wrap(module));
        self.registered
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, loaded);
    }

    pub fn module_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .registered
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn wrap(&self, module: Module) -> LoadedModule {
        let assets = AssetStore::new(
            module.name.clone(),
            self.fetcher.clone(),
            self.asset_cache.clone(),
        );
        LoadedModule {
            module,
            assets: Arc::new(assets),
        }
    }

    /// Look up a module, loading it through the loader when needed.
    /// Concurrent lookups of the same unloaded module share one load.
    pub async fn module(&self, name: &str) -> Result<Arc<LoadedModule>, SlyeRuntimeError> {
        let registered = self
            .registered
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        if let Some(module) = registered {
            return Ok(module);
        }

        let Some(loader) = self.loader.clone() else {
            return Err(SlyeRuntimeError::NotFound(format!("module {name}")));
        };
        let key = name.to_string();
        self.loaded
            .get_or_try_insert_with(key.clone(), async move {
                log::info!("Loading module `{key}`");
                let module = loader.load(&key).await?;
                Ok(Arc::new(self.wrap(module)))
            })
            .await
    }

    pub async fn kind(
        &self,
        module_name: &str,
        component_name: &str,
    ) -> Result<Arc<dyn ComponentKind>, SlyeRuntimeError> {
        self.module(module_name).await?.kind(component_name)
    }
}

#[async_trait]
impl ComponentProvider for ModuleRegistry {
    async fn resolve(
        &self,
        uuid: ComponentId,
        module_name: &str,
        component_name: &str,
        props: Props,
    ) -> Result<ComponentNode, SlyeRuntimeError> {
        let kind = self.kind(module_name, component_name).await?;
        let mut props = props;
        kind.init(&mut props);
        Ok(ComponentNode::new(uuid, module_name, component_name, props))
    }
}

#[async_trait]
impl FontProvider for ModuleRegistry {
    async fn resolve_font(&self, module_name: &str, name: &str) -> Result<Font, SlyeRuntimeError> {
        let module = self.module(module_name).await?;
        if module.module.lookup_font(name).is_none() {
            return Err(SlyeRuntimeError::NotFound(format!("font {module_name}/{name}")));
        }
        Ok(Font::new(module_name, name))
    }
}

/// Provider for tools that never render: accepts any component kind as-is
/// and fabricates any font.
#[derive(Debug, Default, Clone, Copy)]
pub struct Headless;

#[async_trait]
impl ComponentProvider for Headless {
    async fn resolve(
        &self,
        uuid: ComponentId,
        module_name: &str,
        component_name: &str,
        props: Props,
    ) -> Result<ComponentNode, SlyeRuntimeError> {
        Ok(ComponentNode::new(uuid, module_name, component_name, props))
    }
}

#[async_trait]
impl FontProvider for Headless {
    async fn resolve_font(&self, module_name: &str, name: &str) -> Result<Font, SlyeRuntimeError> {
        Ok(Font::new(module_name, name))
    }
}
