use crate::error::SlyeRuntimeError;
use crate::module::{ComponentProvider, FontProvider};
use crate::update::{lock_graph, SharedGraph};
use futures::future::try_join_all;
use indexmap::IndexMap;
use slye_common::id::{IdGenerator, PresentationId, StepId};
use slye_scenegraph::document::{Document, DocumentPropValue, DocumentRef};
use slye_scenegraph::props::{File, Font, PropValue, Props};
use slye_scenegraph::scene_graph::{
    ComponentNode, PresentationNode, SceneGraph, StepNode, Template,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Fonts and files seen during one decode pass. Equal references resolve to
/// the same `Arc`.
#[derive(Debug, Default)]
pub struct Interner {
    fonts: HashMap<(String, String), Arc<Font>>,
    files: HashMap<(String, Option<String>), Arc<File>>,
}

impl Interner {
    pub async fn font(
        &mut self,
        provider: &dyn FontProvider,
        module_name: &str,
        name: &str,
    ) -> Result<Arc<Font>, SlyeRuntimeError> {
        let key = (module_name.to_string(), name.to_string());
        if let Some(font) = self.fonts.get(&key) {
            return Ok(font.clone());
        }
        let font = Arc::new(provider.resolve_font(module_name, name).await?);
        self.fonts.insert(key, font.clone());
        Ok(font)
    }

    pub fn cached_font(&self, module_name: &str, name: &str) -> Option<Arc<Font>> {
        self.fonts
            .get(&(module_name.to_string(), name.to_string()))
            .cloned()
    }

    pub fn file(&mut self, uuid: &str, module_name: Option<&str>) -> Arc<File> {
        let key = (uuid.to_string(), module_name.map(str::to_string));
        self.files
            .entry(key)
            .or_insert_with(|| {
                Arc::new(File {
                    uuid: uuid.to_string(),
                    module_name: module_name.map(str::to_string),
                })
            })
            .clone()
    }
}

/// A document whose modules and fonts are resolved, ready to be inserted
/// into a graph.
#[derive(Debug)]
pub struct ResolvedDocument {
    template: Option<Template>,
    steps: Vec<(StepNode, Vec<ComponentNode>)>,
}

impl ResolvedDocument {
    pub fn num_steps(&self) -> usize {
        self.steps.len()
    }

    /// Insert every step and component under `presentation`, creating the
    /// presentation when missing. A failure part way leaves the presentation
    /// partially populated.
    pub fn apply(
        self,
        graph: &mut SceneGraph,
        presentation: &PresentationId,
        ids: &mut IdGenerator,
    ) -> Result<(), SlyeRuntimeError> {
        if !graph.contains_presentation(presentation) {
            graph.insert_presentation(PresentationNode::new(presentation.clone()))?;
        }
        ids.reserve(presentation.as_str());
        if self.template.is_some() {
            graph.set_template(presentation, self.template)?;
        }

        for (step, components) in self.steps {
            let step_id = step.uuid().clone();
            ids.reserve(step_id.as_str());
            graph.insert_step(step)?;
            for component in components {
                let component_id = component.uuid().clone();
                ids.reserve(component_id.as_str());
                graph.insert_component(component)?;
                graph.add_component(&step_id, &component_id, None)?;
            }
            graph.add_step(presentation, &step_id, None)?;
        }
        Ok(())
    }
}

/// Resolve every module, component kind and font a document references,
/// without touching any graph.
pub async fn resolve_document(
    document: &Document,
    components: &dyn ComponentProvider,
    fonts: &dyn FontProvider,
) -> Result<ResolvedDocument, SlyeRuntimeError> {
    let mut interner = Interner::default();
    let mut steps = Vec::with_capacity(document.steps.len());

    for (step_uuid, step) in &document.steps {
        let node = StepNode::new(StepId::from(step_uuid.as_str())).with_transform(step.transform());
        let mut pending = Vec::with_capacity(step.components.len());
        for component in &step.components {
            let props = decode_props(&component.props, fonts, &mut interner).await?;
            pending.push(async move {
                let node = components
                    .resolve(
                        component.uuid.as_str().into(),
                        &component.module_name,
                        &component.component,
                        props,
                    )
                    .await?;
                Ok::<_, SlyeRuntimeError>(node.with_transform(component.transform()))
            });
        }
        // Kinds of one step resolve concurrently; module loads are coalesced
        let nodes = try_join_all(pending).await?;
        steps.push((node, nodes));
    }

    Ok(ResolvedDocument {
        template: document.template.clone(),
        steps,
    })
}

/// Decode `document` into `presentation`. Resolution happens before the
/// graph is locked; every decoded uuid is reserved in `ids`.
pub async fn decode(
    graph: &SharedGraph,
    presentation: &PresentationId,
    document: &Document,
    components: &dyn ComponentProvider,
    fonts: &dyn FontProvider,
    ids: &mut IdGenerator,
) -> Result<(), SlyeRuntimeError> {
    let resolved = resolve_document(document, components, fonts).await?;
    log::info!(
        "Decoding presentation {presentation}: {} steps, {} components",
        resolved.num_steps(),
        document.num_components()
    );
    resolved.apply(&mut lock_graph(graph), presentation, ids)
}

pub async fn decode_props(
    props: &IndexMap<String, DocumentPropValue>,
    fonts: &dyn FontProvider,
    interner: &mut Interner,
) -> Result<Props, SlyeRuntimeError> {
    let mut out = Props::with_capacity(props.len());
    for (key, value) in props {
        let value = match value {
            DocumentPropValue::Bool(v) => PropValue::Bool(*v),
            DocumentPropValue::Number(v) => PropValue::Number(v.as_f64().ok_or_else(|| {
                SlyeRuntimeError::ProtocolError(format!("prop `{key}` is not a number: {v}"))
            })?),
            DocumentPropValue::String(v) => PropValue::String(v.clone()),
            DocumentPropValue::Ref(DocumentRef::Font { font, module_name }) => {
                PropValue::Font(interner.font(fonts, module_name, font).await?)
            }
            DocumentPropValue::Ref(DocumentRef::File { uuid, module_id }) => {
                PropValue::File(interner.file(uuid, module_id.as_deref()))
            }
        };
        out.insert(key.clone(), value);
    }
    Ok(out)
}
