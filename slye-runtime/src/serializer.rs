//! Wire encoding of action payloads.
//!
//! Each channel keeps one [`Serializer`]: the set of steps and components the
//! other side already knows. Known entities travel as a bare `ref`, unknown
//! ones carry their full `data` once.
use crate::actions::{ActionData, ActionKind, ActionValue};
use crate::decode::Interner;
use crate::error::SlyeRuntimeError;
use crate::module::{ComponentProvider, FontProvider};
use crate::update::{lock_graph, SharedGraph};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use slye_common::id::{ComponentId, PresentationId, StepId};
use slye_common::types::{Transform, Transformable, Vec3};
use slye_scenegraph::props::{File, Font, PropValue, Props};
use slye_scenegraph::scene_graph::{ComponentNode, SceneGraph, StepNode};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

pub type SerializedData = IndexMap<String, SerializedValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SerializedValue {
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<SerializedValue>),
    Nested(Nested),
    Entity(SerializedEntity),
}

/// A nested map, wrapped so it cannot be mistaken for an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Nested {
    #[serde(rename = "_")]
    pub data: SerializedData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SerializedEntity {
    Component {
        #[serde(rename = "ref")]
        uuid: ComponentId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<ComponentPayload>,
    },
    Step {
        #[serde(rename = "ref")]
        uuid: StepId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<StepPayload>,
    },
    Presentation {
        #[serde(rename = "ref")]
        uuid: PresentationId,
    },
    Font {
        #[serde(rename = "moduleName")]
        module_name: String,
        name: String,
    },
    File {
        #[serde(rename = "ref")]
        uuid: String,
        #[serde(rename = "moduleId", default, skip_serializing_if = "Option::is_none")]
        module_id: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentPayload {
    pub module_name: String,
    pub component: String,
    pub props: SerializedData,
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl ComponentPayload {
    fn transform(&self) -> Transform {
        Transform {
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepPayload {
    pub components: Vec<SerializedEntity>,
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl StepPayload {
    fn transform(&self) -> Transform {
        Transform {
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedAction {
    pub forward: bool,
    pub action: ActionKind,
    pub data: SerializedData,
}

/// Per-channel reference table.
#[derive(Debug, Default)]
pub struct Serializer {
    components: HashSet<ComponentId>,
    steps: HashSet<StepId>,
}

impl Serializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn knows_component(&self, id: &ComponentId) -> bool {
        self.components.contains(id)
    }

    pub fn knows_step(&self, id: &StepId) -> bool {
        self.steps.contains(id)
    }

    pub fn register_component(&mut self, id: ComponentId) {
        self.components.insert(id);
    }

    pub fn register_step(&mut self, id: StepId) {
        self.steps.insert(id);
    }

    /// Register every step and component currently in `presentation`.
    pub fn register_presentation(
        &mut self,
        graph: &SceneGraph,
        presentation: &PresentationId,
    ) -> Result<(), SlyeRuntimeError> {
        for step in graph.presentation(presentation)?.steps() {
            self.steps.insert(step.clone());
        }
        for component in graph.presentation_components(presentation)? {
            self.components.insert(component);
        }
        Ok(())
    }

    /// Serialize an action and hand it to `deliver`. Entities sent in full
    /// are remembered only when the message was delivered.
    pub fn send_action(
        &mut self,
        graph: &SceneGraph,
        forward: bool,
        action: ActionKind,
        data: &ActionData,
        deliver: impl FnOnce(SerializedAction) -> Result<(), SlyeRuntimeError>,
    ) -> Result<(), SlyeRuntimeError> {
        let mut marked = Marked::default();
        let result = self.serialize_map(graph, data, &mut marked).and_then(|data| {
            deliver(SerializedAction {
                forward,
                action,
                data,
            })
        });
        if result.is_err() {
            self.forget(&marked);
        }
        result
    }

    /// Serialize `data`. Entities sent in full are remembered only when the
    /// whole payload serializes.
    pub fn serialize(
        &mut self,
        graph: &SceneGraph,
        data: &ActionData,
    ) -> Result<SerializedData, SlyeRuntimeError> {
        let mut marked = Marked::default();
        let result = self.serialize_map(graph, data, &mut marked);
        if result.is_err() {
            self.forget(&marked);
        }
        result
    }

    fn forget(&mut self, marked: &Marked) {
        for id in &marked.components {
            self.components.remove(id);
        }
        for id in &marked.steps {
            self.steps.remove(id);
        }
    }

    fn serialize_map(
        &mut self,
        graph: &SceneGraph,
        data: &ActionData,
        marked: &mut Marked,
    ) -> Result<SerializedData, SlyeRuntimeError> {
        data.iter()
            .map(|(key, value)| Ok((key.clone(), self.serialize_value(graph, value, marked)?)))
            .collect()
    }

    fn serialize_value(
        &mut self,
        graph: &SceneGraph,
        value: &ActionValue,
        marked: &mut Marked,
    ) -> Result<SerializedValue, SlyeRuntimeError> {
        Ok(match value {
            ActionValue::Bool(v) => SerializedValue::Bool(*v),
            ActionValue::Number(v) => SerializedValue::Number(*v),
            ActionValue::String(v) => SerializedValue::String(v.clone()),
            ActionValue::Component(id) => {
                SerializedValue::Entity(self.serialize_component(graph, id, marked)?)
            }
            ActionValue::Step(id) => SerializedValue::Entity(self.serialize_step(graph, id, marked)?),
            ActionValue::Presentation(id) => {
                SerializedValue::Entity(SerializedEntity::Presentation { uuid: id.clone() })
            }
            ActionValue::Font(font) => SerializedValue::Entity(font_entity(font)),
            ActionValue::File(file) => SerializedValue::Entity(file_entity(file)),
            ActionValue::List(values) => SerializedValue::List(
                values
                    .iter()
                    .map(|v| self.serialize_value(graph, v, marked))
                    .collect::<Result<_, _>>()?,
            ),
            ActionValue::Map(data) => SerializedValue::Nested(Nested {
                data: self.serialize_map(graph, data, marked)?,
            }),
        })
    }

    fn serialize_component(
        &mut self,
        graph: &SceneGraph,
        id: &ComponentId,
        marked: &mut Marked,
    ) -> Result<SerializedEntity, SlyeRuntimeError> {
        if self.components.contains(id) {
            return Ok(SerializedEntity::Component {
                uuid: id.clone(),
                data: None,
            });
        }
        let node = graph.component(id)?;
        let transform = node.transform();
        let payload = ComponentPayload {
            module_name: node.module_name().to_string(),
            component: node.component_name().to_string(),
            props: serialize_props(node.props()),
            position: transform.position,
            rotation: transform.rotation,
            scale: transform.scale,
        };
        self.components.insert(id.clone());
        marked.components.push(id.clone());
        Ok(SerializedEntity::Component {
            uuid: id.clone(),
            data: Some(payload),
        })
    }

    fn serialize_step(
        &mut self,
        graph: &SceneGraph,
        id: &StepId,
        marked: &mut Marked,
    ) -> Result<SerializedEntity, SlyeRuntimeError> {
        if self.steps.contains(id) {
            return Ok(SerializedEntity::Step {
                uuid: id.clone(),
                data: None,
            });
        }
        let node = graph.step(id)?;
        let transform = node.transform();
        let components = node
            .components()
            .iter()
            .map(|c| self.serialize_component(graph, c, marked))
            .collect::<Result<_, _>>()?;
        self.steps.insert(id.clone());
        marked.steps.push(id.clone());
        Ok(SerializedEntity::Step {
            uuid: id.clone(),
            data: Some(StepPayload {
                components,
                position: transform.position,
                rotation: transform.rotation,
                scale: transform.scale,
            }),
        })
    }
}

#[derive(Default)]
struct Marked {
    components: Vec<ComponentId>,
    steps: Vec<StepId>,
}

fn font_entity(font: &Font) -> SerializedEntity {
    SerializedEntity::Font {
        module_name: font.module_name.clone(),
        name: font.name.clone(),
    }
}

fn file_entity(file: &File) -> SerializedEntity {
    SerializedEntity::File {
        uuid: file.uuid.clone(),
        module_id: file.module_name.clone(),
    }
}

pub fn serialize_props(props: &Props) -> SerializedData {
    props
        .iter()
        .map(|(key, value)| {
            let value = match value {
                PropValue::Bool(v) => SerializedValue::Bool(*v),
                PropValue::Number(v) => SerializedValue::Number(*v),
                PropValue::String(v) => SerializedValue::String(v.clone()),
                PropValue::Font(font) => SerializedValue::Entity(font_entity(font)),
                PropValue::File(file) => SerializedValue::Entity(file_entity(file)),
                PropValue::Map(map) => SerializedValue::Nested(Nested {
                    data: serialize_props(map),
                }),
            };
            (key.clone(), value)
        })
        .collect()
}

/// Everything in a message that needs async resolution.
#[derive(Default)]
struct Wanted<'a> {
    fonts: Vec<(&'a str, &'a str)>,
    components: Vec<(&'a ComponentId, &'a ComponentPayload)>,
}

impl<'a> Wanted<'a> {
    fn walk_map(&mut self, data: &'a SerializedData) {
        for value in data.values() {
            self.walk_value(value);
        }
    }

    fn walk_value(&mut self, value: &'a SerializedValue) {
        match value {
            SerializedValue::List(values) => values.iter().for_each(|v| self.walk_value(v)),
            SerializedValue::Nested(nested) => self.walk_map(&nested.data),
            SerializedValue::Entity(entity) => self.walk_entity(entity),
            _ => {}
        }
    }

    fn walk_entity(&mut self, entity: &'a SerializedEntity) {
        match entity {
            SerializedEntity::Font { module_name, name } => {
                self.fonts.push((module_name.as_str(), name.as_str()))
            }
            SerializedEntity::Component {
                uuid,
                data: Some(payload),
            } => {
                self.walk_map(&payload.props);
                self.components.push((uuid, payload));
            }
            SerializedEntity::Step {
                data: Some(payload),
                ..
            } => payload.components.iter().for_each(|c| self.walk_entity(c)),
            _ => {}
        }
    }
}

/// Rebuild an action payload received on a channel.
///
/// Component kinds and fonts are resolved first, without holding any lock.
/// The graph and then the table are locked while references are checked and
/// new entities inserted.
pub async fn unserialize(
    serializer: &Mutex<Serializer>,
    graph: &SharedGraph,
    data: &SerializedData,
    components: &dyn ComponentProvider,
    fonts: &dyn FontProvider,
) -> Result<ActionData, SlyeRuntimeError> {
    let mut wanted = Wanted::default();
    wanted.walk_map(data);

    let mut interner = Interner::default();
    for (module_name, name) in &wanted.fonts {
        interner.font(fonts, module_name, name).await?;
    }

    let fresh: Vec<_> = {
        let graph = lock_graph(graph);
        wanted
            .components
            .into_iter()
            .filter(|(uuid, _)| !graph.contains_component(uuid))
            .collect()
    };
    let mut nodes = HashMap::with_capacity(fresh.len());
    for (uuid, payload) in fresh {
        let props = unserialize_props(&payload.props, &mut interner)?;
        let node = components
            .resolve(uuid.clone(), &payload.module_name, &payload.component, props)
            .await?
            .with_transform(payload.transform());
        nodes.insert(uuid.clone(), node);
    }

    let mut graph = lock_graph(graph);
    let mut table = serializer.lock().unwrap_or_else(PoisonError::into_inner);
    let mut builder = Builder {
        table: &mut table,
        graph: &mut graph,
        nodes,
        interner: &mut interner,
    };
    builder.map(data)
}

fn unserialize_props(
    data: &SerializedData,
    interner: &mut Interner,
) -> Result<Props, SlyeRuntimeError> {
    data.iter()
        .map(|(key, value)| {
            let value = match value {
                SerializedValue::Bool(v) => PropValue::Bool(*v),
                SerializedValue::Number(v) => PropValue::Number(*v),
                SerializedValue::String(v) => PropValue::String(v.clone()),
                SerializedValue::Nested(nested) => {
                    PropValue::Map(unserialize_props(&nested.data, interner)?)
                }
                SerializedValue::Entity(SerializedEntity::Font { module_name, name }) => {
                    PropValue::Font(cached_font(interner, module_name, name)?)
                }
                SerializedValue::Entity(SerializedEntity::File { uuid, module_id }) => {
                    PropValue::File(interner.file(uuid, module_id.as_deref()))
                }
                other => {
                    return Err(SlyeRuntimeError::ProtocolError(format!(
                        "prop `{key}` cannot hold {other:?}"
                    )));
                }
            };
            Ok((key.clone(), value))
        })
        .collect()
}

fn cached_font(interner: &Interner, module_name: &str, name: &str) -> Result<Arc<Font>, SlyeRuntimeError> {
    interner.cached_font(module_name, name).ok_or_else(|| {
        SlyeRuntimeError::InternalError(format!("font {module_name}/{name} was not resolved"))
    })
}

struct Builder<'a> {
    table: &'a mut Serializer,
    graph: &'a mut SceneGraph,
    nodes: HashMap<ComponentId, ComponentNode>,
    interner: &'a mut Interner,
}

impl Builder<'_> {
    fn map(&mut self, data: &SerializedData) -> Result<ActionData, SlyeRuntimeError> {
        data.iter()
            .map(|(key, value)| Ok((key.clone(), self.value(value)?)))
            .collect()
    }

    fn value(&mut self, value: &SerializedValue) -> Result<ActionValue, SlyeRuntimeError> {
        Ok(match value {
            SerializedValue::Bool(v) => ActionValue::Bool(*v),
            SerializedValue::Number(v) => ActionValue::Number(*v),
            SerializedValue::String(v) => ActionValue::String(v.clone()),
            SerializedValue::List(values) => ActionValue::List(
                values
                    .iter()
                    .map(|v| self.value(v))
                    .collect::<Result<_, _>>()?,
            ),
            SerializedValue::Nested(nested) => ActionValue::Map(self.map(&nested.data)?),
            SerializedValue::Entity(entity) => self.entity(entity)?,
        })
    }

    fn entity(&mut self, entity: &SerializedEntity) -> Result<ActionValue, SlyeRuntimeError> {
        Ok(match entity {
            SerializedEntity::Component { uuid, data } => {
                ActionValue::Component(self.component(uuid, data.is_some())?)
            }
            SerializedEntity::Step { uuid, data } => {
                ActionValue::Step(self.step(uuid, data.as_ref())?)
            }
            SerializedEntity::Presentation { uuid } => {
                if !self.graph.contains_presentation(uuid) {
                    return Err(SlyeRuntimeError::DanglingReference(format!(
                        "presentation {uuid}"
                    )));
                }
                ActionValue::Presentation(uuid.clone())
            }
            SerializedEntity::Font { module_name, name } => {
                ActionValue::Font(cached_font(self.interner, module_name, name)?)
            }
            SerializedEntity::File { uuid, module_id } => {
                ActionValue::File(self.interner.file(uuid, module_id.as_deref()))
            }
        })
    }

    fn component(&mut self, uuid: &ComponentId, full: bool) -> Result<ComponentId, SlyeRuntimeError> {
        if !full {
            if !self.table.knows_component(uuid) {
                return Err(SlyeRuntimeError::DanglingReference(format!("component {uuid}")));
            }
            return Ok(uuid.clone());
        }
        if !self.graph.contains_component(uuid) {
            let node = self.nodes.remove(uuid).ok_or_else(|| {
                SlyeRuntimeError::InternalError(format!("component {uuid} was not resolved"))
            })?;
            self.graph.insert_component(node)?;
        }
        self.table.register_component(uuid.clone());
        Ok(uuid.clone())
    }

    fn step(&mut self, uuid: &StepId, payload: Option<&StepPayload>) -> Result<StepId, SlyeRuntimeError> {
        let Some(payload) = payload else {
            if !self.table.knows_step(uuid) {
                return Err(SlyeRuntimeError::DanglingReference(format!("step {uuid}")));
            }
            return Ok(uuid.clone());
        };

        let fresh = !self.graph.contains_step(uuid);
        if fresh {
            self.graph
                .insert_step(StepNode::new(uuid.clone()).with_transform(payload.transform()))?;
        }
        for entity in &payload.components {
            let ActionValue::Component(component) = self.entity(entity)? else {
                return Err(SlyeRuntimeError::ProtocolError(format!(
                    "step {uuid} lists a non-component child"
                )));
            };
            if fresh {
                self.graph.add_component(uuid, &component, None)?;
            }
        }
        self.table.register_step(uuid.clone());
        Ok(uuid.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Headless;
    use crate::update::shared_graph;
    use slye_scenegraph::props;
    use slye_scenegraph::scene_graph::PresentationNode;

    fn source() -> SceneGraph {
        let mut graph = SceneGraph::headless();
        graph.insert_presentation(PresentationNode::new("p")).unwrap();
        graph.insert_step(StepNode::new("s")).unwrap();
        graph.add_step(&"p".into(), &"s".into(), None).unwrap();
        let props = props! {
            "text" => "hi",
            "font" => Font::new("slye", "Homa"),
            "style" => props! {"bold" => true},
        };
        graph
            .insert_component(ComponentNode::new("c", "slye", "text", props))
            .unwrap();
        graph.add_component(&"s".into(), &"c".into(), None).unwrap();
        graph
    }

    fn step_data() -> ActionData {
        let mut data = ActionData::new();
        data.insert("step".into(), ActionValue::Step("s".into()));
        data.insert("presentation".into(), ActionValue::Presentation("p".into()));
        data
    }

    #[test]
    fn test_wire_shape() {
        let graph = source();
        let mut serializer = Serializer::new();
        let data = serializer.serialize(&graph, &step_data()).unwrap();
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["step"]["kind"], "step");
        assert_eq!(json["step"]["ref"], "s");
        let component = &json["step"]["data"]["components"][0];
        assert_eq!(component["data"]["moduleName"], "slye");
        assert_eq!(component["data"]["props"]["font"]["kind"], "font");
        assert_eq!(component["data"]["props"]["style"]["_"]["bold"], true);
        assert_eq!(json["presentation"], serde_json::json!({"kind": "presentation", "ref": "p"}));

        let back: SerializedData = serde_json::from_value(json).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_failed_serialize_forgets_marks() {
        let graph = source();
        let mut serializer = Serializer::new();
        let mut data = step_data();
        data.insert("component".into(), ActionValue::Component("missing".into()));
        assert!(serializer.serialize(&graph, &data).is_err());
        assert!(!serializer.knows_step(&"s".into()));
        assert!(!serializer.knows_component(&"c".into()));
    }

    #[tokio::test]
    async fn test_unserialize_builds_entities() {
        let source = source();
        let mut sender = Serializer::new();
        let wire = sender.serialize(&source, &step_data()).unwrap();

        let mut target = SceneGraph::headless();
        target.insert_presentation(PresentationNode::new("p")).unwrap();
        let target = shared_graph(target);
        let receiver = Mutex::new(Serializer::new());
        let data = unserialize(&receiver, &target, &wire, &Headless, &Headless)
            .await
            .unwrap();
        assert_eq!(data, step_data());

        let graph = lock_graph(&target);
        assert_eq!(graph.step(&"s".into()).unwrap().components(), &[ComponentId::from("c")]);
        assert_eq!(
            graph.component(&"c".into()).unwrap().props(),
            source.component(&"c".into()).unwrap().props()
        );
        let receiver = receiver.lock().unwrap();
        assert!(receiver.knows_step(&"s".into()));
        assert!(receiver.knows_component(&"c".into()));
    }

    #[tokio::test]
    async fn test_entity_in_props_is_rejected() {
        let mut wire = SerializedData::new();
        let mut props = SerializedData::new();
        props.insert(
            "other".into(),
            SerializedValue::Entity(SerializedEntity::Step {
                uuid: "s".into(),
                data: None,
            }),
        );
        wire.insert(
            "component".into(),
            SerializedValue::Entity(SerializedEntity::Component {
                uuid: "c".into(),
                data: Some(ComponentPayload {
                    module_name: "slye".into(),
                    component: "text".into(),
                    props,
                    position: Vec3::ZERO,
                    rotation: Vec3::ZERO,
                    scale: Vec3::ONE,
                }),
            }),
        );
        let graph = shared_graph(SceneGraph::headless());
        let result = unserialize(&Mutex::new(Serializer::new()), &graph, &wire, &Headless, &Headless).await;
        assert!(matches!(result, Err(SlyeRuntimeError::ProtocolError(_))));
    }
}
