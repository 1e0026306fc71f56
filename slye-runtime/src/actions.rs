use crate::error::SlyeRuntimeError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use slye_common::id::{ComponentId, PresentationId, StepId};
use slye_common::types::{TransformMode, Vec3};
use slye_scenegraph::props::{merge_props, File, Font, PropValue, Props};
use slye_scenegraph::scene_graph::{SceneGraph, TransformTarget};
use std::sync::Arc;
use strum::VariantNames;

/// Payload of an action: primitives, references to live entities and
/// nested maps.
pub type ActionData = IndexMap<String, ActionValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum ActionValue {
    Bool(bool),
    Number(f64),
    String(String),
    Component(ComponentId),
    Step(StepId),
    Presentation(PresentationId),
    Font(Arc<Font>),
    File(Arc<File>),
    List(Vec<ActionValue>),
    Map(ActionData),
}

impl From<PropValue> for ActionValue {
    fn from(value: PropValue) -> Self {
        match value {
            PropValue::Bool(v) => Self::Bool(v),
            PropValue::Number(v) => Self::Number(v),
            PropValue::String(v) => Self::String(v),
            PropValue::Font(v) => Self::Font(v),
            PropValue::File(v) => Self::File(v),
            PropValue::Map(v) => Self::Map(props_to_data(&v)),
        }
    }
}

pub fn props_to_data(props: &Props) -> ActionData {
    props
        .iter()
        .map(|(k, v)| (k.clone(), ActionValue::from(v.clone())))
        .collect()
}

pub fn data_to_props(data: &ActionData) -> Result<Props, SlyeRuntimeError> {
    data.iter()
        .map(|(key, value)| {
            let value = match value {
                ActionValue::Bool(v) => PropValue::Bool(*v),
                ActionValue::Number(v) => PropValue::Number(*v),
                ActionValue::String(v) => PropValue::String(v.clone()),
                ActionValue::Font(v) => PropValue::Font(v.clone()),
                ActionValue::File(v) => PropValue::File(v.clone()),
                ActionValue::Map(v) => PropValue::Map(data_to_props(v)?),
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

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    VariantNames,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    DeleteStep,
    InsertStep,
    DeleteComponent,
    InsertComponent,
    UpdatePosition,
    UpdateRotation,
    UpdateScale,
    UpdateProps,
}

impl ActionKind {
    pub fn transform_mode(self) -> Option<TransformMode> {
        match self {
            Self::UpdatePosition => Some(TransformMode::Translate),
            Self::UpdateRotation => Some(TransformMode::Rotate),
            Self::UpdateScale => Some(TransformMode::Scale),
            _ => None,
        }
    }

    pub fn for_transform(mode: TransformMode) -> Self {
        match mode {
            TransformMode::Translate => Self::UpdatePosition,
            TransformMode::Rotate => Self::UpdateRotation,
            TransformMode::Scale => Self::UpdateScale,
        }
    }
}

/// Typed constructor for the forward data of each action kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    DeleteStep {
        step: StepId,
    },
    InsertStep {
        presentation: PresentationId,
        step: StepId,
        index: Option<usize>,
    },
    DeleteComponent {
        component: ComponentId,
    },
    InsertComponent {
        step: StepId,
        component: ComponentId,
    },
    Transform {
        mode: TransformMode,
        object: TransformTarget,
        value: Vec3,
        /// Captured from the graph when `None`.
        previous: Option<Vec3>,
    },
    UpdateProps {
        component: ComponentId,
        patch: Props,
    },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::DeleteStep { .. } => ActionKind::DeleteStep,
            Self::InsertStep { .. } => ActionKind::InsertStep,
            Self::DeleteComponent { .. } => ActionKind::DeleteComponent,
            Self::InsertComponent { .. } => ActionKind::InsertComponent,
            Self::Transform { mode, .. } => ActionKind::for_transform(*mode),
            Self::UpdateProps { .. } => ActionKind::UpdateProps,
        }
    }

    pub fn into_data(self) -> ActionData {
        let mut data = ActionData::new();
        match self {
            Self::DeleteStep { step } => {
                data.insert("step".into(), ActionValue::Step(step));
            }
            Self::InsertStep {
                presentation,
                step,
                index,
            } => {
                data.insert("presentation".into(), ActionValue::Presentation(presentation));
                data.insert("step".into(), ActionValue::Step(step));
                if let Some(index) = index {
                    data.insert("index".into(), ActionValue::Number(index as f64));
                }
            }
            Self::DeleteComponent { component } => {
                data.insert("component".into(), ActionValue::Component(component));
            }
            Self::InsertComponent { step, component } => {
                data.insert("step".into(), ActionValue::Step(step));
                data.insert("component".into(), ActionValue::Component(component));
            }
            Self::Transform {
                object,
                value,
                previous,
                ..
            } => {
                data.insert("object".into(), target_value(object));
                insert_vec3(&mut data, ["x", "y", "z"], value);
                if let Some(previous) = previous {
                    insert_vec3(&mut data, ["prevX", "prevY", "prevZ"], previous);
                }
            }
            Self::UpdateProps { component, patch } => {
                data.insert("component".into(), ActionValue::Component(component));
                data.insert("patch".into(), ActionValue::Map(props_to_data(&patch)));
            }
        }
        data
    }
}

fn target_value(target: TransformTarget) -> ActionValue {
    match target {
        TransformTarget::Step(id) => ActionValue::Step(id),
        TransformTarget::Component(id) => ActionValue::Component(id),
    }
}

fn insert_vec3(data: &mut ActionData, keys: [&str; 3], value: Vec3) {
    for (key, v) in keys.into_iter().zip(value.to_array()) {
        data.insert(key.to_string(), ActionValue::Number(v));
    }
}

/// Typed accessors for action payload fields.
trait ActionFields {
    fn field(&self, key: &str) -> Result<&ActionValue, SlyeRuntimeError>;
    fn step(&self, key: &str) -> Result<StepId, SlyeRuntimeError>;
    fn component(&self, key: &str) -> Result<ComponentId, SlyeRuntimeError>;
    fn presentation(&self, key: &str) -> Result<PresentationId, SlyeRuntimeError>;
    fn number(&self, key: &str) -> Result<f64, SlyeRuntimeError>;
    fn index(&self, key: &str) -> Result<Option<usize>, SlyeRuntimeError>;
    fn target(&self, key: &str) -> Result<TransformTarget, SlyeRuntimeError>;
    fn map(&self, key: &str) -> Result<&ActionData, SlyeRuntimeError>;
    fn vec3(&self, keys: [&str; 3]) -> Result<Vec3, SlyeRuntimeError>;
}

fn wrong_type(key: &str, expected: &str, value: &ActionValue) -> SlyeRuntimeError {
    SlyeRuntimeError::ProtocolError(format!("`{key}` should be {expected}, got {value:?}"))
}

impl ActionFields for ActionData {
    fn field(&self, key: &str) -> Result<&ActionValue, SlyeRuntimeError> {
        self.get(key)
            .ok_or_else(|| SlyeRuntimeError::ProtocolError(format!("missing action field `{key}`")))
    }

    fn step(&self, key: &str) -> Result<StepId, SlyeRuntimeError> {
        match self.field(key)? {
            ActionValue::Step(id) => Ok(id.clone()),
            other => Err(wrong_type(key, "a step", other)),
        }
    }

    fn component(&self, key: &str) -> Result<ComponentId, SlyeRuntimeError> {
        match self.field(key)? {
            ActionValue::Component(id) => Ok(id.clone()),
            other => Err(wrong_type(key, "a component", other)),
        }
    }

    fn presentation(&self, key: &str) -> Result<PresentationId, SlyeRuntimeError> {
        match self.field(key)? {
            ActionValue::Presentation(id) => Ok(id.clone()),
            other => Err(wrong_type(key, "a presentation", other)),
        }
    }

    fn number(&self, key: &str) -> Result<f64, SlyeRuntimeError> {
        match self.field(key)? {
            ActionValue::Number(v) => Ok(*v),
            other => Err(wrong_type(key, "a number", other)),
        }
    }

    fn index(&self, key: &str) -> Result<Option<usize>, SlyeRuntimeError> {
        match self.get(key) {
            None => Ok(None),
            Some(ActionValue::Number(v)) if *v >= 0.0 && v.fract() == 0.0 => Ok(Some(*v as usize)),
            Some(other) => Err(wrong_type(key, "an index", other)),
        }
    }

    fn target(&self, key: &str) -> Result<TransformTarget, SlyeRuntimeError> {
        match self.field(key)? {
            ActionValue::Step(id) => Ok(TransformTarget::Step(id.clone())),
            ActionValue::Component(id) => Ok(TransformTarget::Component(id.clone())),
            other => Err(wrong_type(key, "a step or component", other)),
        }
    }

    fn map(&self, key: &str) -> Result<&ActionData, SlyeRuntimeError> {
        match self.field(key)? {
            ActionValue::Map(v) => Ok(v),
            other => Err(wrong_type(key, "a map", other)),
        }
    }

    fn vec3(&self, keys: [&str; 3]) -> Result<Vec3, SlyeRuntimeError> {
        Ok(Vec3::new(
            self.number(keys[0])?,
            self.number(keys[1])?,
            self.number(keys[2])?,
        ))
    }
}

/// Perform an action, returning the data needed to reverse it.
pub fn run_forward(
    graph: &mut SceneGraph,
    kind: ActionKind,
    data: &ActionData,
) -> Result<ActionData, SlyeRuntimeError> {
    let mut back = ActionData::new();
    match kind {
        ActionKind::DeleteStep => {
            let step = data.step("step")?;
            let presentation = graph
                .step(&step)?
                .owner()
                .cloned()
                .ok_or_else(|| SlyeRuntimeError::NotFound(format!("owner of step {step}")))?;
            let index = graph.step_index(&presentation, &step).unwrap_or_default();
            graph.del_step(&presentation, &step)?;
            back.insert("step".into(), ActionValue::Step(step));
            back.insert("presentation".into(), ActionValue::Presentation(presentation));
            back.insert("index".into(), ActionValue::Number(index as f64));
        }
        ActionKind::InsertStep => {
            let presentation = data.presentation("presentation")?;
            let step = data.step("step")?;
            let previous = graph.step(&step)?.owner().cloned();
            let previous_index = previous
                .as_ref()
                .and_then(|owner| graph.step_index(owner, &step));
            graph.add_step(&presentation, &step, data.index("index")?)?;
            back.insert("step".into(), ActionValue::Step(step));
            if let Some(previous) = previous {
                back.insert("previous".into(), ActionValue::Presentation(previous));
            }
            if let Some(index) = previous_index {
                back.insert("index".into(), ActionValue::Number(index as f64));
            }
        }
        ActionKind::DeleteComponent => {
            let component = data.component("component")?;
            let step = graph
                .component(&component)?
                .owner()
                .cloned()
                .ok_or_else(|| SlyeRuntimeError::NotFound(format!("owner of component {component}")))?;
            let index = graph.component_index(&step, &component).unwrap_or_default();
            graph.del_component(&step, &component)?;
            back.insert("component".into(), ActionValue::Component(component));
            back.insert("step".into(), ActionValue::Step(step));
            back.insert("index".into(), ActionValue::Number(index as f64));
        }
        ActionKind::InsertComponent => {
            let step = data.step("step")?;
            let component = data.component("component")?;
            let previous = graph.component(&component)?.owner().cloned();
            let previous_index = previous
                .as_ref()
                .and_then(|owner| graph.component_index(owner, &component));
            graph.add_component(&step, &component, data.index("index")?)?;
            back.insert("component".into(), ActionValue::Component(component));
            if let Some(previous) = previous {
                back.insert("previous".into(), ActionValue::Step(previous));
            }
            if let Some(index) = previous_index {
                back.insert("index".into(), ActionValue::Number(index as f64));
            }
        }
        ActionKind::UpdatePosition | ActionKind::UpdateRotation | ActionKind::UpdateScale => {
            let mode = transform_mode(kind)?;
            let object = data.target("object")?;
            let value = data.vec3(["x", "y", "z"])?;
            let replaced = graph.set_transform(&object, mode, value)?;
            let previous = match data.get("prevX") {
                Some(_) => data.vec3(["prevX", "prevY", "prevZ"])?,
                None => replaced,
            };
            back.insert("object".into(), data.field("object")?.clone());
            insert_vec3(&mut back, ["prevX", "prevY", "prevZ"], previous);
        }
        ActionKind::UpdateProps => {
            let component = data.component("component")?;
            let patch = data_to_props(data.map("patch")?)?;
            let current = graph.component(&component)?.props();

            let mut undo = Props::new();
            let mut unset = vec![];
            for (key, value) in &patch {
                match current.get(key) {
                    Some(existing) if existing != value => {
                        undo.insert(key.clone(), existing.clone());
                    }
                    Some(_) => {}
                    None => unset.push(ActionValue::String(key.clone())),
                }
            }
            graph.patch_props(&component, &patch)?;
            back.insert("component".into(), ActionValue::Component(component));
            back.insert("patch".into(), ActionValue::Map(props_to_data(&undo)));
            back.insert("unset".into(), ActionValue::List(unset));
        }
    }
    Ok(back)
}

/// Reverse an action using the data its forward run produced.
pub fn run_backward(
    graph: &mut SceneGraph,
    kind: ActionKind,
    data: &ActionData,
) -> Result<(), SlyeRuntimeError> {
    match kind {
        ActionKind::DeleteStep => {
            let presentation = data.presentation("presentation")?;
            graph.add_step(&presentation, &data.step("step")?, data.index("index")?)?;
        }
        ActionKind::InsertStep => {
            let step = data.step("step")?;
            if let Some(owner) = graph.step(&step)?.owner().cloned() {
                graph.del_step(&owner, &step)?;
            }
            if data.contains_key("previous") {
                graph.add_step(&data.presentation("previous")?, &step, data.index("index")?)?;
            }
        }
        ActionKind::DeleteComponent => {
            let step = data.step("step")?;
            graph.add_component(&step, &data.component("component")?, data.index("index")?)?;
        }
        ActionKind::InsertComponent => {
            let component = data.component("component")?;
            if let Some(owner) = graph.component(&component)?.owner().cloned() {
                graph.del_component(&owner, &component)?;
            }
            if data.contains_key("previous") {
                graph.add_component(&data.step("previous")?, &component, data.index("index")?)?;
            }
        }
        ActionKind::UpdatePosition | ActionKind::UpdateRotation | ActionKind::UpdateScale => {
            let mode = transform_mode(kind)?;
            let object = data.target("object")?;
            graph.set_transform(&object, mode, data.vec3(["prevX", "prevY", "prevZ"])?)?;
        }
        ActionKind::UpdateProps => {
            let component = data.component("component")?;
            let patch = data_to_props(data.map("patch")?)?;
            let mut props = merge_props(graph.component(&component)?.props(), &patch);
            if let Some(ActionValue::List(unset)) = data.get("unset") {
                for key in unset {
                    if let ActionValue::String(key) = key {
                        props.shift_remove(key);
                    }
                }
            }
            graph.update_props(&component, props)?;
        }
    }
    Ok(())
}

fn transform_mode(kind: ActionKind) -> Result<TransformMode, SlyeRuntimeError> {
    kind.transform_mode()
        .ok_or_else(|| SlyeRuntimeError::InternalError(format!("{kind} is not a transform")))
}

pub fn action_names() -> &'static [&'static str] {
    ActionKind::VARIANTS
}

#[cfg(test)]
mod tests {
    use super::*;
    use slye_scenegraph::props;
    use slye_scenegraph::scene_graph::{ComponentNode, PresentationNode, StepNode};
    use std::str::FromStr;

    fn graph() -> SceneGraph {
        let mut graph = SceneGraph::headless();
        graph.insert_presentation(PresentationNode::new("p")).unwrap();
        for step in ["s1", "s2"] {
            graph.insert_step(StepNode::new(step)).unwrap();
            graph.add_step(&"p".into(), &step.into(), None).unwrap();
        }
        graph
            .insert_component(ComponentNode::new("c1", "slye", "text", props! {"text" => "a", "size" => 1}))
            .unwrap();
        graph.add_component(&"s1".into(), &"c1".into(), None).unwrap();
        graph
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ActionKind::DeleteStep.to_string(), "DELETE_STEP");
        assert_eq!(ActionKind::from_str("UPDATE_PROPS").unwrap(), ActionKind::UpdateProps);
        assert_eq!(
            serde_json::to_string(&ActionKind::InsertComponent).unwrap(),
            "\"INSERT_COMPONENT\""
        );
        assert_eq!(action_names().len(), 8);
    }

    #[test]
    fn test_delete_component_restores_index() {
        let mut graph = graph();
        graph
            .insert_component(ComponentNode::new("c2", "slye", "text", props! {}))
            .unwrap();
        graph.add_component(&"s1".into(), &"c2".into(), None).unwrap();

        let data = Action::DeleteComponent { component: "c1".into() }.into_data();
        let back = run_forward(&mut graph, ActionKind::DeleteComponent, &data).unwrap();
        assert_eq!(back["index"], ActionValue::Number(0.0));
        assert_eq!(graph.step(&"s1".into()).unwrap().components(), &[ComponentId::from("c2")]);

        run_backward(&mut graph, ActionKind::DeleteComponent, &back).unwrap();
        assert_eq!(
            graph.step(&"s1".into()).unwrap().components(),
            &[ComponentId::from("c1"), ComponentId::from("c2")]
        );
    }

    #[test]
    fn test_insert_moved_step_restores_previous_owner() {
        let mut graph = graph();
        graph.insert_presentation(PresentationNode::new("q")).unwrap();
        let data = Action::InsertStep {
            presentation: "q".into(),
            step: "s2".into(),
            index: None,
        }
        .into_data();
        let back = run_forward(&mut graph, ActionKind::InsertStep, &data).unwrap();
        assert_eq!(back["previous"], ActionValue::Presentation("p".into()));
        assert_eq!(graph.presentation(&"p".into()).unwrap().steps(), &[StepId::from("s1")]);

        run_backward(&mut graph, ActionKind::InsertStep, &back).unwrap();
        assert!(graph.presentation(&"q".into()).unwrap().steps().is_empty());
        assert_eq!(graph.step_index(&"p".into(), &"s2".into()), Some(1));
    }

    #[test]
    fn test_transform_captures_previous() {
        let mut graph = graph();
        let data = Action::Transform {
            mode: TransformMode::Rotate,
            object: TransformTarget::Component("c1".into()),
            value: Vec3::new(0.0, 1.5, 0.0),
            previous: None,
        }
        .into_data();
        let back = run_forward(&mut graph, ActionKind::UpdateRotation, &data).unwrap();
        assert_eq!(back["prevY"], ActionValue::Number(0.0));
        let target = TransformTarget::Component("c1".into());
        assert_eq!(graph.transform(&target).unwrap().rotation, Vec3::new(0.0, 1.5, 0.0));

        run_backward(&mut graph, ActionKind::UpdateRotation, &back).unwrap();
        assert_eq!(graph.transform(&target).unwrap().rotation, Vec3::ZERO);
    }

    #[test]
    fn test_update_props_undo_patch() {
        let mut graph = graph();
        let data = Action::UpdateProps {
            component: "c1".into(),
            patch: props! {"text" => "b", "size" => 1, "color" => "red"},
        }
        .into_data();
        let back = run_forward(&mut graph, ActionKind::UpdateProps, &data).unwrap();
        assert_eq!(back["patch"], ActionValue::Map(props_to_data(&props! {"text" => "a"})));
        assert_eq!(back["unset"], ActionValue::List(vec![ActionValue::String("color".into())]));

        run_backward(&mut graph, ActionKind::UpdateProps, &back).unwrap();
        assert_eq!(
            graph.component(&"c1".into()).unwrap().props(),
            &props! {"text" => "a", "size" => 1}
        );
    }

    #[test]
    fn test_malformed_data() {
        let mut graph = graph();
        let mut data = ActionData::new();
        data.insert("step".into(), ActionValue::Number(1.0));
        assert!(matches!(
            run_forward(&mut graph, ActionKind::DeleteStep, &data),
            Err(SlyeRuntimeError::ProtocolError(_))
        ));
        data.insert("step".into(), ActionValue::Step("nope".into()));
        assert!(matches!(
            run_forward(&mut graph, ActionKind::DeleteStep, &data),
            Err(SlyeRuntimeError::SceneGraphError(_))
        ));
    }
}
