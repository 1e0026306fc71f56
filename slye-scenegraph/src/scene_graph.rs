use std::collections::HashMap;

use crate::error::SlyeSceneGraphError;
use crate::marks::mark::SceneFragment;
use crate::props::{merge_props, Props};
use serde::{Deserialize, Serialize};
use slye_common::id::{ComponentId, PresentationId, StepId};
use slye_common::types::{Transform, TransformMode, Transformable, Vec3};

/// How a graph reacts to prop updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Props are applied immediately and nothing is ever rendered.
    Headless,
    /// Props go through the render lifecycle and queue render requests.
    #[default]
    Live,
}

/// Component kind used to lay out every step of a presentation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub module_name: String,
    pub component: String,
}

#[derive(Debug, Clone)]
pub struct PresentationNode {
    uuid: PresentationId,
    steps: Vec<StepId>,
    template: Option<Template>,
}

impl PresentationNode {
    pub fn new(uuid: impl Into<PresentationId>) -> Self {
        Self {
            uuid: uuid.into(),
            steps: vec![],
            template: None,
        }
    }

    pub fn uuid(&self) -> &PresentationId {
        &self.uuid
    }

    pub fn steps(&self) -> &[StepId] {
        &self.steps
    }

    pub fn template(&self) -> Option<&Template> {
        self.template.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct StepNode {
    uuid: StepId,
    owner: Option<PresentationId>,
    transform: Transform,
    components: Vec<ComponentId>,
}

impl StepNode {
    pub fn new(uuid: impl Into<StepId>) -> Self {
        Self {
            uuid: uuid.into(),
            owner: None,
            transform: Transform::default(),
            components: vec![],
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn uuid(&self) -> &StepId {
        &self.uuid
    }

    pub fn owner(&self) -> Option<&PresentationId> {
        self.owner.as_ref()
    }

    pub fn components(&self) -> &[ComponentId] {
        &self.components
    }
}

impl Transformable for StepNode {
    fn transform(&self) -> &Transform {
        &self.transform
    }

    fn transform_mut(&mut self) -> &mut Transform {
        &mut self.transform
    }
}

/// Per-component render lifecycle. At most one render is in flight; while
/// rendering, only the newest requested props are kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum UpdateState {
    #[default]
    Idle,
    Rendering { pending: Option<Props> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Headless graph: props were stored, nothing to render.
    Applied,
    /// A render was queued for the new props.
    Started,
    /// A render is in flight; the props replace any previously stashed ones.
    Stashed,
}

/// Work item for whoever drives component renders.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub component: ComponentId,
    pub module_name: String,
    pub component_name: String,
    pub props: Props,
}

#[derive(Debug, Clone)]
pub struct ComponentNode {
    uuid: ComponentId,
    module_name: String,
    component_name: String,
    owner: Option<StepId>,
    transform: Transform,
    props: Props,
    state: UpdateState,
    fragment: Option<SceneFragment>,
}

impl ComponentNode {
    pub fn new(
        uuid: impl Into<ComponentId>,
        module_name: impl Into<String>,
        component_name: impl Into<String>,
        props: Props,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            module_name: module_name.into(),
            component_name: component_name.into(),
            owner: None,
            transform: Transform::default(),
            props,
            state: UpdateState::Idle,
            fragment: None,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn uuid(&self) -> &ComponentId {
        &self.uuid
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn component_name(&self) -> &str {
        &self.component_name
    }

    pub fn owner(&self) -> Option<&StepId> {
        self.owner.as_ref()
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn state(&self) -> &UpdateState {
        &self.state
    }

    pub fn is_rendering(&self) -> bool {
        matches!(self.state, UpdateState::Rendering { .. })
    }

    /// Output of the last finished render, `None` before the first one or
    /// after a failed render.
    pub fn fragment(&self) -> Option<&SceneFragment> {
        self.fragment.as_ref()
    }

    fn render_request(&self) -> RenderRequest {
        RenderRequest {
            component: self.uuid.clone(),
            module_name: self.module_name.clone(),
            component_name: self.component_name.clone(),
            props: self.props.clone(),
        }
    }
}

impl Transformable for ComponentNode {
    fn transform(&self) -> &Transform {
        &self.transform
    }

    fn transform_mut(&mut self) -> &mut Transform {
        &mut self.transform
    }
}

/// Anything that carries a transform.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransformTarget {
    Step(StepId),
    Component(ComponentId),
}

impl From<StepId> for TransformTarget {
    fn from(value: StepId) -> Self {
        Self::Step(value)
    }
}

impl From<ComponentId> for TransformTarget {
    fn from(value: ComponentId) -> Self {
        Self::Component(value)
    }
}

/// Arena holding every presentation, step and component of a process.
///
/// Children reference their owner by id. Detached entities stay in the arena
/// so that they can be re-inserted later (undo, remote replay).
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    mode: RenderMode,
    presentations: HashMap<PresentationId, PresentationNode>,
    steps: HashMap<StepId, StepNode>,
    components: HashMap<ComponentId, ComponentNode>,
    render_queue: Vec<RenderRequest>,
}

impl SceneGraph {
    pub fn new(mode: RenderMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn headless() -> Self {
        Self::new(RenderMode::Headless)
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn insert_presentation(
        &mut self,
        presentation: PresentationNode,
    ) -> Result<(), SlyeSceneGraphError> {
        if self.presentations.contains_key(&presentation.uuid) {
            return Err(SlyeSceneGraphError::DuplicateId(
                presentation.uuid.to_string(),
            ));
        }
        self.presentations
            .insert(presentation.uuid.clone(), presentation);
        Ok(())
    }

    pub fn insert_step(&mut self, step: StepNode) -> Result<(), SlyeSceneGraphError> {
        if self.steps.contains_key(&step.uuid) {
            return Err(SlyeSceneGraphError::DuplicateId(step.uuid.to_string()));
        }
        self.steps.insert(step.uuid.clone(), step);
        Ok(())
    }

    /// Insert a component. Live graphs queue its first render.
    pub fn insert_component(&mut self, component: ComponentNode) -> Result<(), SlyeSceneGraphError> {
        if self.components.contains_key(&component.uuid) {
            return Err(SlyeSceneGraphError::DuplicateId(
                component.uuid.to_string(),
            ));
        }
        let mut component = component;
        if self.mode == RenderMode::Live {
            component.state = UpdateState::Rendering { pending: None };
            self.render_queue.push(component.render_request());
        }
        self.components.insert(component.uuid.clone(), component);
        Ok(())
    }

    pub fn presentation(&self, id: &PresentationId) -> Result<&PresentationNode, SlyeSceneGraphError> {
        self.presentations
            .get(id)
            .ok_or_else(|| SlyeSceneGraphError::NotFound(format!("presentation {id}")))
    }

    pub fn step(&self, id: &StepId) -> Result<&StepNode, SlyeSceneGraphError> {
        self.steps
            .get(id)
            .ok_or_else(|| SlyeSceneGraphError::NotFound(format!("step {id}")))
    }

    pub fn step_mut(&mut self, id: &StepId) -> Result<&mut StepNode, SlyeSceneGraphError> {
        self.steps
            .get_mut(id)
            .ok_or_else(|| SlyeSceneGraphError::NotFound(format!("step {id}")))
    }

    pub fn component(&self, id: &ComponentId) -> Result<&ComponentNode, SlyeSceneGraphError> {
        self.components
            .get(id)
            .ok_or_else(|| SlyeSceneGraphError::NotFound(format!("component {id}")))
    }

    pub fn component_mut(
        &mut self,
        id: &ComponentId,
    ) -> Result<&mut ComponentNode, SlyeSceneGraphError> {
        self.components
            .get_mut(id)
            .ok_or_else(|| SlyeSceneGraphError::NotFound(format!("component {id}")))
    }

    pub fn contains_presentation(&self, id: &PresentationId) -> bool {
        self.presentations.contains_key(id)
    }

    pub fn contains_step(&self, id: &StepId) -> bool {
        self.steps.contains_key(id)
    }

    pub fn contains_component(&self, id: &ComponentId) -> bool {
        self.components.contains_key(id)
    }

    pub fn set_template(
        &mut self,
        presentation: &PresentationId,
        template: Option<Template>,
    ) -> Result<(), SlyeSceneGraphError> {
        self.presentations
            .get_mut(presentation)
            .ok_or_else(|| SlyeSceneGraphError::NotFound(format!("presentation {presentation}")))?
            .template = template;
        Ok(())
    }

    /// Attach `step` to `presentation` at `index` (default: append), first
    /// detaching it from any other presentation. Re-adding a step to its
    /// current owner is a no-op.
    pub fn add_step(
        &mut self,
        presentation: &PresentationId,
        step: &StepId,
        index: Option<usize>,
    ) -> Result<(), SlyeSceneGraphError> {
        let len = self.presentation(presentation)?.steps.len();
        let previous = self.step(step)?.owner.clone();
        if previous.as_ref() == Some(presentation) {
            return Ok(());
        }
        if let Some(index) = index {
            if index > len {
                return Err(SlyeSceneGraphError::InvalidReparent(format!(
                    "step {step} at index {index} of presentation {presentation} with {len} steps"
                )));
            }
        }
        if let Some(previous) = previous {
            self.del_step(&previous, step)?;
        }

        let target = self
            .presentations
            .get_mut(presentation)
            .ok_or_else(|| SlyeSceneGraphError::NotFound(format!("presentation {presentation}")))?;
        match index {
            Some(index) => target.steps.insert(index, step.clone()),
            None => target.steps.push(step.clone()),
        }
        self.step_mut(step)?.owner = Some(presentation.clone());
        Ok(())
    }

    /// Detach `step` from `presentation`. No-op when it is owned elsewhere.
    pub fn del_step(
        &mut self,
        presentation: &PresentationId,
        step: &StepId,
    ) -> Result<(), SlyeSceneGraphError> {
        if self.step(step)?.owner.as_ref() != Some(presentation) {
            return Ok(());
        }
        if let Some(node) = self.presentations.get_mut(presentation) {
            node.steps.retain(|s| s != step);
        }
        self.step_mut(step)?.owner = None;
        Ok(())
    }

    pub fn step_index(&self, presentation: &PresentationId, step: &StepId) -> Option<usize> {
        self.presentations
            .get(presentation)?
            .steps
            .iter()
            .position(|s| s == step)
    }

    /// Attach `component` to `step`, with the same semantics as [`Self::add_step`].
    pub fn add_component(
        &mut self,
        step: &StepId,
        component: &ComponentId,
        index: Option<usize>,
    ) -> Result<(), SlyeSceneGraphError> {
        let len = self.step(step)?.components.len();
        let previous = self.component(component)?.owner.clone();
        if previous.as_ref() == Some(step) {
            return Ok(());
        }
        if let Some(index) = index {
            if index > len {
                return Err(SlyeSceneGraphError::InvalidReparent(format!(
                    "component {component} at index {index} of step {step} with {len} components"
                )));
            }
        }
        if let Some(previous) = previous {
            self.del_component(&previous, component)?;
        }

        let target = self.step_mut(step)?;
        match index {
            Some(index) => target.components.insert(index, component.clone()),
            None => target.components.push(component.clone()),
        }
        self.component_mut(component)?.owner = Some(step.clone());
        Ok(())
    }

    pub fn del_component(
        &mut self,
        step: &StepId,
        component: &ComponentId,
    ) -> Result<(), SlyeSceneGraphError> {
        if self.component(component)?.owner.as_ref() != Some(step) {
            return Ok(());
        }
        if let Some(node) = self.steps.get_mut(step) {
            node.components.retain(|c| c != component);
        }
        self.component_mut(component)?.owner = None;
        Ok(())
    }

    pub fn component_index(&self, step: &StepId, component: &ComponentId) -> Option<usize> {
        self.steps
            .get(step)?
            .components
            .iter()
            .position(|c| c == component)
    }

    pub fn transform(&self, target: &TransformTarget) -> Result<Transform, SlyeSceneGraphError> {
        match target {
            TransformTarget::Step(id) => Ok(self.step(id)?.transform),
            TransformTarget::Component(id) => Ok(self.component(id)?.transform),
        }
    }

    /// Overwrite one transform vector, returning its previous value.
    pub fn set_transform(
        &mut self,
        target: &TransformTarget,
        mode: TransformMode,
        value: Vec3,
    ) -> Result<Vec3, SlyeSceneGraphError> {
        let transform = match target {
            TransformTarget::Step(id) => self.step_mut(id)?.transform_mut(),
            TransformTarget::Component(id) => self.component_mut(id)?.transform_mut(),
        };
        let previous = transform.get(mode);
        transform.set(mode, value);
        Ok(previous)
    }

    /// Replace a component's props.
    ///
    /// Live graphs start a render when the component is idle and otherwise
    /// stash the props, overwriting anything stashed before.
    pub fn update_props(
        &mut self,
        component: &ComponentId,
        props: Props,
    ) -> Result<UpdateOutcome, SlyeSceneGraphError> {
        let mode = self.mode;
        let node = self.component_mut(component)?;
        if mode == RenderMode::Headless {
            node.props = props;
            return Ok(UpdateOutcome::Applied);
        }
        match &mut node.state {
            UpdateState::Rendering { pending } => {
                *pending = Some(props);
                Ok(UpdateOutcome::Stashed)
            }
            UpdateState::Idle => {
                node.props = props;
                node.state = UpdateState::Rendering { pending: None };
                let request = node.render_request();
                self.render_queue.push(request);
                Ok(UpdateOutcome::Started)
            }
        }
    }

    /// Merge `patch` over the last applied props. Stashed props are not
    /// part of the merge base.
    pub fn patch_props(
        &mut self,
        component: &ComponentId,
        patch: &Props,
    ) -> Result<UpdateOutcome, SlyeSceneGraphError> {
        let merged = merge_props(&self.component(component)?.props, patch);
        self.update_props(component, merged)
    }

    /// Record the end of a render. A failed render (`None`) clears the
    /// component's fragment. Returns the follow-up render when props were
    /// stashed in the meantime.
    pub fn finish_render(
        &mut self,
        component: &ComponentId,
        fragment: Option<SceneFragment>,
    ) -> Result<Option<RenderRequest>, SlyeSceneGraphError> {
        let node = self.component_mut(component)?;
        node.fragment = fragment;
        match std::mem::take(&mut node.state) {
            UpdateState::Rendering {
                pending: Some(props),
            } => {
                node.props = props;
                node.state = UpdateState::Rendering { pending: None };
                Ok(Some(node.render_request()))
            }
            _ => Ok(None),
        }
    }

    /// Record a render that ended without a result because its task went
    /// away. The fragment is kept. Stashed props are queued as a new render
    /// request, otherwise the component goes back to idle.
    pub fn cancel_render(&mut self, component: &ComponentId) -> Result<(), SlyeSceneGraphError> {
        let node = self.component_mut(component)?;
        if let UpdateState::Rendering {
            pending: Some(props),
        } = std::mem::take(&mut node.state)
        {
            node.props = props;
            node.state = UpdateState::Rendering { pending: None };
            let request = node.render_request();
            self.render_queue.push(request);
        }
        Ok(())
    }

    /// Drain the render requests queued since the last call.
    pub fn take_render_requests(&mut self) -> Vec<RenderRequest> {
        std::mem::take(&mut self.render_queue)
    }

    pub fn has_pending_renders(&self) -> bool {
        !self.render_queue.is_empty()
    }

    /// Ids of every component currently attached to a step of `presentation`,
    /// in presentation order.
    pub fn presentation_components(
        &self,
        presentation: &PresentationId,
    ) -> Result<Vec<ComponentId>, SlyeSceneGraphError> {
        let mut out = vec![];
        for step in &self.presentation(presentation)?.steps {
            out.extend(self.step(step)?.components.iter().cloned());
        }
        Ok(out)
    }
}
