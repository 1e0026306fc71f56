use crate::actions::{run_backward, run_forward, ActionData, ActionKind};
use crate::error::SlyeRuntimeError;
use slye_scenegraph::scene_graph::SceneGraph;
use std::fmt;
use std::sync::Arc;

/// Observer of every action performed through an [`ActionStack`], including
/// undo (`forward == false`) and redo.
pub trait ActionListener: Send + Sync {
    fn on_action(
        &self,
        graph: &SceneGraph,
        forward: bool,
        kind: ActionKind,
        data: &ActionData,
    ) -> Result<(), SlyeRuntimeError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TakenAction {
    pub kind: ActionKind,
    pub forward: ActionData,
    pub backward: ActionData,
}

/// Linear undo history. Executing a new action drops everything that was
/// undone and not redone.
pub struct ActionStack {
    actions: Vec<TakenAction>,
    done: usize,
    limit: Option<usize>,
    listener: Option<Arc<dyn ActionListener>>,
}

impl fmt::Debug for ActionStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionStack")
            .field("actions", &self.actions.len())
            .field("done", &self.done)
            .field("limit", &self.limit)
            .field("bound", &self.listener.is_some())
            .finish()
    }
}

impl Default for ActionStack {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ActionStack {
    /// `limit` caps the number of remembered actions; the oldest are
    /// forgotten first.
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            actions: vec![],
            done: 0,
            limit,
            listener: None,
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Index of the last applied action.
    pub fn cursor(&self) -> Option<usize> {
        self.done.checked_sub(1)
    }

    pub fn can_undo(&self) -> bool {
        self.done > 0
    }

    pub fn can_redo(&self) -> bool {
        self.done < self.actions.len()
    }

    pub fn history(&self) -> &[TakenAction] {
        &self.actions
    }

    /// Attach the listener that observes every action. Binding the same
    /// listener again is allowed; binding a different one is not.
    pub fn bind(&mut self, listener: Arc<dyn ActionListener>) -> Result<(), SlyeRuntimeError> {
        match &self.listener {
            Some(bound) if std::ptr::addr_eq(Arc::as_ptr(bound), Arc::as_ptr(&listener)) => Ok(()),
            Some(_) => Err(SlyeRuntimeError::ListenerAlreadyBound(
                "action stack already has a listener".to_string(),
            )),
            None => {
                self.listener = Some(listener);
                Ok(())
            }
        }
    }

    pub fn execute(
        &mut self,
        graph: &mut SceneGraph,
        kind: ActionKind,
        data: ActionData,
    ) -> Result<(), SlyeRuntimeError> {
        let backward = run_forward(graph, kind, &data)?;
        log::debug!("Executed {kind}");
        let notified = self.notify(graph, true, kind, &data);

        self.actions.truncate(self.done);
        self.actions.push(TakenAction {
            kind,
            forward: data,
            backward,
        });
        if let Some(limit) = self.limit {
            if self.actions.len() > limit {
                let excess = self.actions.len() - limit;
                self.actions.drain(..excess);
            }
        }
        self.done = self.actions.len();
        notified
    }

    /// Reverse the last applied action. Returns `false` at the start of
    /// history.
    pub fn undo(&mut self, graph: &mut SceneGraph) -> Result<bool, SlyeRuntimeError> {
        let Some(cursor) = self.cursor() else {
            return Ok(false);
        };
        let taken = &self.actions[cursor];
        run_backward(graph, taken.kind, &taken.backward)?;
        log::debug!("Undid {}", taken.kind);
        self.done = cursor;
        let taken = &self.actions[cursor];
        self.notify(graph, false, taken.kind, &taken.backward)?;
        Ok(true)
    }

    /// Re-apply the next undone action. Returns `false` at the end of
    /// history.
    pub fn redo(&mut self, graph: &mut SceneGraph) -> Result<bool, SlyeRuntimeError> {
        if !self.can_redo() {
            return Ok(false);
        }
        let index = self.done;
        let taken = &self.actions[index];
        let backward = run_forward(graph, taken.kind, &taken.forward)?;
        log::debug!("Redid {}", taken.kind);
        self.actions[index].backward = backward;
        self.done = index + 1;
        let taken = &self.actions[index];
        self.notify(graph, true, taken.kind, &taken.forward)?;
        Ok(true)
    }

    fn notify(
        &self,
        graph: &SceneGraph,
        forward: bool,
        kind: ActionKind,
        data: &ActionData,
    ) -> Result<(), SlyeRuntimeError> {
        match &self.listener {
            Some(listener) => listener.on_action(graph, forward, kind, data),
            None => Ok(()),
        }
    }
}
