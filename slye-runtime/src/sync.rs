//! Mirrors actions between two sessions of the same presentation.
//!
//! The client asks the host for a snapshot (`sly`), decodes the response and
//! from then on both sides forward every executed, undone or redone action.
use crate::action_stack::ActionListener;
use crate::actions::{run_backward, run_forward, ActionData, ActionKind, ActionValue};
use crate::decode::resolve_document;
use crate::error::SlyeRuntimeError;
use crate::module::{ComponentProvider, FontProvider};
use crate::serializer::{unserialize, SerializedAction, Serializer};
use crate::update::{lock_graph, SharedGraph, UpdateEngine};
use serde::{Deserialize, Serialize};
use slye_common::id::{IdGenerator, PresentationId};
use slye_scenegraph::document::Document;
use slye_scenegraph::encode::encode;
use slye_scenegraph::scene_graph::SceneGraph;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;

/// Ordered, text based transport to the other peer.
pub trait SyncChannel: Send + Sync {
    fn send(&self, message: String) -> Result<(), SlyeRuntimeError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SyncCommand {
    Sly { pd: PresentationId },
    SlyResponse { sly: Document },
    Action(SerializedAction),
}

impl SyncCommand {
    pub fn from_json(json: &str) -> Result<Self, SlyeRuntimeError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, SlyeRuntimeError> {
        Ok(serde_json::to_string(self)?)
    }
}

pub struct SyncPeer {
    presentation: PresentationId,
    graph: SharedGraph,
    serializer: Mutex<Serializer>,
    channel: Arc<dyn SyncChannel>,
    components: Arc<dyn ComponentProvider>,
    fonts: Arc<dyn FontProvider>,
    ids: Arc<Mutex<IdGenerator>>,
    engine: Option<UpdateEngine>,
    is_server: bool,
    opened: watch::Sender<bool>,
}

impl fmt::Debug for SyncPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncPeer")
            .field("presentation", &self.presentation)
            .field("is_server", &self.is_server)
            .field("opened", &*self.opened.borrow())
            .finish_non_exhaustive()
    }
}

/// Shared pieces of the session a peer mirrors into.
#[derive(Clone)]
pub struct SyncTarget {
    pub presentation: PresentationId,
    pub graph: SharedGraph,
    pub components: Arc<dyn ComponentProvider>,
    pub fonts: Arc<dyn FontProvider>,
    pub ids: Arc<Mutex<IdGenerator>>,
    pub engine: Option<UpdateEngine>,
}

impl SyncPeer {
    fn new(target: SyncTarget, channel: Arc<dyn SyncChannel>, is_server: bool) -> Self {
        let (opened, _) = watch::channel(is_server);
        Self {
            presentation: target.presentation,
            graph: target.graph,
            serializer: Default::default(),
            channel,
            components: target.components,
            fonts: target.fonts,
            ids: target.ids,
            engine: target.engine,
            is_server,
            opened,
        }
    }

    /// Peer owning the presentation. It answers snapshot requests.
    pub fn host(target: SyncTarget, channel: Arc<dyn SyncChannel>) -> Self {
        Self::new(target, channel, true)
    }

    /// Peer joining a presentation owned by the other side. Requests a
    /// snapshot right away.
    pub fn client(
        target: SyncTarget,
        channel: Arc<dyn SyncChannel>,
    ) -> Result<Self, SlyeRuntimeError> {
        let peer = Self::new(target, channel, false);
        peer.send(&SyncCommand::Sly {
            pd: peer.presentation.clone(),
        })?;
        Ok(peer)
    }

    pub fn presentation(&self) -> &PresentationId {
        &self.presentation
    }

    pub fn is_server(&self) -> bool {
        self.is_server
    }

    pub fn is_open(&self) -> bool {
        *self.opened.borrow()
    }

    /// Resolves once the presentation is available locally.
    pub async fn wait_for_open(&self) -> Result<(), SlyeRuntimeError> {
        let mut opened = self.opened.subscribe();
        opened
            .wait_for(|open| *open)
            .await
            .map_err(|err| SlyeRuntimeError::InternalError(err.to_string()))?;
        Ok(())
    }

    fn send(&self, command: &SyncCommand) -> Result<(), SlyeRuntimeError> {
        self.channel.send(command.to_json()?)
    }

    /// Process incoming messages in order until the inbox closes. A dangling
    /// reference ends the session.
    pub async fn serve(&self, mut inbox: UnboundedReceiver<String>) -> Result<(), SlyeRuntimeError> {
        while let Some(message) = inbox.recv().await {
            match self.handle_message(&message).await {
                Ok(()) => {}
                Err(err @ SlyeRuntimeError::DanglingReference(_)) => {
                    log::error!("Closing sync of presentation {}: {err}", self.presentation);
                    return Err(err);
                }
                Err(err) => log::error!("Sync message rejected: {err}"),
            }
        }
        Ok(())
    }

    pub async fn handle_message(&self, message: &str) -> Result<(), SlyeRuntimeError> {
        match SyncCommand::from_json(message)? {
            SyncCommand::Sly { pd } => self.answer_snapshot(&pd),
            SyncCommand::SlyResponse { sly } => self.open_snapshot(&sly).await,
            SyncCommand::Action(action) => self.apply_action(&action).await,
        }
    }

    fn answer_snapshot(&self, presentation: &PresentationId) -> Result<(), SlyeRuntimeError> {
        if !self.is_server {
            log::warn!("Ignoring snapshot request for {presentation} on a client");
            return Ok(());
        }
        if presentation != &self.presentation {
            return Err(SlyeRuntimeError::NotFound(format!("presentation {presentation}")));
        }
        let document = {
            let graph = lock_graph(&self.graph);
            let document = encode(&graph, presentation)?;
            self.serializer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .register_presentation(&graph, presentation)?;
            document
        };
        log::info!(
            "Sending snapshot of {presentation}: {} steps",
            document.steps.len()
        );
        self.send(&SyncCommand::SlyResponse { sly: document })
    }

    async fn open_snapshot(&self, document: &Document) -> Result<(), SlyeRuntimeError> {
        if self.is_open() {
            log::warn!("Ignoring repeated snapshot of {}", self.presentation);
            return Ok(());
        }
        let resolved =
            resolve_document(document, self.components.as_ref(), self.fonts.as_ref()).await?;
        {
            let mut graph = lock_graph(&self.graph);
            let mut serializer = self.serializer.lock().unwrap_or_else(PoisonError::into_inner);
            let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
            resolved.apply(&mut graph, &self.presentation, &mut ids)?;
            serializer.register_presentation(&graph, &self.presentation)?;
        }
        self.schedule();
        log::info!(
            "Opened presentation {}: {} steps",
            self.presentation,
            document.steps.len()
        );
        self.opened.send_replace(true);
        Ok(())
    }

    async fn apply_action(&self, action: &SerializedAction) -> Result<(), SlyeRuntimeError> {
        let data = unserialize(
            &self.serializer,
            &self.graph,
            &action.data,
            self.components.as_ref(),
            self.fonts.as_ref(),
        )
        .await?;
        {
            let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
            reserve_ids(&mut ids, &data);
        }
        let result = {
            let mut graph = lock_graph(&self.graph);
            if action.forward {
                run_forward(&mut graph, action.action, &data).map(|_| ())
            } else {
                run_backward(&mut graph, action.action, &data)
            }
        };
        self.schedule();
        log::debug!(
            "Applied remote {} ({})",
            action.action,
            if action.forward { "forward" } else { "backward" }
        );
        result
    }

    fn schedule(&self) {
        if let Some(engine) = &self.engine {
            engine.schedule();
        }
    }
}

fn reserve_ids(ids: &mut IdGenerator, data: &ActionData) {
    for value in data.values() {
        reserve_value(ids, value);
    }
}

fn reserve_value(ids: &mut IdGenerator, value: &ActionValue) {
    match value {
        ActionValue::Component(id) => {
            ids.reserve(id.as_str());
        }
        ActionValue::Step(id) => {
            ids.reserve(id.as_str());
        }
        ActionValue::List(values) => values.iter().for_each(|v| reserve_value(ids, v)),
        ActionValue::Map(data) => reserve_ids(ids, data),
        _ => {}
    }
}

impl ActionListener for SyncPeer {
    fn on_action(
        &self,
        graph: &SceneGraph,
        forward: bool,
        kind: ActionKind,
        data: &ActionData,
    ) -> Result<(), SlyeRuntimeError> {
        self.serializer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send_action(graph, forward, kind, data, |action| {
                self.send(&SyncCommand::Action(action))
            })
    }
}

/// In-process transport delivering messages to the paired inbox.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    outbox: UnboundedSender<String>,
}

impl MemoryChannel {
    /// Two connected ends. Messages sent on the first channel arrive in the
    /// second inbox and the other way around.
    pub fn pair() -> (
        (MemoryChannel, UnboundedReceiver<String>),
        (MemoryChannel, UnboundedReceiver<String>),
    ) {
        let (a_tx, a_rx) = unbounded_channel();
        let (b_tx, b_rx) = unbounded_channel();
        (
            (MemoryChannel { outbox: b_tx }, a_rx),
            (MemoryChannel { outbox: a_tx }, b_rx),
        )
    }
}

impl SyncChannel for MemoryChannel {
    fn send(&self, message: String) -> Result<(), SlyeRuntimeError> {
        self.outbox
            .send(message)
            .map_err(|_| SlyeRuntimeError::InternalError("sync channel closed".to_string()))
    }
}
