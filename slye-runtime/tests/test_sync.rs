use slye_common::id::{ComponentId, StepId};
use slye_common::types::{TransformMode, Vec3};
use slye_runtime::actions::{ActionData, ActionValue};
use slye_runtime::error::SlyeRuntimeError;
use slye_runtime::module::Headless;
use slye_runtime::serializer::{unserialize, SerializedEntity, SerializedValue, Serializer};
use slye_runtime::session::Session;
use slye_runtime::sync::{MemoryChannel, SyncChannel, SyncCommand, SyncPeer};
use slye_runtime::update::shared_graph;
use slye_scenegraph::props;
use slye_scenegraph::scene_graph::{RenderMode, SceneGraph};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;

mod utils;
use utils::{config, fetch, open_session, registry};

fn component_data(id: &str) -> ActionData {
    let mut data = ActionData::new();
    data.insert("component".into(), ActionValue::Component(id.into()));
    data
}

fn entity(value: &SerializedValue) -> &SerializedEntity {
    match value {
        SerializedValue::Entity(entity) => entity,
        other => panic!("expected an entity, got {other:?}"),
    }
}

/// Drops the first message with an error, then delivers like its inner channel.
struct FlakyChannel {
    failed: AtomicBool,
    inner: MemoryChannel,
}

impl SyncChannel for FlakyChannel {
    fn send(&self, message: String) -> Result<(), SlyeRuntimeError> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(SlyeRuntimeError::InternalError("link down".to_string()));
        }
        self.inner.send(message)
    }
}

async fn deliver(peer: &SyncPeer, inbox: &mut UnboundedReceiver<String>) {
    let message = inbox.recv().await.unwrap();
    peer.handle_message(&message).await.unwrap();
}

#[tokio::test]
async fn test_second_serialize_is_ref_only() {
    let session = open_session(RenderMode::Headless).await;
    let mut serializer = Serializer::new();
    let graph = session.lock();

    let first = serializer.serialize(&graph, &component_data("b1")).unwrap();
    let second = serializer.serialize(&graph, &component_data("b1")).unwrap();
    assert!(matches!(
        entity(&first["component"]),
        SerializedEntity::Component { data: Some(_), .. }
    ));
    assert!(matches!(
        entity(&second["component"]),
        SerializedEntity::Component { data: None, .. }
    ));
    drop(graph);

    // A receiver that never saw the first message cannot resolve the second
    let receiver = Mutex::new(Serializer::new());
    let target = shared_graph(SceneGraph::headless());
    let result = unserialize(&receiver, &target, &second, &Headless, &Headless).await;
    assert!(matches!(result, Err(SlyeRuntimeError::DanglingReference(_))));

    // Processing both in order works
    unserialize(&receiver, &target, &first, &Headless, &Headless)
        .await
        .unwrap();
    let data = unserialize(&receiver, &target, &second, &Headless, &Headless)
        .await
        .unwrap();
    assert_eq!(data, component_data("b1"));
}

#[tokio::test]
async fn test_host_and_client_stay_in_sync() {
    let mut host = open_session(RenderMode::Headless).await;
    let ((host_channel, mut host_inbox), (client_channel, mut client_inbox)) = MemoryChannel::pair();
    let host_peer = host.host(Arc::new(host_channel)).unwrap();

    let fetch = fetch();
    let (mut client, client_peer) = Session::join(
        "p".into(),
        registry(fetch.clone()),
        fetch,
        config(RenderMode::Headless),
        Arc::new(client_channel),
    )
    .unwrap();
    assert!(!client_peer.is_open());

    // Snapshot request and response
    deliver(&host_peer, &mut host_inbox).await;
    deliver(&client_peer, &mut client_inbox).await;
    client_peer.wait_for_open().await.unwrap();
    assert_eq!(client.save().unwrap(), host.save().unwrap());

    host.update_props(&"b1".into(), props! {"text" => "Changed"}).unwrap();
    let component = host
        .new_component(&"a2".into(), "slye", "text", props! {"text" => "New"})
        .await
        .unwrap();
    deliver(&client_peer, &mut client_inbox).await;
    deliver(&client_peer, &mut client_inbox).await;
    assert_eq!(client.save().unwrap(), host.save().unwrap());

    let step = client.new_step(None).unwrap();
    client
        .transform(component.clone(), TransformMode::Scale, Vec3::new(2.0, 2.0, 2.0))
        .unwrap();
    deliver(&host_peer, &mut host_inbox).await;
    deliver(&host_peer, &mut host_inbox).await;
    assert_eq!(host.save().unwrap(), client.save().unwrap());
    assert!(host.save().unwrap().steps.contains_key(step.as_str()));

    // Undo travels as a backward action
    assert!(client.undo().unwrap());
    assert!(client.undo().unwrap());
    deliver(&host_peer, &mut host_inbox).await;
    deliver(&host_peer, &mut host_inbox).await;
    assert_eq!(host.save().unwrap(), client.save().unwrap());
    assert!(!host.save().unwrap().steps.contains_key(step.as_str()));

    assert!(host_inbox.try_recv().is_err());
    assert!(client_inbox.try_recv().is_err());
}

#[tokio::test]
async fn test_dangling_reference_closes_session() {
    let mut host = open_session(RenderMode::Headless).await;
    let ((host_channel, host_inbox), (client_channel, _client_inbox)) = MemoryChannel::pair();
    let host_peer = host.host(Arc::new(host_channel)).unwrap();

    let message = serde_json::json!({
        "command": "action",
        "forward": true,
        "action": "DELETE_COMPONENT",
        "data": {"component": {"kind": "component", "ref": "b1"}},
    });
    client_channel.send(message.to_string()).unwrap();
    client_channel.send(message.to_string()).unwrap();
    drop(client_channel);

    let result = host_peer.serve(host_inbox).await;
    assert!(matches!(result, Err(SlyeRuntimeError::DanglingReference(_))));
    // Nothing was applied
    let graph = host.lock();
    assert_eq!(
        graph.component(&ComponentId::from("b1")).unwrap().owner(),
        Some(&StepId::from("a1"))
    );
}

#[tokio::test]
async fn test_bad_messages_are_rejected() {
    let mut host = open_session(RenderMode::Headless).await;
    let ((host_channel, _host_inbox), _client) = MemoryChannel::pair();
    let host_peer = host.host(Arc::new(host_channel)).unwrap();
    let request = SyncCommand::Sly { pd: "other".into() }.to_json().unwrap();
    assert!(matches!(
        host_peer.handle_message(&request).await,
        Err(SlyeRuntimeError::NotFound(_))
    ));
    assert!(matches!(
        host_peer.handle_message(r#"{"command": "dance"}"#).await,
        Err(SlyeRuntimeError::JsonError(_))
    ));
}

#[tokio::test]
async fn test_second_listener_is_rejected() {
    let mut host = open_session(RenderMode::Headless).await;
    let ((first, _a), (second, _b)) = MemoryChannel::pair();
    host.host(Arc::new(first)).unwrap();
    assert!(matches!(
        host.host(Arc::new(second)),
        Err(SlyeRuntimeError::ListenerAlreadyBound(_))
    ));
}

#[tokio::test]
async fn test_failed_send_resends_full_payload() {
    let mut host = open_session(RenderMode::Headless).await;
    let ((channel, _host_inbox), (_client_channel, mut client_inbox)) = MemoryChannel::pair();
    let flaky = FlakyChannel {
        failed: AtomicBool::new(false),
        inner: channel,
    };
    host.host(Arc::new(flaky)).unwrap();

    let lost = host.update_props(&"b1".into(), props! {"text" => "Lost"});
    assert!(matches!(lost, Err(SlyeRuntimeError::InternalError(_))));
    assert!(client_inbox.try_recv().is_err());

    host.update_props(&"b1".into(), props! {"text" => "Kept"}).unwrap();
    let message = client_inbox.try_recv().unwrap();
    let SyncCommand::Action(action) = SyncCommand::from_json(&message).unwrap() else {
        panic!("expected an action, got {message}");
    };
    assert!(matches!(
        entity(&action.data["component"]),
        SerializedEntity::Component { data: Some(_), .. }
    ));

    // A receiver that never saw the lost message can apply it
    let receiver = Mutex::new(Serializer::new());
    let target = shared_graph(SceneGraph::headless());
    unserialize(&receiver, &target, &action.data, &Headless, &Headless)
        .await
        .unwrap();
}
