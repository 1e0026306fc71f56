use slye_runtime::asset::AssetStore;
use slye_runtime::cache::CacheConfig;
use slye_runtime::session::Session;
use slye_scenegraph::props;
use slye_scenegraph::props::PropValue;
use slye_scenegraph::scene_graph::{RenderMode, UpdateOutcome, UpdateState};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

mod utils;
use utils::{config, fetch, gated_module, open_session, registry, CountingFetch, GatedKind};

fn gated_session(kind: Arc<GatedKind>) -> Session {
    let fetch = fetch();
    let modules = registry(fetch.clone());
    modules.register(gated_module(kind));
    Session::new("p".into(), modules, fetch, config(RenderMode::Live)).unwrap()
}

#[tokio::test]
async fn test_patches_during_render_are_coalesced() {
    let kind = Arc::new(GatedKind::new());
    let mut session = gated_session(kind.clone());
    let step = session.new_step(None).unwrap();
    let component = session
        .new_component(&step, "test", "gated", props! {"a" => 0})
        .await
        .unwrap();

    // The first render is still blocked on the gate
    session.update_props(&component, props! {"a" => 1}).unwrap();
    session.update_props(&component, props! {"a" => 2}).unwrap();
    assert!(session.lock().component(&component).unwrap().is_rendering());

    kind.release(10);
    session.settle().await.unwrap();

    let renders = kind.renders();
    assert_eq!(renders, vec![props! {"a" => 0}, props! {"a" => 2}]);
    assert_eq!(kind.max_active.load(Ordering::SeqCst), 1);
    let graph = session.lock();
    let node = graph.component(&component).unwrap();
    assert_eq!(node.state(), &UpdateState::Idle);
    assert_eq!(node.props()["a"], PropValue::Number(2.0));
}

#[tokio::test]
async fn test_failed_render_clears_fragment_and_continues() {
    let kind = Arc::new(GatedKind::new());
    let mut session = gated_session(kind.clone());
    let step = session.new_step(None).unwrap();
    let component = session
        .new_component(&step, "test", "gated", props! {})
        .await
        .unwrap();
    kind.release(10);
    session.settle().await.unwrap();
    assert!(session.lock().component(&component).unwrap().fragment().is_some());

    session.update_props(&component, props! {"fail" => true}).unwrap();
    session.settle().await.unwrap();
    assert!(session.lock().component(&component).unwrap().fragment().is_none());

    // Undo removes the failing prop and renders again
    assert!(session.undo().unwrap());
    session.settle().await.unwrap();
    let graph = session.lock();
    let node = graph.component(&component).unwrap();
    assert!(node.fragment().is_some());
    assert!(!node.props().contains_key("fail"));
    assert_eq!(kind.renders().len(), 3);
}

#[tokio::test]
async fn test_abandoned_settle_keeps_renders_running() {
    let kind = Arc::new(GatedKind::new());
    let mut session = gated_session(kind.clone());
    let step = session.new_step(None).unwrap();
    let component = session
        .new_component(&step, "test", "gated", props! {"a" => 0})
        .await
        .unwrap();

    let waited = tokio::time::timeout(Duration::from_millis(20), session.settle()).await;
    assert!(waited.is_err());
    assert_eq!(session.engine().in_flight(), 1);

    kind.release(10);
    session.settle().await.unwrap();
    assert_eq!(session.lock().component(&component).unwrap().state(), &UpdateState::Idle);

    let outcome = session
        .engine()
        .patch_props(&component, &props! {"a" => 5})
        .unwrap();
    assert_eq!(outcome, UpdateOutcome::Started);
    session.settle().await.unwrap();
    assert_eq!(kind.renders(), vec![props! {"a" => 0}, props! {"a" => 5}]);
    let graph = session.lock();
    let node = graph.component(&component).unwrap();
    assert_eq!(node.state(), &UpdateState::Idle);
    assert_eq!(node.props()["a"], PropValue::Number(5.0));
}

#[test]
fn test_render_dropped_with_runtime_requeues_stash() {
    let kind = Arc::new(GatedKind::new());
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let gated = kind.clone();
    let (mut session, component) = runtime.block_on(async move {
        let mut session = gated_session(gated);
        let step = session.new_step(None).unwrap();
        let component = session
            .new_component(&step, "test", "gated", props! {"a" => 0})
            .await
            .unwrap();
        tokio::task::yield_now().await;
        (session, component)
    });
    session.update_props(&component, props! {"a" => 1}).unwrap();
    assert!(session.lock().component(&component).unwrap().is_rendering());

    // Shutting the runtime down drops the blocked render task
    drop(runtime);
    assert_eq!(session.engine().in_flight(), 0);
    assert!(session.lock().has_pending_renders());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        kind.release(10);
        session.settle().await.unwrap();
    });
    assert_eq!(kind.renders().last(), Some(&props! {"a" => 1}));
    let graph = session.lock();
    let node = graph.component(&component).unwrap();
    assert_eq!(node.state(), &UpdateState::Idle);
    assert!(node.fragment().is_some());
}

#[tokio::test]
async fn test_finished_renders_are_not_retained() {
    let session = open_session(RenderMode::Live).await;
    session.settle().await.unwrap();
    let engine = session.engine();
    for size in 0..200 {
        let outcome = engine.patch_props(&"b1".into(), &props! {"size" => size}).unwrap();
        assert_eq!(outcome, UpdateOutcome::Started);
        assert_eq!(engine.in_flight(), 1);
        while engine.in_flight() > 0 {
            tokio::task::yield_now().await;
        }
    }
    assert_eq!(engine.in_flight(), 0);
    assert!(!session.lock().has_pending_renders());
    assert_eq!(
        session.lock().component(&"b1".into()).unwrap().props()["size"],
        PropValue::Number(199.0)
    );
}

#[tokio::test]
async fn test_builtin_components_render() {
    let session = open_session(RenderMode::Live).await;
    session.settle().await.unwrap();
    let graph = session.lock();
    for uuid in ["b1", "b2"] {
        let node = graph.component(&uuid.into()).unwrap();
        assert_eq!(node.state(), &UpdateState::Idle);
        assert_eq!(node.fragment().map(|f| f.len()), Some(1), "{uuid}");
    }
}

#[tokio::test]
async fn test_concurrent_asset_reads_fetch_once() {
    let fetch = Arc::new(CountingFetch::default());
    let store = AssetStore::new("p", fetch.clone(), CacheConfig::default());
    let id = store.load("cat.png");
    let (a, b) = tokio::join!(store.get_data(id), store.get_data(id));
    assert_eq!(a.unwrap().as_slice(), b"cat.png");
    assert!(Arc::ptr_eq(&b.unwrap(), &store.get_data(id).await.unwrap()));
    assert_eq!(fetch.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_module_assets_are_owned_by_module() {
    let fetch = Arc::new(CountingFetch::default());
    let modules = registry(fetch.clone());
    let slye = modules.module("slye").await.unwrap();
    assert_eq!(slye.assets().owner(), "slye");
    let data = slye.assets().load_data("homa.ttf").await.unwrap();
    assert_eq!(data.as_slice(), b"homa.ttf");
}
