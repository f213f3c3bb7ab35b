//! Integration tests for `KubeDependencyWatcher` against an in-memory API server
//!
//! The API server answers discovery and list requests from fixed data and
//! leaves every watch request hanging, so the only events a watcher sees are
//! the ones produced by its initial lists.

mod common;

use async_trait::async_trait;
use common::{addon, db_secret, ihc, Call, FakeClient, NAMESPACE};
use governance_policy_addon_controller::client::DynamicClient;
use governance_policy_addon_controller::constants::{
    COMPLIANCE_ROUTE_NAME, FINALIZER_ADDON_NAMES, POLICY_FINALIZER,
};
use governance_policy_addon_controller::controllers::complianceapi::{
    db_secret_id, desired_route, route_id,
};
use governance_policy_addon_controller::controllers::{
    ComplianceDbSecretReconciler, ComponentFinalizerReconciler,
};
use governance_policy_addon_controller::depwatch::{
    CacheLookup, DependencyWatcher, KubeDependencyWatcher, ObjectIdentifier, Reconcile,
    WatcherOptions,
};
use governance_policy_addon_controller::error::{ApiError, ReconcileError, WatchError};
use http::{Request, Response, StatusCode};
use kube::api::DynamicObject;
use kube::client::Body;
use kube::{Client, ResourceExt};
use kube_runtime::controller::Action;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

const WAIT: Duration = Duration::from_secs(10);

/// Canned API server: discovery documents and list results keyed by path
#[derive(Clone, Default)]
struct FakeApi {
    discovery: Arc<Mutex<HashMap<String, Value>>>,
    lists: Arc<Mutex<HashMap<String, (Duration, Vec<DynamicObject>)>>>,
}

impl FakeApi {
    /// Advertise `kind` (served as `plural`) under `api_version`
    fn serve_kind(&self, api_version: &str, plural: &str, kind: &str, namespaced: bool) {
        let path = if api_version.contains('/') {
            format!("/apis/{api_version}")
        } else {
            format!("/api/{api_version}")
        };
        let mut discovery = self.discovery.lock().unwrap();
        let list = discovery.entry(path).or_insert_with(|| {
            json!({
                "kind": "APIResourceList",
                "apiVersion": "v1",
                "groupVersion": api_version,
                "resources": []
            })
        });
        list["resources"].as_array_mut().unwrap().push(json!({
            "name": plural,
            "singularName": "",
            "namespaced": namespaced,
            "kind": kind,
            "verbs": ["get", "list", "watch", "create", "update", "delete"]
        }));
    }

    /// Advertise a group version that has no resources
    fn serve_empty_group(&self, api_version: &str) {
        self.discovery.lock().unwrap().insert(
            format!("/apis/{api_version}"),
            json!({
                "kind": "APIResourceList",
                "apiVersion": "v1",
                "groupVersion": api_version,
                "resources": []
            }),
        );
    }

    /// Answer lists of `path` with `items` after `delay`
    fn serve_list(&self, path: &str, delay: Duration, items: Vec<DynamicObject>) {
        self.lists
            .lock()
            .unwrap()
            .insert(path.to_string(), (delay, items));
    }

    fn client(&self) -> Client {
        let api = self.clone();
        let service = tower::service_fn(move |req: Request<Body>| {
            let api = api.clone();
            async move { Ok::<_, Infallible>(api.handle(req).await) }
        });
        Client::new(service, "default")
    }

    async fn handle(&self, req: Request<Body>) -> Response<Body> {
        let path = req.uri().path().to_string();
        let query = req.uri().query().unwrap_or_default().to_string();

        if query.contains("watch=true") {
            return futures::future::pending().await;
        }

        let discovered = self.discovery.lock().unwrap().get(&path).cloned();
        if let Some(list) = discovered {
            return respond(StatusCode::OK, &list);
        }

        let listed = self.lists.lock().unwrap().get(&path).cloned();
        let Some((delay, items)) = listed else {
            return respond(
                StatusCode::NOT_FOUND,
                &json!({
                    "kind": "Status",
                    "apiVersion": "v1",
                    "metadata": {},
                    "status": "Failure",
                    "message": format!("the server could not find the requested resource ({path})"),
                    "reason": "NotFound",
                    "code": 404
                }),
            );
        };

        tokio::time::sleep(delay).await;
        let items: Vec<DynamicObject> = match field_selected_name(&query) {
            Some(name) => items.into_iter().filter(|o| o.name_any() == name).collect(),
            None => items,
        };
        respond(
            StatusCode::OK,
            &json!({
                "apiVersion": "v1",
                "kind": "List",
                "metadata": { "resourceVersion": "1" },
                "items": items
            }),
        )
    }
}

/// Name from a `metadata.name=<name>` field selector in `query`
fn field_selected_name(query: &str) -> Option<String> {
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("fieldSelector="))
        .map(|selector| selector.replace("%3D", "="))
        .and_then(|selector| selector.strip_prefix("metadata.name=").map(str::to_string))
}

fn respond(status: StatusCode, body: &Value) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

/// API server with the Secret and Route APIs and the compliance objects listed
fn compliance_api(secret_delay: Duration) -> FakeApi {
    let api = FakeApi::default();
    api.serve_kind("v1", "secrets", "Secret", true);
    api.serve_kind("route.openshift.io/v1", "routes", "Route", true);
    api.serve_list(
        &format!("/api/v1/namespaces/{NAMESPACE}/secrets"),
        secret_delay,
        vec![db_secret(NAMESPACE)],
    );
    api.serve_list(
        &format!("/apis/route.openshift.io/v1/namespaces/{NAMESPACE}/routes"),
        Duration::ZERO,
        vec![desired_route(NAMESPACE)],
    );
    api
}

fn options() -> WatcherOptions {
    WatcherOptions {
        retry_min_secs: 1,
        retry_max_secs: 60,
        restart_delay: Duration::from_millis(100),
    }
}

/// Forwards to another reconciler and reports every call
struct Recorder {
    inner: Arc<dyn Reconcile>,
    calls: mpsc::UnboundedSender<(ObjectIdentifier, bool)>,
}

#[async_trait]
impl Reconcile for Recorder {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn reconcile(&self, watcher: &ObjectIdentifier) -> Result<Action, ReconcileError> {
        let result = self.inner.reconcile(watcher).await;
        self.calls.send((watcher.clone(), result.is_ok())).unwrap();
        result
    }
}

/// Fails or succeeds in a fixed order, recording when each call happened
struct Scripted {
    outcomes: Mutex<Vec<bool>>,
    calls: mpsc::UnboundedSender<Instant>,
}

#[async_trait]
impl Reconcile for Scripted {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn reconcile(&self, _watcher: &ObjectIdentifier) -> Result<Action, ReconcileError> {
        self.calls.send(Instant::now()).unwrap();
        let succeed = {
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.is_empty() {
                true
            } else {
                outcomes.remove(0)
            }
        };
        if succeed {
            Ok(Action::await_change())
        } else {
            Err(ApiError::Conflict("injected".to_string()).into())
        }
    }
}

async fn next_call(calls: &mut mpsc::UnboundedReceiver<Instant>) -> Instant {
    timeout(WAIT * 10, calls.recv()).await.unwrap().unwrap()
}

/// Run `watcher` with `reconciler` until the returned sender fires
async fn start(
    watcher: &Arc<KubeDependencyWatcher>,
    reconciler: Arc<dyn Reconcile>,
) -> (oneshot::Sender<()>, JoinHandle<Result<(), WatchError>>) {
    let (stop, stopped) = oneshot::channel::<()>();
    let running = Arc::clone(watcher);
    let task = tokio::spawn(async move {
        running
            .run(reconciler, async move {
                stopped.await.unwrap_or_default();
            })
            .await
    });
    watcher.started().await;
    (stop, task)
}

#[tokio::test]
async fn test_compliance_reconcile_waits_for_secret_list() {
    let api = compliance_api(Duration::from_millis(300));
    let watcher = Arc::new(KubeDependencyWatcher::new("complianceapi", api.client(), options()));
    let client = Arc::new(FakeClient::default());
    client.insert("Route", NAMESPACE, COMPLIANCE_ROUTE_NAME);
    let reconciler = Arc::new(ComplianceDbSecretReconciler::new(
        Arc::clone(&watcher) as Arc<dyn DependencyWatcher>,
        Arc::clone(&client) as Arc<dyn DynamicClient>,
    ));

    let (calls_tx, mut calls) = mpsc::unbounded_channel();
    let recorder = Arc::new(Recorder {
        inner: Arc::clone(&reconciler) as Arc<dyn Reconcile>,
        calls: calls_tx,
    });
    let (stop, task) = start(&watcher, recorder).await;
    reconciler.watch_resources(NAMESPACE).await.unwrap();

    let (key, ok) = timeout(WAIT, calls.recv()).await.unwrap().unwrap();
    assert_eq!(key, db_secret_id(NAMESPACE));
    assert!(ok);

    // The Secret was visible on the first call, so the Route was kept
    let calls = client.calls();
    assert!(
        !calls.iter().any(|c| matches!(c, Call::Delete { .. })),
        "unexpected delete: {calls:?}"
    );
    assert!(client.exists("Route", NAMESPACE, COMPLIANCE_ROUTE_NAME));

    stop.send(()).unwrap();
    timeout(WAIT, task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_finalizer_reconcile_waits_for_addon_lists() {
    let api = FakeApi::default();
    api.serve_kind(
        "operator.open-cluster-management.io/v1",
        "internalhubcomponents",
        "InternalHubComponent",
        true,
    );
    api.serve_kind(
        "addon.open-cluster-management.io/v1alpha1",
        "managedclusteraddons",
        "ManagedClusterAddOn",
        true,
    );
    api.serve_list(
        &format!("/apis/operator.open-cluster-management.io/v1/namespaces/{NAMESPACE}/internalhubcomponents"),
        Duration::ZERO,
        vec![ihc(NAMESPACE, &[POLICY_FINALIZER])],
    );
    api.serve_list(
        "/apis/addon.open-cluster-management.io/v1alpha1/managedclusteraddons",
        Duration::from_millis(300),
        vec![addon("cluster1", "config-policy-controller")],
    );

    let watcher = Arc::new(KubeDependencyWatcher::new("componentfinalizer", api.client(), options()));
    let client = Arc::new(FakeClient::default());
    let reconciler = Arc::new(ComponentFinalizerReconciler::new(
        Arc::clone(&watcher) as Arc<dyn DependencyWatcher>,
        Arc::clone(&client) as Arc<dyn DynamicClient>,
        FINALIZER_ADDON_NAMES.iter().map(|n| (*n).to_string()).collect(),
        NAMESPACE,
    ));

    let (calls_tx, mut calls) = mpsc::unbounded_channel();
    let recorder = Arc::new(Recorder {
        inner: Arc::clone(&reconciler) as Arc<dyn Reconcile>,
        calls: calls_tx,
    });
    let (stop, task) = start(&watcher, recorder).await;
    reconciler.watch_resources().await.unwrap();

    let (key, ok) = timeout(WAIT, calls.recv()).await.unwrap().unwrap();
    assert_eq!(key, reconciler.target());
    assert!(ok);

    // The add-on was listed before the first call, so the finalizer stays
    assert!(client.updates().is_empty(), "unexpected updates: {:?}", client.updates());

    stop.send(()).unwrap();
    timeout(WAIT, task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_missing_route_api_is_reported() {
    let api = FakeApi::default();
    api.serve_kind("v1", "secrets", "Secret", true);
    let watcher = Arc::new(KubeDependencyWatcher::new("complianceapi", api.client(), options()));
    let reconciler = ComplianceDbSecretReconciler::new(
        Arc::clone(&watcher) as Arc<dyn DependencyWatcher>,
        Arc::new(FakeClient::default()) as Arc<dyn DynamicClient>,
    );

    let err = reconciler.watch_resources(NAMESPACE).await.unwrap_err();
    assert!(err.is_no_versioned_resource(), "unexpected error: {err}");

    // Nothing was registered
    assert!(matches!(
        watcher.list_watched_from_cache(&db_secret_id(NAMESPACE)),
        Err(WatchError::UnknownWatcher(_))
    ));
}

#[tokio::test]
async fn test_group_without_kind_is_reported() {
    let api = FakeApi::default();
    api.serve_kind("v1", "secrets", "Secret", true);
    api.serve_empty_group("route.openshift.io/v1");
    let watcher = KubeDependencyWatcher::new("complianceapi", api.client(), options());

    let err = watcher
        .add_watcher(db_secret_id(NAMESPACE), vec![route_id(NAMESPACE)])
        .await
        .unwrap_err();
    assert!(err.is_no_versioned_resource(), "unexpected error: {err}");
}

#[tokio::test(start_paused = true)]
async fn test_failed_reconcile_is_retried_with_backoff() {
    let api = compliance_api(Duration::ZERO);
    let watcher = Arc::new(KubeDependencyWatcher::new("complianceapi", api.client(), options()));
    let (calls_tx, mut calls) = mpsc::unbounded_channel();
    let scripted = Arc::new(Scripted {
        outcomes: Mutex::new(vec![false, false, true, false, true]),
        calls: calls_tx,
    });
    let (stop, task) = start(&watcher, scripted).await;

    watcher
        .add_watcher(db_secret_id(NAMESPACE), vec![])
        .await
        .unwrap();

    let first = next_call(&mut calls).await;
    let second = next_call(&mut calls).await;
    let third = next_call(&mut calls).await;
    assert!(second - first >= Duration::from_secs(1));
    assert!(third - second >= Duration::from_secs(1));
    assert!(third - second < Duration::from_secs(2));

    // A success restarts the delay sequence at the minimum
    watcher
        .add_or_update_watcher(db_secret_id(NAMESPACE), vec![])
        .await
        .unwrap();
    let fourth = next_call(&mut calls).await;
    let fifth = next_call(&mut calls).await;
    assert!(fifth - fourth >= Duration::from_secs(1));
    assert!(fifth - fourth < Duration::from_secs(2));

    stop.send(()).unwrap();
    timeout(WAIT, task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_second_run_is_rejected() {
    let api = FakeApi::default();
    let watcher = Arc::new(KubeDependencyWatcher::new("complianceapi", api.client(), options()));
    let (calls_tx, _calls) = mpsc::unbounded_channel();
    let scripted: Arc<dyn Reconcile> = Arc::new(Scripted {
        outcomes: Mutex::new(Vec::new()),
        calls: calls_tx,
    });
    let (stop, task) = start(&watcher, Arc::clone(&scripted)).await;
    assert!(watcher.is_started());

    let err = watcher
        .run(scripted, std::future::ready(()))
        .await
        .unwrap_err();
    assert!(matches!(err, WatchError::AlreadyStarted(_)));

    stop.send(()).unwrap();
    timeout(WAIT, task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_update_stops_watching_dropped_dependencies() {
    let api = compliance_api(Duration::ZERO);
    let watcher = Arc::new(KubeDependencyWatcher::new("complianceapi", api.client(), options()));
    let (calls_tx, mut calls) = mpsc::unbounded_channel();
    let scripted = Arc::new(Scripted {
        outcomes: Mutex::new(Vec::new()),
        calls: calls_tx,
    });
    let (stop, task) = start(&watcher, scripted).await;

    watcher
        .add_or_update_watcher(db_secret_id(NAMESPACE), vec![route_id(NAMESPACE)])
        .await
        .unwrap();
    timeout(WAIT, calls.recv()).await.unwrap().unwrap();

    let route_gvk = route_id(NAMESPACE).gvk();
    assert!(matches!(
        watcher
            .get_from_cache(&route_gvk, NAMESPACE, COMPLIANCE_ROUTE_NAME)
            .unwrap(),
        CacheLookup::Found(_)
    ));
    assert_eq!(
        watcher
            .list_watched_from_cache(&db_secret_id(NAMESPACE))
            .unwrap()
            .len(),
        2
    );

    watcher
        .add_or_update_watcher(db_secret_id(NAMESPACE), vec![])
        .await
        .unwrap();

    assert!(matches!(
        watcher
            .get_from_cache(&route_gvk, NAMESPACE, COMPLIANCE_ROUTE_NAME)
            .unwrap(),
        CacheLookup::NotCached
    ));
    let remaining = watcher
        .list_watched_from_cache(&db_secret_id(NAMESPACE))
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].types.as_ref().map(|t| t.kind.as_str()), Some("Secret"));

    // The Secret store was kept, so the watcher is dispatched again straight away
    timeout(WAIT, calls.recv()).await.unwrap().unwrap();

    stop.send(()).unwrap();
    timeout(WAIT, task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_duplicate_watcher_is_rejected() {
    let api = compliance_api(Duration::ZERO);
    let watcher = KubeDependencyWatcher::new("complianceapi", api.client(), options());

    watcher
        .add_watcher(db_secret_id(NAMESPACE), vec![])
        .await
        .unwrap();
    let err = watcher
        .add_watcher(db_secret_id(NAMESPACE), vec![route_id(NAMESPACE)])
        .await
        .unwrap_err();
    assert!(matches!(err, WatchError::WatcherExists(_)));
}

#[test]
fn test_field_selector_name_is_decoded() {
    assert_eq!(
        field_selected_name("fieldSelector=metadata.name%3Dgrc&limit=500").as_deref(),
        Some("grc")
    );
    assert_eq!(field_selected_name("limit=500"), None);
}
