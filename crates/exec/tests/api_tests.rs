//! Integration tests for the exec server API

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use exec_lib::cluster::{ClientProvider, ClusterClient};
use exec_lib::error::ClusterError;
use exec_lib::health::{components, HealthRegistry};
use exec_lib::{
    ActivityManager, Authenticator, ContainerInfo, ExecConfig, ExecMetrics, ExecOutput,
    IdleController, IdleSettings, PodInfo, RemoteExecError, RemoteExecutor, SessionInitializer,
    WorkloadIdentity, EXEC_CONTAINER_NAME, TOOLING_CONTAINER_NAME,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use terminal_exec::api::{create_router, AppState, MAX_BODY_BYTES};
use tower::ServiceExt;

const OWNER_TOKEN: &str = "owner-token";
const OTHER_TOKEN: &str = "other-token";

/// Executor answering by substring match on the command
struct FakeExecutor {
    responses: Vec<(&'static str, Option<&'static str>)>,
    hang: bool,
    ran: Mutex<Vec<String>>,
}

#[async_trait]
impl RemoteExecutor for FakeExecutor {
    async fn exec(
        &self,
        _pod: &str,
        _container: &str,
        command: &str,
    ) -> Result<ExecOutput, RemoteExecError> {
        self.ran.lock().unwrap().push(command.to_string());
        if self.hang {
            std::future::pending::<()>().await;
        }
        match self.responses.iter().find(|(key, _)| command.contains(key)) {
            Some((_, Some(stdout))) => Ok(ExecOutput::new(*stdout, "")),
            _ => Err(RemoteExecError::new(
                "command terminated with exit code 1",
                ExecOutput::default(),
            )),
        }
    }
}

struct FakeCluster {
    uid: &'static str,
    pods: Vec<PodInfo>,
    executor: Arc<FakeExecutor>,
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn list_running_pods(&self, _: &str, _: &str) -> Result<Vec<PodInfo>, ClusterError> {
        Ok(self.pods.clone())
    }

    async fn stop_workload(&self, _: &WorkloadIdentity) -> Result<(), ClusterError> {
        Ok(())
    }

    async fn current_user_uid(&self) -> Result<String, ClusterError> {
        Ok(self.uid.to_string())
    }

    fn executor(&self, _: &str) -> Arc<dyn RemoteExecutor> {
        self.executor.clone()
    }
}

/// Maps the owner and other tokens to distinct users
struct FakeProvider {
    pods: Vec<PodInfo>,
    executor: Arc<FakeExecutor>,
}

impl ClientProvider for FakeProvider {
    fn client_for_token(&self, token: &str) -> Result<Arc<dyn ClusterClient>, ClusterError> {
        let uid = match token {
            OWNER_TOKEN => "owner-uid",
            OTHER_TOKEN => "other-uid",
            _ => return Err(ClusterError::Other("invalid token".to_string())),
        };
        Ok(Arc::new(FakeCluster {
            uid,
            pods: self.pods.clone(),
            executor: self.executor.clone(),
        }))
    }

    fn service_client(&self) -> Result<Arc<dyn ClusterClient>, ClusterError> {
        self.client_for_token(OWNER_TOKEN)
    }
}

fn workspace_pod() -> PodInfo {
    PodInfo {
        name: "workspace123-pod".to_string(),
        containers: vec![
            ContainerInfo::named(EXEC_CONTAINER_NAME),
            ContainerInfo::named(TOOLING_CONTAINER_NAME),
        ],
    }
}

fn executor(responses: &[(&'static str, Option<&'static str>)]) -> Arc<FakeExecutor> {
    Arc::new(FakeExecutor {
        responses: responses.to_vec(),
        hang: false,
        ran: Mutex::new(Vec::new()),
    })
}

fn working_executor() -> Arc<FakeExecutor> {
    executor(&[("KUBECONFIG", Some("")), ("echo $SHELL", Some("/bin/zsh\n"))])
}

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    executor: Arc<FakeExecutor>,
}

fn setup_test_app(executor: Arc<FakeExecutor>, activity: ActivityManager) -> TestApp {
    let config = Arc::new(ExecConfig {
        workload: WorkloadIdentity {
            namespace: "user-ns".to_string(),
            name: "my-terminal".to_string(),
            id: "workspace123".to_string(),
        },
        authenticated_user_id: "owner-uid".to_string(),
        pod_selector: ExecConfig::default_pod_selector("workspace123"),
        api_server: Some("https://172.30.0.1:443".to_string()),
        host_identity: None,
        idle: IdleSettings::disabled(),
    });
    let provider: Arc<dyn ClientProvider> = Arc::new(FakeProvider {
        pods: vec![workspace_pod()],
        executor: executor.clone(),
    });
    let health_registry = HealthRegistry::new();

    let state = Arc::new(AppState {
        initializer: SessionInitializer::new(config.clone(), provider.clone())
            .with_health(health_registry.clone()),
        authenticator: Authenticator::new(provider, config.authenticated_user_id.clone()),
        activity,
        health_registry,
        metrics: ExecMetrics::new(),
        request_timeout: Duration::from_secs(30),
    });

    TestApp {
        router: create_router(state.clone()),
        state,
        executor,
    }
}

fn default_app() -> TestApp {
    setup_test_app(working_executor(), ActivityManager::disabled())
}

fn post(uri: &str, token: Option<&str>, body: impl Into<Body>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(token) = token {
        builder = builder.header("X-Access-Token", token);
    }
    builder.body(body.into()).unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_activity_tick_returns_no_content() {
    let app = default_app();

    let response = app
        .router
        .oneshot(post("/activity/tick", Some(OWNER_TOKEN), Body::empty()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_activity_tick_reaches_controller() {
    let provider = FakeProvider {
        pods: Vec::new(),
        executor: working_executor(),
    };
    let settings = IdleSettings {
        idle_timeout: Some(Duration::from_secs(60)),
        stop_retry_period: Duration::from_secs(10),
    };
    let controller = IdleController::new(
        &settings,
        WorkloadIdentity {
            namespace: "user-ns".to_string(),
            name: "my-terminal".to_string(),
            id: "workspace123".to_string(),
        },
        &provider,
    )
    .unwrap();
    let app = setup_test_app(working_executor(), controller.handle());

    let response = app
        .router
        .oneshot(post("/activity/tick", Some(OWNER_TOKEN), Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // The tick is still pending, so a direct one is dropped
    assert!(!app.state.activity.tick());
}

#[tokio::test]
async fn test_activity_tick_requires_token() {
    let app = default_app();

    let response = app
        .router
        .oneshot(post("/activity/tick", None, Body::empty()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"], "authorization header is missing");
}

#[tokio::test]
async fn test_other_user_is_rejected() {
    let app = default_app();

    let response = app
        .router
        .oneshot(post("/exec/init", Some(OTHER_TOKEN), "{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(
        body["error"],
        "the current user is not authorized to access this web terminal"
    );
    assert!(app.executor.ran.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_token_is_rejected() {
    let app = default_app();

    let response = app
        .router
        .oneshot(post("/exec/init", Some("forged"), "{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "unable to verify user");
}

#[tokio::test]
async fn test_exec_init_success() {
    let app = default_app();

    let body = r#"{"kubeconfig": {"namespace": "user-ns", "username": "alice"}}"#;
    let response = app
        .router
        .oneshot(post("/exec/init", Some(OWNER_TOKEN), body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(
        body,
        serde_json::json!({
            "pod": "workspace123-pod",
            "container": TOOLING_CONTAINER_NAME,
            "cmd": ["/bin/zsh"],
        })
    );

    let ran = app.executor.ran.lock().unwrap();
    assert!(ran[0].contains("token: owner-token"));
    assert!(ran[0].contains("alice-context"));
}

#[tokio::test]
async fn test_exec_init_empty_body_uses_defaults() {
    let app = default_app();

    let response = app
        .router
        .oneshot(post("/exec/init", Some(OWNER_TOKEN), Body::empty()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let ran = app.executor.ran.lock().unwrap();
    assert!(ran[0].contains("Developer-context"));
}

#[tokio::test]
async fn test_exec_init_malformed_json() {
    let app = default_app();

    let response = app
        .router
        .oneshot(post("/exec/init", Some(OWNER_TOKEN), "{not json"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.executor.ran.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_exec_init_unknown_container() {
    let app = default_app();

    let response = app
        .router
        .oneshot(post(
            "/exec/init",
            Some(OWNER_TOKEN),
            r#"{"container": "missing"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(
        body["error"],
        "container 'missing' not found in pod 'workspace123-pod'"
    );
}

#[tokio::test]
async fn test_exec_init_body_too_large() {
    let app = default_app();

    let oversized = format!(
        r#"{{"container": "{}"}}"#,
        "a".repeat(MAX_BODY_BYTES + 1)
    );
    let response = app
        .router
        .oneshot(post("/exec/init", Some(OWNER_TOKEN), oversized))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_exec_init_remote_failure() {
    let app = setup_test_app(
        executor(&[("KUBECONFIG", None)]),
        ActivityManager::disabled(),
    );

    let response = app
        .router
        .clone()
        .oneshot(post("/exec/init", Some(OWNER_TOKEN), "{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("failed to create kubeconfig"));

    let health = app
        .router
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    let health = json_body(health).await;
    assert_eq!(health["status"], "degraded");
    assert_eq!(
        health["components"][components::SESSION_INIT]["status"],
        "degraded"
    );
}

#[tokio::test(start_paused = true)]
async fn test_exec_init_times_out() {
    let hanging = Arc::new(FakeExecutor {
        responses: Vec::new(),
        hang: true,
        ran: Mutex::new(Vec::new()),
    });
    let app = setup_test_app(hanging, ActivityManager::disabled());

    let response = app
        .router
        .oneshot(post("/exec/init", Some(OWNER_TOKEN), "{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_body(response).await["error"],
        "session initialization timed out"
    );
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let app = default_app();
    app.state
        .health_registry
        .set_unhealthy(components::IDLE_CONTROLLER, "controller exited")
        .await;

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_follows_readiness_flag() {
    let app = default_app();

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    app.state.health_registry.set_ready(true).await;
    let response = app
        .router
        .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = default_app();

    app.router
        .clone()
        .oneshot(post("/activity/tick", Some(OWNER_TOKEN), Body::empty()))
        .await
        .unwrap();
    let response = app
        .router
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("terminal_exec_"));
}
