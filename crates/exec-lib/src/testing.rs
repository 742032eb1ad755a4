//! In-memory cluster fakes for unit tests

use crate::cluster::{ClientProvider, ClusterClient};
use crate::error::ClusterError;
use crate::exec::{ExecOutput, RemoteExecError, RemoteExecutor};
use crate::models::{ContainerInfo, PodInfo, WorkloadIdentity};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// Executor answering commands by substring match; unmatched commands fail
#[derive(Default)]
pub struct ScriptedExecutor {
    responses: Vec<(&'static str, Option<&'static str>)>,
    ran: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    /// `None` output makes commands containing the key fail
    pub fn new(responses: &[(&'static str, Option<&'static str>)]) -> Arc<Self> {
        Arc::new(Self {
            responses: responses.to_vec(),
            ran: Mutex::new(Vec::new()),
        })
    }

    pub fn ran(&self) -> Vec<String> {
        self.ran.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn exec(
        &self,
        _pod: &str,
        _container: &str,
        command: &str,
    ) -> Result<ExecOutput, RemoteExecError> {
        self.ran.lock().unwrap().push(command.to_string());
        match self.responses.iter().find(|(key, _)| command.contains(key)) {
            Some((_, Some(stdout))) => Ok(ExecOutput::new(*stdout, "")),
            Some((_, None)) => Err(RemoteExecError::new(
                "command terminated with exit code 1",
                ExecOutput::default(),
            )),
            None => Err(RemoteExecError::new("unexpected command", ExecOutput::default())),
        }
    }
}

pub fn pod(name: &str, containers: &[&str]) -> PodInfo {
    PodInfo {
        name: name.to_string(),
        containers: containers.iter().map(|c| ContainerInfo::named(*c)).collect(),
    }
}

pub fn workload() -> WorkloadIdentity {
    WorkloadIdentity {
        namespace: "user-ns".to_string(),
        name: "my-terminal".to_string(),
        id: "workspace123".to_string(),
    }
}

/// Cluster with a fixed pod list whose stop calls fail a set number of times
pub struct FakeCluster {
    pub pods: Vec<PodInfo>,
    pub executor: Arc<ScriptedExecutor>,
    pub list_error: bool,
    stop_failures_left: AtomicU32,
    stop_calls: Mutex<Vec<Instant>>,
}

impl FakeCluster {
    pub fn new(pods: Vec<PodInfo>, executor: Arc<ScriptedExecutor>) -> Arc<Self> {
        Arc::new(Self {
            pods,
            executor,
            list_error: false,
            stop_failures_left: AtomicU32::new(0),
            stop_calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing_list() -> Arc<Self> {
        Arc::new(Self {
            list_error: true,
            ..Self::plain()
        })
    }

    /// Cluster whose first `failures` stop attempts fail
    pub fn failing_stops(failures: u32) -> Arc<Self> {
        let cluster = Self::plain();
        cluster.stop_failures_left.store(failures, Ordering::SeqCst);
        Arc::new(cluster)
    }

    fn plain() -> Self {
        Self {
            pods: Vec::new(),
            executor: Arc::new(ScriptedExecutor::default()),
            list_error: false,
            stop_failures_left: AtomicU32::new(0),
            stop_calls: Mutex::new(Vec::new()),
        }
    }

    /// Instants at which the workload stop was attempted
    pub fn stop_calls(&self) -> Vec<Instant> {
        self.stop_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn list_running_pods(
        &self,
        _namespace: &str,
        _label_selector: &str,
    ) -> Result<Vec<PodInfo>, ClusterError> {
        if self.list_error {
            return Err(ClusterError::Other("pods is forbidden".to_string()));
        }
        Ok(self.pods.clone())
    }

    async fn stop_workload(&self, _workload: &WorkloadIdentity) -> Result<(), ClusterError> {
        self.stop_calls.lock().unwrap().push(Instant::now());
        let left = self.stop_failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.stop_failures_left.store(left - 1, Ordering::SeqCst);
            return Err(ClusterError::Other("conflict".to_string()));
        }
        Ok(())
    }

    async fn current_user_uid(&self) -> Result<String, ClusterError> {
        Ok("uid-1".to_string())
    }

    fn executor(&self, _namespace: &str) -> Arc<dyn RemoteExecutor> {
        self.executor.clone()
    }
}

/// Provider handing out the same fake cluster for every credential
pub struct FakeProvider {
    cluster: Option<Arc<FakeCluster>>,
    service_calls: AtomicU32,
}

impl FakeProvider {
    pub fn new(cluster: Arc<FakeCluster>) -> Arc<Self> {
        Arc::new(Self {
            cluster: Some(cluster),
            service_calls: AtomicU32::new(0),
        })
    }

    /// Provider whose client construction always fails
    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            cluster: None,
            service_calls: AtomicU32::new(0),
        })
    }

    pub fn service_calls(&self) -> u32 {
        self.service_calls.load(Ordering::SeqCst)
    }

    fn client(&self) -> Result<Arc<dyn ClusterClient>, ClusterError> {
        match &self.cluster {
            Some(cluster) => Ok(cluster.clone()),
            None => Err(ClusterError::Other("no cluster".to_string())),
        }
    }
}

impl ClientProvider for FakeProvider {
    fn client_for_token(&self, token: &str) -> Result<Arc<dyn ClusterClient>, ClusterError> {
        if token.is_empty() {
            return Err(ClusterError::EmptyToken);
        }
        self.client()
    }

    fn service_client(&self) -> Result<Arc<dyn ClusterClient>, ClusterError> {
        self.service_calls.fetch_add(1, Ordering::SeqCst);
        self.client()
    }
}
