//! In-memory runtime for tests

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use async_trait::async_trait;
use sysdock_core::{ContainerId, Error, ProcessId, Result, RuntimeEvent};
use tokio::sync::Mutex;

use crate::client::{ContainerInfo, EventFilter, RuntimeClient};
use crate::events::{EventStream, ScriptedEvents};

/// A call made against [`MockRuntime`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// `inspect(name_or_id)`
    Inspect(String),
    /// `create(args)`
    Create(Vec<String>),
    /// `connect_network(network, ip, id)`
    ConnectNetwork(String, Option<String>, ContainerId),
    /// `start(id)`
    Start(ContainerId),
    /// `remove(id)`
    Remove(ContainerId),
    /// `events(filter)`
    Events(EventFilter),
}

/// Runtime double that keeps containers in memory
///
/// Containers can be looked up by name or id. `start` gives the container
/// the configured start pid; `remove` forgets it. Event subscriptions replay
/// scripts queued with [`script_events`](Self::script_events), one script per
/// subscription, then an empty stream.
///
/// # Example
/// ```
/// use sysdock_core::{ContainerName, RunContext};
/// use sysdock_runtime::{MockRuntime, Orchestrator};
///
/// # tokio_test::block_on(async {
/// let runtime = MockRuntime::new();
/// let ctx = RunContext::new(ContainerName::new("web").unwrap())
///     .with_create_args(vec!["--name".into(), "web".into(), "nginx".into()]);
///
/// let resolved = Orchestrator::new(&runtime, &ctx).resolve().await.unwrap();
/// assert!(resolved.pid.is_valid());
/// # });
/// ```
#[derive(Clone)]
pub struct MockRuntime {
    state: Arc<Mutex<MockState>>,
}

struct MockState {
    containers: BTreeMap<String, ContainerInfo>,
    calls: Vec<Call>,
    scripts: VecDeque<Vec<RuntimeEvent>>,
    closes: Arc<AtomicUsize>,
    start_pid: ProcessId,
    create_health_check: Option<Vec<String>>,
    next_id: u32,
    fail_events: bool,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            containers: BTreeMap::new(),
            calls: Vec::new(),
            scripts: VecDeque::new(),
            closes: Arc::new(AtomicUsize::new(0)),
            start_pid: ProcessId::from_raw(4242),
            create_health_check: None,
            next_id: 1,
            fail_events: false,
        }
    }
}

impl MockState {
    fn find(&self, name_or_id: &str) -> Option<&ContainerInfo> {
        self.containers
            .values()
            .find(|c| c.name == name_or_id || c.id.as_str() == name_or_id)
    }

    fn find_mut(&mut self, id: &ContainerId) -> Result<&mut ContainerInfo> {
        self.containers
            .values_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| Error::Runtime {
                command: "mock".to_string(),
                message: format!("No such container: {id}"),
            })
    }
}

impl MockRuntime {
    /// Create an empty runtime
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Add an existing container
    pub async fn with_container(self, info: ContainerInfo) -> Self {
        self.state
            .lock()
            .await
            .containers
            .insert(info.name.clone(), info);
        self
    }

    /// Pid given to containers when they start
    pub async fn set_start_pid(&self, pid: ProcessId) {
        self.state.lock().await.start_pid = pid;
    }

    /// Health check given to containers created from now on
    pub async fn set_create_health_check(&self, test: Option<Vec<String>>) {
        self.state.lock().await.create_health_check = test;
    }

    /// Make the next `events` calls fail
    pub async fn fail_events(&self, fail: bool) {
        self.state.lock().await.fail_events = fail;
    }

    /// Queue the events replayed by the next subscription
    pub async fn script_events(&self, events: impl IntoIterator<Item = RuntimeEvent>) {
        self.state
            .lock()
            .await
            .scripts
            .push_back(events.into_iter().collect());
    }

    /// Mark a container running or stopped
    pub async fn set_running(&self, name: &str, running: bool) {
        let mut state = self.state.lock().await;
        if let Some(info) = state.containers.get_mut(name) {
            info.running = running;
            if !running {
                info.pid = ProcessId::from_raw(0);
            }
        }
    }

    /// Current view of a container
    pub async fn container(&self, name: &str) -> Option<ContainerInfo> {
        self.state.lock().await.find(name).cloned()
    }

    /// Calls made so far, in order
    pub async fn calls(&self) -> Vec<Call> {
        self.state.lock().await.calls.clone()
    }

    /// Number of event subscriptions that were closed
    pub async fn closed_streams(&self) -> usize {
        self.state
            .lock()
            .await
            .closes
            .load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRuntime").finish_non_exhaustive()
    }
}

/// Value of `--name NAME` or `--name=NAME`
fn name_flag(args: &[String]) -> Option<String> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--name" {
            return iter.next().cloned();
        }
        if let Some(name) = arg.strip_prefix("--name=") {
            return Some(name.to_string());
        }
    }
    None
}

#[async_trait]
impl RuntimeClient for MockRuntime {
    async fn inspect(&self, name_or_id: &str) -> Result<Option<ContainerInfo>> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::Inspect(name_or_id.to_string()));

        tracing::debug!(container = name_or_id, "Mock: Inspect");

        Ok(state.find(name_or_id).cloned())
    }

    async fn create(&self, args: &[String]) -> Result<ContainerId> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::Create(args.to_vec()));

        let name = name_flag(args).ok_or_else(|| Error::Launch {
            message: "create without --name".to_string(),
        })?;
        if state.containers.contains_key(&name) {
            return Err(Error::Runtime {
                command: "mock create".to_string(),
                message: format!("Conflict. The container name \"/{name}\" is already in use"),
            });
        }

        let id = ContainerId::new(format!("{:064x}", state.next_id))?;
        state.next_id += 1;

        let info = ContainerInfo {
            id: id.clone(),
            name: name.clone(),
            running: false,
            pid: ProcessId::from_raw(0),
            health_check: state.create_health_check.clone(),
        };
        state.containers.insert(name, info);

        tracing::debug!(id = %id.short(), "Mock: Created container");

        Ok(id)
    }

    async fn connect_network(
        &self,
        network: &str,
        ip: Option<&str>,
        id: &ContainerId,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::ConnectNetwork(
            network.to_string(),
            ip.map(str::to_string),
            id.clone(),
        ));
        state.find_mut(id)?;
        Ok(())
    }

    async fn start(&self, id: &ContainerId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::Start(id.clone()));

        let pid = state.start_pid;
        let info = state.find_mut(id)?;
        info.running = true;
        info.pid = pid;

        tracing::debug!(id = %id.short(), pid = %pid, "Mock: Started container");

        Ok(())
    }

    async fn remove(&self, id: &ContainerId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::Remove(id.clone()));
        state.containers.retain(|_, c| &c.id != id);

        tracing::debug!(id = %id.short(), "Mock: Removed container");

        Ok(())
    }

    async fn events(&self, filter: &EventFilter) -> Result<Box<dyn EventStream>> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::Events(filter.clone()));

        if state.fail_events {
            return Err(Error::Runtime {
                command: "mock events".to_string(),
                message: "subscription refused".to_string(),
            });
        }

        let script = state.scripts.pop_front().unwrap_or_default();
        let stream = ScriptedEvents::new(script).with_close_counter(Arc::clone(&state.closes));

        Ok(Box::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_name_flag() {
        assert_eq!(name_flag(&args(&["--name", "web", "nginx"])), Some("web".to_string()));
        assert_eq!(name_flag(&args(&["--name=db", "postgres"])), Some("db".to_string()));
        assert_eq!(name_flag(&args(&["nginx"])), None);
    }

    #[tokio::test]
    async fn test_create_start_inspect() {
        let runtime = MockRuntime::new();
        let id = runtime.create(&args(&["--name", "web", "nginx"])).await.unwrap();

        let created = runtime.inspect("web").await.unwrap().unwrap();
        assert!(!created.running);

        runtime.start(&id).await.unwrap();
        let started = runtime.inspect(id.as_str()).await.unwrap().unwrap();
        assert!(started.running);
        assert_eq!(started.pid, ProcessId::from_raw(4242));
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let runtime = MockRuntime::new();
        runtime.create(&args(&["--name", "web", "nginx"])).await.unwrap();
        let err = runtime
            .create(&args(&["--name", "web", "nginx"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Runtime { .. }));
    }

    #[tokio::test]
    async fn test_scripted_subscriptions() {
        let runtime = MockRuntime::new();
        let id = ContainerId::new("abc").unwrap();
        runtime
            .script_events([RuntimeEvent::Stopped {
                action: "die".to_string(),
            }])
            .await;

        let filter = EventFilter::new(id, ["die"]);
        let mut first = runtime.events(&filter).await.unwrap();
        assert!(first.recv().await.is_some());
        first.close().await.unwrap();

        let mut second = runtime.events(&filter).await.unwrap();
        assert!(second.recv().await.is_none());

        assert_eq!(runtime.closed_streams().await, 1);
    }
}
