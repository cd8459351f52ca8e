//! ControlPlaneBuilder: wiring and startup validation.
//!
//! The builder collects the ports, the configuration and the workflow set,
//! and refuses to build a control plane that could not serve what the
//! deployment expects.

use std::sync::Arc;
use std::time::Duration;

use super::context::{Services, WorkflowContext};
use super::engine::{RegistryError, Workflow, WorkflowRegistry};
use super::fleet::FleetCoordinator;
use super::workflows::register_standard;
use crate::config::{ConfigError, ControlPlaneConfig};
use crate::domain::{ControlError, Key, User};
use crate::impls::FixedNotifications;
use crate::ports::{AgentCapability, Clock, IdGenerator, NotificationSource, SystemClock, UlidGenerator};
use crate::store::{EntityStore, InMemoryEntityStore, Tables};

/// Builds a [`ControlPlane`].
///
/// # Example
/// ```ignore
/// let plane = ControlPlaneBuilder::new()
///     .agents(Arc::new(fleet))
///     .with_standard_workflows()?
///     .expect_workflows(STANDARD_WORKFLOWS)
///     .build()?;
/// ```
///
/// `build()` fails when an expected workflow is not registered, when no
/// agent capability was supplied, or when the configuration is invalid.
pub struct ControlPlaneBuilder {
    store: Option<Arc<dyn EntityStore>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    agents: Option<Arc<dyn AgentCapability>>,
    notifications: Option<Arc<dyn NotificationSource>>,
    config: ControlPlaneConfig,
    registry: WorkflowRegistry,
    expected_workflows: Option<Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing workflows: {0:?}. These workflows were expected but not registered.")]
    MissingWorkflows(Vec<String>),

    #[error("no agent capability configured")]
    MissingAgentCapability,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ControlPlaneBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            clock: None,
            ids: None,
            agents: None,
            notifications: None,
            config: ControlPlaneConfig::default(),
            registry: WorkflowRegistry::new(),
            expected_workflows: None,
        }
    }

    /// Defaults to an empty in-memory store.
    pub fn store(mut self, store: Arc<dyn EntityStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Defaults to the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Defaults to ULID slugs timed by the configured clock.
    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn agents(mut self, agents: Arc<dyn AgentCapability>) -> Self {
        self.agents = Some(agents);
        self
    }

    /// Defaults to a source reporting no notifications.
    pub fn notifications(mut self, notifications: Arc<dyn NotificationSource>) -> Self {
        self.notifications = Some(notifications);
        self
    }

    pub fn config(mut self, config: ControlPlaneConfig) -> Self {
        self.config = config;
        self
    }

    pub fn register<W: Workflow>(mut self, workflow: W) -> Result<Self, RegistryError> {
        self.registry.register(workflow)?;
        Ok(self)
    }

    pub fn with_standard_workflows(mut self) -> Result<Self, RegistryError> {
        register_standard(&mut self.registry)?;
        Ok(self)
    }

    pub fn expect_workflows(mut self, names: &[&str]) -> Self {
        self.expected_workflows = Some(names.iter().map(|name| name.to_string()).collect());
        self
    }

    pub fn build(self) -> Result<ControlPlane, BuildError> {
        if let Some(expected) = &self.expected_workflows {
            let registered = self.registry.names();
            let missing: Vec<String> = expected
                .iter()
                .filter(|name| !registered.contains(&name.as_str()))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingWorkflows(missing));
            }
        }
        self.config.validate()?;
        let agents = self.agents.ok_or(BuildError::MissingAgentCapability)?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(clock.clone())));
        let services = Services {
            store: self
                .store
                .unwrap_or_else(|| Arc::new(InMemoryEntityStore::new())),
            clock,
            ids,
            agents,
            notifications: self
                .notifications
                .unwrap_or_else(|| Arc::new(FixedNotifications::new())),
            config: self.config,
        };
        Ok(ControlPlane {
            services: Arc::new(services),
            registry: Arc::new(self.registry),
        })
    }
}

impl Default for ControlPlaneBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A wired control plane. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct ControlPlane {
    services: Arc<Services>,
    registry: Arc<WorkflowRegistry>,
}

impl ControlPlane {
    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub fn snapshot(&self) -> Tables {
        self.services.store.snapshot()
    }

    pub fn context(&self, caller: Option<Key<User>>) -> WorkflowContext {
        WorkflowContext::new(self.services.clone(), caller)
    }

    /// Registered workflow names, sorted.
    pub fn workflows(&self) -> Vec<&'static str> {
        self.registry.names()
    }

    pub fn fleet(&self) -> FleetCoordinator {
        FleetCoordinator::new(self.services.clone())
    }

    /// Run a workflow through its typed entry point.
    pub async fn run<W: Workflow>(
        &self,
        workflow: &W,
        caller: Option<Key<User>>,
        input: W::Input,
    ) -> Result<W::Output, ControlError> {
        workflow.execute(&self.context(caller), input).await
    }

    /// Run a registered workflow by name under the configured deadline.
    pub async fn dispatch(
        &self,
        name: &str,
        caller: Option<Key<User>>,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, ControlError> {
        let deadline = self.services.config.workflow.timeout();
        self.dispatch_with_deadline(name, caller, input, deadline).await
    }

    /// Run a registered workflow by name, abandoning it after `deadline`.
    ///
    /// Transactions are synchronous, so an abandoned workflow has either
    /// committed in full or not at all.
    ///
    /// An overrun is `Internal`, not `UpstreamUnavailable`. Agent calls carry
    /// their own deadline (shorter by default) and provisioning records that
    /// timeout as a failed instance. Reaching this deadline means the
    /// workflow itself stalled, and nothing it started was committed.
    #[tracing::instrument(name = "dispatch", skip(self, input))]
    pub async fn dispatch_with_deadline(
        &self,
        name: &str,
        caller: Option<Key<User>>,
        input: serde_json::Value,
        deadline: Duration,
    ) -> Result<serde_json::Value, ControlError> {
        let workflow = self
            .registry
            .get(name)
            .ok_or_else(|| ControlError::Internal(format!("unknown workflow '{name}'")))?;
        let ctx = self.context(caller);
        match tokio::time::timeout(deadline, workflow.execute_dyn(&ctx, input)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(workflow = name, ?deadline, "workflow deadline exceeded");
                Err(ControlError::Internal(format!(
                    "workflow '{name}' exceeded its deadline of {deadline:?}"
                )))
            }
        }
    }
}
