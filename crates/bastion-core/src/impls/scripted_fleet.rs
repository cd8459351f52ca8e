//! ScriptedAgentFleet: an in-process stand-in for remote agents.
//!
//! Each agent's answer to `start` is scripted per agent slug; instance
//! statuses are kept per handle and can be rewritten to simulate drift
//! between stored status and ground truth.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{AgentAddress, ReportedStatus};
use crate::ports::{AgentCapability, CapabilityError, StartAck, StartRequest};

/// How an agent answers a start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartScript {
    Ack(ReportedStatus),
    /// Acknowledge after a delay.
    Slow(Duration, ReportedStatus),
    Reject(String),
    Unreachable,
    /// Never answers; the caller's deadline decides.
    Hang,
}

impl Default for StartScript {
    fn default() -> Self {
        StartScript::Ack(ReportedStatus::Available)
    }
}

#[derive(Debug, Default)]
struct FleetState {
    scripts: HashMap<String, StartScript>,
    statuses: HashMap<String, ReportedStatus>,
    cut_off: HashSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedAgentFleet {
    state: Arc<Mutex<FleetState>>,
    start_calls: Arc<AtomicUsize>,
    status_calls: Arc<AtomicUsize>,
}

impl ScriptedAgentFleet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_start(&self, agent: &str, script: StartScript) {
        self.state.lock().scripts.insert(agent.to_string(), script);
    }

    /// Overwrite the ground-truth status of one instance.
    pub fn report(&self, handle: &str, status: ReportedStatus) {
        self.state.lock().statuses.insert(handle.to_string(), status);
    }

    /// Overwrite the ground-truth status of every instance on an agent.
    pub fn report_all_on(&self, agent: &str, status: ReportedStatus) {
        let prefix = format!("{agent}/");
        let mut state = self.state.lock();
        for (handle, reported) in state.statuses.iter_mut() {
            if handle.starts_with(&prefix) {
                *reported = status;
            }
        }
    }

    /// Make every call to `agent` fail as unreachable.
    pub fn cut_off(&self, agent: &str) {
        self.state.lock().cut_off.insert(agent.to_string());
    }

    pub fn reconnect(&self, agent: &str) {
        self.state.lock().cut_off.remove(agent);
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn handle_for(agent: &str, instance: &str) -> String {
        format!("{agent}/{instance}")
    }
}

#[async_trait]
impl AgentCapability for ScriptedAgentFleet {
    async fn start(&self, agent: &AgentAddress, request: StartRequest) -> Result<StartAck, CapabilityError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let script = {
            let state = self.state.lock();
            if state.cut_off.contains(agent.slug.as_str()) {
                StartScript::Unreachable
            } else {
                state.scripts.get(agent.slug.as_str()).cloned().unwrap_or_default()
            }
        };
        let status = match script {
            StartScript::Ack(status) => status,
            StartScript::Slow(delay, status) => {
                tokio::time::sleep(delay).await;
                status
            }
            StartScript::Reject(reason) => return Err(CapabilityError::Rejected(reason)),
            StartScript::Unreachable => return Err(CapabilityError::Unreachable(agent.hostname.clone())),
            StartScript::Hang => std::future::pending().await,
        };
        let handle = Self::handle_for(agent.slug.as_str(), &request.instance);
        self.state.lock().statuses.insert(handle.clone(), status);
        Ok(StartAck { handle, status })
    }

    async fn status(&self, agent: &AgentAddress, handle: &str) -> Result<ReportedStatus, CapabilityError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        if state.cut_off.contains(agent.slug.as_str()) {
            return Err(CapabilityError::Unreachable(agent.hostname.clone()));
        }
        state
            .statuses
            .get(handle)
            .copied()
            .ok_or_else(|| CapabilityError::UnknownHandle(handle.to_string()))
    }
}
