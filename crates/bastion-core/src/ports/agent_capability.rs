//! AgentCapability port: the control plane's view of a remote agent.
//!
//! The control plane never runs challenge code itself. It asks an agent to
//! start an instance and later asks for the instance's ground-truth status.
//! Implementations talk to real agents over the network; tests use a
//! scripted fleet.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{AgentAddress, ReportedStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartRequest {
    pub instance: String,
    pub flavor: String,
    pub bundle: String,
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartAck {
    /// Agent-side handle used for later status queries.
    pub handle: String,
    pub status: ReportedStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("agent unreachable: {0}")]
    Unreachable(String),

    #[error("agent rejected the request: {0}")]
    Rejected(String),

    #[error("unknown instance handle {0}")]
    UnknownHandle(String),

    #[error("agent did not answer within {0:?}")]
    TimedOut(std::time::Duration),
}

#[async_trait]
pub trait AgentCapability: Send + Sync {
    async fn start(&self, agent: &AgentAddress, request: StartRequest) -> Result<StartAck, CapabilityError>;

    async fn status(&self, agent: &AgentAddress, handle: &str) -> Result<ReportedStatus, CapabilityError>;
}

/// Run a capability call under a deadline; an elapsed deadline becomes
/// [`CapabilityError::TimedOut`].
pub async fn with_deadline<T>(
    deadline: std::time::Duration,
    call: impl std::future::Future<Output = Result<T, CapabilityError>>,
) -> Result<T, CapabilityError> {
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(CapabilityError::TimedOut(deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn deadline_turns_hangs_into_timeouts() {
        let result: Result<(), _> =
            with_deadline(Duration::from_millis(50), std::future::pending()).await;
        assert_eq!(result, Err(CapabilityError::TimedOut(Duration::from_millis(50))));
    }

    #[tokio::test]
    async fn deadline_passes_results_through() {
        let result = with_deadline(Duration::from_secs(1), async {
            Err::<(), _>(CapabilityError::Rejected("bad bundle".into()))
        })
        .await;
        assert_eq!(result, Err(CapabilityError::Rejected("bad bundle".into())));
    }
}
