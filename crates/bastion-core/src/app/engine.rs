//! Workflow engine: typed workflows behind a name-keyed registry.
//!
//! Each workflow has a stable versioned name (`team-invite.accept.v1`), a
//! typed input and a typed output. The registry erases the types so a
//! transport layer can dispatch by name with JSON payloads, while in-process
//! callers use the typed entry points directly.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::context::WorkflowContext;
use crate::domain::ControlError;

#[async_trait]
pub trait Workflow: Send + Sync + 'static {
    const NAME: &'static str;

    type Input: DeserializeOwned + Send + 'static;
    type Output: Serialize + Send + 'static;

    /// Run the workflow. Every committed execution appends exactly one
    /// activity in the same transaction as its writes.
    async fn execute(&self, ctx: &WorkflowContext, input: Self::Input) -> Result<Self::Output, ControlError>;
}

/// Object-safe form of [`Workflow`] working on JSON values.
#[async_trait]
pub trait DynWorkflow: Send + Sync {
    async fn execute_dyn(
        &self,
        ctx: &WorkflowContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, ControlError>;

    fn name(&self) -> &'static str;
}

pub struct TypedWorkflow<W: Workflow> {
    workflow: W,
    _marker: PhantomData<fn() -> W>,
}

impl<W: Workflow> TypedWorkflow<W> {
    pub fn new(workflow: W) -> Self {
        Self {
            workflow,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<W: Workflow> DynWorkflow for TypedWorkflow<W> {
    async fn execute_dyn(
        &self,
        ctx: &WorkflowContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, ControlError> {
        let input: W::Input = serde_json::from_value(input).map_err(|e| {
            tracing::debug!(workflow = W::NAME, error = %e, "undecodable workflow input");
            ControlError::MissingInput { field: "input" }
        })?;
        let output = self.workflow.execute(ctx, input).await?;
        serde_json::to_value(output).map_err(|e| ControlError::Internal(format!("encode output: {e}")))
    }

    fn name(&self) -> &'static str {
        W::NAME
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("workflow '{0}' is already registered")]
    AlreadyRegistered(String),
}

#[derive(Default)]
pub struct WorkflowRegistry {
    workflows: HashMap<&'static str, Arc<dyn DynWorkflow>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<W: Workflow>(&mut self, workflow: W) -> Result<(), RegistryError> {
        if self.workflows.contains_key(W::NAME) {
            return Err(RegistryError::AlreadyRegistered(W::NAME.to_string()));
        }
        self.workflows.insert(W::NAME, Arc::new(TypedWorkflow::new(workflow)));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DynWorkflow>> {
        self.workflows.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.workflows.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    struct Echo;

    #[derive(Deserialize)]
    struct EchoInput {
        text: String,
    }

    #[async_trait]
    impl Workflow for Echo {
        const NAME: &'static str = "test.echo.v1";
        type Input = EchoInput;
        type Output = String;

        async fn execute(&self, _ctx: &WorkflowContext, input: EchoInput) -> Result<String, ControlError> {
            Ok(input.text)
        }
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut registry = WorkflowRegistry::new();
        registry.register(Echo).unwrap();
        assert!(matches!(
            registry.register(Echo),
            Err(RegistryError::AlreadyRegistered(name)) if name == Echo::NAME
        ));
        assert_eq!(registry.names(), vec![Echo::NAME]);
    }

    #[tokio::test]
    async fn dyn_dispatch_decodes_and_encodes() {
        let mut registry = WorkflowRegistry::new();
        registry.register(Echo).unwrap();
        let ctx = crate::app::testing::context(None);
        let workflow = registry.get(Echo::NAME).unwrap();

        let out = workflow
            .execute_dyn(&ctx, serde_json::json!({ "text": "hi" }))
            .await
            .unwrap();
        assert_eq!(out, serde_json::json!("hi"));

        let err = workflow.execute_dyn(&ctx, serde_json::json!({})).await.unwrap_err();
        assert_eq!(err, ControlError::MissingInput { field: "input" });
    }
}
