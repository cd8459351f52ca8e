//! Shared services and the per-call workflow context.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::ControlPlaneConfig;
use crate::domain::{ControlError, EntityKind, Key, Slug, User};
use crate::ports::{AgentCapability, Clock, IdGenerator, NotificationSource};
use crate::store::{EntityStore, Row, Tables};

/// Everything a workflow may touch. Built once by the control plane builder.
pub struct Services {
    pub store: Arc<dyn EntityStore>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub agents: Arc<dyn AgentCapability>,
    pub notifications: Arc<dyn NotificationSource>,
    pub config: ControlPlaneConfig,
}

impl Services {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn slug(&self, kind: EntityKind) -> Slug {
        self.ids.slug(kind)
    }
}

/// Context of one workflow execution.
#[derive(Clone)]
pub struct WorkflowContext {
    services: Arc<Services>,
    caller: Option<Key<User>>,
}

impl WorkflowContext {
    pub fn new(services: Arc<Services>, caller: Option<Key<User>>) -> Self {
        Self { services, caller }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn caller(&self) -> Option<Key<User>> {
        self.caller
    }

    /// The calling user; absent, unknown or deleted callers are rejected.
    pub fn require_caller(&self, tables: &Tables) -> Result<Key<User>, ControlError> {
        let key = self.caller.ok_or_else(|| ControlError::Unauthenticated {
            reason: "no caller identity".into(),
        })?;
        match tables.get(key) {
            Some(user) if user.deletion_status.is_active() => Ok(key),
            Some(_) => Err(ControlError::Unauthenticated {
                reason: format!("{key} is deleted"),
            }),
            None => Err(ControlError::Unauthenticated {
                reason: format!("{key} does not exist"),
            }),
        }
    }
}

/// Resolve a caller-supplied surface identifier.
pub fn lookup<'t, E: Row>(tables: &'t Tables, slug: &str, field: &'static str) -> Result<&'t E, ControlError> {
    if slug.trim().is_empty() {
        return Err(ControlError::MissingInput { field });
    }
    tables
        .by_slug::<E>(slug)
        .ok_or_else(|| ControlError::not_found(E::KIND, slug))
}

pub fn require_input<'a>(value: &'a str, field: &'static str) -> Result<&'a str, ControlError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ControlError::MissingInput { field })
    } else {
        Ok(trimmed)
    }
}
