//! Agent self-registration and the default agent flag.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app::context::{WorkflowContext, lookup, require_input};
use crate::app::engine::Workflow;
use crate::domain::{ActivityKind, ActivityRefs, Agent, ControlError, EntityKind, Key, NewActivity, Slug};
use crate::store::{EntityStoreExt, Tx};

fn flip_default_agent(tx: &mut Tx<'_>, agent: Key<Agent>, now: chrono::DateTime<chrono::Utc>) -> Result<Option<Slug>, ControlError> {
    let previous = tx.default_agent().map(|a| (a.id, a.slug.clone()));
    if let Some((key, _)) = &previous {
        if *key == agent {
            return Ok(None);
        }
        tx.update(*key, |a| {
            a.default_agent = false;
            a.updated_at = now;
        })?;
    }
    tx.update(agent, |a| {
        a.default_agent = true;
        a.updated_at = now;
    })?;
    Ok(previous.map(|(_, slug)| slug))
}

/// Register (or re-register) an agent by hostname.
///
/// Re-registration keeps the agent's key and counters and arms the
/// first-heartbeat flag again, so the next heartbeat counts as a new
/// registration.
pub struct AgentRegister;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRegisterInput {
    pub hostname: String,
    #[serde(default)]
    pub domain_suffix: String,
    #[serde(default)]
    pub default_agent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRegistered {
    pub agent: Key<Agent>,
    pub slug: Slug,
    pub created: bool,
}

#[async_trait]
impl Workflow for AgentRegister {
    const NAME: &'static str = "agent.register.v1";
    type Input = AgentRegisterInput;
    type Output = AgentRegistered;

    #[tracing::instrument(name = "agent_register", skip_all, fields(hostname = %input.hostname))]
    async fn execute(&self, ctx: &WorkflowContext, input: AgentRegisterInput) -> Result<AgentRegistered, ControlError> {
        let hostname = require_input(&input.hostname, "hostname")?.to_string();
        let services = ctx.services();
        let now = services.now();
        let author = ctx.caller();
        let registered = services.store.transaction(|tx| {
            let existing = tx.rows::<Agent>().find(|a| a.hostname == hostname).map(|a| a.id);
            let (agent, created) = match existing {
                Some(agent) => {
                    tx.update(agent, |a| {
                        a.domain_suffix = input.domain_suffix.clone();
                        a.awaiting_first_heartbeat = true;
                        a.updated_at = now;
                    })?;
                    (agent, false)
                }
                None => {
                    let agent = tx.insert(|id| Agent {
                        id,
                        slug: Slug::new(hostname.clone()),
                        hostname: hostname.clone(),
                        domain_suffix: input.domain_suffix.clone(),
                        default_agent: false,
                        times_seen: 0,
                        times_registered: 0,
                        awaiting_first_heartbeat: true,
                        last_seen_at: None,
                        created_at: now,
                        updated_at: now,
                    })?;
                    (agent, true)
                }
            };
            if input.default_agent {
                flip_default_agent(tx, agent, now)?;
            }
            tx.append(
                NewActivity::new(ActivityKind::AgentRegister, author, now)
                    .refs(ActivityRefs {
                        agent: Some(agent),
                        ..ActivityRefs::default()
                    })
                    .detail(serde_json::json!({ "created": created })),
            )?;
            let slug = tx.require(agent)?.slug.clone();
            Ok::<_, ControlError>(AgentRegistered { agent, slug, created })
        })?;
        info!(workflow = Self::NAME, agent = %registered.slug, created = registered.created, "agent registered");
        Ok(registered)
    }
}

/// Compare-and-set flip of the default agent.
pub struct AgentSetDefault;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSetDefaultInput {
    pub target: String,
    pub expected_current: Option<String>,
}

#[async_trait]
impl Workflow for AgentSetDefault {
    const NAME: &'static str = "agent.set-default.v1";
    type Input = AgentSetDefaultInput;
    type Output = Key<Agent>;

    #[tracing::instrument(name = "agent_set_default", skip_all, fields(agent = %input.target))]
    async fn execute(&self, ctx: &WorkflowContext, input: AgentSetDefaultInput) -> Result<Key<Agent>, ControlError> {
        let services = ctx.services();
        let now = services.now();
        let author = ctx.caller();
        let key = services.store.transaction(|tx| {
            let target = lookup::<Agent>(tx, &input.target, "target")?.id;
            let current = tx.default_agent().map(|a| a.slug.to_string());
            if current != input.expected_current {
                return Err(ControlError::conflict(
                    EntityKind::Agent,
                    &input.target,
                    format!(
                        "default agent is {}, expected {}",
                        current.as_deref().unwrap_or("none"),
                        input.expected_current.as_deref().unwrap_or("none")
                    ),
                ));
            }
            if current.as_deref() == Some(input.target.as_str()) {
                return Err(ControlError::conflict(EntityKind::Agent, &input.target, "already the default agent"));
            }
            let previous = flip_default_agent(tx, target, now)?;
            tx.append(
                NewActivity::new(ActivityKind::AgentDefaultChange, author, now)
                    .refs(ActivityRefs {
                        agent: Some(target),
                        ..ActivityRefs::default()
                    })
                    .detail(serde_json::json!({ "previous_default": previous })),
            )?;
            Ok(target)
        })?;
        info!(workflow = Self::NAME, agent = %input.target, "default agent changed");
        Ok(key)
    }
}
