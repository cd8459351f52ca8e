//! Instance provisioning and teardown.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::context::{WorkflowContext, lookup};
use crate::app::engine::Workflow;
use crate::domain::{
    ActivityKind, ActivityRefs, Agent, ChallengeFlavor, ChallengeInstance, ControlError, EntityKind,
    InstanceStatus, Key, NewActivity, ReportedStatus, Slug,
};
use crate::ports::{StartRequest, with_deadline};
use crate::store::EntityStoreExt;

/// Start a flavor on an explicitly named agent.
///
/// The agent must be reachable (heard from within the staleness window)
/// before anything is written. A failed or timed-out start is still
/// recorded: an `Error` instance and an `InstanceProvisionFailed` activity
/// are committed before `UpstreamUnavailable` is returned.
pub struct InstanceProvisioning;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionInput {
    pub flavor: String,
    pub agent: String,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionedInstance {
    pub instance: Key<ChallengeInstance>,
    pub slug: Slug,
    pub status: InstanceStatus,
    pub handle: Option<String>,
}

fn status_after_ack(reported: ReportedStatus) -> InstanceStatus {
    match reported {
        ReportedStatus::Available => InstanceStatus::Available,
        // Accepted but not serving yet.
        ReportedStatus::Unavailable => InstanceStatus::Starting,
        ReportedStatus::Error => InstanceStatus::Error,
    }
}

#[async_trait]
impl Workflow for InstanceProvisioning {
    const NAME: &'static str = "instance.provision.v1";
    type Input = ProvisionInput;
    type Output = ProvisionedInstance;

    #[tracing::instrument(name = "provision", skip_all, fields(flavor = %input.flavor, agent = %input.agent))]
    async fn execute(&self, ctx: &WorkflowContext, input: ProvisionInput) -> Result<ProvisionedInstance, ControlError> {
        let services = ctx.services();
        let fleet = &services.config.fleet;
        let tables = services.store.snapshot();
        let flavor: ChallengeFlavor = lookup::<ChallengeFlavor>(&tables, &input.flavor, "flavor")?.clone();
        let agent: Agent = lookup::<Agent>(&tables, &input.agent, "agent")?.clone();
        if agent.is_stale(services.now(), fleet.stale_after()) {
            return Err(ControlError::unavailable(&agent.slug, "agent has not sent a recent heartbeat"));
        }
        let challenge = flavor.challenge;
        drop(tables);

        let slug = services.slug(EntityKind::ChallengeInstance);
        let config = input.config.unwrap_or_else(|| serde_json::json!({}));
        let request = StartRequest {
            instance: slug.to_string(),
            flavor: flavor.slug.to_string(),
            bundle: flavor.bundle.clone(),
            config: config.clone(),
        };
        let started = with_deadline(
            fleet.capability_timeout(),
            services.agents.start(&agent.address(), request),
        )
        .await;

        let (status, handle, failure) = match started {
            Ok(ack) if ack.status == ReportedStatus::Error => {
                (InstanceStatus::Error, Some(ack.handle), Some("agent reported an error on start".to_string()))
            }
            Ok(ack) => (status_after_ack(ack.status), Some(ack.handle), None),
            Err(err) => (InstanceStatus::Error, None, Some(err.to_string())),
        };
        let kind = if failure.is_some() {
            ActivityKind::InstanceProvisionFailed
        } else {
            ActivityKind::InstanceProvision
        };

        let now = services.now();
        let author = ctx.caller();
        let instance = services.store.transaction(|tx| {
            let instance = tx.insert(|id| ChallengeInstance {
                id,
                slug: slug.clone(),
                flavor: flavor.id,
                agent: agent.id,
                status,
                handle: handle.clone(),
                config,
                last_error: failure.clone(),
                stale: false,
                created_at: now,
                updated_at: now,
            })?;
            let mut activity = NewActivity::new(kind, author, now).refs(ActivityRefs {
                challenge: Some(challenge),
                challenge_flavor: Some(flavor.id),
                challenge_instance: Some(instance),
                agent: Some(agent.id),
                ..ActivityRefs::default()
            });
            if let Some(reason) = &failure {
                activity = activity.detail(serde_json::json!({ "error": reason }));
            }
            tx.append(activity)?;
            Ok::<_, ControlError>(instance)
        })?;

        match failure {
            Some(reason) => {
                warn!(workflow = Self::NAME, instance = %slug, agent = %agent.slug, error = %reason, "provisioning failed");
                Err(ControlError::unavailable(&agent.slug, reason))
            }
            None => {
                info!(workflow = Self::NAME, instance = %slug, agent = %agent.slug, ?status, "instance provisioned");
                Ok(ProvisionedInstance {
                    instance,
                    slug,
                    status,
                    handle,
                })
            }
        }
    }
}

/// Destroy an instance. The row stays, in the terminal `Destroyed` status.
pub struct InstanceTeardown;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeardownInput {
    pub instance: String,
}

#[async_trait]
impl Workflow for InstanceTeardown {
    const NAME: &'static str = "instance.teardown.v1";
    type Input = TeardownInput;
    type Output = Key<ChallengeInstance>;

    #[tracing::instrument(name = "teardown", skip_all, fields(instance = %input.instance))]
    async fn execute(&self, ctx: &WorkflowContext, input: TeardownInput) -> Result<Key<ChallengeInstance>, ControlError> {
        let services = ctx.services();
        let now = services.now();
        let author = ctx.caller();
        let key = services.store.transaction(|tx| {
            let instance = lookup::<ChallengeInstance>(tx, &input.instance, "instance")?.clone();
            if instance.status.is_terminal() {
                return Err(ControlError::conflict(
                    EntityKind::ChallengeInstance,
                    &instance.slug,
                    "instance is already destroyed",
                ));
            }
            let challenge = tx.require(instance.flavor)?.challenge;
            tx.update(instance.id, |i| {
                i.status = InstanceStatus::Destroyed;
                i.stale = false;
                i.updated_at = now;
            })?;
            tx.append(
                NewActivity::new(ActivityKind::InstanceTeardown, author, now)
                    .refs(ActivityRefs {
                        challenge: Some(challenge),
                        challenge_flavor: Some(instance.flavor),
                        challenge_instance: Some(instance.id),
                        agent: Some(instance.agent),
                        ..ActivityRefs::default()
                    })
                    .detail(serde_json::json!({ "from": instance.status })),
            )?;
            Ok(instance.id)
        })?;
        info!(workflow = Self::NAME, instance = %input.instance, "instance destroyed");
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::Harness;
    use crate::domain::{Activity, ErrorKind};
    use crate::impls::StartScript;
    use chrono::Duration;

    fn input(agent: &str) -> ProvisionInput {
        ProvisionInput {
            flavor: "hello@1.0.0".into(),
            agent: agent.into(),
            config: None,
        }
    }

    fn harness() -> Harness {
        let h = Harness::new();
        h.seed_season("s1", true);
        h.seed_flavor("hello", "1.0.0");
        h
    }

    #[tokio::test]
    async fn acknowledged_starts_are_available() {
        let h = harness();
        h.seed_agent("a", true);
        let before = h.snapshot().count::<Activity>();

        let out = h.run(InstanceProvisioning, None, input("a")).await.unwrap();
        assert_eq!(out.status, InstanceStatus::Available);

        let tables = h.snapshot();
        let instance = tables.get(out.instance).unwrap();
        assert_eq!(instance.handle.as_deref(), Some(format!("a/{}", out.slug).as_str()));
        assert_eq!(tables.count::<Activity>(), before + 1);
        let activity = tables.rows::<Activity>().last().unwrap();
        assert_eq!(activity.kind, ActivityKind::InstanceProvision);
        assert_eq!(activity.refs.challenge_instance, Some(out.instance));
    }

    #[tokio::test]
    async fn pending_acks_start_in_starting() {
        let h = harness();
        h.seed_agent("a", true);
        h.fleet.script_start("a", StartScript::Ack(ReportedStatus::Unavailable));
        let out = h.run(InstanceProvisioning, None, input("a")).await.unwrap();
        assert_eq!(out.status, InstanceStatus::Starting);
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_record_a_failed_instance() {
        let h = harness();
        h.seed_agent("a", true);
        h.fleet.script_start("a", StartScript::Hang);

        let err = h.run(InstanceProvisioning, None, input("a")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);

        let tables = h.snapshot();
        let instances: Vec<_> = tables.rows::<ChallengeInstance>().collect();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].status, InstanceStatus::Error);
        assert!(instances[0].handle.is_none());
        let activity = tables.rows::<Activity>().last().unwrap();
        assert_eq!(activity.kind, ActivityKind::InstanceProvisionFailed);
        assert_eq!(activity.refs.challenge_instance, Some(instances[0].id));
    }

    #[tokio::test]
    async fn rejected_starts_record_a_failed_instance() {
        let h = harness();
        h.seed_agent("a", true);
        h.fleet.script_start("a", StartScript::Reject("no capacity".into()));
        let err = h.run(InstanceProvisioning, None, input("a")).await.unwrap_err();
        assert!(matches!(err, ControlError::UpstreamUnavailable { ref reason, .. } if reason.contains("no capacity")));
        let tables = h.snapshot();
        let instance = tables.rows::<ChallengeInstance>().next().unwrap();
        assert_eq!(instance.last_error.as_deref(), Some("agent rejected the request: no capacity"));
    }

    #[tokio::test]
    async fn stale_agents_are_not_contacted() {
        let h = harness();
        h.seed_agent("a", true);
        h.clock.advance(Duration::seconds(600));
        let before = h.snapshot().last_sequence();

        let err = h.run(InstanceProvisioning, None, input("a")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
        assert_eq!(h.fleet.start_calls(), 0);
        assert_eq!(h.snapshot().last_sequence(), before);
    }

    #[tokio::test]
    async fn unknown_references_are_not_found() {
        let h = harness();
        h.seed_agent("a", true);
        let err = h.run(InstanceProvisioning, None, input("b")).await.unwrap_err();
        assert_eq!(err, ControlError::not_found(EntityKind::Agent, "b"));
        let err = h
            .run(
                InstanceProvisioning,
                None,
                ProvisionInput {
                    flavor: String::new(),
                    agent: "a".into(),
                    config: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err, ControlError::MissingInput { field: "flavor" });
    }

    #[tokio::test]
    async fn teardown_is_terminal() {
        let h = harness();
        h.seed_agent("a", true);
        let out = h.run(InstanceProvisioning, None, input("a")).await.unwrap();
        let teardown = TeardownInput {
            instance: out.slug.to_string(),
        };
        h.run(InstanceTeardown, None, teardown.clone()).await.unwrap();
        assert_eq!(
            h.snapshot().get(out.instance).unwrap().status,
            InstanceStatus::Destroyed
        );
        let err = h.run(InstanceTeardown, None, teardown).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
