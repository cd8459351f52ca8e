//! Fleet coordinator: agent liveness and instance status reconciliation.
//!
//! Status transitions driven from here are written one instance per
//! transaction, each with its own activity, so a failure on one instance
//! never hides or rolls back the others.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::context::{Services, lookup, require_input};
use crate::domain::{
    ActivityKind, ActivityRefs, Agent, ChallengeFlavor, ChallengeInstance, ChallengeSubscription,
    ControlError, EntityKind, InstanceStatus, Key, NewActivity, ReportedStatus, SubscriptionStatus, Slug, User,
};
use crate::ports::with_deadline;
use crate::store::{EntityStoreExt, Tables};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub instance: Slug,
    pub from: InstanceStatus,
    pub to: InstanceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeartbeatReport {
    pub agent: Slug,
    pub times_seen: u64,
    pub times_registered: u64,
    /// False when the liveness update could not be stored.
    pub recorded: bool,
    pub recovered: Vec<StatusChange>,
}

/// What a redump identifier resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "slug", rename_all = "snake_case")]
pub enum RedumpTarget {
    Instance(Slug),
    Flavor(Slug),
    Agent(Slug),
    UserSession(Slug),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedumpReport {
    pub target: RedumpTarget,
    pub checked: Vec<Slug>,
    pub changed: Vec<StatusChange>,
}

/// Result for one redump identifier, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct RedumpOutcome {
    pub identifier: String,
    pub result: Result<RedumpReport, ControlError>,
}

#[derive(Clone)]
pub struct FleetCoordinator {
    services: Arc<Services>,
}

impl FleetCoordinator {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.services.now()
    }

    /// Record a heartbeat from `agent`.
    ///
    /// Only an unknown agent fails the call. Liveness bookkeeping failures
    /// are logged and reported through `recorded`.
    #[tracing::instrument(name = "heartbeat", skip(self))]
    pub fn heartbeat(&self, agent: &str) -> Result<HeartbeatReport, ControlError> {
        let slug = require_input(agent, "agent")?;
        let agent = lookup::<Agent>(&self.services.store.snapshot(), slug, "agent")?.clone();
        let now = self.services.now();

        let touched = self.services.store.touch::<Agent>(agent.id, |a| {
            a.times_seen += 1;
            if a.awaiting_first_heartbeat {
                a.times_registered += 1;
                a.awaiting_first_heartbeat = false;
            }
            a.last_seen_at = Some(now);
            a.updated_at = now;
        });
        let (times_seen, times_registered, recorded) = match touched {
            Ok(a) => (a.times_seen, a.times_registered, true),
            Err(error) => {
                warn!(agent = %agent.slug, %error, "heartbeat bookkeeping failed");
                (agent.times_seen, agent.times_registered, false)
            }
        };

        let tables = self.services.store.snapshot();
        let swept: Vec<Key<ChallengeInstance>> = tables
            .instances_on_agent(agent.id)
            .filter(|i| i.status == InstanceStatus::Unavailable && i.stale)
            .map(|i| i.id)
            .collect();
        let mut recovered = Vec::new();
        for instance in swept {
            match self.transition(instance, Cause::Heartbeat) {
                Ok(Some(change)) => recovered.push(change),
                Ok(None) => {}
                Err(error) => warn!(agent = %agent.slug, %instance, %error, "instance recovery failed"),
            }
        }
        if !recovered.is_empty() {
            info!(agent = %agent.slug, recovered = recovered.len(), "instances recovered after heartbeat");
        }
        Ok(HeartbeatReport {
            agent: agent.slug,
            times_seen,
            times_registered,
            recorded,
            recovered,
        })
    }

    /// Move Available instances of agents not heard from since
    /// `now - heartbeat_stale_after` to Unavailable.
    #[tracing::instrument(name = "sweep", skip(self))]
    pub fn sweep_stale_agents(&self, now: DateTime<Utc>) -> Vec<StatusChange> {
        let stale_after = self.services.config.fleet.stale_after();
        let tables = self.services.store.snapshot();
        let candidates: Vec<(Slug, Key<ChallengeInstance>)> = tables
            .rows::<Agent>()
            .filter(|a| a.is_stale(now, stale_after))
            .flat_map(|a| {
                tables
                    .instances_on_agent(a.id)
                    .filter(|i| i.status == InstanceStatus::Available)
                    .map(|i| (a.slug.clone(), i.id))
            })
            .collect();

        let mut changes = Vec::new();
        for (agent, instance) in candidates {
            match self.transition(instance, Cause::Sweep) {
                Ok(Some(change)) => changes.push(change),
                Ok(None) => {}
                Err(error) => warn!(%agent, %instance, %error, "marking instance unavailable failed"),
            }
        }
        if !changes.is_empty() {
            info!(changed = changes.len(), "stale agents swept");
        }
        changes
    }

    /// Reconcile stored instance statuses with what agents report.
    ///
    /// Identifiers are resolved independently with bounded concurrency;
    /// outcomes come back in input order.
    #[tracing::instrument(name = "redump", skip_all, fields(identifiers = identifiers.len()))]
    pub async fn redump(&self, identifiers: Vec<String>) -> Vec<RedumpOutcome> {
        let concurrency = self.services.config.fleet.redump_concurrency.max(1);
        stream::iter(identifiers)
            .map(|identifier| async move {
                let result = self.redump_one(&identifier).await;
                match &result {
                    Ok(report) => debug!(%identifier, changed = report.changed.len(), "redump resolved"),
                    Err(error) => warn!(%identifier, %error, "redump failed"),
                }
                RedumpOutcome { identifier, result }
            })
            .buffered(concurrency)
            .collect()
            .await
    }

    async fn redump_one(&self, identifier: &str) -> Result<RedumpReport, ControlError> {
        let identifier = require_input(identifier, "identifier")?;
        let tables = self.services.store.snapshot();
        let (target, instances) = resolve_target(&tables, identifier)?;

        let deadline = self.services.config.fleet.capability_timeout();
        let mut observed = Vec::new();
        for instance in instances {
            let Some(handle) = instance.handle.as_deref() else {
                continue;
            };
            let agent = tables.require(instance.agent)?;
            let reported = with_deadline(deadline, self.services.agents.status(&agent.address(), handle))
                .await
                .map_err(|e| ControlError::unavailable(&agent.slug, e.to_string()))?;
            observed.push((instance.id, instance.slug.clone(), reported));
        }
        drop(tables);

        let mut changed = Vec::new();
        for (instance, _, reported) in &observed {
            changed.extend(self.transition(*instance, Cause::Report(*reported))?);
        }
        Ok(RedumpReport {
            target,
            checked: observed.into_iter().map(|(_, slug, _)| slug).collect(),
            changed,
        })
    }

    /// Apply `cause` to one instance, writing the new status and one
    /// activity together. Returns the status change, if the status moved.
    fn transition(
        &self,
        instance: Key<ChallengeInstance>,
        cause: Cause,
    ) -> Result<Option<StatusChange>, ControlError> {
        let now = self.services.now();
        self.services.store.transaction(|tx| {
            let current = tx.require(instance)?.clone();
            let Some((to, stale)) = cause.apply(&current) else {
                return Ok(None);
            };
            let challenge = tx.require(current.flavor)?.challenge;
            tx.update(instance, |i| {
                i.status = to;
                i.stale = stale;
                i.updated_at = now;
            })?;
            tx.append(
                NewActivity::new(cause.kind(), None, now)
                    .refs(ActivityRefs {
                        challenge: Some(challenge),
                        challenge_flavor: Some(current.flavor),
                        challenge_instance: Some(instance),
                        agent: Some(current.agent),
                        ..ActivityRefs::default()
                    })
                    .detail(serde_json::json!({
                        "from": current.status,
                        "to": to,
                        "reason": cause.reason(),
                    })),
            )?;
            Ok((to != current.status).then(|| StatusChange {
                instance: current.slug,
                from: current.status,
                to,
            }))
        })
    }
}

/// Why an instance's stored status is being rewritten.
#[derive(Debug, Clone, Copy)]
enum Cause {
    /// Its agent missed heartbeats.
    Sweep,
    /// Its agent is heard from again.
    Heartbeat,
    /// Its agent answered a status query.
    Report(ReportedStatus),
}

impl Cause {
    fn kind(self) -> ActivityKind {
        match self {
            Cause::Sweep | Cause::Heartbeat => ActivityKind::InstanceStatusChange,
            Cause::Report(_) => ActivityKind::InstanceRedump,
        }
    }

    fn reason(self) -> &'static str {
        match self {
            Cause::Sweep => "heartbeat missed",
            Cause::Heartbeat => "heartbeat recovered",
            Cause::Report(_) => "agent report",
        }
    }

    /// Status and stale marker to store, or `None` when nothing changes.
    ///
    /// A heartbeat only brings back what the sweep took out; an instance the
    /// agent itself reported Unavailable waits for the agent to say otherwise.
    fn apply(self, current: &ChallengeInstance) -> Option<(InstanceStatus, bool)> {
        use InstanceStatus::*;
        let next = match self {
            Cause::Sweep => (current.status == Available).then_some((Unavailable, true))?,
            Cause::Heartbeat => (current.status == Unavailable && current.stale).then_some((Available, false))?,
            Cause::Report(reported) => (current.status.reconcile(reported).unwrap_or(current.status), false),
        };
        (next != (current.status, current.stale)).then_some(next)
    }
}

/// Resolve a redump identifier: instance, then flavor, then agent, then
/// user session. Destroyed instances are never reconciled.
fn resolve_target<'t>(
    tables: &'t Tables,
    identifier: &str,
) -> Result<(RedumpTarget, Vec<&'t ChallengeInstance>), ControlError> {
    let live = |i: &&ChallengeInstance| !i.status.is_terminal();

    if let Some(instance) = tables.by_slug::<ChallengeInstance>(identifier) {
        let instances = std::iter::once(instance).filter(live).collect();
        return Ok((RedumpTarget::Instance(instance.slug.clone()), instances));
    }
    if let Some(flavor) = tables.by_slug::<ChallengeFlavor>(identifier) {
        let instances = tables.instances_of_flavor(flavor.id).filter(live).collect();
        return Ok((RedumpTarget::Flavor(flavor.slug.clone()), instances));
    }
    if let Some(agent) = tables.by_slug::<Agent>(identifier) {
        let instances = tables.instances_on_agent(agent.id).filter(live).collect();
        return Ok((RedumpTarget::Agent(agent.slug.clone()), instances));
    }
    if let Some(user) = tables.by_slug::<User>(identifier) {
        let flavors = subscribed_flavors(tables, user);
        let instances = tables
            .rows::<ChallengeInstance>()
            .filter(|i| flavors.contains(&i.flavor))
            .filter(live)
            .collect();
        return Ok((RedumpTarget::UserSession(user.slug.clone()), instances));
    }
    Err(ControlError::not_found(EntityKind::ChallengeInstance, identifier))
}

/// Flavors the user's active team is subscribed to.
fn subscribed_flavors(tables: &Tables, user: &User) -> Vec<Key<ChallengeFlavor>> {
    let Some(team) = user
        .active_team_member
        .and_then(|m| tables.get(m))
        .map(|m| m.team)
    else {
        return Vec::new();
    };
    tables
        .rows::<ChallengeSubscription>()
        .filter(|s| s.team == team && s.status == SubscriptionStatus::Active)
        .filter_map(|s| tables.get(s.season_challenge))
        .map(|sc| sc.flavor)
        .collect()
}
