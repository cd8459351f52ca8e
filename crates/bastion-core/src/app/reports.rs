//! Read-only administrative reports.
//!
//! Every report works on one snapshot. Relations that may be missing are
//! `Option` fields filled in here, so renderers never chase references.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::builder::ControlPlane;
use crate::domain::{
    Agent, Challenge, ChallengeFlavor, ChallengeInstance, DeletionStatus, InstanceStatus, Organization,
    OrganizationMember, SeasonChallenge, Slug, Team, TeamMember, User,
};
use crate::store::Tables;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceReport {
    pub slug: Slug,
    /// `challenge@version`, or the flavor slug when the challenge is gone.
    pub label: String,
    pub challenge: Option<Slug>,
    pub flavor: Option<Slug>,
    pub agent: Option<Slug>,
    pub status: InstanceStatus,
    pub season_challenges: usize,
    pub purchase_price: Option<u64>,
    pub validation_reward: Option<u64>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChallengeReport {
    pub slug: Slug,
    pub name: String,
    pub is_draft: bool,
    pub flavors: Vec<FlavorReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlavorReport {
    pub slug: Slug,
    pub version: String,
    pub available: usize,
    /// Live instances that are not available.
    pub unavailable: usize,
    pub seasons: Vec<Slug>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserReport {
    pub slug: Slug,
    pub email: String,
    pub active_team: Option<Slug>,
    pub active_season: Option<Slug>,
    pub deletion_status: DeletionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamReport {
    pub slug: Slug,
    pub organization: Option<Slug>,
    pub season: Option<Slug>,
    pub is_default: bool,
    pub members: usize,
    pub deletion_status: DeletionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizationReport {
    pub slug: Slug,
    pub name: String,
    pub solo: bool,
    pub teams: usize,
    pub members: usize,
    pub deletion_status: DeletionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentReport {
    pub slug: Slug,
    pub hostname: String,
    pub default_agent: bool,
    pub reachable: bool,
    pub times_seen: u64,
    pub times_registered: u64,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub instances: usize,
}

impl ControlPlane {
    /// Instances that are not destroyed.
    pub fn ps(&self) -> Vec<InstanceReport> {
        let tables = self.snapshot();
        tables
            .rows::<ChallengeInstance>()
            .filter(|i| !i.status.is_terminal())
            .map(|i| instance_report(&tables, i))
            .collect()
    }

    pub fn challenges(&self) -> Vec<ChallengeReport> {
        let tables = self.snapshot();
        tables
            .rows::<Challenge>()
            .map(|c| ChallengeReport {
                slug: c.slug.clone(),
                name: c.name.clone(),
                is_draft: c.is_draft,
                flavors: tables
                    .rows::<ChallengeFlavor>()
                    .filter(|f| f.challenge == c.id)
                    .map(|f| flavor_report(&tables, f))
                    .collect(),
            })
            .collect()
    }

    pub fn users(&self) -> Vec<UserReport> {
        let tables = self.snapshot();
        tables
            .rows::<User>()
            .map(|u| {
                let team = u
                    .active_team_member
                    .and_then(|m| tables.get(m))
                    .and_then(|m| tables.get(m.team));
                UserReport {
                    slug: u.slug.clone(),
                    email: u.email.clone(),
                    active_team: team.map(|t| t.slug.clone()),
                    active_season: u.active_season.and_then(|s| tables.get(s)).map(|s| s.slug.clone()),
                    deletion_status: u.deletion_status,
                }
            })
            .collect()
    }

    pub fn teams(&self) -> Vec<TeamReport> {
        let tables = self.snapshot();
        tables
            .rows::<Team>()
            .map(|t| TeamReport {
                slug: t.slug.clone(),
                organization: tables.get(t.organization).map(|o| o.slug.clone()),
                season: tables.get(t.season).map(|s| s.slug.clone()),
                is_default: t.is_default,
                members: tables
                    .rows::<TeamMember>()
                    .filter(|m| m.team == t.id && m.deletion_status.is_active())
                    .count(),
                deletion_status: t.deletion_status,
            })
            .collect()
    }

    pub fn organizations(&self) -> Vec<OrganizationReport> {
        let tables = self.snapshot();
        tables
            .rows::<Organization>()
            .map(|o| OrganizationReport {
                slug: o.slug.clone(),
                name: o.name.clone(),
                solo: o.solo,
                teams: tables
                    .rows::<Team>()
                    .filter(|t| t.organization == o.id && t.deletion_status.is_active())
                    .count(),
                members: tables
                    .rows::<OrganizationMember>()
                    .filter(|m| m.organization == o.id)
                    .count(),
                deletion_status: o.deletion_status,
            })
            .collect()
    }

    pub fn agents(&self) -> Vec<AgentReport> {
        let services = self.services();
        let now = services.now();
        let stale_after = services.config.fleet.stale_after();
        let tables = self.snapshot();
        tables
            .rows::<Agent>()
            .map(|a| AgentReport {
                slug: a.slug.clone(),
                hostname: a.hostname.clone(),
                default_agent: a.default_agent,
                reachable: a.is_reachable(now, stale_after),
                times_seen: a.times_seen,
                times_registered: a.times_registered,
                last_seen_at: a.last_seen_at,
                instances: tables
                    .instances_on_agent(a.id)
                    .filter(|i| !i.status.is_terminal())
                    .count(),
            })
            .collect()
    }
}

fn instance_report(tables: &Tables, instance: &ChallengeInstance) -> InstanceReport {
    let flavor = tables.get(instance.flavor);
    let challenge = flavor.and_then(|f| tables.get(f.challenge));
    let label = match (challenge, flavor) {
        (Some(c), Some(f)) => format!("{}@{}", c.slug, f.version),
        (None, Some(f)) => f.slug.to_string(),
        _ => instance.slug.to_string(),
    };
    InstanceReport {
        slug: instance.slug.clone(),
        label,
        challenge: challenge.map(|c| c.slug.clone()),
        flavor: flavor.map(|f| f.slug.clone()),
        agent: tables.get(instance.agent).map(|a| a.slug.clone()),
        status: instance.status,
        season_challenges: tables
            .rows::<SeasonChallenge>()
            .filter(|sc| sc.flavor == instance.flavor)
            .count(),
        purchase_price: flavor.map(|f| f.purchase_price),
        validation_reward: flavor.map(|f| f.validation_reward),
        last_error: instance.last_error.clone(),
        updated_at: instance.updated_at,
    }
}

fn flavor_report(tables: &Tables, flavor: &ChallengeFlavor) -> FlavorReport {
    let (available, unavailable) = tables
        .instances_of_flavor(flavor.id)
        .filter(|i| !i.status.is_terminal())
        .fold((0, 0), |(up, down), i| {
            if i.status.is_available() { (up + 1, down) } else { (up, down + 1) }
        });
    FlavorReport {
        slug: flavor.slug.clone(),
        version: flavor.version.clone(),
        available,
        unavailable,
        seasons: tables
            .rows::<SeasonChallenge>()
            .filter(|sc| sc.flavor == flavor.id)
            .filter_map(|sc| tables.get(sc.season))
            .map(|s| s.slug.clone())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::Harness;
    use crate::app::workflows::{SeasonChallengeAdd, SeasonChallengeAddInput};

    #[tokio::test]
    async fn ps_and_challenges_summarize_the_fleet() {
        let h = Harness::new();
        h.seed_season("s1", true);
        h.seed_flavor("hello", "1.0.0");
        let agent = h.seed_agent("a", true);
        h.seed_instance("i-1", "hello@1.0.0", agent, InstanceStatus::Available);
        h.seed_instance("i-2", "hello@1.0.0", agent, InstanceStatus::Error);
        h.seed_instance("i-3", "hello@1.0.0", agent, InstanceStatus::Destroyed);
        h.run(
            SeasonChallengeAdd,
            None,
            SeasonChallengeAddInput {
                season: "s1".into(),
                flavor: "hello@1.0.0".into(),
            },
        )
        .await
        .unwrap();

        let ps = h.plane.ps();
        assert_eq!(ps.len(), 2);
        assert_eq!(ps[0].label, "hello@1.0.0");
        assert_eq!(ps[0].agent.as_ref().map(Slug::as_str), Some("a"));
        assert_eq!(ps[0].season_challenges, 1);

        let challenges = h.plane.challenges();
        assert_eq!(challenges.len(), 1);
        let flavor = &challenges[0].flavors[0];
        assert_eq!((flavor.available, flavor.unavailable), (1, 1));
        assert_eq!(flavor.seasons, vec![Slug::new("s1")]);

        let agents = h.plane.agents();
        assert!(agents[0].reachable);
        assert_eq!(agents[0].instances, 2);
    }

    #[tokio::test]
    async fn listings_resolve_workspace_relations() {
        let h = Harness::new();
        h.seed_season("s1", true);
        let alice = h.onboard("alice").await;

        let users = h.plane.users();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].active_season.as_ref().map(Slug::as_str), Some("s1"));
        let team_slug = h.snapshot().get(alice.team).unwrap().slug.clone();
        assert_eq!(users[0].active_team.as_ref(), Some(&team_slug));

        let teams = h.plane.teams();
        assert_eq!(teams[0].members, 1);
        assert!(teams[0].is_default);

        let organizations = h.plane.organizations();
        assert!(organizations[0].solo);
        assert_eq!((organizations[0].teams, organizations[0].members), (1, 1));
    }
}
