//! Activity: the append-only audit record of one completed workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::agent::Agent;
use super::challenge::{Challenge, ChallengeFlavor, ChallengeInstance, ChallengeSubscription};
use super::ids::{Entity, EntityKind, Key, Slug};
use super::organization::Organization;
use super::season::{Season, SeasonChallenge};
use super::team::{Team, TeamMember};
use super::user::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    UserRegister,
    UserDelete,
    TeamInviteSend,
    TeamInviteAccept,
    SeasonCreate,
    SeasonDefaultChange,
    ChallengeCreate,
    ChallengeFlavorCreate,
    SeasonChallengeCreate,
    ChallengeSubscribe,
    AgentRegister,
    AgentDefaultChange,
    InstanceProvision,
    InstanceProvisionFailed,
    InstanceRedump,
    InstanceStatusChange,
    InstanceTeardown,
}

/// Coupons are referenced by activity rows but have no workflow of their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Coupon {}

impl Entity for Coupon {
    const KIND: EntityKind = EntityKind::Coupon;

    fn key(&self) -> Key<Self> {
        match *self {}
    }

    fn slug(&self) -> &Slug {
        match *self {}
    }
}

/// Foreign keys of an activity row. Every field is always present in the
/// serialized row, unset references included, so audit rows have one shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRefs {
    pub team: Option<Key<Team>>,
    pub user: Option<Key<User>>,
    pub organization: Option<Key<Organization>>,
    pub season: Option<Key<Season>>,
    pub challenge: Option<Key<Challenge>>,
    pub coupon: Option<Key<Coupon>>,
    pub season_challenge: Option<Key<SeasonChallenge>>,
    pub team_member: Option<Key<TeamMember>>,
    pub challenge_subscription: Option<Key<ChallengeSubscription>>,
    pub challenge_flavor: Option<Key<ChallengeFlavor>>,
    pub challenge_instance: Option<Key<ChallengeInstance>>,
    pub agent: Option<Key<Agent>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Key<Activity>,
    pub slug: Slug,
    pub kind: ActivityKind,
    /// Absent for system-originated transitions (agent liveness, sweeps).
    pub author: Option<Key<User>>,
    pub refs: ActivityRefs,
    /// Free-form detail, e.g. the previous and new status of an instance.
    pub detail: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Entity for Activity {
    const KIND: EntityKind = EntityKind::Activity;

    fn key(&self) -> Key<Self> {
        self.id
    }

    fn slug(&self) -> &Slug {
        &self.slug
    }
}

/// Unsaved activity; the store assigns key and slug on append.
#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    pub kind: ActivityKind,
    pub author: Option<Key<User>>,
    pub refs: ActivityRefs,
    pub detail: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl NewActivity {
    pub fn new(kind: ActivityKind, author: Option<Key<User>>, created_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            author,
            refs: ActivityRefs::default(),
            detail: None,
            created_at,
        }
    }

    pub fn refs(mut self, refs: ActivityRefs) -> Self {
        self.refs = refs;
        self
    }

    pub fn detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}
