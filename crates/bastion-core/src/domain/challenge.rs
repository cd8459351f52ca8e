//! Challenges, their runnable flavors, live instances and team subscriptions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::agent::Agent;
use super::ids::{Entity, EntityKind, Key, Slug};
use super::season::SeasonChallenge;
use super::state::InstanceStatus;
use super::team::Team;
use super::user::User;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: Key<Challenge>,
    pub slug: Slug,
    pub name: String,
    pub description: String,
    pub author: String,
    pub locale: String,
    pub is_draft: bool,
    pub preview_url: Option<String>,
    pub homepage: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Challenge {
    const KIND: EntityKind = EntityKind::Challenge;

    fn key(&self) -> Key<Self> {
        self.id
    }

    fn slug(&self) -> &Slug {
        &self.slug
    }
}

/// A versioned, runnable packaging of a challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeFlavor {
    pub id: Key<ChallengeFlavor>,
    pub slug: Slug,
    pub challenge: Key<Challenge>,
    pub version: String,
    /// Reference to the deployable bundle handed to agents.
    pub bundle: String,
    pub purchase_price: u64,
    pub validation_reward: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for ChallengeFlavor {
    const KIND: EntityKind = EntityKind::ChallengeFlavor;

    fn key(&self) -> Key<Self> {
        self.id
    }

    fn slug(&self) -> &Slug {
        &self.slug
    }
}

/// A deployment of a flavor on a specific agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeInstance {
    pub id: Key<ChallengeInstance>,
    pub slug: Slug,
    pub flavor: Key<ChallengeFlavor>,
    pub agent: Key<Agent>,
    pub status: InstanceStatus,
    /// Agent-side handle returned by `start`; absent when the start failed.
    pub handle: Option<String>,
    /// Opaque instance configuration blob.
    pub config: serde_json::Value,
    pub last_error: Option<String>,
    /// Set while the instance is Unavailable because its agent went quiet,
    /// not because the agent said so. Only these come back on a heartbeat.
    #[serde(default)]
    pub stale: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for ChallengeInstance {
    const KIND: EntityKind = EntityKind::ChallengeInstance;

    fn key(&self) -> Key<Self> {
        self.id
    }

    fn slug(&self) -> &Slug {
        &self.slug
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
}

/// A team's participation in a challenge within a season.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeSubscription {
    pub id: Key<ChallengeSubscription>,
    pub slug: Slug,
    pub team: Key<Team>,
    pub season_challenge: Key<SeasonChallenge>,
    pub buyer: Key<User>,
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
}

impl Entity for ChallengeSubscription {
    const KIND: EntityKind = EntityKind::ChallengeSubscription;

    fn key(&self) -> Key<Self> {
        self.id
    }

    fn slug(&self) -> &Slug {
        &self.slug
    }
}
