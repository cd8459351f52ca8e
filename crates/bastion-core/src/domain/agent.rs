//! Remote execution agents.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{Entity, EntityKind, Key, Slug};

/// A registered remote executor. Agents are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: Key<Agent>,
    pub slug: Slug,
    pub hostname: String,
    pub domain_suffix: String,
    /// At most one default agent overall.
    pub default_agent: bool,
    pub times_seen: u64,
    pub times_registered: u64,
    /// Set by registration, cleared by the next heartbeat.
    pub awaiting_first_heartbeat: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// An agent is reachable once it has been seen within `stale_after`.
    pub fn is_reachable(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        match self.last_seen_at {
            Some(seen) => now.signed_duration_since(seen) <= stale_after,
            None => false,
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        !self.is_reachable(now, stale_after)
    }

    pub fn address(&self) -> AgentAddress {
        AgentAddress {
            slug: self.slug.clone(),
            hostname: self.hostname.clone(),
            domain_suffix: self.domain_suffix.clone(),
        }
    }
}

impl Entity for Agent {
    const KIND: EntityKind = EntityKind::Agent;

    fn key(&self) -> Key<Self> {
        self.id
    }

    fn slug(&self) -> &Slug {
        &self.slug
    }
}

/// What a capability needs to reach an agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentAddress {
    pub slug: Slug,
    pub hostname: String,
    pub domain_suffix: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn agent(last_seen_at: Option<DateTime<Utc>>) -> Agent {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        Agent {
            id: Key::from_raw(1),
            slug: Slug::new("agent-a"),
            hostname: "a.local".into(),
            domain_suffix: "local".into(),
            default_agent: false,
            times_seen: 0,
            times_registered: 1,
            awaiting_first_heartbeat: false,
            last_seen_at,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn never_seen_agents_are_unreachable() {
        let now = Utc::now();
        assert!(!agent(None).is_reachable(now, Duration::seconds(90)));
    }

    #[test]
    fn reachability_follows_last_seen() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 1, 0).unwrap();
        let seen = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert!(agent(Some(seen)).is_reachable(now, Duration::seconds(90)));
        assert!(agent(Some(seen)).is_stale(now, Duration::seconds(30)));
    }
}
