//! Activity ledger queries.
//!
//! The ledger has no write surface here: rows are appended by the
//! transactions that perform the transitions they describe.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::builder::ControlPlane;
use crate::domain::{Activity, ActivityKind, Key, Organization, Season, Slug, Team, User};
use crate::store::{Row, Tables};

/// Conjunctive filter; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityFilter {
    pub team: Option<Key<Team>>,
    pub user: Option<Key<User>>,
    pub organization: Option<Key<Organization>>,
    pub season: Option<Key<Season>>,
    pub kind: Option<ActivityKind>,
}

impl ActivityFilter {
    pub fn matches(&self, activity: &Activity) -> bool {
        let refs = &activity.refs;
        self.team.is_none_or(|t| refs.team == Some(t))
            && self.user.is_none_or(|u| refs.user == Some(u) || activity.author == Some(u))
            && self.organization.is_none_or(|o| refs.organization == Some(o))
            && self.season.is_none_or(|s| refs.season == Some(s))
            && self.kind.is_none_or(|k| activity.kind == k)
    }
}

/// An activity with its references resolved to surface identifiers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityView {
    pub slug: Slug,
    pub kind: ActivityKind,
    pub author: Option<Slug>,
    pub team: Option<Slug>,
    pub user: Option<Slug>,
    pub organization: Option<Slug>,
    pub season: Option<Slug>,
    pub challenge: Option<Slug>,
    pub challenge_instance: Option<Slug>,
    pub agent: Option<Slug>,
    pub detail: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl ActivityView {
    fn new(tables: &Tables, activity: &Activity) -> Self {
        let refs = &activity.refs;
        Self {
            slug: activity.slug.clone(),
            kind: activity.kind,
            author: slug_of(tables, activity.author),
            team: slug_of(tables, refs.team),
            user: slug_of(tables, refs.user),
            organization: slug_of(tables, refs.organization),
            season: slug_of(tables, refs.season),
            challenge: slug_of(tables, refs.challenge),
            challenge_instance: slug_of(tables, refs.challenge_instance),
            agent: slug_of(tables, refs.agent),
            detail: activity.detail.clone(),
            created_at: activity.created_at,
        }
    }
}

fn slug_of<E: Row>(tables: &Tables, key: Option<Key<E>>) -> Option<Slug> {
    key.and_then(|k| tables.get(k)).map(|row| row.slug().clone())
}

impl ControlPlane {
    /// Matching activities, oldest first.
    pub fn activities(&self, filter: &ActivityFilter) -> Vec<ActivityView> {
        let tables = self.snapshot();
        tables
            .rows::<Activity>()
            .filter(|a| filter.matches(a))
            .map(|a| ActivityView::new(&tables, a))
            .collect()
    }
}
