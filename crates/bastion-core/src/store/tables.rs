//! The entity arena and its transactional view.
//!
//! `Tables` keeps one persistent map per entity kind, keyed by durable key.
//! Relations are plain keys resolved by explicit lookups, so the cyclic
//! user/team/organization/season graph never turns into pointer cycles.
//! Cloning `Tables` is O(1), which is what makes snapshots and transaction
//! drafts cheap.

use std::ops::Deref;

use im::OrdMap;

use super::StoreError;
use crate::domain::{
    Activity, Agent, Challenge, ChallengeFlavor, ChallengeInstance, ChallengeSubscription,
    Entity, EntityKind, Key, NewActivity, Organization, OrganizationMember, Season,
    SeasonChallenge, Slug, Team, TeamInvite, TeamMember, User,
};

#[derive(Debug, Clone, Default)]
pub struct Tables {
    users: OrdMap<Key<User>, User>,
    organizations: OrdMap<Key<Organization>, Organization>,
    organization_members: OrdMap<Key<OrganizationMember>, OrganizationMember>,
    teams: OrdMap<Key<Team>, Team>,
    team_members: OrdMap<Key<TeamMember>, TeamMember>,
    team_invites: OrdMap<Key<TeamInvite>, TeamInvite>,
    seasons: OrdMap<Key<Season>, Season>,
    challenges: OrdMap<Key<Challenge>, Challenge>,
    flavors: OrdMap<Key<ChallengeFlavor>, ChallengeFlavor>,
    season_challenges: OrdMap<Key<SeasonChallenge>, SeasonChallenge>,
    instances: OrdMap<Key<ChallengeInstance>, ChallengeInstance>,
    subscriptions: OrdMap<Key<ChallengeSubscription>, ChallengeSubscription>,
    agents: OrdMap<Key<Agent>, Agent>,
    activities: OrdMap<Key<Activity>, Activity>,

    /// Surface identifier index, unique per kind.
    slugs: OrdMap<(EntityKind, Slug), u64>,
    /// OAuth subject index for users.
    subjects: OrdMap<String, Key<User>>,
    /// Last allocated durable key (shared by all kinds).
    sequence: u64,
}

/// A row type stored in [`Tables`].
pub trait Row: Entity {
    fn table(tables: &Tables) -> &OrdMap<Key<Self>, Self>;

    fn table_mut(tables: &mut Tables) -> &mut OrdMap<Key<Self>, Self>;

    /// Foreign keys and cross-row invariants.
    fn check(&self, tables: &Tables) -> Result<(), StoreError>;

    /// Rules that compare a row with its previous version.
    fn check_update(&self, _previous: &Self) -> Result<(), StoreError> {
        Ok(())
    }

    fn index(&self, _tables: &mut Tables) {}

    fn unindex(&self, _tables: &mut Tables) {}
}

/// Rows that may be updated in place. Activities are not.
pub trait Mutable: Row {}

/// Rows that may be physically removed. Only consumed invitations are.
pub trait Deletable: Row {}

/// Rows whose liveness fields may be touched outside audited workflows.
pub trait Bookkeeping: Mutable {}

macro_rules! table {
    ($field:ident) => {
        fn table(tables: &Tables) -> &OrdMap<Key<Self>, Self> {
            &tables.$field
        }

        fn table_mut(tables: &mut Tables) -> &mut OrdMap<Key<Self>, Self> {
            &mut tables.$field
        }
    };
}

fn exists<E: Row>(tables: &Tables, referrer: EntityKind, key: Key<E>) -> Result<(), StoreError> {
    if E::table(tables).contains_key(&key) {
        Ok(())
    } else {
        Err(StoreError::DanglingReference {
            referrer,
            kind: E::KIND,
            key: key.raw(),
        })
    }
}

fn exists_opt<E: Row>(
    tables: &Tables,
    referrer: EntityKind,
    key: Option<Key<E>>,
) -> Result<(), StoreError> {
    match key {
        Some(key) => exists(tables, referrer, key),
        None => Ok(()),
    }
}

fn invariant(kind: EntityKind, reason: impl Into<String>) -> StoreError {
    StoreError::Invariant {
        kind,
        reason: reason.into(),
    }
}

impl Row for User {
    table!(users);

    fn check(&self, tables: &Tables) -> Result<(), StoreError> {
        if let Some(other) = tables.subjects.get(&self.oauth_subject)
            && *other != self.id
        {
            return Err(invariant(
                EntityKind::User,
                format!("subject {} already bound to {}", self.oauth_subject, other),
            ));
        }
        if !self.deletion_status.is_active() {
            return Ok(());
        }
        exists_opt(tables, EntityKind::User, self.active_season)?;
        if let Some(member_key) = self.active_team_member {
            let member = tables.require(member_key)?;
            if member.user != self.id || !member.deletion_status.is_active() {
                return Err(invariant(
                    EntityKind::User,
                    format!("active membership {member_key} is not a live membership of this user"),
                ));
            }
            let team = tables.require(member.team)?;
            if !team.deletion_status.is_active() {
                return Err(invariant(
                    EntityKind::User,
                    format!("active team {} is deleted", team.slug),
                ));
            }
            if Some(team.season) != self.active_season {
                return Err(invariant(
                    EntityKind::User,
                    format!("active team {} is not in the active season", team.slug),
                ));
            }
        }
        Ok(())
    }

    fn check_update(&self, previous: &Self) -> Result<(), StoreError> {
        if self.oauth_subject != previous.oauth_subject {
            return Err(invariant(EntityKind::User, "oauth subject is immutable"));
        }
        Ok(())
    }

    fn index(&self, tables: &mut Tables) {
        tables.subjects.insert(self.oauth_subject.clone(), self.id);
    }

    fn unindex(&self, tables: &mut Tables) {
        tables.subjects.remove(&self.oauth_subject);
    }
}

impl Mutable for User {}

impl Row for Organization {
    table!(organizations);

    fn check(&self, _tables: &Tables) -> Result<(), StoreError> {
        Ok(())
    }
}

impl Mutable for Organization {}

impl Row for OrganizationMember {
    table!(organization_members);

    fn check(&self, tables: &Tables) -> Result<(), StoreError> {
        exists(tables, Self::KIND, self.organization)?;
        exists(tables, Self::KIND, self.user)
    }
}

impl Mutable for OrganizationMember {}

impl Row for Team {
    table!(teams);

    fn check(&self, tables: &Tables) -> Result<(), StoreError> {
        exists(tables, Self::KIND, self.organization)?;
        exists(tables, Self::KIND, self.season)?;
        if self.is_default
            && let Some(other) = tables.default_team(self.organization)
            && other.id != self.id
        {
            return Err(invariant(
                Self::KIND,
                format!("{} is already the default team of its organization", other.slug),
            ));
        }
        Ok(())
    }
}

impl Mutable for Team {}

impl Row for TeamMember {
    table!(team_members);

    fn check(&self, tables: &Tables) -> Result<(), StoreError> {
        exists(tables, Self::KIND, self.team)?;
        exists(tables, Self::KIND, self.user)
    }
}

impl Mutable for TeamMember {}

impl Row for TeamInvite {
    table!(team_invites);

    fn check(&self, tables: &Tables) -> Result<(), StoreError> {
        exists(tables, Self::KIND, self.user)?;
        let team = tables.require(self.team)?;
        if !team.deletion_status.is_active() {
            return Err(invariant(Self::KIND, format!("team {} is deleted", team.slug)));
        }
        Ok(())
    }
}

impl Deletable for TeamInvite {}

impl Row for Season {
    table!(seasons);

    fn check(&self, tables: &Tables) -> Result<(), StoreError> {
        if self.is_default
            && let Some(other) = tables.default_season()
            && other.id != self.id
        {
            return Err(invariant(
                Self::KIND,
                format!("{} is already the default season", other.slug),
            ));
        }
        Ok(())
    }
}

impl Mutable for Season {}

impl Row for Challenge {
    table!(challenges);

    fn check(&self, _tables: &Tables) -> Result<(), StoreError> {
        Ok(())
    }
}

impl Mutable for Challenge {}

impl Row for ChallengeFlavor {
    table!(flavors);

    fn check(&self, tables: &Tables) -> Result<(), StoreError> {
        exists(tables, Self::KIND, self.challenge)
    }
}

impl Mutable for ChallengeFlavor {}

impl Row for SeasonChallenge {
    table!(season_challenges);

    fn check(&self, tables: &Tables) -> Result<(), StoreError> {
        exists(tables, Self::KIND, self.season)?;
        exists(tables, Self::KIND, self.flavor)?;
        let duplicate = tables
            .season_challenges
            .values()
            .any(|sc| sc.id != self.id && sc.season == self.season && sc.flavor == self.flavor);
        if duplicate {
            return Err(invariant(Self::KIND, "flavor already listed in this season"));
        }
        Ok(())
    }
}

impl Mutable for SeasonChallenge {}

impl Row for ChallengeInstance {
    table!(instances);

    fn check(&self, tables: &Tables) -> Result<(), StoreError> {
        exists(tables, Self::KIND, self.flavor)?;
        exists(tables, Self::KIND, self.agent)
    }

    fn check_update(&self, previous: &Self) -> Result<(), StoreError> {
        if !previous.status.permits(self.status) {
            return Err(invariant(
                Self::KIND,
                format!("illegal status change {:?} -> {:?}", previous.status, self.status),
            ));
        }
        Ok(())
    }
}

impl Mutable for ChallengeInstance {}

impl Row for ChallengeSubscription {
    table!(subscriptions);

    fn check(&self, tables: &Tables) -> Result<(), StoreError> {
        exists(tables, Self::KIND, self.buyer)?;
        let team = tables.require(self.team)?;
        let season_challenge = tables.require(self.season_challenge)?;
        if team.season != season_challenge.season {
            return Err(invariant(
                Self::KIND,
                format!("team {} plays another season", team.slug),
            ));
        }
        Ok(())
    }
}

impl Mutable for ChallengeSubscription {}

impl Row for Agent {
    table!(agents);

    fn check(&self, tables: &Tables) -> Result<(), StoreError> {
        if self.default_agent
            && let Some(other) = tables.default_agent()
            && other.id != self.id
        {
            return Err(invariant(
                Self::KIND,
                format!("{} is already the default agent", other.slug),
            ));
        }
        Ok(())
    }

    fn check_update(&self, previous: &Self) -> Result<(), StoreError> {
        if self.times_seen < previous.times_seen
            || self.times_registered < previous.times_registered
        {
            return Err(invariant(Self::KIND, "agent counters cannot decrease"));
        }
        Ok(())
    }
}

impl Mutable for Agent {}

impl Bookkeeping for Agent {}

impl Row for Activity {
    table!(activities);

    fn check(&self, tables: &Tables) -> Result<(), StoreError> {
        let kind = Self::KIND;
        let refs = &self.refs;
        exists_opt(tables, kind, self.author)?;
        exists_opt(tables, kind, refs.team)?;
        exists_opt(tables, kind, refs.user)?;
        exists_opt(tables, kind, refs.organization)?;
        exists_opt(tables, kind, refs.season)?;
        exists_opt(tables, kind, refs.challenge)?;
        exists_opt(tables, kind, refs.season_challenge)?;
        exists_opt(tables, kind, refs.team_member)?;
        exists_opt(tables, kind, refs.challenge_subscription)?;
        exists_opt(tables, kind, refs.challenge_flavor)?;
        exists_opt(tables, kind, refs.challenge_instance)?;
        exists_opt(tables, kind, refs.agent)?;
        // Coupons have no table; a coupon key cannot be constructed from a row.
        Ok(())
    }
}

impl Tables {
    pub fn get<E: Row>(&self, key: Key<E>) -> Option<&E> {
        E::table(self).get(&key)
    }

    pub fn require<E: Row>(&self, key: Key<E>) -> Result<&E, StoreError> {
        self.get(key).ok_or(StoreError::MissingRow {
            kind: E::KIND,
            key: key.raw(),
        })
    }

    pub fn key_by_slug<E: Row>(&self, slug: &str) -> Option<Key<E>> {
        self.slugs
            .get(&(E::KIND, Slug::new(slug)))
            .map(|raw| Key::from_raw(*raw))
    }

    pub fn by_slug<E: Row>(&self, slug: &str) -> Option<&E> {
        self.key_by_slug::<E>(slug).and_then(|key| self.get(key))
    }

    /// Rows in durable-key order, which is creation order.
    pub fn rows<E: Row>(&self) -> impl Iterator<Item = &E> {
        E::table(self).values()
    }

    pub fn count<E: Row>(&self) -> usize {
        E::table(self).len()
    }

    pub fn user_by_subject(&self, subject: &str) -> Option<&User> {
        self.subjects.get(subject).and_then(|key| self.users.get(key))
    }

    pub fn default_season(&self) -> Option<&Season> {
        self.seasons.values().find(|s| s.is_default)
    }

    pub fn default_agent(&self) -> Option<&Agent> {
        self.agents.values().find(|a| a.default_agent)
    }

    pub fn default_team(&self, organization: Key<Organization>) -> Option<&Team> {
        self.teams
            .values()
            .find(|t| t.organization == organization && t.is_default)
    }

    /// Memberships of a user, deleted ones included.
    pub fn memberships_of(&self, user: Key<User>) -> impl Iterator<Item = &TeamMember> {
        self.team_members.values().filter(move |m| m.user == user)
    }

    /// Active membership of `user` in a team of `season`, if any.
    pub fn membership_in_season(&self, user: Key<User>, season: Key<Season>) -> Option<&TeamMember> {
        self.memberships_of(user).find(|m| {
            m.deletion_status.is_active()
                && self
                    .teams
                    .get(&m.team)
                    .is_some_and(|t| t.season == season && t.deletion_status.is_active())
        })
    }

    pub fn instances_of_flavor(
        &self,
        flavor: Key<ChallengeFlavor>,
    ) -> impl Iterator<Item = &ChallengeInstance> {
        self.instances.values().filter(move |i| i.flavor == flavor)
    }

    pub fn instances_on_agent(&self, agent: Key<Agent>) -> impl Iterator<Item = &ChallengeInstance> {
        self.instances.values().filter(move |i| i.agent == agent)
    }

    pub fn last_sequence(&self) -> u64 {
        self.sequence
    }

    /// Re-check every row and index. Used on restore and by tests.
    pub fn verify(&self) -> Result<(), StoreError> {
        self.verify_table::<User>()?;
        self.verify_table::<Organization>()?;
        self.verify_table::<OrganizationMember>()?;
        self.verify_table::<Team>()?;
        self.verify_table::<TeamMember>()?;
        self.verify_table::<TeamInvite>()?;
        self.verify_table::<Season>()?;
        self.verify_table::<Challenge>()?;
        self.verify_table::<ChallengeFlavor>()?;
        self.verify_table::<SeasonChallenge>()?;
        self.verify_table::<ChallengeInstance>()?;
        self.verify_table::<ChallengeSubscription>()?;
        self.verify_table::<Agent>()?;
        self.verify_table::<Activity>()?;
        if self.seasons.values().filter(|s| s.is_default).count() > 1 {
            return Err(invariant(EntityKind::Season, "more than one default season"));
        }
        if self.agents.values().filter(|a| a.default_agent).count() > 1 {
            return Err(invariant(EntityKind::Agent, "more than one default agent"));
        }
        Ok(())
    }

    fn verify_table<E: Row>(&self) -> Result<(), StoreError> {
        for (key, row) in E::table(self).iter() {
            if row.key() != *key || key.raw() > self.sequence {
                return Err(invariant(E::KIND, format!("row stored under wrong key {key}")));
            }
            let indexed = self.slugs.get(&(E::KIND, row.slug().clone()));
            if indexed != Some(&key.raw()) {
                return Err(invariant(E::KIND, format!("slug {} is not indexed", row.slug())));
            }
            row.check(self)?;
        }
        Ok(())
    }

    /// Insert a row without checks; `verify` must run afterwards.
    pub(super) fn restore_row<E: Row>(&mut self, row: E) {
        self.sequence = self.sequence.max(row.key().raw());
        self.slugs.insert((E::KIND, row.slug().clone()), row.key().raw());
        row.index(self);
        E::table_mut(self).insert(row.key(), row);
    }

    pub(super) fn set_sequence(&mut self, sequence: u64) {
        self.sequence = self.sequence.max(sequence);
    }
}

/// What a transaction is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// Workflow transaction: any mutation requires an activity row.
    Audited,
    /// Single-row liveness update; no activity is written.
    Bookkeeping,
}

/// Mutable view over a draft of [`Tables`].
///
/// Dropping a `Tx` without the store committing the draft discards every
/// write made through it.
pub struct Tx<'a> {
    tables: &'a mut Tables,
    mode: TxMode,
    mutations: usize,
    activities: usize,
}

impl<'a> Tx<'a> {
    pub(super) fn new(tables: &'a mut Tables, mode: TxMode) -> Self {
        Self {
            tables,
            mode,
            mutations: 0,
            activities: 0,
        }
    }

    pub fn mode(&self) -> TxMode {
        self.mode
    }

    fn audited_only(&self) -> Result<(), StoreError> {
        match self.mode {
            TxMode::Audited => Ok(()),
            TxMode::Bookkeeping => Err(StoreError::NotPermitted),
        }
    }

    fn allocate(&mut self) -> u64 {
        self.tables.sequence += 1;
        self.tables.sequence
    }

    /// Insert a new row built from its freshly allocated key.
    pub fn insert<E: Row>(&mut self, build: impl FnOnce(Key<E>) -> E) -> Result<Key<E>, StoreError> {
        self.audited_only()?;
        let key = Key::from_raw(self.allocate());
        let row = build(key);
        if row.key() != key {
            return Err(invariant(E::KIND, "row built with a foreign key"));
        }
        self.insert_row(row)?;
        self.mutations += 1;
        Ok(key)
    }

    fn insert_row<E: Row>(&mut self, row: E) -> Result<(), StoreError> {
        if row.slug().is_empty() {
            return Err(StoreError::EmptySlug { kind: E::KIND });
        }
        let slot = (E::KIND, row.slug().clone());
        if self.tables.slugs.contains_key(&slot) {
            return Err(StoreError::DuplicateSlug {
                kind: E::KIND,
                slug: row.slug().to_string(),
            });
        }
        row.check(self.tables)?;
        self.tables.slugs.insert(slot, row.key().raw());
        row.index(self.tables);
        E::table_mut(self.tables).insert(row.key(), row);
        Ok(())
    }

    /// Apply `change` to a row and re-validate it. Returns the new version.
    pub fn update<E: Mutable>(&mut self, key: Key<E>, change: impl FnOnce(&mut E)) -> Result<E, StoreError> {
        self.audited_only()?;
        let row = self.replace(key, change)?;
        self.mutations += 1;
        Ok(row)
    }

    /// Bookkeeping-only single-row update.
    pub fn touch<E: Bookkeeping>(&mut self, key: Key<E>, change: impl FnOnce(&mut E)) -> Result<E, StoreError> {
        let row = self.replace(key, change)?;
        self.mutations += 1;
        Ok(row)
    }

    fn replace<E: Row>(&mut self, key: Key<E>, change: impl FnOnce(&mut E)) -> Result<E, StoreError> {
        let previous = self.tables.require(key)?.clone();
        let mut next = previous.clone();
        change(&mut next);
        if next.key() != key {
            return Err(invariant(E::KIND, "durable key is immutable"));
        }
        if next.slug() != previous.slug() {
            return Err(StoreError::ImmutableSlug { kind: E::KIND });
        }
        next.check_update(&previous)?;
        next.check(self.tables)?;
        previous.unindex(self.tables);
        next.index(self.tables);
        E::table_mut(self.tables).insert(key, next.clone());
        Ok(next)
    }

    pub fn delete<E: Deletable>(&mut self, key: Key<E>) -> Result<E, StoreError> {
        self.audited_only()?;
        let row = E::table_mut(self.tables)
            .remove(&key)
            .ok_or(StoreError::MissingRow {
                kind: E::KIND,
                key: key.raw(),
            })?;
        self.tables.slugs.remove(&(E::KIND, row.slug().clone()));
        row.unindex(self.tables);
        self.mutations += 1;
        Ok(row)
    }

    /// Append an activity row to the ledger.
    pub fn append(&mut self, activity: NewActivity) -> Result<Key<Activity>, StoreError> {
        self.audited_only()?;
        let key: Key<Activity> = Key::from_raw(self.allocate());
        let row = Activity {
            id: key,
            slug: Slug::new(format!("activity-{}", key.raw())),
            kind: activity.kind,
            author: activity.author,
            refs: activity.refs,
            detail: activity.detail,
            created_at: activity.created_at,
        };
        self.insert_row(row)?;
        self.activities += 1;
        Ok(key)
    }

    /// Commit-time rules; the store calls this before publishing the draft.
    pub(super) fn finish(self) -> Result<(), StoreError> {
        match self.mode {
            TxMode::Audited if self.mutations > 0 && self.activities == 0 => {
                Err(StoreError::Unaudited {
                    mutations: self.mutations,
                })
            }
            TxMode::Bookkeeping if self.mutations > 1 => Err(StoreError::NotPermitted),
            _ => Ok(()),
        }
    }
}

impl Deref for Tx<'_> {
    type Target = Tables;

    fn deref(&self) -> &Tables {
        &*self.tables
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Row builders shared by store and workflow tests.

    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::domain::{ActivityKind, DeletionStatus, MemberRole, Visibility};

    pub fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    pub fn season(slug: &str, is_default: bool) -> impl FnOnce(Key<Season>) -> Season {
        let slug = Slug::new(slug);
        move |id| Season {
            id,
            name: slug.to_string(),
            slug,
            is_default,
            visibility: Visibility::Public,
            created_at: at(),
            updated_at: at(),
        }
    }

    pub fn agent(slug: &str, default_agent: bool) -> impl FnOnce(Key<Agent>) -> Agent {
        let slug = Slug::new(slug);
        move |id| Agent {
            id,
            hostname: format!("{slug}.local"),
            slug,
            domain_suffix: "local".into(),
            default_agent,
            times_seen: 0,
            times_registered: 0,
            awaiting_first_heartbeat: true,
            last_seen_at: None,
            created_at: at(),
            updated_at: at(),
        }
    }

    pub fn user(username: &str) -> impl FnOnce(Key<User>) -> User {
        let username = username.to_string();
        move |id| User {
            id,
            slug: Slug::new(username.clone()),
            email: format!("{username}@example.com"),
            gravatar_url: String::new(),
            oauth_subject: format!("sub-{username}"),
            username,
            active_team_member: None,
            active_season: None,
            deletion_status: DeletionStatus::Active,
            created_at: at(),
            updated_at: at(),
        }
    }

    pub fn organization(slug: &str) -> impl FnOnce(Key<Organization>) -> Organization {
        let slug = Slug::new(slug);
        move |id| Organization {
            id,
            name: slug.to_string(),
            slug,
            gravatar_url: String::new(),
            solo: false,
            deletion_status: DeletionStatus::Active,
            created_at: at(),
            updated_at: at(),
        }
    }

    pub fn team(
        slug: &str,
        organization: Key<Organization>,
        season: Key<Season>,
        is_default: bool,
    ) -> impl FnOnce(Key<Team>) -> Team {
        let slug = Slug::new(slug);
        move |id| Team {
            id,
            slug,
            organization,
            season,
            is_default,
            deletion_status: DeletionStatus::Active,
            created_at: at(),
            updated_at: at(),
        }
    }

    pub fn member(slug: &str, team: Key<Team>, user: Key<User>) -> impl FnOnce(Key<TeamMember>) -> TeamMember {
        let slug = Slug::new(slug);
        move |id| TeamMember {
            id,
            slug,
            team,
            user,
            role: MemberRole::Member,
            deletion_status: DeletionStatus::Active,
            created_at: at(),
        }
    }

    pub fn seed_activity() -> NewActivity {
        NewActivity::new(ActivityKind::SeasonCreate, None, at())
    }
}
