//! Test harness: a control plane on an in-memory store, a fixed clock and a
//! scripted fleet, plus seeding shortcuts.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::builder::{ControlPlane, ControlPlaneBuilder};
use super::context::WorkflowContext;
use super::engine::Workflow;
use super::workflows::{
    Onboarded, Onboarding, SeasonChallengeAdd, SeasonChallengeAddInput, SubscribeInput, TeamSubscribe,
};
use crate::domain::{
    Agent, Challenge, ChallengeFlavor, ChallengeInstance, ChallengeSubscription, Claims, ControlError,
    DeletionStatus, InstanceStatus, Key, MemberRole, Organization, ReportedStatus, Season, SeasonChallenge, Slug,
    Team, TeamMember, User,
};
use crate::impls::{FixedNotifications, ScriptedAgentFleet};
use crate::ports::{Clock, FixedClock};
use crate::store::fixtures;
use crate::store::{EntityStoreExt, InMemoryEntityStore, Tables, Tx};

pub struct Harness {
    pub plane: ControlPlane,
    pub store: Arc<InMemoryEntityStore>,
    pub clock: Arc<FixedClock>,
    pub fleet: ScriptedAgentFleet,
    pub notifications: Arc<FixedNotifications>,
    seeded: AtomicUsize,
}

pub fn claims(subject: &str, username: &str) -> Claims {
    Claims {
        subject: subject.into(),
        preferred_username: username.into(),
        email: format!("{username}@example.com"),
        email_verified: true,
    }
}

pub fn context(caller: Option<Key<User>>) -> WorkflowContext {
    Harness::new().plane.context(caller)
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryEntityStore::new());
        let clock = Arc::new(FixedClock::new(fixtures::at()));
        let fleet = ScriptedAgentFleet::new();
        let notifications = Arc::new(FixedNotifications::new());
        let plane = ControlPlaneBuilder::new()
            .store(store.clone())
            .clock(clock.clone())
            .agents(Arc::new(fleet.clone()))
            .notifications(notifications.clone())
            .with_standard_workflows()
            .unwrap()
            .build()
            .unwrap();
        Self {
            plane,
            store,
            clock,
            fleet,
            notifications,
            seeded: AtomicUsize::new(0),
        }
    }

    pub async fn run<W: Workflow>(
        &self,
        workflow: W,
        caller: Option<Key<User>>,
        input: W::Input,
    ) -> Result<W::Output, ControlError> {
        self.plane.run(&workflow, caller, input).await
    }

    pub fn snapshot(&self) -> Tables {
        self.plane.snapshot()
    }

    /// Activities written by the `seed_*` helpers.
    pub fn seeded_activities(&self) -> usize {
        self.seeded.load(Ordering::SeqCst)
    }

    fn seed<R>(&self, work: impl FnOnce(&mut Tx<'_>) -> R) -> R {
        self.seeded.fetch_add(1, Ordering::SeqCst);
        self.store
            .transaction(|tx| {
                let out = work(tx);
                tx.append(fixtures::seed_activity())?;
                Ok::<_, ControlError>(out)
            })
            .unwrap()
    }

    pub fn seed_season(&self, slug: &str, is_default: bool) -> Key<Season> {
        self.seed(|tx| tx.insert(fixtures::season(slug, is_default)).unwrap())
    }

    /// An agent with slug `slug` and hostname `{slug}.local`; `heartbeat`
    /// makes it seen and registered as of now.
    pub fn seed_agent(&self, slug: &str, heartbeat: bool) -> Key<Agent> {
        let now = self.clock.now();
        self.seed(|tx| {
            tx.insert(|id| {
                let mut agent = fixtures::agent(slug, false)(id);
                if heartbeat {
                    agent.times_seen = 1;
                    agent.times_registered = 1;
                    agent.awaiting_first_heartbeat = false;
                    agent.last_seen_at = Some(now);
                }
                agent
            })
            .unwrap()
        })
    }

    /// A further non-default team in `organization`, owned by `owner`.
    pub fn seed_team(&self, organization: Key<Organization>, season: Key<Season>, slug: &str, owner: Key<User>) -> Key<Team> {
        let now = self.clock.now();
        self.seed(|tx| {
            let team = tx
                .insert(|id| Team {
                    id,
                    slug: Slug::new(slug),
                    organization,
                    season,
                    is_default: false,
                    deletion_status: DeletionStatus::Active,
                    created_at: now,
                    updated_at: now,
                })
                .unwrap();
            tx.insert(|id| TeamMember {
                id,
                slug: Slug::new(format!("{slug}-owner")),
                team,
                user: owner,
                role: MemberRole::Owner,
                deletion_status: DeletionStatus::Active,
                created_at: now,
            })
            .unwrap();
            team
        })
    }

    /// Flavor `{challenge}@{version}`, creating the challenge when needed.
    pub fn seed_flavor(&self, challenge: &str, version: &str) -> Key<ChallengeFlavor> {
        let now = self.clock.now();
        self.seed(|tx| {
            let challenge_key = match tx.key_by_slug::<Challenge>(challenge) {
                Some(key) => key,
                None => tx
                    .insert(|id| Challenge {
                        id,
                        slug: Slug::new(challenge),
                        name: challenge.to_string(),
                        description: String::new(),
                        author: "tester".into(),
                        locale: "en".into(),
                        is_draft: false,
                        preview_url: None,
                        homepage: None,
                        created_at: now,
                        updated_at: now,
                    })
                    .unwrap(),
            };
            tx.insert(|id| ChallengeFlavor {
                id,
                slug: Slug::new(format!("{challenge}@{version}")),
                challenge: challenge_key,
                version: version.to_string(),
                bundle: format!("bundles/{challenge}-{version}.tar"),
                purchase_price: 10,
                validation_reward: 20,
                created_at: now,
                updated_at: now,
            })
            .unwrap()
        })
    }

    /// An instance with a live handle on `agent`; the scripted fleet reports
    /// the same status the row holds.
    pub fn seed_instance(
        &self,
        slug: &str,
        flavor: &str,
        agent: Key<Agent>,
        status: InstanceStatus,
    ) -> Key<ChallengeInstance> {
        let now = self.clock.now();
        let agent_slug = self.snapshot().get(agent).unwrap().slug.to_string();
        let handle = ScriptedAgentFleet::handle_for(&agent_slug, slug);
        let reported = match status {
            InstanceStatus::Available => Some(ReportedStatus::Available),
            InstanceStatus::Error => Some(ReportedStatus::Error),
            InstanceStatus::Destroyed => None,
            InstanceStatus::Starting | InstanceStatus::Unavailable => Some(ReportedStatus::Unavailable),
        };
        if let Some(reported) = reported {
            self.fleet.report(&handle, reported);
        }
        self.seed(|tx| {
            let flavor = tx.key_by_slug::<ChallengeFlavor>(flavor).unwrap();
            tx.insert(|id| ChallengeInstance {
                id,
                slug: Slug::new(slug),
                flavor,
                agent,
                status,
                handle: Some(handle),
                config: serde_json::json!({}),
                last_error: None,
                stale: false,
                created_at: now,
                updated_at: now,
            })
            .unwrap()
        })
    }

    pub async fn onboard(&self, username: &str) -> Onboarded {
        self.run(Onboarding, None, claims(&format!("sub-{username}"), username))
            .await
            .unwrap()
    }

    /// Subscribe the user's active team to `flavor` in `season`, listing the
    /// flavor in the season first when needed.
    pub async fn subscribe(&self, user: Key<User>, season: &str, flavor: &str) -> Key<ChallengeSubscription> {
        let listing = format!("{season}/{flavor}");
        if self.snapshot().key_by_slug::<SeasonChallenge>(&listing).is_none() {
            self.run(
                SeasonChallengeAdd,
                None,
                SeasonChallengeAddInput {
                    season: season.into(),
                    flavor: flavor.into(),
                },
            )
            .await
            .unwrap();
        }
        self.run(TeamSubscribe, Some(user), SubscribeInput { season_challenge: listing })
            .await
            .unwrap()
    }
}
