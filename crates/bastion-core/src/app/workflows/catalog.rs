//! Seasons, challenges, flavors, season catalogs and team subscriptions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app::context::{WorkflowContext, lookup, require_input};
use crate::app::engine::Workflow;
use crate::domain::{
    ActivityKind, ActivityRefs, Challenge, ChallengeFlavor, ChallengeSubscription, ControlError,
    EntityKind, Key, NewActivity, Season, SeasonChallenge, Slug, SubscriptionStatus, Visibility,
};
use crate::store::{EntityStoreExt, Tx};

/// Clear the current default season (if any) and set `season` as default.
/// Returns the previous default.
fn flip_default_season(tx: &mut Tx<'_>, season: Key<Season>, now: chrono::DateTime<chrono::Utc>) -> Result<Option<Slug>, ControlError> {
    let previous = tx.default_season().map(|s| (s.id, s.slug.clone()));
    if let Some((key, _)) = &previous {
        tx.update(*key, |s| {
            s.is_default = false;
            s.updated_at = now;
        })?;
    }
    tx.update(season, |s| {
        s.is_default = true;
        s.updated_at = now;
    })?;
    Ok(previous.map(|(_, slug)| slug))
}

pub struct SeasonCreate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonCreateInput {
    pub slug: String,
    pub name: String,
    #[serde(default = "public")]
    pub visibility: Visibility,
    #[serde(default)]
    pub make_default: bool,
}

fn public() -> Visibility {
    Visibility::Public
}

#[async_trait]
impl Workflow for SeasonCreate {
    const NAME: &'static str = "season.create.v1";
    type Input = SeasonCreateInput;
    type Output = Key<Season>;

    #[tracing::instrument(name = "season_create", skip_all, fields(season = %input.slug))]
    async fn execute(&self, ctx: &WorkflowContext, input: SeasonCreateInput) -> Result<Key<Season>, ControlError> {
        let slug = require_input(&input.slug, "slug")?.to_string();
        let services = ctx.services();
        let now = services.now();
        let author = ctx.caller();
        let key = services.store.transaction(|tx| {
            let season = tx.insert(|id| Season {
                id,
                slug: Slug::new(slug.clone()),
                name: input.name.clone(),
                is_default: false,
                visibility: input.visibility,
                created_at: now,
                updated_at: now,
            })?;
            let previous = if input.make_default {
                flip_default_season(tx, season, now)?
            } else {
                None
            };
            tx.append(
                NewActivity::new(ActivityKind::SeasonCreate, author, now)
                    .refs(ActivityRefs {
                        season: Some(season),
                        ..ActivityRefs::default()
                    })
                    .detail(serde_json::json!({ "default": input.make_default, "previous_default": previous })),
            )?;
            Ok::<_, ControlError>(season)
        })?;
        info!(workflow = Self::NAME, season = %slug, "season created");
        Ok(key)
    }
}

/// Compare-and-set flip of the platform default season.
pub struct SeasonSetDefault;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetDefaultInput {
    pub target: String,
    /// Default the caller believes is current; `None` means "no default".
    pub expected_current: Option<String>,
}

#[async_trait]
impl Workflow for SeasonSetDefault {
    const NAME: &'static str = "season.set-default.v1";
    type Input = SetDefaultInput;
    type Output = Key<Season>;

    #[tracing::instrument(name = "season_set_default", skip_all, fields(season = %input.target))]
    async fn execute(&self, ctx: &WorkflowContext, input: SetDefaultInput) -> Result<Key<Season>, ControlError> {
        let services = ctx.services();
        let now = services.now();
        let author = ctx.caller();
        let key = services.store.transaction(|tx| {
            let target = lookup::<Season>(tx, &input.target, "target")?.id;
            let current = tx.default_season().map(|s| s.slug.to_string());
            if current != input.expected_current {
                return Err(ControlError::conflict(
                    EntityKind::Season,
                    &input.target,
                    format!(
                        "default season is {}, expected {}",
                        current.as_deref().unwrap_or("none"),
                        input.expected_current.as_deref().unwrap_or("none")
                    ),
                ));
            }
            if current.as_deref() == Some(input.target.as_str()) {
                return Err(ControlError::conflict(EntityKind::Season, &input.target, "already the default season"));
            }
            let previous = flip_default_season(tx, target, now)?;
            tx.append(
                NewActivity::new(ActivityKind::SeasonDefaultChange, author, now)
                    .refs(ActivityRefs {
                        season: Some(target),
                        ..ActivityRefs::default()
                    })
                    .detail(serde_json::json!({ "previous_default": previous })),
            )?;
            Ok(target)
        })?;
        info!(workflow = Self::NAME, season = %input.target, "default season changed");
        Ok(key)
    }
}

pub struct ChallengeAdd;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeAddInput {
    pub slug: String,
    pub name: String,
    pub description: String,
    pub author: String,
    pub locale: String,
    pub is_draft: bool,
    pub preview_url: Option<String>,
    pub homepage: Option<String>,
}

#[async_trait]
impl Workflow for ChallengeAdd {
    const NAME: &'static str = "challenge.add.v1";
    type Input = ChallengeAddInput;
    type Output = Key<Challenge>;

    #[tracing::instrument(name = "challenge_add", skip_all, fields(challenge = %input.slug))]
    async fn execute(&self, ctx: &WorkflowContext, input: ChallengeAddInput) -> Result<Key<Challenge>, ControlError> {
        let slug = require_input(&input.slug, "slug")?.to_string();
        let name = if input.name.trim().is_empty() { slug.clone() } else { input.name };
        let services = ctx.services();
        let now = services.now();
        let author = ctx.caller();
        let key = services.store.transaction(|tx| {
            let challenge = tx.insert(|id| Challenge {
                id,
                slug: Slug::new(slug.clone()),
                name,
                description: input.description,
                author: input.author,
                locale: input.locale,
                is_draft: input.is_draft,
                preview_url: input.preview_url,
                homepage: input.homepage,
                created_at: now,
                updated_at: now,
            })?;
            tx.append(NewActivity::new(ActivityKind::ChallengeCreate, author, now).refs(ActivityRefs {
                challenge: Some(challenge),
                ..ActivityRefs::default()
            }))?;
            Ok::<_, ControlError>(challenge)
        })?;
        info!(workflow = Self::NAME, challenge = %slug, "challenge created");
        Ok(key)
    }
}

pub struct ChallengeFlavorAdd;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlavorAddInput {
    pub challenge: String,
    pub version: String,
    /// Defaults to `{challenge}@{version}`.
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub bundle: String,
    #[serde(default)]
    pub purchase_price: u64,
    #[serde(default)]
    pub validation_reward: u64,
}

#[async_trait]
impl Workflow for ChallengeFlavorAdd {
    const NAME: &'static str = "challenge-flavor.add.v1";
    type Input = FlavorAddInput;
    type Output = Key<ChallengeFlavor>;

    #[tracing::instrument(name = "flavor_add", skip_all, fields(challenge = %input.challenge, version = %input.version))]
    async fn execute(&self, ctx: &WorkflowContext, input: FlavorAddInput) -> Result<Key<ChallengeFlavor>, ControlError> {
        let version = require_input(&input.version, "version")?.to_string();
        let services = ctx.services();
        let now = services.now();
        let author = ctx.caller();
        let key = services.store.transaction(|tx| {
            let challenge = lookup::<Challenge>(tx, &input.challenge, "challenge")?;
            let slug = match input.slug.as_deref().map(str::trim) {
                Some(slug) if !slug.is_empty() => Slug::new(slug),
                _ => Slug::new(format!("{}@{}", challenge.slug, version)),
            };
            let challenge = challenge.id;
            let flavor = tx.insert(|id| ChallengeFlavor {
                id,
                slug,
                challenge,
                version: version.clone(),
                bundle: input.bundle.clone(),
                purchase_price: input.purchase_price,
                validation_reward: input.validation_reward,
                created_at: now,
                updated_at: now,
            })?;
            tx.append(NewActivity::new(ActivityKind::ChallengeFlavorCreate, author, now).refs(ActivityRefs {
                challenge: Some(challenge),
                challenge_flavor: Some(flavor),
                ..ActivityRefs::default()
            }))?;
            Ok::<_, ControlError>(flavor)
        })?;
        info!(workflow = Self::NAME, challenge = %input.challenge, %version, "flavor created");
        Ok(key)
    }
}

/// List a flavor in a season's catalog.
pub struct SeasonChallengeAdd;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonChallengeAddInput {
    pub season: String,
    pub flavor: String,
}

#[async_trait]
impl Workflow for SeasonChallengeAdd {
    const NAME: &'static str = "season-challenge.add.v1";
    type Input = SeasonChallengeAddInput;
    type Output = Key<SeasonChallenge>;

    #[tracing::instrument(name = "season_challenge_add", skip_all, fields(season = %input.season, flavor = %input.flavor))]
    async fn execute(&self, ctx: &WorkflowContext, input: SeasonChallengeAddInput) -> Result<Key<SeasonChallenge>, ControlError> {
        let services = ctx.services();
        let now = services.now();
        let author = ctx.caller();
        let key = services.store.transaction(|tx| {
            let season = lookup::<Season>(tx, &input.season, "season")?.id;
            let flavor = lookup::<ChallengeFlavor>(tx, &input.flavor, "flavor")?;
            let (flavor, challenge) = (flavor.id, flavor.challenge);
            let listed = tx.insert(|id| SeasonChallenge {
                id,
                slug: Slug::new(format!("{}/{}", input.season, input.flavor)),
                season,
                flavor,
                created_at: now,
            })?;
            tx.append(NewActivity::new(ActivityKind::SeasonChallengeCreate, author, now).refs(ActivityRefs {
                season: Some(season),
                season_challenge: Some(listed),
                challenge_flavor: Some(flavor),
                challenge: Some(challenge),
                ..ActivityRefs::default()
            }))?;
            Ok::<_, ControlError>(listed)
        })?;
        info!(workflow = Self::NAME, season = %input.season, flavor = %input.flavor, "flavor listed in season");
        Ok(key)
    }
}

/// The caller's active team subscribes to a challenge of its season.
pub struct TeamSubscribe;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeInput {
    pub season_challenge: String,
}

#[async_trait]
impl Workflow for TeamSubscribe {
    const NAME: &'static str = "team.subscribe.v1";
    type Input = SubscribeInput;
    type Output = Key<ChallengeSubscription>;

    #[tracing::instrument(name = "team_subscribe", skip_all, fields(season_challenge = %input.season_challenge))]
    async fn execute(&self, ctx: &WorkflowContext, input: SubscribeInput) -> Result<Key<ChallengeSubscription>, ControlError> {
        let services = ctx.services();
        let now = services.now();
        let slug = services.slug(EntityKind::ChallengeSubscription);
        let key = services.store.transaction(|tx| {
            let caller = ctx.require_caller(tx)?;
            let listed = lookup::<SeasonChallenge>(tx, &input.season_challenge, "season_challenge")?.clone();
            let member_key = tx
                .require(caller)?
                .active_team_member
                .ok_or_else(|| ControlError::not_found(EntityKind::TeamMember, "active"))?;
            let team = tx.require(tx.require(member_key)?.team)?.clone();
            if team.season != listed.season {
                return Err(ControlError::conflict(
                    EntityKind::SeasonChallenge,
                    &listed.slug,
                    format!("team {} plays another season", team.slug),
                ));
            }
            let already = tx.rows::<ChallengeSubscription>().any(|s| {
                s.team == team.id && s.season_challenge == listed.id && s.status == SubscriptionStatus::Active
            });
            if already {
                return Err(ControlError::conflict(EntityKind::SeasonChallenge, &listed.slug, "already subscribed"));
            }
            let challenge = tx.require(listed.flavor)?.challenge;
            let subscription = tx.insert(|id| ChallengeSubscription {
                id,
                slug,
                team: team.id,
                season_challenge: listed.id,
                buyer: caller,
                status: SubscriptionStatus::Active,
                created_at: now,
            })?;
            tx.append(NewActivity::new(ActivityKind::ChallengeSubscribe, Some(caller), now).refs(ActivityRefs {
                team: Some(team.id),
                user: Some(caller),
                organization: Some(team.organization),
                season: Some(team.season),
                season_challenge: Some(listed.id),
                challenge_subscription: Some(subscription),
                challenge_flavor: Some(listed.flavor),
                challenge: Some(challenge),
                team_member: Some(member_key),
                ..ActivityRefs::default()
            }))?;
            Ok(subscription)
        })?;
        info!(workflow = Self::NAME, season_challenge = %input.season_challenge, "team subscribed");
        Ok(key)
    }
}
