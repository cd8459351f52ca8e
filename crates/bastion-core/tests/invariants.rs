//! Properties that hold after any sequence of workflow executions.

mod common;

use std::collections::HashMap;

use bastion_core::domain::{Activity, Agent, Key, Season, Team, User};
use bastion_core::{ControlPlane, ErrorKind};
use common::{Platform, claims};
use serde_json::{Value, json};

/// Dispatch by name; a completed workflow must add exactly one activity,
/// a failed one none.
async fn step(plane: &ControlPlane, caller: Option<Key<User>>, name: &str, input: Value) -> Result<Value, ErrorKind> {
    let before = plane.snapshot().count::<Activity>();
    let result = plane.dispatch(name, caller, input).await;
    let added = plane.snapshot().count::<Activity>() - before;
    match result {
        Ok(out) => {
            assert_eq!(added, 1, "{name} should write exactly one activity");
            Ok(out)
        }
        Err(err) => {
            assert_eq!(added, 0, "{name} failed with {err} but wrote activities");
            Err(err.kind())
        }
    }
}

fn assert_single_defaults(plane: &ControlPlane) {
    let t = plane.snapshot();
    t.verify().unwrap();
    assert!(t.rows::<Season>().filter(|s| s.is_default).count() <= 1);
    assert!(t.rows::<Agent>().filter(|a| a.default_agent).count() <= 1);
    let mut per_org: HashMap<_, usize> = HashMap::new();
    for team in t.rows::<Team>().filter(|t| t.is_default) {
        *per_org.entry(team.organization).or_default() += 1;
    }
    assert!(per_org.values().all(|&n| n == 1));
}

#[tokio::test]
async fn default_flags_stay_unique_across_workflows() {
    let p = Platform::seeded().await;
    let plane = &p.plane;
    assert_single_defaults(plane);

    step(plane, None, "season.create.v1", json!({ "slug": "s2", "name": "Season 2", "make_default": true }))
        .await
        .unwrap();
    assert_eq!(plane.snapshot().default_season().unwrap().slug.as_str(), "s2");
    assert_single_defaults(plane);

    // A stale expectation loses the compare-and-set.
    let lost = step(
        plane,
        None,
        "season.set-default.v1",
        json!({ "target": "s1", "expected_current": "s1" }),
    )
    .await;
    assert_eq!(lost.unwrap_err(), ErrorKind::Conflict);
    step(plane, None, "season.set-default.v1", json!({ "target": "s1", "expected_current": "s2" }))
        .await
        .unwrap();
    assert_single_defaults(plane);

    step(plane, None, "agent.register.v1", json!({ "hostname": "agent-2", "default_agent": true }))
        .await
        .unwrap();
    assert_eq!(plane.snapshot().default_agent().unwrap().slug.as_str(), "agent-2");
    assert_single_defaults(plane);
    step(
        plane,
        None,
        "agent.set-default.v1",
        json!({ "target": "agent-1", "expected_current": "agent-2" }),
    )
    .await
    .unwrap();
    assert_single_defaults(plane);

    for name in ["alice", "bob", "carol"] {
        step(plane, None, "user.onboard.v1", serde_json::to_value(claims(&format!("sub-{name}"), name)).unwrap())
            .await
            .unwrap();
    }
    assert_single_defaults(plane);

    let t = plane.snapshot();
    let alice = t.key_by_slug::<User>("alice").unwrap();
    let bob = t.key_by_slug::<User>("bob").unwrap();
    let alice_team = t.get(t.get(alice).unwrap().active_team_member.unwrap()).unwrap().team;
    let team_slug = t.get(alice_team).unwrap().slug.to_string();
    drop(t);

    step(
        plane,
        Some(alice),
        "team-invite.send.v1",
        json!({ "team": team_slug, "user": "bob", "slug": "inv-1" }),
    )
    .await
    .unwrap();
    step(plane, Some(bob), "team-invite.accept.v1", json!({ "team_invite": "inv-1" }))
        .await
        .unwrap();
    let gone = step(plane, Some(bob), "team-invite.accept.v1", json!({ "team_invite": "inv-1" })).await;
    assert_eq!(gone.unwrap_err(), ErrorKind::NotFound);
    assert_single_defaults(plane);

    step(plane, Some(bob), "user.delete.v1", json!({})).await.unwrap();
    assert_single_defaults(plane);
}

#[tokio::test]
async fn invalid_input_writes_nothing() {
    let p = Platform::seeded().await;
    let missing = step(&p.plane, None, "season.create.v1", json!({ "slug": " ", "name": "blank" })).await;
    assert_eq!(missing.unwrap_err(), ErrorKind::MissingInput);
    let duplicate = step(&p.plane, None, "season.create.v1", json!({ "slug": "s1", "name": "again" })).await;
    assert_eq!(duplicate.unwrap_err(), ErrorKind::Conflict);
    let unknown = step(&p.plane, None, "season.explode.v1", json!({})).await;
    assert_eq!(unknown.unwrap_err(), ErrorKind::Internal);
}
