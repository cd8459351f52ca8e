mod common;

use bastion_core::app::workflows::{InstanceProvisioning, ProvisionInput, ProvisionedInstance};
use bastion_core::domain::{Activity, ActivityKind, ChallengeInstance, InstanceStatus, ReportedStatus};
use bastion_core::impls::StartScript;
use bastion_core::ErrorKind;
use chrono::Duration;
use common::{AGENT, FLAVOR, Platform};

async fn provision(p: &Platform) -> ProvisionedInstance {
    p.plane
        .run(
            &InstanceProvisioning,
            None,
            ProvisionInput {
                flavor: FLAVOR.into(),
                agent: AGENT.into(),
                config: None,
            },
        )
        .await
        .unwrap()
}

fn statuses(p: &Platform) -> Vec<InstanceStatus> {
    p.plane.snapshot().rows::<ChallengeInstance>().map(|i| i.status).collect()
}

#[tokio::test]
async fn a_missing_identifier_does_not_abort_the_others() {
    let p = Platform::seeded().await;
    let i1 = provision(&p).await;
    p.fleet.report(i1.handle.as_deref().unwrap(), ReportedStatus::Error);

    let outcomes = p.plane.fleet().redump(vec![i1.slug.to_string(), "i-2".into()]).await;
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].identifier, i1.slug.as_str());
    let report = outcomes[0].result.as_ref().unwrap();
    assert_eq!(report.checked, vec![i1.slug.clone()]);
    assert_eq!(report.changed.len(), 1);
    assert_eq!(outcomes[1].identifier, "i-2");
    assert_eq!(outcomes[1].result.as_ref().unwrap_err().kind(), ErrorKind::NotFound);

    let t = p.plane.snapshot();
    assert_eq!(t.get(i1.instance).unwrap().status, InstanceStatus::Error);
    let last = t.rows::<Activity>().last().unwrap();
    assert_eq!(last.kind, ActivityKind::InstanceRedump);
    assert_eq!(last.refs.challenge_instance, Some(i1.instance));
}

#[tokio::test]
async fn redump_twice_changes_nothing_the_second_time() {
    let p = Platform::seeded().await;
    let a = provision(&p).await;
    let b = provision(&p).await;
    p.fleet.report(a.handle.as_deref().unwrap(), ReportedStatus::Unavailable);
    p.fleet.report(b.handle.as_deref().unwrap(), ReportedStatus::Error);
    let ids = vec![FLAVOR.to_string(), AGENT.to_string()];

    p.plane.fleet().redump(ids.clone()).await;
    let activities = p.plane.snapshot().count::<Activity>();
    let after_first = statuses(&p);
    assert_eq!(after_first, vec![InstanceStatus::Unavailable, InstanceStatus::Error]);

    let second = p.plane.fleet().redump(ids).await;
    assert!(second.iter().all(|o| o.result.as_ref().unwrap().changed.is_empty()));
    assert_eq!(p.plane.snapshot().count::<Activity>(), activities);
    assert_eq!(statuses(&p), after_first);
}

#[tokio::test]
async fn unreachable_agent_fails_only_its_own_identifier() {
    let p = Platform::seeded().await;
    let i1 = provision(&p).await;
    p.fleet.cut_off(AGENT);

    let outcomes = p.plane.fleet().redump(vec![i1.slug.to_string(), "".into()]).await;
    assert_eq!(outcomes[0].result.as_ref().unwrap_err().kind(), ErrorKind::UpstreamUnavailable);
    assert_eq!(outcomes[1].result.as_ref().unwrap_err().kind(), ErrorKind::MissingInput);
    assert_eq!(p.plane.snapshot().get(i1.instance).unwrap().status, InstanceStatus::Available);
}

#[tokio::test]
async fn heartbeat_between_redumps_does_not_undo_the_agent_report() {
    let p = Platform::seeded().await;
    let i1 = provision(&p).await;
    p.fleet.report(i1.handle.as_deref().unwrap(), ReportedStatus::Unavailable);
    let fleet = p.plane.fleet();

    let first = fleet.redump(vec![i1.slug.to_string()]).await;
    assert_eq!(first[0].result.as_ref().unwrap().changed.len(), 1);
    let activities = p.plane.snapshot().count::<Activity>();

    assert!(fleet.heartbeat(AGENT).unwrap().recovered.is_empty());
    let second = fleet.redump(vec![i1.slug.to_string()]).await;
    assert!(second[0].result.as_ref().unwrap().changed.is_empty());
    assert_eq!(p.plane.snapshot().get(i1.instance).unwrap().status, InstanceStatus::Unavailable);
    assert_eq!(p.plane.snapshot().count::<Activity>(), activities);
}

#[tokio::test]
async fn starting_instance_is_not_demoted_or_promoted_without_the_agent() {
    let p = Platform::seeded().await;
    p.fleet.script_start(AGENT, StartScript::Ack(ReportedStatus::Unavailable));
    let i1 = provision(&p).await;
    assert_eq!(statuses(&p), vec![InstanceStatus::Starting]);
    let fleet = p.plane.fleet();
    let activities = p.plane.snapshot().count::<Activity>();

    let outcomes = fleet.redump(vec![i1.slug.to_string()]).await;
    assert!(outcomes[0].result.as_ref().unwrap().changed.is_empty());
    assert!(fleet.heartbeat(AGENT).unwrap().recovered.is_empty());
    assert_eq!(statuses(&p), vec![InstanceStatus::Starting]);
    assert_eq!(p.plane.snapshot().count::<Activity>(), activities);
}

#[tokio::test]
async fn swept_instances_come_back_on_the_next_heartbeat() {
    let p = Platform::seeded().await;
    let i1 = provision(&p).await;
    let fleet = p.plane.fleet();

    p.clock.advance(Duration::minutes(5));
    let swept = fleet.sweep_stale_agents(fleet.now());
    assert_eq!(swept.len(), 1);
    assert!(p.plane.snapshot().get(i1.instance).unwrap().stale);

    let report = fleet.heartbeat(AGENT).unwrap();
    assert_eq!(report.recovered.len(), 1);
    let t = p.plane.snapshot();
    let instance = t.get(i1.instance).unwrap();
    assert_eq!(instance.status, InstanceStatus::Available);
    assert!(!instance.stale);
}
