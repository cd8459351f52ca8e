mod common;

use bastion_core::app::workflows::{InviteAccept, InviteAcceptInput, InviteSend, InviteSendInput, Onboarded};
use bastion_core::domain::{Activity, ActivityKind, DeletionStatus, TeamInvite, TeamMember};
use bastion_core::ErrorKind;
use common::Platform;

async fn invite_bob(p: &Platform) -> (Onboarded, Onboarded) {
    let alice = p.onboard("alice").await;
    let bob = p.onboard("bob").await;
    let team = p.plane.snapshot().get(alice.team).unwrap().slug.to_string();
    p.plane
        .run(
            &InviteSend,
            Some(alice.user),
            InviteSendInput {
                team,
                user: "bob".into(),
                slug: Some("inv-1".into()),
            },
        )
        .await
        .unwrap();
    (alice, bob)
}

fn accept() -> InviteAcceptInput {
    InviteAcceptInput {
        team_invite: "inv-1".into(),
    }
}

#[tokio::test]
async fn accepting_joins_the_team_and_consumes_the_invite() {
    let p = Platform::seeded().await;
    let (alice, bob) = invite_bob(&p).await;
    let before = p.plane.snapshot().count::<Activity>();

    let accepted = p.plane.run(&InviteAccept, Some(bob.user), accept()).await.unwrap();
    assert_eq!(accepted.team, alice.team);
    assert_eq!(accepted.retired_team_member, Some(bob.team_member));

    let t = p.plane.snapshot();
    let member = t.get(accepted.team_member).unwrap();
    assert_eq!((member.team, member.user), (alice.team, bob.user));
    assert!(t.by_slug::<TeamInvite>("inv-1").is_none());
    assert_eq!(t.get(bob.team_member).unwrap().deletion_status, DeletionStatus::Deleted);
    assert_eq!(t.get(bob.user).unwrap().active_team_member, Some(accepted.team_member));

    let new: Vec<&Activity> = t.rows::<Activity>().skip(before).collect();
    assert_eq!(new.len(), 1);
    assert_eq!(new[0].kind, ActivityKind::TeamInviteAccept);
    assert_eq!(new[0].author, Some(bob.user));
    assert_eq!(new[0].refs.team, Some(alice.team));
    assert_eq!(new[0].refs.team_member, Some(accepted.team_member));
    assert_eq!(new[0].refs.organization, Some(alice.organization));

    let again = p.plane.run(&InviteAccept, Some(bob.user), accept()).await.unwrap_err();
    assert_eq!(again.kind(), ErrorKind::NotFound);
    assert_eq!(p.plane.snapshot().count::<Activity>(), before + 1);
}

#[tokio::test]
async fn only_the_invitee_can_accept() {
    let p = Platform::seeded().await;
    let (alice, _bob) = invite_bob(&p).await;
    let err = p.plane.run(&InviteAccept, Some(alice.user), accept()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(p.plane.snapshot().by_slug::<TeamInvite>("inv-1").is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acceptances_have_exactly_one_winner() {
    let p = Platform::seeded().await;
    let (_alice, bob) = invite_bob(&p).await;
    let members_before = p.plane.snapshot().count::<TeamMember>();
    let activities_before = p.plane.snapshot().count::<Activity>();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let plane = p.plane.clone();
            tokio::spawn(async move { plane.run(&InviteAccept, Some(bob.user), accept()).await })
        })
        .collect();
    let mut won = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(err) => assert_eq!(err.kind(), ErrorKind::NotFound),
        }
    }

    assert_eq!(won, 1);
    let t = p.plane.snapshot();
    assert_eq!(t.count::<TeamMember>(), members_before + 1);
    assert_eq!(t.count::<Activity>(), activities_before + 1);
    t.verify().unwrap();
}
