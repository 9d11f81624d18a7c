//! Spawned tasks, chat scopes and shutdown, driven on paused time.

mod common;

use std::time::Duration;

use tokio::time::sleep;

use common::{channel, space, user, FakeState, Harness};
use spaces_client::{SyncEvent, Topic};
use spaces_shared::{SpaceId, UserId};

/// Ada (1) owns "Studio" (1) with one channel shared with Grace (2).
fn studio() -> Harness {
    let mut ada = user(1, "Ada");
    ada.spaces = vec![SpaceId(1)];
    ada.friends = vec![UserId(2), UserId(3)];

    let mut state = FakeState::default();
    state.users = vec![ada.clone(), user(2, "Grace"), user(3, "Linus"), user(4, "Barbara")];
    state.spaces = vec![space(1, "Studio", 1, vec![channel(10, "general", &[1, 2])])];
    Harness::new(&ada, state)
}

fn log_len(h: &Harness) -> usize {
    h.backend.state().log.len()
}

#[tokio::test(start_paused = true)]
async fn periodic_tasks_survive_a_failed_tick() {
    let h = studio();
    h.backend.state().failures.insert("fetch_users", 1);
    h.engine.start(None);

    sleep(Duration::from_millis(4_500)).await;
    assert!(h.backend.requests("fetch_users") >= 3);
    let snap = h.engine.snapshot();
    assert_eq!(snap.user.map(|u| u.id), Some(UserId(1)));
    assert_eq!(snap.spaces.len(), 1);
    assert!(h.engine.is_running());
}

#[tokio::test(start_paused = true)]
async fn stop_aborts_every_task() {
    let h = studio();
    h.engine.start(None);
    sleep(Duration::from_millis(2_500)).await;
    assert!(log_len(&h) > 0);

    h.engine.stop();
    assert!(!h.engine.is_running());
    let seen = log_len(&h);
    sleep(Duration::from_secs(20)).await;
    assert_eq!(log_len(&h), seen);
}

#[tokio::test(start_paused = true)]
async fn session_loss_stops_periodic_tasks() {
    let mut h = studio();
    h.backend.state().unauthorized = true;
    h.engine.start(None);

    sleep(Duration::from_secs(10)).await;
    assert!(h.engine.context().is_expired());
    assert_eq!(h.backend.requests("fetch_users"), 1);
    let expired = h
        .drain()
        .into_iter()
        .filter(|e| *e == SyncEvent::SessionExpired)
        .count();
    assert_eq!(expired, 1);

    let seen = log_len(&h);
    sleep(Duration::from_secs(10)).await;
    assert_eq!(log_len(&h), seen);
}

#[tokio::test(start_paused = true)]
async fn leaving_a_chat_stops_its_poller() {
    let h = studio();
    h.engine.start(None);

    h.engine.open_dm(UserId(2)).await.unwrap();
    sleep(Duration::from_millis(3_500)).await;
    let grace = "fetch_messages dm_1_2";
    assert!(h.backend.hits(grace) >= 4);

    // Switching chats drops the old scope.
    h.engine.open_dm(UserId(3)).await.unwrap();
    let after_switch = h.backend.hits(grace);
    sleep(Duration::from_millis(3_500)).await;
    assert_eq!(h.backend.hits(grace), after_switch);

    let linus = "fetch_messages dm_1_3";
    assert!(h.backend.hits(linus) >= 4);
    h.engine.close_chat();
    let after_close = h.backend.hits(linus);
    let identity_ticks = h.backend.requests("fetch_users");
    sleep(Duration::from_secs(5)).await;
    assert_eq!(h.backend.hits(linus), after_close);

    // The engine itself keeps running.
    assert!(h.backend.requests("fetch_users") > identity_ticks);
}

#[tokio::test]
async fn open_space_refresh_merges_member_change() {
    let mut h = studio();
    h.engine.refresh_identity().await.unwrap();

    // Nothing open: no request.
    h.engine.refresh_active_space().await.unwrap();
    assert_eq!(h.backend.requests("fetch_spaces_by_ids"), 1);

    h.engine.open_space(SpaceId(1)).unwrap();
    assert!(h.engine.toggle_expanded(SpaceId(1)).unwrap());
    h.drain();
    h.backend.state().spaces[0].members.insert(UserId(4));

    h.engine.refresh_active_space().await.unwrap();
    let snap = h.engine.snapshot();
    let studio = snap.space(SpaceId(1)).unwrap();
    assert!(studio.members.contains(&UserId(4)));
    assert!(studio.expanded);
    assert!(h.drain().contains(&SyncEvent::StateChanged(Topic::Spaces)));

    // Unchanged on the next tick.
    h.engine.refresh_active_space().await.unwrap();
    assert!(h.drain().is_empty());
}

#[tokio::test]
async fn space_fetched_after_navigating_away_is_discarded() {
    let h = studio();
    h.engine.refresh_identity().await.unwrap();
    h.engine.open_space(SpaceId(1)).unwrap();
    h.backend.state().spaces[0].members.insert(UserId(4));

    let release = h.backend.hold_space_fetch();
    let (result, ()) = tokio::join!(h.engine.refresh_active_space(), async {
        h.engine.go_home();
        let _ = release.send(());
    });
    result.unwrap();

    let snap = h.engine.snapshot();
    assert!(!snap.space(SpaceId(1)).unwrap().members.contains(&UserId(4)));
}
