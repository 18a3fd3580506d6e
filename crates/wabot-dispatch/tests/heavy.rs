mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use tokio::sync::Semaphore;
use wabot_dispatch::{messages, Command, CommandDescriptor, InboundMessage, Outcome};

#[tokio::test]
async fn fourth_heavy_command_is_busy_until_one_finishes() {
    let gate = Arc::new(Semaphore::new(0));
    let slow = Scripted::new(
        CommandDescriptor::new("slow", "download")
            .heavy()
            .cooldown(Duration::ZERO),
        Behaviour::Wait(Arc::clone(&gate)),
    );
    let h = Harness::with(config(), vec![slow.clone() as Arc<dyn Command>]);
    let users = ["628201000001", "628201000002", "628201000003", "628201000004"];
    for user in users {
        h.allow(user);
    }
    let throttle = || h.security().throttle().in_flight();

    let mut running = Vec::new();
    for user in &users[..3] {
        let dispatcher = Arc::clone(&h.dispatcher);
        let msg = InboundMessage::direct(*user, ".slow");
        running.push(tokio::spawn(async move { dispatcher.handle_inbound(msg).await }));
    }
    wait_until(|| throttle() == 3).await;

    assert_eq!(h.dm(users[3], ".slow").await, Outcome::Busy);
    assert_eq!(h.sink.last_to(users[3]).as_deref(), Some(messages::BUSY));
    assert_eq!(throttle(), 3);
    assert_eq!(slow.runs(), 3);

    gate.add_permits(1);
    wait_until(|| throttle() == 2).await;

    let dispatcher = Arc::clone(&h.dispatcher);
    let fourth = tokio::spawn(async move {
        dispatcher
            .handle_inbound(InboundMessage::direct(users[3], ".slow"))
            .await
    });
    wait_until(|| throttle() == 3).await;

    gate.add_permits(3);
    assert_eq!(fourth.await.unwrap(), Outcome::Completed);
    for task in running {
        assert_eq!(task.await.unwrap(), Outcome::Completed);
    }
    assert_eq!(throttle(), 0);
    assert_eq!(slow.runs(), 4);
}

#[tokio::test]
async fn failed_heavy_command_releases_its_slot() {
    let mut config = config();
    config.limits.max_heavy_concurrency = 1;
    let broken = Scripted::new(
        CommandDescriptor::new("broken", "download").heavy(),
        Behaviour::Fail("ffmpeg exited with status 1"),
    );
    let h = Harness::with(config, vec![broken.clone() as Arc<dyn Command>]);
    h.allow("628201000009");

    for _ in 0..3 {
        assert_eq!(h.dm("628201000009", ".broken").await, Outcome::Failed);
        assert_eq!(h.security().throttle().in_flight(), 0);
    }
    assert_eq!(broken.runs(), 3);
}
