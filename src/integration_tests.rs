//! End-to-end tests over the real admission/loop/routing path: mock model
//! behind the real Agent, behind the real TaskManager and OutputRouter.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::manager::{BUSY_NOTICE, INTERRUPTED_NOTICE};
use crate::testing::{full_stack, CaptureChannel, EchoTool, MockProvider};
use crate::types::{SubmitOutcome, Turn, SOURCE_SCHEDULER};

#[tokio::test]
async fn busy_slot_rejects_then_frees() {
    let provider = Arc::new(
        MockProvider::with_responses(vec!["first done".into(), "second done".into()])
            .with_delay(Duration::from_millis(150)),
    );
    let console = Arc::new(CaptureChannel::new("console"));
    let telegram = Arc::new(CaptureChannel::new("telegram"));
    let (manager, _router) =
        full_stack(provider, vec![], vec![console.clone(), telegram.clone()]).await;

    assert_eq!(
        manager
            .submit(Turn::new("console", None, "slow question"))
            .await
            .unwrap(),
        SubmitOutcome::Admitted
    );
    sleep(Duration::from_millis(40)).await;

    // While busy, a second request bounces with guidance, addressed to the
    // requester's own reply target.
    assert_eq!(
        manager
            .submit(Turn::new("telegram", Some("42".into()), "me too"))
            .await
            .unwrap(),
        SubmitOutcome::RejectedBusy
    );
    assert_eq!(
        telegram.sent().await,
        vec![(Some("42".to_string()), BUSY_NOTICE.to_string())]
    );

    sleep(Duration::from_millis(250)).await;
    assert!(!manager.is_busy().await);
    assert_eq!(console.texts().await, vec!["first done".to_string()]);

    // Slot is free again.
    assert_eq!(
        manager
            .submit(Turn::new("telegram", Some("42".into()), "me too"))
            .await
            .unwrap(),
        SubmitOutcome::Admitted
    );
    sleep(Duration::from_millis(250)).await;
    assert_eq!(telegram.sent().await.last().unwrap().1, "second done");
}

#[tokio::test]
async fn stop_cancels_and_notice_goes_to_interrupted_source() {
    let provider = Arc::new(
        MockProvider::with_responses(vec!["never delivered".into()])
            .with_delay(Duration::from_millis(400)),
    );
    let console = Arc::new(CaptureChannel::new("console"));
    let telegram = Arc::new(CaptureChannel::new("telegram"));
    let (manager, _router) =
        full_stack(provider, vec![], vec![console.clone(), telegram.clone()]).await;

    manager
        .submit(Turn::new("console", None, "long running"))
        .await
        .unwrap();
    sleep(Duration::from_millis(40)).await;

    assert_eq!(
        manager
            .submit(Turn::new("telegram", Some("42".into()), "stop"))
            .await
            .unwrap(),
        SubmitOutcome::CancelRequested
    );
    sleep(Duration::from_millis(80)).await;

    assert!(!manager.is_busy().await);
    // The interruption is reported where the cancelled turn came from, and
    // its answer never lands anywhere.
    assert_eq!(console.texts().await, vec![INTERRUPTED_NOTICE.to_string()]);
    assert!(telegram.sent().await.is_empty());
}

#[tokio::test]
async fn scheduler_preempts_and_output_is_broadcast() {
    let provider = Arc::new(
        MockProvider::with_responses(vec!["job done".into()])
            .with_delay(Duration::from_millis(120)),
    );
    let console = Arc::new(CaptureChannel::new("console"));
    let (manager, _router) = full_stack(provider, vec![], vec![console.clone()]).await;

    manager
        .submit(Turn::new("console", None, "long running"))
        .await
        .unwrap();
    sleep(Duration::from_millis(30)).await;

    // The scheduler does not queue behind the user turn; it takes the slot
    // after the grace window.
    assert_eq!(
        manager
            .submit(Turn::new(SOURCE_SCHEDULER, None, "daily report"))
            .await
            .unwrap(),
        SubmitOutcome::Admitted
    );
    sleep(Duration::from_millis(300)).await;

    let texts = console.texts().await;
    assert!(texts.contains(&INTERRUPTED_NOTICE.to_string()));
    assert!(texts.contains(&"job done".to_string()));
    assert!(!manager.is_busy().await);
}

#[tokio::test]
async fn scheduler_broadcast_reaches_every_recent_surface() {
    let provider = Arc::new(MockProvider::with_responses(vec![
        "hi console".into(),
        "hi telegram".into(),
        "daily report".into(),
    ]));
    let console = Arc::new(CaptureChannel::new("console"));
    let telegram = Arc::new(CaptureChannel::new("telegram"));
    let (manager, router) =
        full_stack(provider, vec![], vec![console.clone(), telegram.clone()]).await;

    // Two surfaces become active, plus one live connection.
    manager
        .submit(Turn::new("console", None, "hello"))
        .await
        .unwrap();
    sleep(Duration::from_millis(50)).await;
    manager
        .submit(Turn::new("telegram", Some("42".into()), "hello"))
        .await
        .unwrap();
    sleep(Duration::from_millis(50)).await;
    let (tx, mut rx) = tokio::sync::mpsc::channel(4);
    router.register_live("ipc_peer", tx).await;

    manager
        .submit(Turn::new(SOURCE_SCHEDULER, None, "do the rounds"))
        .await
        .unwrap();
    sleep(Duration::from_millis(50)).await;

    assert!(console.texts().await.contains(&"daily report".to_string()));
    assert!(telegram
        .sent()
        .await
        .contains(&(Some("42".to_string()), "daily report".to_string())));
    assert_eq!(rx.recv().await.unwrap(), "daily report");
}

#[tokio::test]
async fn tool_turn_delivers_in_order() {
    let provider = Arc::new(MockProvider::with_responses(vec![
        r#"{"tool": "echo", "args": {"text": "pong"}, "message": "Pinging..."}"#.into(),
        "All sorted.".into(),
    ]));
    let console = Arc::new(CaptureChannel::new("console"));
    let (manager, _router) = full_stack(
        provider,
        vec![Arc::new(EchoTool::new("echo"))],
        vec![console.clone()],
    )
    .await;

    manager
        .submit(Turn::new("console", None, "ping please"))
        .await
        .unwrap();
    sleep(Duration::from_millis(80)).await;

    // Progress notice, then the tool's output, then the final answer.
    assert_eq!(
        console.texts().await,
        vec![
            "Pinging...".to_string(),
            "pong".to_string(),
            "All sorted.".to_string()
        ]
    );
    assert!(!manager.is_busy().await);
}
