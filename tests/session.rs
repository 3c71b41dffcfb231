mod common;

use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use eyegaze::{
    GazeError,
    config::{SessionConfig, StoreConfig, TrainingConfig},
    orchestrator::Phase,
    session::Session,
    store::{DirectoryStore, RoundStore},
};
use tokio::time::{sleep, timeout};

fn config() -> SessionConfig {
    SessionConfig {
        sample_interval_ms: 10,
        round_ms: 200,
        rounds: 2,
        train_ratio: 0.75,
        predict_interval_ms: 10,
        seed: Some(11),
        training: TrainingConfig {
            epochs: NonZeroUsize::new(3).unwrap(),
            ..TrainingConfig::default()
        },
        ..SessionConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn session_trains_and_predicts() {
    let session = Session::start(config(), common::sources(None, Duration::from_millis(5))).unwrap();
    assert_eq!(session.phase(), Phase::Collecting);
    assert!(!session.retry());

    let mut phases = session.phases();
    let ready = tokio::time::timeout(
        Duration::from_secs(30),
        phases.wait_for(|phase| *phase == Phase::Ready),
    )
    .await;
    tokio_test::assert_ok!(ready.expect("the model wasn't trained in time"));

    let mut predictions = session.predictions();
    let prediction = *tokio::time::timeout(
        Duration::from_secs(10),
        predictions.wait_for(Option::is_some),
    )
    .await
    .expect("no prediction was published")
    .unwrap();
    let prediction = prediction.unwrap();

    assert!(prediction.normalized.iter().all(|v| v.is_finite()));
    let back = common::VIEWPORT.normalize(prediction.point);
    assert!((back[0] - prediction.normalized[0]).abs() < 1e-4);
    assert!((back[1] - prediction.normalized[1]).abs() < 1e-4);

    let status = session.status();
    assert_eq!(status.phase, Phase::Ready);
    assert!(status.elapsed_ms >= 400);

    session.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn aborted_sessions_wait_for_an_explicit_retry() {
    // Every sample lands in validation, so the train set is empty and training fails.
    let config = SessionConfig {
        train_ratio: 1e-9,
        ..config()
    };
    let session = Session::start(config, common::sources(None, Duration::from_millis(5))).unwrap();
    let mut phases = session.phases();

    timeout(Duration::from_secs(30), phases.wait_for(|p| *p == Phase::Aborted))
        .await
        .expect("training never aborted")
        .unwrap();

    sleep(Duration::from_millis(100)).await;
    assert_eq!(session.phase(), Phase::Aborted);
    assert!(session.status().elapsed_ms >= 400);
    assert!(session.predictions().borrow().is_none());

    assert!(session.retry());
    timeout(Duration::from_secs(10), phases.wait_for(|p| *p == Phase::Collecting))
        .await
        .expect("collection didn't restart")
        .unwrap();
    assert!(session.status().elapsed_ms < 400);

    timeout(Duration::from_secs(30), phases.wait_for(|p| *p == Phase::Aborted))
        .await
        .expect("the second run never aborted")
        .unwrap();

    session.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stopping_keeps_closed_rounds() {
    let dir = std::env::temp_dir().join(format!("eyegaze-session-{}", std::process::id()));
    let config = SessionConfig {
        rounds: 5,
        store: StoreConfig::Directory { path: dir.clone() },
        ..config()
    };
    let session = Session::start(config, common::sources(None, Duration::from_millis(5))).unwrap();

    timeout(Duration::from_secs(10), async {
        while session.status().round < 1 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("round 0 never closed");
    session.stop().await;

    let store = RoundStore::new(Arc::new(DirectoryStore::new(&dir)), "eyegaze");
    let round = store.load(0).await.unwrap().expect("round 0 wasn't written");
    assert_eq!(round.train.len() + round.val.len(), 20);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn session_notices_the_end_of_the_source() {
    let session = Session::start(config(), common::sources(Some(3), Duration::from_millis(1))).unwrap();

    tokio::time::timeout(Duration::from_secs(5), session.source_finished())
        .await
        .unwrap();

    assert_eq!(session.phase(), Phase::Collecting);
    assert!(session.predictions().borrow().is_none());
    session.stop().await;
}

#[tokio::test]
async fn invalid_configs_are_rejected() {
    let config = SessionConfig {
        rounds: 0,
        ..config()
    };

    let res = Session::start(config, common::sources(Some(1), Duration::from_millis(1)));
    assert!(matches!(res, Err(GazeError::InvalidConfig(_))));
}
