use futures::future::join_all;
use std::sync::Arc;
use tradectl::{
    AppConfig, ControlError, ControlPlane, ControlState, MemoryStore, PauseCoordinator,
};

fn coordinator() -> Arc<PauseCoordinator<MemoryStore>> {
    Arc::new(PauseCoordinator::new(Arc::new(MemoryStore::new())))
}

#[tokio::test]
async fn empty_log_reads_as_running_and_is_stable() {
    let coordinator = coordinator();

    let first = coordinator.get_state().await.unwrap();
    let second = coordinator.get_state().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.state(), ControlState::Running);
    assert!(!coordinator.is_paused().await.unwrap());
    assert!(coordinator.history(None).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_pauses_admit_exactly_one() {
    let coordinator = coordinator();

    let handles = (0..16).map(|i| {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            let actor = format!("orchestrator-{i}");
            let result = coordinator.request_pause(&actor, Some("risk limit")).await;
            result.map(|record| (actor, record))
        })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    for loser in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(loser, ControlError::InvalidTransition { .. }));
    }

    let (winner, record) = winners[0];
    let state = coordinator.get_state().await.unwrap();
    assert!(state.paused);
    assert_eq!(state.id, record.id);
    assert_eq!(state.paused_by.as_deref(), Some(winner.as_str()));
    assert_eq!(coordinator.history(None).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_resumes_admit_exactly_one() {
    let coordinator = coordinator();
    coordinator.request_pause("ops", None).await.unwrap();

    let handles = (0..8).map(|i| {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_resume(&format!("ops-{i}")).await })
    });
    let succeeded = join_all(handles)
        .await
        .into_iter()
        .filter(|joined| matches!(joined, Ok(Ok(_))))
        .count();

    assert_eq!(succeeded, 1);
    assert!(!coordinator.is_paused().await.unwrap());
}

#[tokio::test]
async fn transitions_are_one_shot() {
    let coordinator = coordinator();

    let err = coordinator.request_resume("ops").await.unwrap_err();
    assert!(matches!(err, ControlError::InvalidTransition { .. }));

    coordinator.request_pause("ops", Some("deploy")).await.unwrap();
    let err = coordinator.request_pause("ops", Some("again")).await.unwrap_err();
    assert!(matches!(err, ControlError::InvalidTransition { .. }));

    // Rejected attempts leave no trace
    assert_eq!(coordinator.history(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn audit_trail_alternates_in_creation_order() {
    let coordinator = coordinator();
    let cycles = 5;

    for i in 0..cycles {
        coordinator
            .request_pause("risk-desk", Some(&format!("cycle {i}")))
            .await
            .unwrap();
        coordinator.request_resume("ops").await.unwrap();
    }

    let history = coordinator.history(None).await.unwrap();
    assert_eq!(history.len(), cycles * 2);
    assert!(history.windows(2).all(|w| w[0].id < w[1].id));
    for (i, record) in history.iter().enumerate() {
        assert_eq!(record.paused, i % 2 == 0);
        if record.paused {
            assert!(record.paused_at.is_some() && record.resumed_at.is_none());
            assert_eq!(record.pause_reason.as_deref(), Some(format!("cycle {}", i / 2).as_str()));
        } else {
            assert!(record.resumed_at.is_some() && record.paused_at.is_none());
            assert_eq!(record.paused_by.as_deref(), Some("ops"));
        }
    }

    let tail = coordinator.history(Some(3)).await.unwrap();
    assert_eq!(tail, history[history.len() - 3..].to_vec());
    assert!(coordinator.history(Some(0)).await.is_err());
}

#[tokio::test]
async fn pause_is_visible_through_the_control_plane() {
    let config = AppConfig::default_config("postgres://localhost/tradectl_test");
    let plane = ControlPlane::with_store(Arc::new(MemoryStore::new()), &config).unwrap();

    plane
        .coordinator()
        .request_pause("orchestrator", Some("manual halt"))
        .await
        .unwrap();
    assert!(plane.coordinator().is_paused().await.unwrap());

    let snapshot = plane.metrics().snapshot("control_state").unwrap();
    assert_eq!(snapshot.successes, 2);
    assert_eq!(snapshot.failures, 0);
}
