//! Integration test: model lifecycle against a real on-disk store

use std::sync::Arc;

use ndarray::Array2;
use verifiable_engine::prelude::*;

fn manager(dir: &std::path::Path) -> Arc<ModelManager> {
    let store = Arc::new(ModelStore::open(dir).unwrap());
    Arc::new(ModelManager::new(store, ForestConfig::default()))
}

fn rows(data: &[[f64; 2]]) -> Array2<f64> {
    let rows: Vec<Vec<f64>> = data.iter().map(|r| r.to_vec()).collect();
    dataset_from_rows(&rows).unwrap()
}

fn probe() -> Array2<f64> {
    rows(&[[0.0, 0.0], [1.0, 1.0], [5.0, -5.0], [50.0, 50.0], [1.05, 0.95]])
}

#[tokio::test]
async fn test_worked_example_through_manager() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());

    let train = rows(&[[1.0, 1.0], [1.1, 1.1], [1.2, 1.2], [10.0, 10.0]]);
    manager.get_or_train("worked", &train, 0.25).await.unwrap();

    let detection = manager
        .detect("worked", rows(&[[1.15, 1.15], [10.5, 10.5], [1.0, 1.0]]), 0.01)
        .await
        .unwrap();
    assert_eq!(detection.labels, vec![1, -1, 1]);
    assert_eq!(detection.source, ModelSource::Loaded);
    assert!((0.0..=1.0).contains(&detection.verifiability));
}

#[tokio::test]
async fn test_cache_wins_over_new_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());

    let first = rows(&[[1.0, 1.0], [1.1, 1.1], [1.2, 1.2], [10.0, 10.0]]);
    let second = rows(&[[100.0, -3.0], [7.0, 7.0], [8.0, 9.0]]);

    let a = manager.get_or_train("cached", &first, 0.25).await.unwrap();
    let b = manager.get_or_train("cached", &second, 0.0).await.unwrap();

    assert_eq!(a.predict(&probe()).unwrap(), b.predict(&probe()).unwrap());
    assert_eq!(b.contamination(), 0.25);
    assert_eq!(manager.training_runs(), 1);
}

#[tokio::test]
async fn test_concurrent_first_callers_train_once() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());

    let mut handles = Vec::new();
    for i in 0..8 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(async move {
            let offset = i as f64;
            let x = rows(&[[offset, 1.0], [offset + 0.1, 1.1], [offset + 0.2, 0.9], [offset + 30.0, 30.0]]);
            manager.get_or_train("contended", &x, 0.25).await.unwrap()
        }));
    }

    let mut forests = Vec::new();
    for handle in handles {
        forests.push(handle.await.unwrap());
    }

    assert_eq!(manager.training_runs(), 1);
    let reference = forests[0].predict(&probe()).unwrap();
    for forest in &forests[1..] {
        assert_eq!(**forest, *forests[0]);
        assert_eq!(forest.predict(&probe()).unwrap(), reference);
    }
}

#[tokio::test]
async fn test_unrelated_identifiers_train_independently() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(dir.path());
    let x = rows(&[[1.0, 2.0], [2.0, 3.0], [3.0, 4.0], [40.0, 40.0]]);

    let (a, b) = tokio::join!(
        manager.get_or_train("left", &x, 0.1),
        manager.get_or_train("right", &x, 0.1)
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(manager.training_runs(), 2);
    assert_eq!(manager.list().unwrap(), vec!["left".to_string(), "right".to_string()]);
}

#[tokio::test]
async fn test_records_survive_a_new_manager() {
    let dir = tempfile::tempdir().unwrap();
    let x = rows(&[[1.0, 2.0], [2.0, 3.0], [3.0, 4.0], [40.0, 40.0]]);

    let original = manager(dir.path())
        .get_or_train("durable", &x, 0.25)
        .await
        .unwrap();

    let reopened = manager(dir.path());
    let status = reopened.status("durable").await.unwrap();
    assert!(status.is_trained);

    let loaded = reopened.get_or_train("durable", &x, 0.25).await.unwrap();
    assert_eq!(reopened.training_runs(), 0);
    assert_eq!(loaded.predict(&probe()).unwrap(), original.predict(&probe()).unwrap());
}

#[tokio::test]
async fn test_empty_detection_never_touches_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let models = dir.path().join("models");
    let manager = manager(&models);

    let err = manager
        .detect("anything", Array2::zeros((0, 3)), 0.1)
        .await
        .unwrap_err();
    assert!(matches!(err, VerifiableError::InvalidInput(_)));
    assert!(manager.list().unwrap().is_empty());
    assert!(!manager.status("anything").await.unwrap().is_trained);
}

#[test]
fn test_verifiability_of_degenerate_batch() {
    assert_eq!(verifiability_score(&[0.42]).unwrap(), 1.0);
    assert_eq!(verifiability_score(&[0.5; 16]).unwrap(), 1.0);
}
