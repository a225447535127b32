use std::collections::BTreeSet;
use std::sync::Arc;

use conductor::deployment::{
    CreateWorkerRequest, DeploymentAdapter, FactoryConfig, LocalProcessAdapter, WorkerFactory, WorkerOverrides,
};
use conductor::ConductorError;

async fn factory(dir: &tempfile::TempDir) -> WorkerFactory {
    let adapter = LocalProcessAdapter::open(dir.path().join("workers.toml"))
        .await
        .unwrap()
        .without_autostart();
    WorkerFactory::new(Arc::new(adapter), FactoryConfig::default())
}

fn auto(worker_type: &str) -> CreateWorkerRequest {
    CreateWorkerRequest {
        auto_name: true,
        worker_type: Some(worker_type.into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_creations_without_port_get_distinct_ports() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(&dir).await;

    let first = factory.create_worker(auto("standard")).await.unwrap();
    let second = factory.create_worker(auto("memory-optimized")).await.unwrap();
    assert_ne!(first.config.port, second.config.port);
    assert_ne!(first.config.name, second.config.name);

    let reopened = LocalProcessAdapter::open(dir.path().join("workers.toml"))
        .await
        .unwrap()
        .without_autostart();
    let ports: BTreeSet<u16> = reopened
        .list_workers()
        .await
        .unwrap()
        .into_iter()
        .map(|w| w.config.port)
        .collect();
    assert_eq!(ports, BTreeSet::from([first.config.port, second.config.port]));
}

#[tokio::test]
async fn test_explicit_port_taken_is_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(&dir).await;
    let first = factory.create_worker(auto("standard")).await.unwrap();

    let err = factory
        .create_worker(CreateWorkerRequest {
            name: Some("pinned".into()),
            port: Some(first.config.port),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ConductorError::PortConflict(_)));
}

#[tokio::test]
async fn test_clone_keeps_settings_on_new_port() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(&dir).await;
    let source = factory
        .create_worker(CreateWorkerRequest {
            name: Some("writer".into()),
            max_concurrent: Some(8),
            ..Default::default()
        })
        .await
        .unwrap();

    let clone = factory.clone_worker("writer", WorkerOverrides::default()).await.unwrap();
    assert_ne!(clone.config.name, source.config.name);
    assert_ne!(clone.config.port, source.config.port);
    assert_eq!(clone.config.max_concurrent, 8);

    let missing = factory.clone_worker("ghost", WorkerOverrides::default()).await.unwrap_err();
    assert!(missing.is_not_found());
}

#[tokio::test]
async fn test_scale_up_and_down() {
    let dir = tempfile::tempdir().unwrap();
    let factory = factory(&dir).await;

    let up = factory.scale(3).await.unwrap();
    assert_eq!((up.previous, up.current), (0, 3));
    let ports: BTreeSet<u16> = factory
        .list_workers()
        .await
        .unwrap()
        .iter()
        .map(|w| w.config.port)
        .collect();
    assert_eq!(ports.len(), 3);

    let down = factory.scale(1).await.unwrap();
    assert_eq!(down.current, 1);
    assert_eq!(down.deleted.len(), 2);
}
