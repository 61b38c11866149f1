use barman_conf::server::{ServerDeclaration, ServerRecord};
use barman_conf::snapshot::{Snapshot, SnapshotManager};
use std::collections::BTreeMap;
use tempfile::TempDir;

fn record(name: &str, description: &str) -> ServerRecord {
    let decl = ServerDeclaration {
        description: Some(description.to_string()),
        conninfo: Some(format!("host={}", name)),
        ssh_command: Some(format!("ssh postgres@{}", name)),
        ..ServerDeclaration::new(name)
    };
    ServerRecord::new(&decl, None).unwrap()
}

#[tokio::test]
async fn test_snapshot_persistence() {
    let temp_dir = TempDir::new().unwrap();
    let snapshot_path = temp_dir.path().join("test_snapshot.json");

    let manager = SnapshotManager::new(&snapshot_path);

    let snapshot = Snapshot::new(vec![record("a", "first")], BTreeMap::new(), 1);
    manager.save(&snapshot).await.unwrap();

    let loaded = manager.load().await.unwrap().expect("Snapshot should exist");
    assert_eq!(loaded.generation, 1);
    assert_eq!(loaded.records, vec![record("a", "first")]);

    let snapshot2 = Snapshot::new(vec![record("a", "second"), record("b", "x")], BTreeMap::new(), 2);
    manager.save(&snapshot2).await.unwrap();

    let loaded2 = manager.load().await.unwrap().expect("Snapshot should exist");
    assert_eq!(loaded2.generation, 2);
    assert_eq!(loaded2.records.len(), 2);
    assert_eq!(loaded2.records[0].description, "second");
}

#[tokio::test]
async fn test_snapshot_recovery_simulation() {
    let temp_dir = TempDir::new().unwrap();
    let snapshot_path = temp_dir.path().join("recovery_snapshot.json");

    // First run
    {
        let manager = SnapshotManager::new(&snapshot_path);
        assert!(manager.load().await.unwrap().is_none());

        let snapshot = Snapshot::new(vec![record("server1", "x")], BTreeMap::new(), 1);
        manager.save(&snapshot).await.unwrap();
    }

    // Restart picks up where the last run left off
    {
        let manager = SnapshotManager::new(&snapshot_path);
        let loaded = manager.load().await.unwrap().expect("Should recover snapshot");
        assert_eq!(loaded.generation, 1);

        let mut records = loaded.records.clone();
        records.push(record("server2", "y"));
        let next = Snapshot::new(records, BTreeMap::new(), loaded.generation + 1);
        manager.save(&next).await.unwrap();
    }

    {
        let manager = SnapshotManager::new(&snapshot_path);
        let final_snapshot = manager.load().await.unwrap().expect("Should have final snapshot");
        assert_eq!(final_snapshot.generation, 2);
        assert_eq!(final_snapshot.records.len(), 2);
    }

    assert!(!temp_dir.path().join("recovery_snapshot.tmp").exists());
}

#[tokio::test]
async fn test_rapid_snapshot_writes() {
    let temp_dir = TempDir::new().unwrap();
    let manager = SnapshotManager::new(temp_dir.path().join("rapid_snapshot.json"));

    for generation in 1..=10 {
        let snapshot = Snapshot::new(
            vec![record("server1", &format!("gen {}", generation))],
            BTreeMap::new(),
            generation,
        );
        manager.save(&snapshot).await.unwrap();
    }

    let final_snapshot = manager.load().await.unwrap().expect("Should have snapshot");
    assert_eq!(final_snapshot.generation, 10);
    assert_eq!(final_snapshot.records[0].description, "gen 10");
}
