use barman_conf::config::{ConsumerConfig, ProducerConfig};
use barman_conf::exchange::{Labels, Selector};
use barman_conf::server::{PostgresProfile, ServerDeclaration};
use std::path::Path;

pub fn global_labels() -> Labels {
    Labels::from([("host_group".to_string(), "global".to_string())])
}

/// Producer that declares one PostgreSQL profile for itself.
pub fn postgres_producer(id: &str, server_id: &str) -> ProducerConfig {
    ProducerConfig {
        id: id.to_string(),
        labels: global_labels(),
        servers: Vec::new(),
        postgres: Some(PostgresProfile::new(server_id)),
    }
}

pub fn declaration(name: &str, host: &str) -> ServerDeclaration {
    ServerDeclaration {
        host: Some(host.to_string()),
        ssh_command: Some(format!("ssh postgres@{}", host)),
        ..ServerDeclaration::new(name)
    }
}

/// Consumer writing under `root`, with checks disabled unless `barman_bin` is set.
pub fn consumer(root: &Path, barman_bin: Option<&str>) -> ConsumerConfig {
    ConsumerConfig {
        selector: Selector::all().with("host_group", "global"),
        config_dir: root.join("barman.d"),
        snapshot_file: root.join("state/snapshot.json"),
        barman_bin: barman_bin.unwrap_or("barman").to_string(),
        run_checks: barman_bin.is_some(),
    }
}
