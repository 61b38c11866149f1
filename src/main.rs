use anyhow::{bail, Context};
use barman_conf::reconcile::FsMaterializer;
use barman_conf::runner;
use barman_conf::snapshot::SnapshotManager;
use barman_conf::{render, Broker, Config, FileStore, Selector};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "barman-conf")]
#[command(about = "Publish and collect Barman server configurations", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "barman-conf.toml")]
    config: PathBuf,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate this host's server declarations
    Validate,
    /// Print the rendered configuration of this host's servers
    Render {
        #[arg(long, value_name = "NAME", help = "Only render this server")]
        server: Option<String>,
    },
    /// Publish this host's servers to the exchange
    Publish,
    /// Collect published servers and materialize them on this backup host
    Collect {
        #[arg(long, help = "Show the plan without writing anything")]
        dry_run: bool,

        #[arg(
            long,
            value_name = "KEY=VALUE[,KEY=VALUE...]",
            help = "Collect with this label selector instead of the configured one"
        )]
        selector: Option<Selector>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Loading configuration from {:?}", args.config);
    let config = match Config::from_file(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e).context("loading configuration");
        }
    };

    match args.command {
        Command::Validate => {
            let records = config.producer()?.records().context("validating declarations")?;
            for (record, labels) in &records {
                info!(identifier = %record.identifier, labels = ?labels, "Declaration valid");
            }
            println!("{} server declaration(s) valid", records.len());
        }
        Command::Render { server } => {
            let records = config.producer()?.records().context("validating declarations")?;
            let mut rendered = 0;
            for (record, _) in &records {
                if server.as_deref().is_some_and(|s| s != record.identifier.as_str()) {
                    continue;
                }
                print!("{}", render(record));
                rendered += 1;
            }
            if let Some(server) = server.filter(|_| rendered == 0) {
                bail!("no server named '{}' is declared", server);
            }
        }
        Command::Publish => {
            let broker = Broker::new(FileStore::new(&config.exchange.path));
            let summary = runner::publish(&broker, config.producer()?)
                .await
                .context("publishing server records")?;
            println!(
                "published {}, unchanged {}, retracted {}",
                summary.published.len(),
                summary.unchanged.len(),
                summary.retracted.len()
            );
        }
        Command::Collect { dry_run, selector } => {
            let mut consumer = config.consumer()?.clone();
            if let Some(selector) = selector {
                info!(selector = %selector, "Overriding configured selector");
                consumer.selector = selector;
            }
            let broker = Broker::new(FileStore::new(&config.exchange.path));
            let materializer = FsMaterializer::new(&consumer.config_dir);
            let snapshots = SnapshotManager::new(&consumer.snapshot_file);

            let outcome = runner::collect(&broker, &consumer, &materializer, &snapshots, dry_run)
                .await
                .context("collecting server records")?;

            for conflict in &outcome.conflicts {
                warn!(
                    identifier = %conflict.identifier,
                    kept = %conflict.kept,
                    rejected = ?conflict.rejected,
                    "Server published by more than one producer"
                );
            }

            let plan = &outcome.plan;
            for record in &plan.to_create {
                println!("+ {}", record.identifier);
            }
            for record in &plan.to_update {
                println!("~ {}", record.identifier);
            }
            for identifier in &plan.to_delete {
                println!("- {}", identifier);
            }

            if let Some(report) = &outcome.report {
                if !report.failed.is_empty() {
                    bail!("{} server(s) could not be applied", report.failed.len());
                }
            }
        }
    }

    Ok(())
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("barman_conf=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("barman_conf=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
