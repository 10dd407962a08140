use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use time::OffsetDateTime;
use tracing::{info, warn};

mod config;
use config::ReceiverConfig;

mod jump;
mod receiver;
use receiver::{Receiver, Sanitizer};

mod server;

mod store;
use store::{ContentStore, DirectoryStore, MemoryStore};

mod upgrade;
use upgrade::{maybe_upgrade, OptionStore};

mod webhooks;
use webhooks::AccessGuard;

#[derive(Parser)]
#[command(version)]
struct Opts {
    /// Configuration file for the receiver
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ReceiverConfig> {
    let path = match path {
        Some(path) => path,
        None => return Ok(ReceiverConfig::default()),
    };

    let config_file =
        File::open(path).with_context(|| format!("couldn't open {}:", path.display()))?;
    serde_yaml::from_reader(BufReader::new(config_file)).context("couldn't parse config file")
}

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opts = Opts::parse();
    let config = load_config(opts.config.as_ref())?;

    let (store, options): (Arc<dyn ContentStore>, Arc<dyn OptionStore>) = match &config.store_dir {
        Some(dir) => {
            let store = Arc::new(
                DirectoryStore::open(dir)
                    .with_context(|| format!("couldn't open store in {}", dir.display()))?,
            );
            (store.clone(), store)
        }
        None => {
            warn!("no store_dir configured, records will only be kept in memory");
            let store = Arc::new(MemoryStore::new());
            (store.clone(), store)
        }
    };

    let outcome = maybe_upgrade(options.as_ref(), store.as_ref(), OffsetDateTime::now_utc())
        .context("failed to upgrade store")?;
    info!("store upgrade: {:?}", outcome);

    let sanitizer = match &config.allowed_tags {
        Some(tags) => Sanitizer::new(tags),
        None => Sanitizer::default(),
    };
    let receiver = Receiver::new(
        AccessGuard::new(config.guard, config.github_secret),
        config.title_style,
        sanitizer,
        store,
    );

    let rocket = server::build(Arc::new(receiver));
    rocket
        .launch()
        .await
        .map(|_| ())
        .map_err(|err| anyhow::anyhow!(err))
}
