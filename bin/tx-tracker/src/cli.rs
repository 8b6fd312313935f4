use clap::Parser;
use std::{
    env,
    path::PathBuf,
    str::FromStr,
};
use tracing_subscriber::{
    Layer,
    filter::EnvFilter,
    layer::SubscriberExt,
    registry,
};

#[cfg(feature = "env")]
use dotenvy::dotenv;

pub mod watch;

#[derive(Parser, Debug)]
#[clap(
    name = "tx-tracker",
    about = "Follows the statuses of submitted DEX transactions",
    version,
    rename_all = "kebab-case"
)]
pub struct Opt {
    #[clap(subcommand)]
    command: Tracker,
}

#[derive(Debug, Parser)]
pub enum Tracker {
    Watch(watch::Command),
}

pub const LOG_FILTER: &str = "RUST_LOG";
pub const HUMAN_LOGGING: &str = "HUMAN_LOGGING";

#[cfg(feature = "env")]
fn init_environment() -> Option<PathBuf> {
    dotenv().ok()
}

#[cfg(not(feature = "env"))]
fn init_environment() -> Option<PathBuf> {
    None
}

pub fn init_logging() -> anyhow::Result<()> {
    let filter = match env::var_os(LOG_FILTER) {
        Some(_) => EnvFilter::try_from_default_env()
            .map_err(|e| anyhow::anyhow!("Invalid `{LOG_FILTER}` provided: {e}"))?,
        None => EnvFilter::new("info"),
    };

    let human_logging = match env::var(HUMAN_LOGGING) {
        Ok(value) => bool::from_str(&value).map_err(|_| {
            anyhow::anyhow!("Expected `true` or `false` to be provided for `{HUMAN_LOGGING}`")
        })?,
        Err(_) => true,
    };

    let layer = tracing_subscriber::fmt::Layer::default().with_writer(std::io::stderr);

    let fmt = if human_logging {
        // use pretty logs
        layer
            .with_ansi(true)
            .with_level(true)
            .with_line_number(true)
            .boxed()
    } else {
        // use machine parseable structured logs
        layer
            .with_ansi(false)
            .with_level(true)
            .with_line_number(true)
            .json()
            .boxed()
    };

    let subscriber = registry::Registry::default().with(filter).with(fmt);

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

pub async fn run_cli() -> anyhow::Result<()> {
    init_logging()?;
    if let Some(path) = init_environment() {
        let path = path.display();
        tracing::info!("Loading environment variables from {path}");
    }

    match Opt::try_parse() {
        Ok(opt) => match opt.command {
            Tracker::Watch(command) => watch::exec(command).await,
        },
        Err(e) => {
            // Prints the error and exits.
            e.exit()
        }
    }
}
