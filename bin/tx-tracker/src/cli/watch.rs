use clap::Parser;
use meeray_tx_tracker::{
    Config,
    ConnectionState,
    TransitionTable,
    new_service,
    websocket::{
        DEFAULT_URL,
        WebSocketTransport,
    },
};
use meeray_types::services::{
    events::EventKind,
    transaction_status::{
        TrackingId,
        TxStage,
    },
};
use std::str::FromStr;
use tokio::sync::broadcast::error::RecvError;
use url::Url;

/// A transaction to track, given as `<tracking id>:<type>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedTx {
    pub id: TrackingId,
    pub tx_type: String,
}

impl FromStr for TrackedTx {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, tx_type) = s
            .split_once(':')
            .ok_or_else(|| format!("Expected `<tracking id>:<type>`, got `{s}`"))?;
        if id.is_empty() || tx_type.is_empty() {
            return Err(format!("Expected `<tracking id>:<type>`, got `{s}`"))
        }
        Ok(Self {
            id: id.into(),
            tx_type: tx_type.to_string(),
        })
    }
}

/// An override of the stage an event type moves the transaction to, given as
/// `<event type>=<stage>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub kind: EventKind,
    pub stage: TxStage,
}

impl FromStr for Transition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, stage) = s
            .split_once('=')
            .ok_or_else(|| format!("Expected `<event type>=<stage>`, got `{s}`"))?;
        let stage = serde_json::Value::String(stage.trim().to_uppercase());
        let stage: TxStage = serde_json::from_value(stage)
            .map_err(|e| format!("Unknown stage in `{s}`: {e}"))?;
        Ok(Self {
            kind: EventKind::from(kind.trim()),
            stage,
        })
    }
}

#[derive(Debug, Clone, Parser)]
pub struct Command {
    /// The endpoint of the event stream.
    #[clap(long = "url", default_value = DEFAULT_URL, env = "EVENT_STREAM_URL")]
    pub url: Url,

    /// The account whose events are requested after every connect.
    #[clap(long = "user", env = "TRACKER_USER")]
    pub user: Option<String>,

    /// Transactions to track, as `<tracking id>:<type>`.
    #[clap(long = "track", value_delimiter = ',', env = "TRACKER_TRANSACTIONS")]
    pub track: Vec<TrackedTx>,

    /// Overrides of the stage transitions, as `<event type>=<stage>`.
    #[clap(long = "transition", value_delimiter = ',', env = "TRACKER_TRANSITIONS")]
    pub transitions: Vec<Transition>,

    #[clap(long = "reconnect-delay", default_value = "5s", env)]
    pub reconnect_delay: humantime::Duration,

    /// The upper bound of the exponential reconnection backoff.
    /// The delay stays fixed when unset.
    #[clap(long = "max-reconnect-delay", env)]
    pub max_reconnect_delay: Option<humantime::Duration>,

    #[clap(long = "max-reconnect-attempts", env)]
    pub max_reconnect_attempts: Option<u32>,

    /// How long final statuses stay available.
    #[clap(long = "terminal-retention", default_value = "30s", env)]
    pub terminal_retention: humantime::Duration,

    /// Drops transactions that stay unfinished for longer than this.
    #[clap(long = "pending-ttl", env)]
    pub pending_ttl: Option<humantime::Duration>,

    #[clap(long = "ttl-check-interval", default_value = "1s", env)]
    pub ttl_check_interval: humantime::Duration,

    /// Exit once every tracked transaction reached a final stage.
    #[clap(long = "exit-when-done", env)]
    pub exit_when_done: bool,
}

impl Command {
    pub fn config(&self) -> Config {
        let mut transitions = TransitionTable::default();
        for transition in &self.transitions {
            transitions.insert(transition.kind.clone(), transition.stage);
        }

        let reconnect_delay: std::time::Duration = self.reconnect_delay.into();
        Config {
            reconnect_delay,
            max_reconnect_delay: self
                .max_reconnect_delay
                .map(Into::into)
                .unwrap_or(reconnect_delay),
            max_reconnect_attempts: self.max_reconnect_attempts,
            terminal_retention: self.terminal_retention.into(),
            pending_ttl: self.pending_ttl.map(Into::into),
            ttl_check_interval: self.ttl_check_interval.into(),
            transitions,
            ..Default::default()
        }
    }
}

pub async fn exec(command: Command) -> anyhow::Result<()> {
    let config = command.config();
    let transport = WebSocketTransport::new(command.url.clone());
    let tracked: Vec<TrackingId> = command.track.iter().map(|tx| tx.id.clone()).collect();
    tracing::info!(url = %transport.url(), tracked = tracked.len(), "Starting the tracker");
    let service = new_service(transport, command.user.clone(), config);

    for tx in &command.track {
        service.register(tx.id.clone(), tx.tx_type.clone())?;
    }

    let mut updates = service.subscribe_updates();
    let mut connection = service.connection_state_watcher();
    service.connect()?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received the shutdown signal");
                break
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    break
                }
                let state = *connection.borrow_and_update();
                tracing::info!(%state, "Event stream connection changed");
                if state == ConnectionState::Connected {
                    for id in &tracked {
                        service.subscribe_to_transaction(id);
                    }
                }
            }
            update = updates.recv() => match update {
                Ok(status) => {
                    println!("{}", serde_json::to_string(&status)?);
                    let done = command.exit_when_done
                        && !tracked.is_empty()
                        && tracked.iter().all(|id| {
                            service.get(id).is_none_or(|status| status.is_final())
                        });
                    if done {
                        tracing::info!("All tracked transactions are final");
                        break
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "The output lagged behind the updates");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    service.dispose().await?;
    Ok(())
}
