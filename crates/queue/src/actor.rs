use tokio::sync::{mpsc, oneshot};
use wire::{ContentHash, LogId};

use crate::shard::{now_ms, Pull, Sequenced, ShardState, ShardStats};
use crate::{Error, QueueConfig, Result};

/// Handle to a single-writer shard actor.
///
/// Each shard owns its SQLite connection on a dedicated thread; methods
/// enqueue a command and await the reply, so all operations on one shard
/// execute to completion with respect to each other while distinct shards
/// run in parallel. Dropping every handle shuts the thread down and closes
/// the store.
#[derive(Clone)]
pub struct Shard {
    commands: mpsc::UnboundedSender<Command>,
}

enum Command {
    Enqueue {
        log_id: LogId,
        content_hash: ContentHash,
        extras: Box<[Option<Vec<u8>>; 4]>,
        reply: oneshot::Sender<Result<i64>>,
    },
    Pull {
        poller_id: String,
        batch_size: u64,
        visibility_ms: u64,
        reply: oneshot::Sender<Result<Pull>>,
    },
    AckFirst {
        log_id: LogId,
        seq_lo: i64,
        limit: u64,
        first_leaf_index: u64,
        massif_height: u8,
        reply: oneshot::Sender<Result<u64>>,
    },
    ResolveContent {
        content_hash: ContentHash,
        reply: oneshot::Sender<Result<Option<Sequenced>>>,
    },
    Stats {
        reply: oneshot::Sender<Result<ShardStats>>,
    },
}

impl Shard {
    /// Open the shard store and start its actor thread. Fails fast if the
    /// store cannot be opened or migrated.
    pub fn open(path: &str, cfg: QueueConfig) -> Result<Self> {
        let state = ShardState::open(path, cfg)?;
        let (commands, rx) = mpsc::unbounded_channel();

        let name = format!("queue-shard({path})");
        std::thread::Builder::new()
            .name(name)
            .spawn(move || run(state, rx))
            .expect("spawning a shard thread");

        Ok(Self { commands })
    }

    async fn call<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| Error::ShardClosed)?;
        rx.await.map_err(|_| Error::ShardClosed)?
    }

    pub async fn enqueue(
        &self,
        log_id: LogId,
        content_hash: ContentHash,
        extras: [Option<Vec<u8>>; 4],
    ) -> Result<i64> {
        let extras = Box::new(extras);
        self.call(|reply| Command::Enqueue {
            log_id,
            content_hash,
            extras,
            reply,
        })
        .await
    }

    pub async fn pull(
        &self,
        poller_id: String,
        batch_size: u64,
        visibility_ms: u64,
    ) -> Result<Pull> {
        self.call(|reply| Command::Pull {
            poller_id,
            batch_size,
            visibility_ms,
            reply,
        })
        .await
    }

    pub async fn ack_first(
        &self,
        log_id: LogId,
        seq_lo: i64,
        limit: u64,
        first_leaf_index: u64,
        massif_height: u8,
    ) -> Result<u64> {
        self.call(|reply| Command::AckFirst {
            log_id,
            seq_lo,
            limit,
            first_leaf_index,
            massif_height,
            reply,
        })
        .await
    }

    pub async fn resolve_content(&self, content_hash: ContentHash) -> Result<Option<Sequenced>> {
        self.call(|reply| Command::ResolveContent {
            content_hash,
            reply,
        })
        .await
    }

    pub async fn stats(&self) -> Result<ShardStats> {
        self.call(|reply| Command::Stats { reply }).await
    }
}

fn run(mut state: ShardState, mut rx: mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = rx.blocking_recv() {
        match command {
            Command::Enqueue {
                log_id,
                content_hash,
                extras,
                reply,
            } => {
                let result = state.enqueue(&log_id, &content_hash, &extras, now_ms());
                let _ = reply.send(result);
            }
            Command::Pull {
                poller_id,
                batch_size,
                visibility_ms,
                reply,
            } => {
                let result = state.pull(&poller_id, batch_size, visibility_ms, now_ms());
                let _ = reply.send(result);
            }
            Command::AckFirst {
                log_id,
                seq_lo,
                limit,
                first_leaf_index,
                massif_height,
                reply,
            } => {
                let result = state.ack_first(
                    &log_id,
                    seq_lo,
                    limit,
                    first_leaf_index,
                    massif_height,
                    now_ms(),
                );
                let _ = reply.send(result);
            }
            Command::ResolveContent {
                content_hash,
                reply,
            } => {
                let _ = reply.send(state.resolve_content(&content_hash));
            }
            Command::Stats { reply } => {
                let _ = reply.send(state.stats(now_ms()));
            }
        }
    }
    tracing::debug!("queue shard thread exiting");
}
