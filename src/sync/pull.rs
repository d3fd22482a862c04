use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use itertools::Itertools;
use pallas::ledger::traverse::MultiEraBlock;
use pallas::network::facades::NodeClient;
use pallas::network::miniprotocols::chainsync::{BlockContent, NextResponse};
use pallas::network::miniprotocols::Point;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::health::HealthTracker;
use crate::mailbox::{ChainMessage, MailboxSender};
use crate::prelude::*;
use crate::store::{self, Store};

use super::UpstreamConfig;

/// Reconnect backoff: starts at one second, doubles up to a minute,
/// retries forever.
const BACKOFF_UNIT: Duration = Duration::from_secs(1);
const BACKOFF_FACTOR: u32 = 2;
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceRollbackError {
    /// The producer no longer knows the target point.
    TargetNotFound,
    /// The pipeline is down or was torn down mid-rendezvous.
    PipelineUnavailable,
}

impl std::fmt::Display for ForceRollbackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TargetNotFound => write!(f, "producer does not know the target point"),
            Self::PipelineUnavailable => write!(f, "sync pipeline unavailable"),
        }
    }
}

impl std::error::Error for ForceRollbackError {}

/// A single-shot rendezvous: the control plane asks the chain-sync client
/// to rewind to `target`, the client replies exactly once, and streaming
/// stays paused until the `resume` side is released.
pub struct ForcedRollback {
    pub(crate) target: ChainPoint,
    pub(crate) reply: oneshot::Sender<Result<(), ForceRollbackError>>,
    pub(crate) resume: oneshot::Receiver<()>,
}

/// Held by the HTTP plane. Cloning is cheap; requests are serialized by
/// the channel.
#[derive(Clone)]
pub struct RollbackHandle {
    tx: mpsc::Sender<ForcedRollback>,
}

/// While this guard lives, the chain-sync client will not stream past the
/// rollback target; drop it once the paired store transaction finished.
pub struct ResumeGuard {
    _resume: oneshot::Sender<()>,
}

impl RollbackHandle {
    pub async fn force_rollback(
        &self,
        target: ChainPoint,
    ) -> Result<ResumeGuard, ForceRollbackError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let (resume_tx, resume_rx) = oneshot::channel();

        let request = ForcedRollback {
            target,
            reply: reply_tx,
            resume: resume_rx,
        };

        self.tx
            .send(request)
            .await
            .map_err(|_| ForceRollbackError::PipelineUnavailable)?;

        match reply_rx.await {
            Ok(Ok(())) => Ok(ResumeGuard { _resume: resume_tx }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ForceRollbackError::PipelineUnavailable),
        }
    }
}

/// The receiver side outlives pipeline restarts so the control plane's
/// handle stays valid; each incarnation of the client locks it for its
/// own lifetime.
pub type CommandChannel = Arc<Mutex<mpsc::Receiver<ForcedRollback>>>;

pub fn rollback_channel() -> (RollbackHandle, CommandChannel) {
    let (tx, rx) = mpsc::channel(1);
    (RollbackHandle { tx }, Arc::new(Mutex::new(rx)))
}

enum SessionEnd {
    /// A forced-rollback rendezvous completed (either way); reconnect
    /// right away without backoff.
    Rendezvous,
}

pub struct ChainSync {
    socket_path: PathBuf,
    network_magic: u64,
    store: Store,
    mailbox: MailboxSender,
    health: HealthTracker,
    commands: CommandChannel,
    /// Last point delivered downstream; where to re-intersect after a
    /// disconnection.
    cursor: Option<ChainPoint>,
}

impl ChainSync {
    pub fn new(
        config: &UpstreamConfig,
        store: Store,
        mailbox: MailboxSender,
        health: HealthTracker,
        commands: CommandChannel,
    ) -> Self {
        Self {
            socket_path: config.socket_path.clone(),
            network_magic: config.network_magic,
            store,
            mailbox,
            health,
            commands,
            cursor: None,
        }
    }

    pub async fn run(mut self) -> Result<(), Error> {
        let mut commands = self.commands.clone().lock_owned().await;
        let mut backoff = BACKOFF_UNIT;

        loop {
            match self.session(&mut commands).await {
                Ok(SessionEnd::Rendezvous) => {
                    backoff = BACKOFF_UNIT;
                }
                Err(err @ Error::IntersectionNotFound(_)) => {
                    self.health.set_connected(false);
                    return Err(err);
                }
                Err(err @ Error::StoreError(_)) | Err(err @ Error::Message(_)) => {
                    self.health.set_connected(false);
                    return Err(err);
                }
                Err(err) => {
                    self.health.set_connected(false);
                    warn!(%err, ?backoff, "chain-sync disconnected, will retry");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * BACKOFF_FACTOR).min(MAX_BACKOFF);
                }
            }
        }
    }

    async fn connect(&self) -> Result<NodeClient, Error> {
        debug!(path = ?self.socket_path, "connecting to producer");

        NodeClient::connect(&self.socket_path, self.network_magic)
            .await
            .map_err(Error::client)
    }

    fn intersect_candidates(&self) -> Result<Vec<ChainPoint>, Error> {
        let mut candidates = match self.cursor {
            Some(cursor) => vec![cursor],
            None => Vec::new(),
        };

        let stored = self.store.with_reader(store::intersection_candidates)?;
        for point in stored {
            if !candidates.contains(&point) {
                candidates.push(point);
            }
        }

        Ok(candidates)
    }

    async fn session(
        &mut self,
        commands: &mut mpsc::Receiver<ForcedRollback>,
    ) -> Result<SessionEnd, Error> {
        let mut client = self.connect().await?;

        let offered = self.intersect_candidates()?;
        let candidates: Vec<Point> = if offered.is_empty() {
            vec![Point::Origin]
        } else {
            offered.iter().copied().map(Point::from).collect_vec()
        };

        debug!(candidates = offered.len(), "finding intersect");

        let (intersection, _tip) = client
            .chainsync()
            .find_intersect(candidates)
            .await
            .map_err(Error::client)?;

        let Some(intersection) = intersection else {
            return Err(Error::IntersectionNotFound(offered));
        };

        info!(intersection = %ChainPoint::from(intersection), "chain-sync intersection found");
        self.health.set_connected(true);

        let mut commands_open = true;

        loop {
            // control commands are only picked up between protocol
            // exchanges, when it is safe to walk away from the session
            if commands_open {
                match commands.try_recv() {
                    Ok(request) => {
                        client.abort().await;
                        self.rendezvous(request).await?;
                        return Ok(SessionEnd::Rendezvous);
                    }
                    Err(mpsc::error::TryRecvError::Empty) => {}
                    Err(mpsc::error::TryRecvError::Disconnected) => commands_open = false,
                }
            }

            if client.chainsync().has_agency() {
                let next = client
                    .chainsync()
                    .request_next()
                    .await
                    .map_err(Error::client)?;
                self.forward_next(next).await?;
            } else if commands_open {
                // waiting at the tip; a control command may arrive first
                let awaited = tokio::select! {
                    request = commands.recv() => Err(request),
                    next = client.chainsync().recv_while_must_reply() => {
                        Ok(next.map_err(Error::client)?)
                    }
                };

                match awaited {
                    Ok(next) => self.forward_next(next).await?,
                    Err(Some(request)) => {
                        client.abort().await;
                        self.rendezvous(request).await?;
                        return Ok(SessionEnd::Rendezvous);
                    }
                    Err(None) => commands_open = false,
                }
            } else {
                let next = client
                    .chainsync()
                    .recv_while_must_reply()
                    .await
                    .map_err(Error::client)?;
                self.forward_next(next).await?;
            }
        }
    }

    async fn forward_next(&mut self, next: NextResponse<BlockContent>) -> Result<(), Error> {
        match next {
            NextResponse::RollForward(content, tip) => {
                let body = content.0;
                let (slot, hash) = {
                    let block = MultiEraBlock::decode(&body).map_err(Error::parse)?;
                    (block.slot(), block.hash())
                };

                debug!(slot, "roll forward from producer");

                let tip = ChainPoint::from(tip.0);
                self.mailbox
                    .send(ChainMessage::RollForward(tip, RawBlock { slot, hash, body }))
                    .await
                    .map_err(|_| Error::message("mailbox closed"))?;

                self.health.set_node_tip(tip);
                self.cursor = Some(ChainPoint::Specific(slot, hash));
            }
            NextResponse::RollBackward(point, tip) => {
                let point = ChainPoint::from(point);
                let tip = ChainPoint::from(tip.0);

                info!(%point, "rollback from producer");

                self.mailbox
                    .send(ChainMessage::RollBackward(tip, point, None))
                    .await
                    .map_err(|_| Error::message("mailbox closed"))?;

                self.health.set_node_tip(tip);
                self.cursor = Some(point);
            }
            NextResponse::Await => {
                debug!("reached producer tip");
            }
        }

        Ok(())
    }

    /// Disconnect, re-intersect at exactly the requested target, push a
    /// synthetic rollback and hold the stream until the control plane is
    /// done. Exactly one reply is sent, whatever happens.
    async fn rendezvous(&mut self, request: ForcedRollback) -> Result<(), Error> {
        info!(target = %request.target, "forced rollback requested");

        let mut client = self.connect().await?;

        let (found, tip) = client
            .chainsync()
            .find_intersect(vec![request.target.into()])
            .await
            .map_err(Error::client)?;

        if found.is_none() {
            warn!(target = %request.target, "producer cannot intersect at rollback target");
            let _ = request.reply.send(Err(ForceRollbackError::TargetNotFound));
            client.abort().await;
            return Ok(());
        }

        let tip = ChainPoint::from(tip.0);

        let (ack_tx, ack_rx) = oneshot::channel();
        self.mailbox
            .send(ChainMessage::RollBackward(tip, request.target, Some(ack_tx)))
            .await
            .map_err(|_| Error::message("mailbox closed"))?;

        match ack_rx.await {
            Ok(checkpoint) => {
                debug!(?checkpoint, "synthetic rollback applied by consumer");

                if request.reply.send(Ok(())).is_ok() {
                    // the control plane still has to persist its pattern
                    // change; do not stream past the target meanwhile
                    let _ = request.resume.await;
                }

                self.cursor = Some(request.target);
            }
            Err(_) => {
                let _ = request.reply.send(Err(ForceRollbackError::PipelineUnavailable));
            }
        }

        client.abort().await;

        Ok(())
    }
}
