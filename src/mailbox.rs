use tokio::sync::{mpsc, oneshot};

use crate::model::{ChainPoint, RawBlock, Tip};

/// Bound of the in-process queue between chain-sync and the consumer.
/// Larger means more memory and faster catch-up; the bound is part of the
/// memory contract, so it is not a config knob.
pub const MAILBOX_CAPACITY: usize = 100;

/// Fired by the consumer once a rollback transaction committed, carrying
/// the store's new latest checkpoint. Only synthetic rollbacks (forced by
/// the control plane) request an ack.
pub type RollbackAck = oneshot::Sender<Option<ChainPoint>>;

#[derive(Debug)]
pub enum ChainMessage {
    RollForward(Tip, RawBlock),
    RollBackward(Tip, ChainPoint, Option<RollbackAck>),
}

/// A non-empty unit of consumer work: either a coalesced run of forwards
/// or exactly one backward. Rollbacks are never merged with forwards and
/// never overtake them.
#[derive(Debug)]
pub enum Drained {
    Forward(Vec<(Tip, RawBlock)>),
    Backward(Tip, ChainPoint, Option<RollbackAck>),
}

pub fn mailbox() -> (MailboxSender, MailboxReceiver) {
    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
    (MailboxSender { tx }, MailboxReceiver { rx, stash: None })
}

#[derive(Clone)]
pub struct MailboxSender {
    tx: mpsc::Sender<ChainMessage>,
}

impl MailboxSender {
    /// Blocks when the queue is full: backpressure onto the producer.
    pub async fn send(&self, message: ChainMessage) -> Result<(), MailboxClosed> {
        self.tx.send(message).await.map_err(|_| MailboxClosed)
    }
}

pub struct MailboxReceiver {
    rx: mpsc::Receiver<ChainMessage>,
    /// A backward observed while coalescing forwards waits here for the
    /// next drain, so FIFO order is preserved.
    stash: Option<ChainMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxClosed;

impl std::fmt::Display for MailboxClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mailbox closed")
    }
}

impl std::error::Error for MailboxClosed {}

impl MailboxReceiver {
    /// Waits until at least one message is available, then returns the
    /// largest batch that keeps rollbacks isolated.
    pub async fn drain(&mut self) -> Result<Drained, MailboxClosed> {
        let first = match self.stash.take() {
            Some(message) => message,
            None => self.rx.recv().await.ok_or(MailboxClosed)?,
        };

        let mut forwards = match first {
            ChainMessage::RollBackward(tip, point, ack) => {
                return Ok(Drained::Backward(tip, point, ack));
            }
            ChainMessage::RollForward(tip, block) => vec![(tip, block)],
        };

        loop {
            match self.rx.try_recv() {
                Ok(ChainMessage::RollForward(tip, block)) => forwards.push((tip, block)),
                Ok(backward @ ChainMessage::RollBackward(..)) => {
                    self.stash = Some(backward);
                    break;
                }
                Err(_) => break,
            }
        }

        Ok(Drained::Forward(forwards))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pallas::crypto::hash::Hash;

    fn block(slot: u64) -> RawBlock {
        RawBlock {
            slot,
            hash: Hash::new([slot as u8; 32]),
            body: vec![],
        }
    }

    fn tip(slot: u64) -> Tip {
        ChainPoint::Specific(slot, Hash::new([0xff; 32]))
    }

    #[tokio::test]
    async fn coalesces_consecutive_forwards() {
        let (sender, mut receiver) = mailbox();

        for slot in 1..=3 {
            sender
                .send(ChainMessage::RollForward(tip(10), block(slot)))
                .await
                .unwrap();
        }

        match receiver.drain().await.unwrap() {
            Drained::Forward(items) => {
                let slots: Vec<_> = items.iter().map(|(_, b)| b.slot).collect();
                assert_eq!(slots, vec![1, 2, 3]);
            }
            other => panic!("unexpected drain: {other:?}"),
        }
    }

    #[tokio::test]
    async fn backward_never_merges_with_forwards() {
        let (sender, mut receiver) = mailbox();

        sender
            .send(ChainMessage::RollForward(tip(10), block(1)))
            .await
            .unwrap();
        sender
            .send(ChainMessage::RollBackward(tip(10), ChainPoint::Origin, None))
            .await
            .unwrap();
        sender
            .send(ChainMessage::RollForward(tip(10), block(2)))
            .await
            .unwrap();

        match receiver.drain().await.unwrap() {
            Drained::Forward(items) => assert_eq!(items.len(), 1),
            other => panic!("unexpected drain: {other:?}"),
        }

        match receiver.drain().await.unwrap() {
            Drained::Backward(_, point, _) => assert_eq!(point, ChainPoint::Origin),
            other => panic!("unexpected drain: {other:?}"),
        }

        match receiver.drain().await.unwrap() {
            Drained::Forward(items) => assert_eq!(items[0].1.slot, 2),
            other => panic!("unexpected drain: {other:?}"),
        }
    }

    #[tokio::test]
    async fn leading_backward_returns_alone() {
        let (sender, mut receiver) = mailbox();

        sender
            .send(ChainMessage::RollBackward(tip(5), ChainPoint::Origin, None))
            .await
            .unwrap();

        match receiver.drain().await.unwrap() {
            Drained::Backward(..) => {}
            other => panic!("unexpected drain: {other:?}"),
        }
    }

    #[tokio::test]
    async fn drain_reports_closed_channel() {
        let (sender, mut receiver) = mailbox();
        drop(sender);

        assert_eq!(receiver.drain().await.unwrap_err(), MailboxClosed);
    }
}
