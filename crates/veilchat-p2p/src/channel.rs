//! Broadcast channel handles.
//!
//! A [`Channel`] is a subscription to one gossipsub topic. Inbound
//! messages are fanned out through a bounded queue with drop-oldest
//! overflow: a slow consumer observes a `Lagged(n)` error naming how
//! many messages it missed, then continues from the oldest retained
//! one. When the network task stops, every receiver drains and then
//! yields `Closed`.

use libp2p::PeerId;
use tokio::sync::{broadcast, mpsc, oneshot};

use veilchat_types::{Result, VeilError};

use crate::node::SwarmCommand;

/// A message received on a broadcast channel.
#[derive(Clone, Debug)]
pub struct ChannelMessage {
    /// Authenticated author of the message, when the substrate
    /// carried one. `None` for anonymously-published messages.
    pub source: Option<PeerId>,
    /// Opaque payload bytes.
    pub data: Vec<u8>,
}

/// Handle to a joined broadcast channel.
///
/// Each call to [`P2pHandle::join`](crate::node::P2pHandle::join)
/// returns an independent `Channel`; multiple handles for the same
/// topic each receive every message.
pub struct Channel {
    topic: String,
    cmd_tx: mpsc::Sender<SwarmCommand>,
    rx: broadcast::Receiver<ChannelMessage>,
}

impl Channel {
    pub(crate) fn new(
        topic: String,
        cmd_tx: mpsc::Sender<SwarmCommand>,
        rx: broadcast::Receiver<ChannelMessage>,
    ) -> Self {
        Self { topic, cmd_tx, rx }
    }

    /// The topic this channel is subscribed to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publishes a payload to the channel.
    ///
    /// Publishing with no connected peers succeeds; the message is
    /// simply not propagated anywhere.
    ///
    /// # Errors
    ///
    /// Returns [`VeilError::Publish`] if the substrate rejects the
    /// message or the network task has stopped.
    pub async fn publish(&self, data: Vec<u8>) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(SwarmCommand::Publish {
                topic: self.topic.clone(),
                data,
                reply: reply_tx,
            })
            .await
            .map_err(|_| VeilError::Publish {
                reason: "network task stopped".into(),
            })?;
        reply_rx.await.map_err(|_| VeilError::Publish {
            reason: "network task dropped the reply".into(),
        })?
    }

    /// Receives the next message.
    ///
    /// # Errors
    ///
    /// - `Lagged(n)` — this consumer fell behind and `n` oldest
    ///   messages were dropped; call again to resume.
    /// - `Closed` — the node shut down; no more messages will arrive.
    pub async fn recv(
        &mut self,
    ) -> std::result::Result<ChannelMessage, broadcast::error::RecvError> {
        self.rx.recv().await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::CHANNEL_QUEUE_CAPACITY;

    #[tokio::test]
    async fn overflow_drops_oldest_and_reports_lag() {
        let (tx, rx) = broadcast::channel(CHANNEL_QUEUE_CAPACITY);
        let mut ch = {
            let (cmd_tx, _cmd_rx) = mpsc::channel(1);
            Channel::new("t".into(), cmd_tx, rx)
        };

        let overflow = 5usize;
        for i in 0..(CHANNEL_QUEUE_CAPACITY + overflow) {
            tx.send(ChannelMessage {
                source: None,
                data: vec![i as u8],
            })
            .unwrap();
        }

        match ch.recv().await {
            Err(broadcast::error::RecvError::Lagged(n)) => {
                assert_eq!(n as usize, overflow);
            }
            other => panic!("expected Lagged, got {other:?}"),
        }
        // Oldest retained message follows the lag report.
        let msg = ch.recv().await.unwrap();
        assert_eq!(msg.data, vec![overflow as u8]);
    }

    #[tokio::test]
    async fn closed_when_sender_dropped() {
        let (tx, rx) = broadcast::channel::<ChannelMessage>(CHANNEL_QUEUE_CAPACITY);
        let mut ch = {
            let (cmd_tx, _cmd_rx) = mpsc::channel(1);
            Channel::new("t".into(), cmd_tx, rx)
        };
        drop(tx);
        assert!(matches!(
            ch.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn publish_after_task_stop_is_an_error() {
        let (tx, rx) = broadcast::channel::<ChannelMessage>(CHANNEL_QUEUE_CAPACITY);
        let ch = {
            let (cmd_tx, cmd_rx) = mpsc::channel(1);
            drop(cmd_rx); // network task gone
            Channel::new("t".into(), cmd_tx, rx)
        };
        drop(tx);
        let err = ch.publish(b"late".to_vec()).await.unwrap_err();
        assert!(matches!(err, VeilError::Publish { .. }));
    }
}
