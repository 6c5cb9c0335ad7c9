use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use moose_core::{errors::Error, ports::ChatPort, Result};

use crate::message::{join_lines, IrcMessage};

/// Chat lines waiting on the paced writer.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Receiving halves drained by the connection's writer task.
pub struct OutboundQueues {
    pub(crate) urgent: mpsc::UnboundedReceiver<String>,
    pub(crate) paced: mpsc::Receiver<String>,
}

/// `ChatPort` over a live IRC connection.
///
/// Cheap to clone; every clone feeds the same writer.
#[derive(Clone)]
pub struct IrcClient {
    nick: Arc<RwLock<String>>,
    urgent: mpsc::UnboundedSender<String>,
    paced: mpsc::Sender<String>,
}

impl IrcClient {
    pub fn new(nick: &str) -> (Self, OutboundQueues) {
        let (urgent_tx, urgent_rx) = mpsc::unbounded_channel();
        let (paced_tx, paced_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let client = Self {
            nick: Arc::new(RwLock::new(nick.to_string())),
            urgent: urgent_tx,
            paced: paced_tx,
        };
        let queues = OutboundQueues {
            urgent: urgent_rx,
            paced: paced_rx,
        };
        (client, queues)
    }

    pub(crate) fn set_nick(&self, nick: &str) {
        *self.nick.write() = nick.to_string();
    }

    /// Protocol traffic (registration, PONG, QUIT); skips pacing.
    pub(crate) fn send_now(&self, msg: &IrcMessage) -> Result<()> {
        self.urgent
            .send(msg.format())
            .map_err(|_| Error::Protocol("connection writer has stopped".to_string()))
    }

    async fn queue_line(&self, line: String) -> Result<()> {
        self.paced
            .send(line)
            .await
            .map_err(|_| Error::Protocol("connection writer has stopped".to_string()))
    }
}

#[async_trait]
impl ChatPort for IrcClient {
    fn current_nick(&self) -> String {
        self.nick.read().clone()
    }

    async fn join(&self, channels: &[String]) -> Result<()> {
        for line in join_lines(channels) {
            self.queue_line(line).await?;
        }
        Ok(())
    }

    async fn send_message(&self, target: &str, text: &str) -> Result<()> {
        self.queue_line(IrcMessage::privmsg(target, text).format())
            .await
    }

    async fn send_notice(&self, target: &str, text: &str) -> Result<()> {
        self.queue_line(IrcMessage::notice(target, text).format())
            .await
    }

    async fn identify(&self, password: &str) -> Result<()> {
        let text = format!("IDENTIFY {password}");
        self.queue_line(IrcMessage::privmsg("NickServ", &text).format())
            .await
    }
}
