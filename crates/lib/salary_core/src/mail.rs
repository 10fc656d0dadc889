//! Outbound mail.
//!
//! The auth core never waits on mail delivery: messages are queued on a
//! [`MailOutbox`] and a background [`MailWorker`] hands them to a [`Mailer`].
//! Delivery failures are logged and dropped.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

/// A plain-text message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Mail delivery errors.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail transport error: {0}")]
    Transport(String),

    #[error("Mail rejected with status {0}")]
    Rejected(u16),
}

/// Delivers one message.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError>;
}

/// Mailer that only logs recipient and subject. Bodies may carry tokens and
/// are not logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        info!(to = %message.to, subject = %message.subject, "mail delivery disabled, message dropped");
        Ok(())
    }
}

/// Mailer that POSTs each message as JSON (`{"to","subject","body"}`) to a
/// mail relay endpoint.
#[derive(Debug, Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpMailer {
    pub fn new(endpoint: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(message)
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(MailError::Rejected(resp.status().as_u16()));
        }
        info!(to = %message.to, subject = %message.subject, "sent mail");
        Ok(())
    }
}

/// Sending half of the mail queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MailOutbox {
    tx: mpsc::UnboundedSender<MailMessage>,
}

/// Receiving half of the mail queue.
#[derive(Debug)]
pub struct MailWorker {
    rx: mpsc::UnboundedReceiver<MailMessage>,
}

impl MailOutbox {
    /// Create a connected outbox/worker pair.
    pub fn channel() -> (MailOutbox, MailWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        (MailOutbox { tx }, MailWorker { rx })
    }

    /// Create an outbox and spawn its worker on the current runtime.
    pub fn spawn(mailer: Arc<dyn Mailer>) -> (MailOutbox, tokio::task::JoinHandle<()>) {
        let (outbox, worker) = Self::channel();
        let handle = tokio::spawn(worker.run(mailer));
        (outbox, handle)
    }

    /// Queue a message. Never fails; a stopped worker is logged.
    pub fn enqueue(&self, message: MailMessage) {
        let to = message.to.clone();
        if self.tx.send(message).is_err() {
            warn!(to = %to, "mail worker stopped, message dropped");
        }
    }
}

impl MailWorker {
    /// Deliver queued messages until every outbox is dropped.
    pub async fn run(mut self, mailer: Arc<dyn Mailer>) {
        while let Some(message) = self.rx.recv().await {
            if let Err(e) = mailer.send(&message).await {
                warn!(to = %message.to, error = %e, "failed to send mail");
            }
        }
        debug!("mail worker stopped");
    }

    /// Next queued message, if any, without waiting.
    pub fn try_next(&mut self) -> Option<MailMessage> {
        self.rx.try_recv().ok()
    }
}
