use crate::rate_limit::RateLimiter;
use crate::{Error, Message, MessageSubClient, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Pulls from a subscription and forwards deliveries to a bounded channel at no more
/// than `max_mps` messages per second.
pub struct RateLimitedPuller {
    client: Arc<dyn MessageSubClient>,
    limiter: RateLimiter,
    tx: mpsc::Sender<Message>,
    rx: MessageReceiver,
}

/// Receiving side of the puller's channel, shared by every batch worker.
///
/// `recv` yields `None` once the puller has stopped and the buffered messages are gone.
#[derive(Clone)]
pub struct MessageReceiver {
    inner: Arc<Mutex<mpsc::Receiver<Message>>>,
}

impl MessageReceiver {
    pub async fn recv(&self) -> Option<Message> {
        self.inner.lock().await.recv().await
    }

    /// Closes the channel and nacks every message still buffered in it. Returns how
    /// many were nacked.
    pub async fn nack_remaining(&self) -> usize {
        let mut rx = self.inner.lock().await;
        rx.close();
        let mut nacked = 0;
        while let Ok(message) = rx.try_recv() {
            message.nack().await;
            nacked += 1;
        }
        nacked
    }
}

impl RateLimitedPuller {
    pub fn new(client: Arc<dyn MessageSubClient>, max_mps: usize) -> Result<Self> {
        if max_mps == 0 {
            return Err(Error::Config("max_mps must be greater than 0".into()));
        }
        let (tx, rx) = mpsc::channel(max_mps);
        Ok(Self {
            client,
            limiter: RateLimiter::new(max_mps),
            tx,
            rx: MessageReceiver {
                inner: Arc::new(Mutex::new(rx)),
            },
        })
    }

    pub fn message_receiver(&self) -> MessageReceiver {
        self.rx.clone()
    }

    /// Pulls until `cln_token` is cancelled or the client fails. Client errors are
    /// returned as-is; retrying is left to whoever restarts the process. The channel
    /// closes when this returns.
    pub async fn run(self, cln_token: CancellationToken) -> Result<()> {
        let Self {
            client,
            mut limiter,
            tx,
            ..
        } = self;

        loop {
            let messages = tokio::select! {
                _ = cln_token.cancelled() => {
                    log::debug!("Puller cancelled, stopping pull");
                    return Ok(());
                }
                res = client.get_messages() => res.map_err(|e| {
                    log::error!("Failed to get messages with error: {e:?}");
                    e
                })?,
            };

            let mut pending = messages.into_iter();
            while let Some(message) = pending.next() {
                let permit = tokio::select! {
                    _ = cln_token.cancelled() => None,
                    permit = async {
                        limiter.acquire().await;
                        tx.reserve().await.ok()
                    } => permit,
                };
                let Some(permit) = permit else {
                    // Hand the undelivered remainder back to the bus right away instead of
                    // waiting for the ack deadline.
                    message.nack().await;
                    for message in pending {
                        message.nack().await;
                    }
                    return Ok(());
                };
                permit.send(message);
            }
        }
    }
}
