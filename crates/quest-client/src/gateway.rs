//! Live notification feed over the WebSocket gateway.

use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite};
use tracing::{debug, info, warn};

use quest_types::events::GatewayEvent;

/// Fixed-delay reconnection with a bounded number of consecutive attempts.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

/// A running gateway subscription. Dropping it stops the background task.
pub struct Subscription {
    pub events: mpsc::UnboundedReceiver<GatewayEvent>,
    task: JoinHandle<()>,
}

impl Subscription {
    pub async fn next(&mut self) -> Option<GatewayEvent> {
        self.events.recv().await
    }

    pub fn close(self) {
        self.task.abort();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Connect to `ws_url` with `token` and forward every gateway event into the
/// returned subscription. The channel closes once reconnection gives up.
pub fn subscribe_notifications(ws_url: &str, token: &str, policy: ReconnectPolicy) -> Subscription {
    let url = format!("{ws_url}?token={token}");
    let (tx, events) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(url, policy, tx));
    Subscription { events, task }
}

enum Ended {
    /// The subscriber went away; stop for good.
    Unsubscribed,
    /// The socket dropped; try again.
    Lost,
}

async fn run(url: String, policy: ReconnectPolicy, tx: mpsc::UnboundedSender<GatewayEvent>) {
    let mut attempts = 0;

    loop {
        match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                attempts = 0;
                info!("Connected to gateway");
                match pump(stream, &tx).await {
                    Ended::Unsubscribed => return,
                    Ended::Lost => warn!("Gateway connection lost"),
                }
            }
            Err(tungstenite::Error::Http(response)) if response.status().as_u16() == 401 => {
                warn!("Gateway rejected the token, not reconnecting");
                return;
            }
            Err(e) => warn!("Gateway connect failed: {}", e),
        }

        attempts += 1;
        if attempts > policy.max_attempts {
            warn!("Giving up on the gateway after {} attempts", policy.max_attempts);
            return;
        }
        debug!("Reconnecting in {:?} (attempt {}/{})", policy.delay, attempts, policy.max_attempts);
        tokio::time::sleep(policy.delay).await;
    }
}

async fn pump<S>(mut stream: S, tx: &mpsc::UnboundedSender<GatewayEvent>) -> Ended
where
    S: Stream<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(tungstenite::Message::Text(text)) => text,
            Ok(tungstenite::Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        match serde_json::from_str::<GatewayEvent>(text.as_str()) {
            Ok(event) => {
                if tx.send(event).is_err() {
                    return Ended::Unsubscribed;
                }
            }
            Err(e) => debug!("Ignoring unknown gateway message: {}", e),
        }
    }
    if tx.is_closed() {
        Ended::Unsubscribed
    } else {
        Ended::Lost
    }
}
