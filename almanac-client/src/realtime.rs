//! Change-notification subscription over the hosted realtime websocket
//! (Phoenix channel protocol). Only the change kind and row id are extracted;
//! the engine always re-fetches instead of trusting the pushed row.

use crate::config::RemoteConfig;
use crate::remote::{ChangeKind, ChangeNotice};
use almanac_core::errors::RemoteError;
use almanac_core::models::TaskId;
use backon::{ExponentialBuilder, Retryable};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const CONNECT_ATTEMPTS: usize = 3;
const REJOIN_PAUSE: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    pub payload: Value,
    #[serde(rename = "ref")]
    pub reference: Option<String>,
}

impl PhoenixMessage {
    fn join(config: &RemoteConfig) -> Self {
        Self {
            topic: topic(config),
            event: "phx_join".to_string(),
            payload: json!({
                "config": {
                    "postgres_changes": [{
                        "event": "*",
                        "schema": "public",
                        "table": config.table,
                        "filter": format!("user_id=eq.{}", config.user_id),
                    }]
                },
                "access_token": config.bearer(),
            }),
            reference: Some("1".to_string()),
        }
    }

    fn heartbeat(seq: u64) -> Self {
        Self {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: json!({}),
            reference: Some(seq.to_string()),
        }
    }
}

fn topic(config: &RemoteConfig) -> String {
    format!("realtime:public:{}", config.table)
}

/// `https://host` → `wss://host/realtime/v1/websocket?apikey=..&vsn=1.0.0`
pub fn realtime_url(config: &RemoteConfig) -> Result<String, RemoteError> {
    let base = config.url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(RemoteError::Rejected(format!(
            "unsupported remote url scheme: {}",
            config.url
        )));
    };
    Ok(format!(
        "{ws_base}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
        config.anon_key
    ))
}

/// Extract a change notice from a raw channel frame, if it is one.
pub fn parse_notice(text: &str) -> Option<ChangeNotice> {
    let message: PhoenixMessage = serde_json::from_str(text).ok()?;
    if message.event != "postgres_changes" {
        return None;
    }
    let data = message.payload.get("data")?;
    let kind = match data.get("type")?.as_str()? {
        "INSERT" => ChangeKind::Insert,
        "UPDATE" => ChangeKind::Update,
        "DELETE" => ChangeKind::Delete,
        _ => return None,
    };
    let task_id = ["record", "old_record"]
        .iter()
        .filter_map(|field| data.get(*field)?.get("id")?.as_str())
        .next()
        .map(TaskId::from);
    Some(ChangeNotice { kind, task_id })
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connect with retries and join the change channel.
async fn open_channel(
    url: &str,
    config: &RemoteConfig,
    attempts: usize,
) -> Result<WsStream, RemoteError> {
    let (mut ws, _) = (|| async move { connect_async(url).await })
        .retry(
            ExponentialBuilder::default()
                .with_min_delay(Duration::from_millis(100))
                .with_max_delay(Duration::from_secs(2))
                .with_max_times(attempts),
        )
        .notify(|err, delay| {
            tracing::warn!("REALTIME: Connect failed ({}), retrying in {:?}", err, delay);
        })
        .await
        .map_err(|e| RemoteError::Unavailable(e.to_string()))?;

    let join = serde_json::to_string(&PhoenixMessage::join(config))
        .map_err(|e| RemoteError::Rejected(e.to_string()))?;
    ws.send(Message::Text(join))
        .await
        .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
    tracing::info!("REALTIME: Joined {}", topic(config));
    Ok(ws)
}

/// Forward notices from one connection and keep it alive with heartbeats.
/// Returns `false` once the receiver is gone, `true` when the socket dropped.
async fn pump(ws: WsStream, tx: &mpsc::Sender<ChangeNotice>) -> bool {
    let (mut write, mut read) = ws.split();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut seq: u64 = 2;

    loop {
        tokio::select! {
            _ = tx.closed() => {
                let _ = write.close().await;
                return false;
            }
            _ = heartbeat.tick() => {
                let Ok(frame) = serde_json::to_string(&PhoenixMessage::heartbeat(seq)) else {
                    return true;
                };
                if write.send(Message::Text(frame)).await.is_err() {
                    tracing::warn!("REALTIME: Heartbeat failed, socket closed");
                    return true;
                }
                seq += 1;
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(notice) = parse_notice(&text) {
                        tracing::debug!("REALTIME: {:?} {:?}", notice.kind, notice.task_id);
                        if tx.send(notice).await.is_err() {
                            return false;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => return true,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("REALTIME: Socket error: {}", e);
                    return true;
                }
            }
        }
    }
}

/// Subscribe to row changes. The first connect fails fast; once established,
/// the subscription rejoins on its own after every disconnect and emits a
/// [`ChangeKind::Resync`] notice, until the returned receiver is dropped.
pub async fn subscribe(
    config: &RemoteConfig,
) -> Result<mpsc::Receiver<ChangeNotice>, RemoteError> {
    let url = realtime_url(config)?;
    let ws = open_channel(&url, config, CONNECT_ATTEMPTS).await?;
    let (tx, rx) = mpsc::channel::<ChangeNotice>(64);
    let config = config.clone();

    tokio::spawn(async move {
        let mut ws = ws;
        while pump(ws, &tx).await {
            tracing::warn!("REALTIME: Connection lost, rejoining");
            ws = loop {
                match open_channel(&url, &config, CONNECT_ATTEMPTS).await {
                    Ok(ws) => break ws,
                    Err(e) => {
                        if tx.is_closed() {
                            return;
                        }
                        tracing::warn!("REALTIME: Rejoin failed: {}", e);
                        tokio::time::sleep(REJOIN_PAUSE).await;
                    }
                }
            };
            // Changes made while disconnected were never pushed.
            let resync = ChangeNotice {
                kind: ChangeKind::Resync,
                task_id: None,
            };
            if tx.send(resync).await.is_err() {
                break;
            }
        }
        tracing::info!("REALTIME: Subscription closed");
    });

    Ok(rx)
}
