use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use cf_battle_server::bot::{Bot, BotOptions, CommandContext};
use cf_battle_server::judge::{CfJudge, DEFAULT_API_BASE};
use cf_battle_server::router::{parse_command, parse_interaction, Command, Interaction};
use cf_battle_server::store::PointsStore;
use cf_battle_server::transport::{ChatTransport, Controls};
use cf_battle_server::types::{ChatId, MessageId};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_MESSAGE_ID: AtomicI64 = AtomicI64::new(1);

/// Chat-bridge transport: every outbound chat operation is broadcast as a
/// JSON frame to all connected bridge clients. The bridge process on the
/// other end owns the actual chat platform session.
#[derive(Clone)]
struct WsTransport {
    clients: Arc<Mutex<HashMap<String, mpsc::Sender<String>>>>,
}

impl WsTransport {
    fn new() -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn register(&self, client_id: String, tx: mpsc::Sender<String>) {
        self.clients.lock().await.insert(client_id, tx);
    }

    async fn unregister(&self, client_id: &str) {
        self.clients.lock().await.remove(client_id);
    }

    async fn send_to(&self, client_id: &str, payload: String) {
        let clients = self.clients.lock().await;
        if let Some(tx) = clients.get(client_id) {
            let _ = tx.try_send(payload);
        }
    }

    /// Sends the payload to every bridge client, dropping ones whose queue
    /// is gone or full. Returns how many clients received it.
    async fn broadcast(&self, payload: String) -> usize {
        let mut clients = self.clients.lock().await;
        let mut failed = Vec::new();
        let mut delivered = 0;
        for (client_id, tx) in clients.iter() {
            if tx.try_send(payload.clone()).is_ok() {
                delivered += 1;
            } else {
                failed.push(client_id.clone());
            }
        }
        for client_id in failed {
            clients.remove(&client_id);
        }
        delivered
    }
}

impl ChatTransport for WsTransport {
    async fn post_message(
        &self,
        chat_id: ChatId,
        text: &str,
        controls: Option<Controls>,
    ) -> Option<MessageId> {
        let message_id = NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "type": "message",
            "chatId": chat_id,
            "messageId": message_id,
            "text": text,
            "buttons": buttons_payload(controls.as_ref()),
        })
        .to_string();
        if self.broadcast(payload).await == 0 {
            eprintln!("[server] no bridge client connected, message to chat {chat_id} dropped");
            return None;
        }
        Some(message_id)
    }

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        controls: Option<Controls>,
    ) -> bool {
        let payload = json!({
            "type": "edit",
            "chatId": chat_id,
            "messageId": message_id,
            "text": text,
            "buttons": buttons_payload(controls.as_ref()),
        })
        .to_string();
        self.broadcast(payload).await > 0
    }

    async fn answer_interaction(&self, interaction_id: &str, alert: Option<&str>) {
        let payload = json!({
            "type": "answer",
            "interactionId": interaction_id,
            "alert": alert,
        })
        .to_string();
        self.broadcast(payload).await;
    }
}

fn buttons_payload(controls: Option<&Controls>) -> Value {
    match controls {
        None => Value::Null,
        Some(controls) => Value::Array(
            controls
                .buttons
                .iter()
                .map(|button| {
                    json!({
                        "label": button.label,
                        "action": button.action,
                    })
                })
                .collect(),
        ),
    }
}

#[derive(Clone)]
struct AppState {
    bot: Bot<CfJudge, WsTransport>,
    transport: WsTransport,
}

#[derive(Debug, Deserialize)]
struct LeaderboardQuery {
    #[serde(rename = "chatId")]
    chat_id: Option<String>,
    limit: Option<String>,
}

#[derive(Debug)]
enum ParsedBridgeMessage {
    Command {
        ctx: CommandContext,
        command: Command,
    },
    Interaction {
        ctx: CommandContext,
        interaction_id: String,
        interaction: Interaction,
    },
    /// Well-formed frame carrying text the core has no command for.
    Ignored,
}

#[tokio::main]
async fn main() {
    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let store_path = std::env::var("STORE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".data/points.json"));

    let api_base =
        std::env::var("CF_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());

    let transport = WsTransport::new();
    let bot = Bot::new(
        CfJudge::new(&api_base),
        transport.clone(),
        PointsStore::new(store_path),
        BotOptions::default(),
    );

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/leaderboard", get(leaderboard_handler))
        .route("/ws", get(ws_handler))
        .with_state(AppState { bot, transport });

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind server socket");

    println!("[server] listening on :{port}");
    axum::serve(listener, app)
        .await
        .expect("server runtime failed");
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn leaderboard_handler(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> impl IntoResponse {
    let chat_id = parse_chat_id(query.chat_id.as_deref());
    let limit = parse_leaderboard_limit(query.limit.as_deref());
    Json(state.bot.leaderboard_response(chat_id, limit).await)
}

fn parse_chat_id(raw: Option<&str>) -> ChatId {
    raw.and_then(|value| value.parse::<ChatId>().ok())
        .unwrap_or(0)
}

fn parse_leaderboard_limit(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|value| value.parse::<usize>().ok())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let client_id = make_id("bridge");
    let (tx, mut rx) = mpsc::channel::<String>(256);
    state.transport.register(client_id.clone(), tx).await;
    println!("[server] bridge client connected: {client_id}");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if ws_sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_bridge_message(&state, &client_id, raw.to_string()).await;
            }
            Message::Binary(raw) => {
                if let Ok(text) = String::from_utf8(raw.to_vec()) {
                    handle_bridge_message(&state, &client_id, text).await;
                } else {
                    send_error_to_client(&state, &client_id, "invalid utf8 message").await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.transport.unregister(&client_id).await;
    println!("[server] bridge client disconnected: {client_id}");
    let _ = writer.await;
}

async fn handle_bridge_message(state: &AppState, client_id: &str, raw: String) {
    let Some(parsed) = parse_bridge_message(&raw) else {
        send_error_to_client(state, client_id, "invalid message").await;
        return;
    };

    // A slow verification round-trip must not stall the socket reader.
    match parsed {
        ParsedBridgeMessage::Ignored => {}
        ParsedBridgeMessage::Command { ctx, command } => {
            let bot = state.bot.clone();
            tokio::spawn(async move {
                bot.handle_command(&ctx, command).await;
            });
        }
        ParsedBridgeMessage::Interaction {
            ctx,
            interaction_id,
            interaction,
        } => {
            let bot = state.bot.clone();
            tokio::spawn(async move {
                bot.handle_interaction(&ctx, &interaction_id, interaction).await;
            });
        }
    }
}

async fn send_error_to_client(state: &AppState, client_id: &str, message: &str) {
    let payload = json!({
        "type": "error",
        "message": message,
    })
    .to_string();
    state.transport.send_to(client_id, payload).await;
}

fn parse_bridge_message(raw: &str) -> Option<ParsedBridgeMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    let chat_id = object.get("chatId")?.as_i64()?;
    let user_id = object.get("userId")?.as_i64()?;
    let display_name = match object.get("displayName") {
        None => String::new(),
        Some(value) => value.as_str()?.to_string(),
    };
    let ctx = CommandContext {
        chat_id,
        user_id,
        display_name,
    };

    match message_type {
        "command" => {
            let text = object.get("text")?.as_str()?;
            match parse_command(text) {
                Some(command) => Some(ParsedBridgeMessage::Command { ctx, command }),
                None => Some(ParsedBridgeMessage::Ignored),
            }
        }
        "interaction" => {
            let interaction_id = object.get("interactionId")?.as_str()?.to_string();
            let interaction = parse_interaction(object.get("data")?.as_str()?)?;
            Some(ParsedBridgeMessage::Interaction {
                ctx,
                interaction_id,
                interaction,
            })
        }
        _ => None,
    }
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}
