//! Booking notifications. The core publishes `(user, event, payload)`; how it
//! reaches a live session is the sink's business.

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;
use socketioxide::extract::{Data, SocketRef};
use socketioxide::SocketIo;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::AuthEngine;

pub const BOOKING_CREATED: &str = "booking:created";
pub const BOOKING_ACCEPTED: &str = "booking:accepted";
pub const BOOKING_REJECTED: &str = "booking:rejected";
pub const BOOKING_STARTED: &str = "booking:started";
pub const BOOKING_COMPLETED: &str = "booking:completed";
pub const BOOKING_CANCELLED: &str = "booking:cancelled";
pub const BOOKING_RATED: &str = "booking:rated";

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, user_id: Uuid, event: &str, payload: &Value) -> anyhow::Result<()>;
}

pub fn user_room(user_id: Uuid) -> String {
    format!("user:{user_id}")
}

// ─── Socket.IO Sink ──────────────────────────────────────────────────────────

pub struct SocketIoNotifier {
    io: SocketIo,
}

impl SocketIoNotifier {
    pub fn new(io: SocketIo) -> Self {
        Self { io }
    }
}

#[async_trait]
impl NotificationSink for SocketIoNotifier {
    async fn publish(&self, user_id: Uuid, event: &str, payload: &Value) -> anyhow::Result<()> {
        self.io
            .to(user_room(user_id))
            .emit(event.to_string(), payload)
            .map_err(|e| anyhow!("emit {event} to {user_id} failed: {e}"))
    }
}

/// Socket connection handler: a client joins its own room by emitting
/// `register` with `{ "token": <jwt> }` (or the bare token string).
pub async fn on_connect(socket: SocketRef, auth: Arc<AuthEngine>) {
    info!("Client connected: {}", socket.id);

    socket.on_disconnect(|s: SocketRef| async move {
        info!("Client disconnected: {}", s.id);
    });

    socket.on("register", move |s: SocketRef, Data::<Value>(data)| {
        let auth = auth.clone();
        async move {
            let token = data
                .get("token")
                .and_then(Value::as_str)
                .or_else(|| data.as_str())
                .unwrap_or_default();

            let Some(caller) = auth.verify(token) else {
                warn!("Client {}: rejected, invalid token", s.id);
                let _ = s.emit("register-error", &serde_json::json!({ "error": "errors.unauthorized" }));
                let _ = s.disconnect();
                return;
            };

            let room = user_room(caller.user_id);
            let _ = s.join(room.clone());
            info!("Client {} registered as {:?} in {room}", s.id, caller.role);
            let _ = s.emit("registered", &serde_json::json!({ "room": room }));
        }
    });
}

// ─── Recording Sink ──────────────────────────────────────────────────────────

/// Keeps every published event in memory.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(Uuid, String, Value)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events_for(&self, user_id: Uuid) -> Vec<String> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|(u, _, _)| *u == user_id)
            .map(|(_, e, _)| e.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn publish(&self, user_id: Uuid, event: &str, payload: &Value) -> anyhow::Result<()> {
        self.events.lock().await.push((user_id, event.to_string(), payload.clone()));
        Ok(())
    }
}
