//! # audit
//!
//! SHA-256 chained append-only log of booking events.
//!
//! Every creation, status change, cancellation, rating and payment settlement is
//! appended as a block that hashes the previous block's hash, so editing or
//! dropping a line breaks the chain. Write failures are logged and never fail
//! the booking operation that produced the event.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::state::{Booking, BookingStatus, Party, Payment};

// ── Audit Event Types ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    BookingCreated,
    /// accept, reject, start, complete
    StatusChange,
    /// Cancellation with the computed refund
    Cancellation,
    Rating,
    PaymentSettled,
    /// Provider returned the golfer's money
    Refund,
    Liquidation,
}

impl AuditEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditEventType::BookingCreated => "BOOKING_CREATED",
            AuditEventType::StatusChange => "STATUS_CHANGE",
            AuditEventType::Cancellation => "CANCELLATION",
            AuditEventType::Rating => "RATING",
            AuditEventType::PaymentSettled => "PAYMENT_SETTLED",
            AuditEventType::Refund => "REFUND",
            AuditEventType::Liquidation => "LIQUIDATION",
        }
    }
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Audit Block ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditBlock {
    /// Monotonically increasing sequence number within this process
    pub block_seq: u64,
    /// Booking (or payment) the event concerns
    pub subject_id: Uuid,
    pub timestamp_ms: i64,
    /// Hex SHA-256 of the previous block. Genesis: 64 zeros.
    pub prev_hash: String,
    pub event_type: AuditEventType,
    pub payload_json: String,
    /// SHA-256 of (prev_hash || timestamp_ms || event_type || subject_id || payload_json)
    pub block_hash: String,
}

impl AuditBlock {
    fn compute_hash(
        prev_hash: &str,
        timestamp_ms: i64,
        event_type: AuditEventType,
        subject_id: &Uuid,
        payload_json: &str,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(prev_hash.as_bytes());
        hasher.update(timestamp_ms.to_le_bytes());
        hasher.update(event_type.as_str().as_bytes());
        hasher.update(subject_id.as_bytes());
        hasher.update(payload_json.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn new(
        block_seq: u64,
        subject_id: Uuid,
        timestamp_ms: i64,
        prev_hash: String,
        event_type: AuditEventType,
        payload_json: String,
    ) -> Self {
        let block_hash =
            Self::compute_hash(&prev_hash, timestamp_ms, event_type, &subject_id, &payload_json);
        Self {
            block_seq,
            subject_id,
            timestamp_ms,
            prev_hash,
            event_type,
            payload_json,
            block_hash,
        }
    }

    /// Recomputes the hash from the stored fields.
    pub fn verify(&self) -> bool {
        let expected = Self::compute_hash(
            &self.prev_hash,
            self.timestamp_ms,
            self.event_type,
            &self.subject_id,
            &self.payload_json,
        );
        expected == self.block_hash
    }
}

/// Checks every block and every link. Returns the index of the first bad block.
pub fn verify_chain(blocks: &[AuditBlock]) -> Result<(), usize> {
    let mut prev = GENESIS_HASH;
    for (i, block) in blocks.iter().enumerate() {
        if block.prev_hash != prev || !block.verify() {
            return Err(i);
        }
        prev = block.block_hash.as_str();
    }
    Ok(())
}

/// Every block in a JSON-lines log. A missing file is an empty log.
pub async fn read_log(path: &Path) -> anyhow::Result<Vec<AuditBlock>> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .enumerate()
        .map(|(i, l)| {
            serde_json::from_str(l).map_err(|e| anyhow::anyhow!("line {}: {e}", i + 1))
        })
        .collect()
}

// ── Audit Logger ──────────────────────────────────────────────────────────────

const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

struct AuditState {
    block_seq: u64,
    last_hash: String,
}

/// Append-only chained audit logger. Without a path blocks are only traced.
#[derive(Clone)]
pub struct AuditLogger {
    state: Arc<RwLock<AuditState>>,
    path: Option<PathBuf>,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::build(Some(path.into()))
    }

    pub fn disabled() -> Self {
        Self::build(None)
    }

    /// Continues the chain already on disk at `path`, if any.
    pub async fn resume(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let logger = Self::build(Some(path.clone()));
        match read_log(&path).await {
            Ok(blocks) => {
                if let Some(last) = blocks.last() {
                    let mut state = logger.state.write().await;
                    state.block_seq = last.block_seq + 1;
                    state.last_hash = last.block_hash.clone();
                    debug!("Audit: resuming after block {}", last.block_seq);
                }
            }
            Err(e) => warn!("Audit: could not read {}, starting a new chain: {e:#}", path.display()),
        }
        logger
    }

    fn build(path: Option<PathBuf>) -> Self {
        Self {
            state: Arc::new(RwLock::new(AuditState {
                block_seq: 0,
                last_hash: GENESIS_HASH.to_string(),
            })),
            path,
        }
    }

    /// Chains and writes one booking event. Every helper below goes through here.
    pub async fn append(&self, event_type: AuditEventType, subject_id: Uuid, payload: serde_json::Value) -> AuditBlock {
        let timestamp_ms = Utc::now().timestamp_millis();
        let payload_json = payload.to_string();

        // The lock is held through the write so file order matches chain order.
        let mut state = self.state.write().await;
        let block = AuditBlock::new(
            state.block_seq,
            subject_id,
            timestamp_ms,
            state.last_hash.clone(),
            event_type,
            payload_json,
        );
        state.last_hash = block.block_hash.clone();
        state.block_seq += 1;

        debug_assert!(block.verify(), "AuditBlock hash mismatch immediately after creation");

        let Some(path) = &self.path else {
            debug!("Audit[{}]: {} {} {}", block.block_seq, block.event_type, subject_id, block.block_hash);
            return block;
        };

        let line = match serde_json::to_string(&block) {
            Ok(l) => format!("{l}\n"),
            Err(e) => {
                warn!("Audit: failed to serialize block: {e}");
                return block;
            }
        };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                warn!("Audit: could not create {}: {e}", dir.display());
            }
        }

        match OpenOptions::new().create(true).append(true).open(path).await {
            Ok(mut f) => {
                if let Err(e) = f.write_all(line.as_bytes()).await {
                    warn!("Audit: write failed: {e}");
                }
            }
            Err(e) => warn!("Audit: could not open {}: {e}", path.display()),
        }
        block
    }

    pub async fn log_created(&self, booking: &Booking) {
        self.append(
            AuditEventType::BookingCreated,
            booking.id,
            serde_json::json!({
                "caddieId": booking.caddie_id,
                "golferId": booking.golfer_id,
                "date": booking.date,
                "slot": booking.slot().to_string(),
                "totalPrice": booking.total_price,
            }),
        )
        .await;
    }

    pub async fn log_status_change(&self, booking_id: Uuid, from: BookingStatus, to: BookingStatus) {
        self.append(
            AuditEventType::StatusChange,
            booking_id,
            serde_json::json!({ "from": from, "to": to }),
        )
        .await;
    }

    pub async fn log_cancellation(&self, booking: &Booking, from: BookingStatus) {
        self.append(
            AuditEventType::Cancellation,
            booking.id,
            serde_json::json!({ "from": from, "cancellation": booking.cancellation }),
        )
        .await;
    }

    pub async fn log_rating(&self, booking_id: Uuid, rated: Party, rating: u8) {
        self.append(
            AuditEventType::Rating,
            booking_id,
            serde_json::json!({ "rated": rated, "rating": rating }),
        )
        .await;
    }

    pub async fn log_payment_settled(&self, payment: &Payment) {
        self.append(
            AuditEventType::PaymentSettled,
            payment.booking_id,
            serde_json::json!({
                "paymentId": payment.id,
                "amount": payment.amount,
                "providerPaymentId": payment.provider_payment_id,
            }),
        )
        .await;
    }

    pub async fn log_refund(&self, payment: &Payment) {
        self.append(
            AuditEventType::Refund,
            payment.booking_id,
            serde_json::json!({ "paymentId": payment.id, "providerPaymentId": payment.provider_payment_id }),
        )
        .await;
    }

    pub async fn log_liquidation(&self, payment: &Payment) {
        self.append(
            AuditEventType::Liquidation,
            payment.booking_id,
            serde_json::json!({ "paymentId": payment.id, "caddieAmount": payment.caddie_amount }),
        )
        .await;
    }
}
