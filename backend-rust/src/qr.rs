//! QR binding between a physical scan and one booking's scheduled start.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use schedule_types::TimeOfDay;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Maximum distance, in hours, between the embedded timestamp and the scheduled start.
pub const QR_TOLERANCE_HOURS: i64 = 24;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QrPayload {
    booking_id: Option<String>,
    timestamp: Option<serde_json::Value>,
    #[serde(default)]
    signature: String,
}

/// Booking date plus start time, read in the club's zone. A start that falls in
/// a DST gap resolves to the earliest valid instant after it.
pub fn service_start(date: NaiveDate, start: TimeOfDay, tz: Tz) -> AppResult<DateTime<Utc>> {
    let naive = date
        .and_hms_opt(u32::from(start.hour()), u32::from(start.minute()), 0)
        .ok_or(AppError::Validation("booking.invalidTime"))?;
    let local = match tz.from_local_datetime(&naive).earliest() {
        Some(t) => t,
        None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .ok_or(AppError::Validation("booking.invalidTime"))?,
    };
    Ok(local.with_timezone(&Utc))
}

fn signature(secret: &str, booking_id: &str, timestamp_ms: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b"|");
    hasher.update(booking_id.as_bytes());
    hasher.update(b"|");
    hasher.update(timestamp_ms.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Produces the payload encoded in the QR shown to the golfer on acceptance.
pub fn issue(secret: &str, booking_id: Uuid, start: DateTime<Utc>) -> String {
    let id = booking_id.to_string();
    let timestamp_ms = start.timestamp_millis();
    serde_json::json!({
        "bookingId": id,
        "timestamp": timestamp_ms,
        "signature": signature(secret, &id, timestamp_ms),
    })
    .to_string()
}

/// Checks a scanned payload against the booking it is presented for.
pub fn verify(secret: &str, raw: &str, booking_id: Uuid, scheduled_start: DateTime<Utc>) -> AppResult<()> {
    let payload: QrPayload =
        serde_json::from_str(raw.trim()).map_err(|_| AppError::Validation("booking.invalidQR"))?;

    let embedded_id = payload.booking_id.ok_or(AppError::Validation("booking.invalidQR"))?;
    if embedded_id != booking_id.to_string() {
        return Err(AppError::Validation("booking.qrMismatch"));
    }

    let timestamp_ms = payload
        .timestamp
        .as_ref()
        .and_then(serde_json::Value::as_i64)
        .filter(|t| *t > 0)
        .ok_or(AppError::Validation("booking.qrInvalidTimestamp"))?;

    if payload.signature != signature(secret, &embedded_id, timestamp_ms) {
        return Err(AppError::Validation("booking.invalidQR"));
    }

    let embedded = DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .ok_or(AppError::Validation("booking.qrInvalidTimestamp"))?;
    let skew_ms = (embedded - scheduled_start).num_milliseconds().abs();
    if skew_ms > Duration::hours(QR_TOLERANCE_HOURS).num_milliseconds() {
        return Err(AppError::Validation("booking.qrDateMismatch"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "qr-test";

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    fn key(err: AppError) -> &'static str {
        err.translation_key()
    }

    #[test]
    fn issued_payload_verifies() {
        let id = Uuid::new_v4();
        let raw = issue(SECRET, id, start());
        assert!(verify(SECRET, &raw, id, start()).is_ok());
        // tolerates skew within a day
        assert!(verify(SECRET, &raw, id, start() + Duration::hours(20)).is_ok());
    }

    #[test]
    fn each_failure_has_its_own_key() {
        let id = Uuid::new_v4();
        let raw = issue(SECRET, id, start());

        assert_eq!(key(verify(SECRET, "not json", id, start()).unwrap_err()), "booking.invalidQR");
        assert_eq!(key(verify(SECRET, &raw, Uuid::new_v4(), start()).unwrap_err()), "booking.qrMismatch");
        assert_eq!(
            key(verify(SECRET, &raw, id, start() + Duration::days(3)).unwrap_err()),
            "booking.qrDateMismatch"
        );
        assert_eq!(key(verify("other", &raw, id, start()).unwrap_err()), "booking.invalidQR");

        let no_ts = serde_json::json!({ "bookingId": id.to_string() }).to_string();
        assert_eq!(key(verify(SECRET, &no_ts, id, start()).unwrap_err()), "booking.qrInvalidTimestamp");
    }

    #[test]
    fn service_start_uses_club_zone() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let nine = TimeOfDay::parse_hhmm("09:00").unwrap();
        let at = service_start(date, nine, chrono_tz::America::Argentina::Buenos_Aires).unwrap();
        // UTC-3, no DST
        assert_eq!(at, Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap());
    }
}
