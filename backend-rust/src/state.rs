use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use schedule_types::{SlotRange, TimeOfDay};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Roles & Parties ─────────────────────────────────────────────────────────

/// Role claimed by an authenticated user. Only used for route gating; ownership
/// is always re-checked against the booking's golfer/caddie references.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Golfer,
    Caddie,
    Admin,
}

/// Side of a booking: who cancels, who rates, who gets rated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    Golfer,
    Caddie,
}

impl Party {
    pub fn as_str(self) -> &'static str {
        match self {
            Party::Golfer => "golfer",
            Party::Caddie => "caddie",
        }
    }
}

// ─── Status Enums ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VettingStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BookingStatus {
    #[default]
    Pending,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
    Rejected,
}

impl BookingStatus {
    /// Pending and accepted bookings occupy the caddie's time.
    pub fn holds_slot(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Accepted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::InProgress => "in-progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
    /// Owed, waiting for the provider.
    Pending,
    /// The provider reported the money returned.
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Refunded,
}

// ─── Clubs ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Club {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub city: String,
    /// Club-local zone for service start instants. Falls back to `CLUB_TIME_ZONE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<Tz>,
}

// ─── Caddie Availability ─────────────────────────────────────────────────────

/// Free blocks bound to one calendar date, club-agnostic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpecificAvailability {
    pub date: NaiveDate,
    pub time_slots: Vec<String>,
}

/// Weekly pattern at one club. `day_of_week`: 0 = Sunday … 6 = Saturday.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecurringAvailability {
    pub club_id: Uuid,
    pub day_of_week: u8,
    pub time_slots: Vec<String>,
}

// ─── Profiles ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Caddie {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub status: VettingStatus,
    /// Hourly rate in whole currency units.
    pub suggested_rate: i64,
    #[serde(default)]
    pub clubs: Vec<Uuid>,
    #[serde(default)]
    pub availability: Vec<SpecificAvailability>,
    #[serde(default)]
    pub recurring_availability: Vec<RecurringAvailability>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub total_ratings: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Golfer {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handicap: Option<f64>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub total_ratings: u32,
}

// ─── Bookings ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub rating: u8,
    #[serde(default)]
    pub review: String,
    pub rated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    pub cancelled_by: Party,
    pub cancelled_at: DateTime<Utc>,
    #[serde(default)]
    pub reason: String,
    pub refund_amount: i64,
    pub refund_percentage: u8,
    pub hours_until_service: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_status: Option<RefundStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub golfer_id: Uuid,
    pub caddie_id: Uuid,
    pub club_id: Uuid,
    pub date: NaiveDate,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub total_price: i64,
    pub status: BookingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
    /// Golfer's rating of the caddie.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caddie_rating: Option<Review>,
    /// Caddie's rating of the golfer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub golfer_rating: Option<Review>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation: Option<Cancellation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn slot(&self) -> SlotRange {
        SlotRange {
            start_minute: self.start_time.minutes(),
            end_minute: self.end_time.minutes(),
        }
    }

    /// Rating slot for the given rated party.
    pub fn rating_of(&self, rated: Party) -> Option<&Review> {
        match rated {
            Party::Caddie => self.caddie_rating.as_ref(),
            Party::Golfer => self.golfer_rating.as_ref(),
        }
    }
}

// ─── Payments ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub golfer_id: Uuid,
    pub caddie_id: Uuid,
    pub amount: i64,
    pub commission: i64,
    pub caddie_amount: i64,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_preference_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liquidated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ─── Full Store Snapshot ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    #[serde(default)]
    pub clubs: HashMap<Uuid, Club>,
    #[serde(default)]
    pub caddies: HashMap<Uuid, Caddie>,
    #[serde(default)]
    pub golfers: HashMap<Uuid, Golfer>,
    #[serde(default)]
    pub bookings: HashMap<Uuid, Booking>,
    #[serde(default)]
    pub payments: HashMap<Uuid, Payment>,
}
