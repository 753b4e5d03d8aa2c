//! # booking_engine
//!
//! The booking lifecycle:
//!
//! ```text
//! pending ──accept──▶ accepted ──start(QR)──▶ in-progress ──complete──▶ completed
//!    │                   │  └──────────complete──────────────────────────▲
//!    └─reject─▶ rejected └─cancel─▶ cancelled ◀─cancel─ pending
//! ```
//!
//! Every mutation resolves the caller to the golfer or caddie profile referenced
//! by the booking before doing anything, and writes through a status-conditional
//! update so two racing transitions cannot both apply. Notifications and audit
//! entries are best-effort and never fail the operation.

use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use chrono_tz::Tz;
use schedule_types::{containing, SlotRange, TimeOfDay};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::alternatives::{self, AvailabilityCheck, Suggestions};
use crate::audit::AuditLogger;
use crate::auth::Caller;
use crate::availability::{self, Resolution};
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::notify::{self, NotificationSink};
use crate::persistence::BookingStore;
use crate::qr;
use crate::ratings;
use crate::refund::{hours_until, RefundPolicy, RefundQuote};
use crate::state::{
    Booking, BookingStatus, Caddie, Cancellation, Golfer, Party, RecurringAvailability, RefundStatus, Review,
    Role, SpecificAvailability, VettingStatus,
};

// ─── Requests ────────────────────────────────────────────────────────────────

/// Fields are optional so a missing one maps to `validation.required`
/// instead of a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub caddie_id: Option<Uuid>,
    pub club_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOutcome {
    pub booking: Booking,
    pub refund_info: RefundQuote,
}

/// A caddie's bookings in one calendar month. Earnings count completed services only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthStats {
    /// `YYYY-MM`
    pub month: String,
    pub total_bookings: usize,
    pub completed_bookings: usize,
    pub pending_bookings: usize,
    pub accepted_bookings: usize,
    pub estimated_earnings: i64,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct BookingEngine {
    store: Arc<dyn BookingStore>,
    notifier: Arc<dyn NotificationSink>,
    audit: AuditLogger,
    qr_secret: String,
    default_time_zone: Tz,
    refund_policy: RefundPolicy,
}

impl BookingEngine {
    pub fn new(
        store: Arc<dyn BookingStore>,
        notifier: Arc<dyn NotificationSink>,
        audit: AuditLogger,
        config: &AppConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            audit,
            qr_secret: config.qr_secret.clone(),
            default_time_zone: config.default_time_zone,
            refund_policy: config.refund_policy,
        }
    }

    pub fn store(&self) -> &dyn BookingStore {
        self.store.as_ref()
    }

    // ── Create ──

    pub async fn create_booking(&self, caller: &Caller, req: CreateBookingRequest) -> AppResult<Booking> {
        caller.require(Role::Golfer)?;
        let (Some(caddie_id), Some(club_id), Some(date), Some(start), Some(end)) =
            (req.caddie_id, req.club_id, req.date, req.start_time, req.end_time)
        else {
            return Err(AppError::Validation("validation.required"));
        };

        let golfer = self.golfer_of(caller).await?;
        let caddie = self
            .store
            .get_caddie(caddie_id)
            .await?
            .ok_or(AppError::NotFound("caddie.notFound"))?;
        if caddie.status != VettingStatus::Approved {
            return Err(AppError::Validation("caddie.pending"));
        }
        self.store
            .get_club(club_id)
            .await?
            .ok_or(AppError::NotFound("club.notFound"))?;

        let start_time = TimeOfDay::parse_hhmm(&start).map_err(|_| AppError::Validation("booking.invalidTime"))?;
        let end_time = TimeOfDay::parse_hhmm(&end).map_err(|_| AppError::Validation("booking.invalidTime"))?;
        let requested = SlotRange::from_times(start_time, end_time)
            .map_err(|_| AppError::Validation("booking.invalidTimeRange"))?;

        let existing = self.store.bookings_for_caddie_on(caddie.id, date).await?;
        if existing
            .iter()
            .any(|b| b.status.holds_slot() && b.slot().overlaps(&requested))
        {
            return Err(AppError::Validation("booking.alreadyBooked"));
        }

        let free = availability::free_blocks(&caddie, date, club_id, &existing);
        if containing(&free, &requested).is_none() {
            return Err(AppError::Validation("caddie.notAvailable"));
        }

        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4(),
            golfer_id: golfer.id,
            caddie_id: caddie.id,
            club_id,
            date,
            start_time,
            end_time,
            total_price: price_for(caddie.suggested_rate, &requested),
            status: BookingStatus::Pending,
            qr_code: None,
            caddie_rating: None,
            golfer_rating: None,
            payment_id: None,
            cancellation: None,
            created_at: now,
            updated_at: now,
        };

        // A concurrent request may have taken the slot since `existing` was read.
        if !self.store.insert_booking_if_free(&booking).await? {
            return Err(AppError::Validation("booking.alreadyBooked"));
        }

        info!(
            "Booking {} created: caddie {} on {} {}",
            booking.id,
            booking.caddie_id,
            booking.date,
            booking.slot()
        );
        self.audit.log_created(&booking).await;
        self.notify(notify::BOOKING_CREATED, &booking).await;
        Ok(booking)
    }

    // ── Caddie transitions ──

    pub async fn accept(&self, booking_id: Uuid, caller: &Caller) -> AppResult<Booking> {
        let mut booking = self.load(booking_id).await?;
        self.require_party(caller, &booking, Party::Caddie).await?;
        if booking.status != BookingStatus::Pending {
            return Err(AppError::InvalidState("booking.invalidStatus"));
        }

        let starts_at = self.scheduled_start(&booking).await?;
        booking.qr_code = Some(qr::issue(&self.qr_secret, booking.id, starts_at));
        self.transition(booking, BookingStatus::Accepted, notify::BOOKING_ACCEPTED).await
    }

    pub async fn reject(&self, booking_id: Uuid, caller: &Caller) -> AppResult<Booking> {
        let booking = self.load(booking_id).await?;
        self.require_party(caller, &booking, Party::Caddie).await?;
        if booking.status != BookingStatus::Pending {
            return Err(AppError::InvalidState("booking.invalidStatus"));
        }
        self.transition(booking, BookingStatus::Rejected, notify::BOOKING_REJECTED).await
    }

    pub async fn start(&self, booking_id: Uuid, caller: &Caller, qr_payload: &str) -> AppResult<Booking> {
        let booking = self.load(booking_id).await?;
        self.require_party(caller, &booking, Party::Caddie).await?;
        if booking.status != BookingStatus::Accepted {
            return Err(AppError::InvalidState("booking.invalidStatus"));
        }

        let starts_at = self.scheduled_start(&booking).await?;
        qr::verify(&self.qr_secret, qr_payload, booking.id, starts_at)?;
        self.transition(booking, BookingStatus::InProgress, notify::BOOKING_STARTED).await
    }

    /// Allowed straight from `accepted`: scanning is best-effort.
    pub async fn complete(&self, booking_id: Uuid, caller: &Caller) -> AppResult<Booking> {
        let booking = self.load(booking_id).await?;
        self.require_party(caller, &booking, Party::Caddie).await?;
        if !matches!(booking.status, BookingStatus::Accepted | BookingStatus::InProgress) {
            return Err(AppError::InvalidState("booking.invalidStatus"));
        }
        self.transition(booking, BookingStatus::Completed, notify::BOOKING_COMPLETED).await
    }

    // ── Cancel ──

    pub async fn cancel(
        &self,
        booking_id: Uuid,
        caller: &Caller,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<CancelOutcome> {
        let mut booking = self.load(booking_id).await?;
        let cancelled_by = self
            .party_of(caller, &booking)
            .await?
            .ok_or_else(AppError::forbidden)?;

        let prior = booking.status;
        if !matches!(prior, BookingStatus::Pending | BookingStatus::Accepted) {
            return Err(AppError::InvalidState("booking.cannotCancel"));
        }

        let hours = hours_until(self.scheduled_start(&booking).await?, now);
        let quote = self
            .refund_policy
            .quote(prior, cancelled_by, hours, booking.total_price);

        booking.cancellation = Some(Cancellation {
            cancelled_by,
            cancelled_at: now,
            reason: reason.unwrap_or_default(),
            refund_amount: quote.refund_amount,
            refund_percentage: quote.refund_percentage,
            hours_until_service: quote.hours_until_service,
            refund_status: (booking.payment_id.is_some() && quote.refund_amount > 0).then_some(RefundStatus::Pending),
        });
        booking.status = BookingStatus::Cancelled;
        booking.updated_at = now;

        if !self.store.update_booking(&booking, prior).await? {
            return Err(AppError::InvalidState("booking.cannotCancel"));
        }

        info!(
            "Booking {} cancelled by {}: {}% refund ({}), {}h ahead",
            booking.id,
            cancelled_by.as_str(),
            quote.refund_percentage,
            quote.refund_amount,
            quote.hours_until_service
        );
        self.audit.log_cancellation(&booking, prior).await;
        self.notify(notify::BOOKING_CANCELLED, &booking).await;
        Ok(CancelOutcome {
            booking,
            refund_info: quote,
        })
    }

    // ── Ratings ──

    /// `rated` is the party receiving the rating; the caller must be the other one.
    pub async fn rate(
        &self,
        booking_id: Uuid,
        caller: &Caller,
        rated: Party,
        rating: u8,
        review: Option<String>,
    ) -> AppResult<Booking> {
        let mut booking = self.load(booking_id).await?;
        let rater = match rated {
            Party::Caddie => Party::Golfer,
            Party::Golfer => Party::Caddie,
        };
        self.require_party(caller, &booking, rater).await?;

        if booking.status != BookingStatus::Completed {
            return Err(AppError::InvalidState("booking.invalidStatus"));
        }
        if !(1..=5).contains(&rating) {
            return Err(AppError::Validation("rating.invalid"));
        }
        if booking.rating_of(rated).is_some() {
            return Err(AppError::Validation("rating.alreadyRated"));
        }

        let now = Utc::now();
        let entry = Some(Review {
            rating,
            review: review.unwrap_or_default(),
            rated_at: now,
        });
        match rated {
            Party::Caddie => booking.caddie_rating = entry,
            Party::Golfer => booking.golfer_rating = entry,
        }
        booking.updated_at = now;

        if !self.store.update_booking(&booking, BookingStatus::Completed).await? {
            return Err(AppError::InvalidState("booking.invalidStatus"));
        }

        let profile_id = match rated {
            Party::Caddie => booking.caddie_id,
            Party::Golfer => booking.golfer_id,
        };
        // The booking already holds the rating; the next recompute repairs a miss.
        if let Err(e) = ratings::recompute(self.store.as_ref(), rated, profile_id).await {
            warn!("Rating aggregate for {} {profile_id} not refreshed: {e:#}", rated.as_str());
        }

        self.audit.log_rating(booking.id, rated, rating).await;
        self.notify(notify::BOOKING_RATED, &booking).await;
        Ok(booking)
    }

    // ── Queries ──

    pub async fn get_booking(&self, booking_id: Uuid, caller: &Caller) -> AppResult<Booking> {
        let booking = self.load(booking_id).await?;
        if caller.is_admin() || self.party_of(caller, &booking).await?.is_some() {
            Ok(booking)
        } else {
            Err(AppError::forbidden())
        }
    }

    /// Newest first.
    pub async fn bookings_for_caller(&self, caller: &Caller) -> AppResult<Vec<Booking>> {
        match caller.role {
            Role::Golfer => {
                let golfer = self.golfer_of(caller).await?;
                Ok(self.store.bookings_for_golfer(golfer.id).await?)
            }
            Role::Caddie => {
                let caddie = self.caddie_of(caller).await?;
                Ok(self.store.bookings_for_caddie(caddie.id).await?)
            }
            Role::Admin => Err(AppError::forbidden()),
        }
    }

    /// Earliest accepted or in-progress booking dated today or later.
    pub async fn next_service(&self, caller: &Caller, now: DateTime<Utc>) -> AppResult<Option<Booking>> {
        let today = self.today(now);
        let upcoming = self
            .bookings_for_caller(caller)
            .await?
            .into_iter()
            .filter(|b| is_active(b.status) && b.date >= today)
            .min_by_key(|b| (b.date, b.start_time));
        Ok(upcoming)
    }

    /// The caddie's accepted and in-progress bookings for today, by start time.
    pub async fn today_schedule(&self, caller: &Caller, now: DateTime<Utc>) -> AppResult<Vec<Booking>> {
        caller.require(Role::Caddie)?;
        let caddie = self.caddie_of(caller).await?;
        let mut today: Vec<Booking> = self
            .store
            .bookings_for_caddie_on(caddie.id, self.today(now))
            .await?
            .into_iter()
            .filter(|b| is_active(b.status))
            .collect();
        today.sort_by_key(|b| b.start_time);
        Ok(today)
    }

    // ── Availability ──

    pub async fn resolve_availability(
        &self,
        caddie_id: Uuid,
        date: NaiveDate,
        club_id: Uuid,
        requested: Option<SlotRange>,
    ) -> AppResult<Resolution> {
        availability::resolve_availability(self.store.as_ref(), caddie_id, date, club_id, requested).await
    }

    pub async fn suggest_alternatives(
        &self,
        caddie_id: Uuid,
        club_id: Uuid,
        date: NaiveDate,
        requested: SlotRange,
    ) -> AppResult<Suggestions> {
        alternatives::suggest_alternatives(self.store.as_ref(), caddie_id, club_id, date, requested).await
    }

    pub async fn check_availability(
        &self,
        caddie_id: Uuid,
        club_id: Uuid,
        date: NaiveDate,
        requested: SlotRange,
    ) -> AppResult<AvailabilityCheck> {
        alternatives::check_availability(self.store.as_ref(), caddie_id, club_id, date, requested).await
    }

    /// Approved caddies of `club_id` whose free time on `date` covers the whole window,
    /// best rated first.
    pub async fn search_caddies(&self, club_id: Uuid, date: NaiveDate, requested: SlotRange) -> AppResult<Vec<Caddie>> {
        self.store
            .get_club(club_id)
            .await?
            .ok_or(AppError::NotFound("club.notFound"))?;

        let mut found = Vec::new();
        for caddie in self.store.list_caddies().await? {
            if caddie.status != VettingStatus::Approved || !caddie.clubs.contains(&club_id) {
                continue;
            }
            let bookings = self.store.bookings_for_caddie_on(caddie.id, date).await?;
            let free = availability::free_blocks(&caddie, date, club_id, &bookings);
            if containing(&free, &requested).is_some() {
                found.push(caddie);
            }
        }
        found.sort_by(|a, b| {
            b.rating
                .total_cmp(&a.rating)
                .then_with(|| a.display_name.cmp(&b.display_name))
        });
        info!("Search {club_id} {date} {requested}: {} caddies free", found.len());
        Ok(found)
    }

    /// Counts for the calendar month containing `now` in the reference zone.
    pub async fn month_stats(&self, caller: &Caller, now: DateTime<Utc>) -> AppResult<MonthStats> {
        caller.require(Role::Caddie)?;
        let caddie = self.caddie_of(caller).await?;

        let today = self.today(now);
        let first = today
            .with_day(1)
            .ok_or_else(|| anyhow!("no first day for {today}"))?;
        let next = first
            .checked_add_months(Months::new(1))
            .ok_or_else(|| anyhow!("no month after {first}"))?;

        let bookings: Vec<Booking> = self
            .store
            .bookings_between(first, next)
            .await?
            .into_iter()
            .filter(|b| b.caddie_id == caddie.id)
            .collect();
        let count = |status: BookingStatus| bookings.iter().filter(|b| b.status == status).count();

        Ok(MonthStats {
            month: first.format("%Y-%m").to_string(),
            total_bookings: bookings.len(),
            completed_bookings: count(BookingStatus::Completed),
            pending_bookings: count(BookingStatus::Pending),
            accepted_bookings: count(BookingStatus::Accepted),
            estimated_earnings: bookings
                .iter()
                .filter(|b| b.status == BookingStatus::Completed)
                .map(|b| b.total_price)
                .sum(),
        })
    }

    /// Replaces the caller's date-specific availability.
    pub async fn set_specific_availability(
        &self,
        caller: &Caller,
        entries: Vec<SpecificAvailability>,
    ) -> AppResult<Caddie> {
        caller.require(Role::Caddie)?;
        let caddie = self.caddie_of(caller).await?;
        let entries = availability::normalize_specific(entries)?;
        let count = entries.len();
        let caddie = self
            .store
            .update_caddie(caddie.id, Box::new(move |c| c.availability = entries))
            .await?
            .ok_or(AppError::NotFound("caddie.notFound"))?;
        info!("Caddie {} set {count} specific availability entries", caddie.id);
        Ok(caddie)
    }

    /// Replaces the caller's weekly pattern. Every referenced club must exist and
    /// is added to the caddie's clubs.
    pub async fn set_recurring_availability(
        &self,
        caller: &Caller,
        entries: Vec<RecurringAvailability>,
    ) -> AppResult<Caddie> {
        caller.require(Role::Caddie)?;
        let caddie = self.caddie_of(caller).await?;
        let entries = availability::normalize_recurring(entries)?;
        for entry in &entries {
            if self.store.get_club(entry.club_id).await?.is_none() {
                return Err(AppError::NotFound("club.notFound"));
            }
        }

        let count = entries.len();
        let caddie = self
            .store
            .update_caddie(
                caddie.id,
                Box::new(move |c| {
                    for entry in &entries {
                        if !c.clubs.contains(&entry.club_id) {
                            c.clubs.push(entry.club_id);
                        }
                    }
                    c.recurring_availability = entries;
                }),
            )
            .await?
            .ok_or(AppError::NotFound("caddie.notFound"))?;
        info!("Caddie {} set {count} recurring availability entries", caddie.id);
        Ok(caddie)
    }

    // ── Internals ──

    async fn load(&self, booking_id: Uuid) -> AppResult<Booking> {
        self.store
            .get_booking(booking_id)
            .await?
            .ok_or(AppError::NotFound("booking.notFound"))
    }

    async fn golfer_of(&self, caller: &Caller) -> AppResult<Golfer> {
        self.store
            .find_golfer_by_user(caller.user_id)
            .await?
            .ok_or(AppError::NotFound("golfer.notFound"))
    }

    async fn caddie_of(&self, caller: &Caller) -> AppResult<Caddie> {
        self.store
            .find_caddie_by_user(caller.user_id)
            .await?
            .ok_or(AppError::NotFound("caddie.notFound"))
    }

    /// Which side of `booking` the caller is, judged by profile, not by claim.
    async fn party_of(&self, caller: &Caller, booking: &Booking) -> AppResult<Option<Party>> {
        let party = match caller.role {
            Role::Golfer => self
                .store
                .find_golfer_by_user(caller.user_id)
                .await?
                .filter(|g| g.id == booking.golfer_id)
                .map(|_| Party::Golfer),
            Role::Caddie => self
                .store
                .find_caddie_by_user(caller.user_id)
                .await?
                .filter(|c| c.id == booking.caddie_id)
                .map(|_| Party::Caddie),
            Role::Admin => None,
        };
        Ok(party)
    }

    async fn require_party(&self, caller: &Caller, booking: &Booking, party: Party) -> AppResult<()> {
        match self.party_of(caller, booking).await? {
            Some(p) if p == party => Ok(()),
            _ => Err(AppError::forbidden()),
        }
    }

    async fn zone_for(&self, club_id: Uuid) -> AppResult<Tz> {
        let club = self.store.get_club(club_id).await?;
        Ok(club.and_then(|c| c.time_zone).unwrap_or(self.default_time_zone))
    }

    async fn scheduled_start(&self, booking: &Booking) -> AppResult<DateTime<Utc>> {
        let tz = self.zone_for(booking.club_id).await?;
        qr::service_start(booking.date, booking.start_time, tz)
    }

    fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.default_time_zone).date_naive()
    }

    /// Writes `booking` with its new status if nobody moved it first.
    async fn transition(&self, mut booking: Booking, to: BookingStatus, event: &str) -> AppResult<Booking> {
        let from = booking.status;
        booking.status = to;
        booking.updated_at = Utc::now();
        if !self.store.update_booking(&booking, from).await? {
            return Err(AppError::InvalidState("booking.invalidStatus"));
        }

        info!("Booking {}: {} -> {}", booking.id, from.as_str(), to.as_str());
        self.audit.log_status_change(booking.id, from, to).await;
        self.notify(event, &booking).await;
        Ok(booking)
    }

    /// Publishes to both parties. Failures are logged and swallowed.
    async fn notify(&self, event: &str, booking: &Booking) {
        let golfer_user = match self.store.get_golfer(booking.golfer_id).await {
            Ok(g) => g.map(|g| g.user_id),
            Err(e) => {
                warn!("Notify {event}: golfer lookup failed: {e:#}");
                None
            }
        };
        let caddie_user = match self.store.get_caddie(booking.caddie_id).await {
            Ok(c) => c.map(|c| c.user_id),
            Err(e) => {
                warn!("Notify {event}: caddie lookup failed: {e:#}");
                None
            }
        };

        let mut payload = serde_json::to_value(booking).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut payload {
            map.insert("golferUserId".into(), serde_json::json!(golfer_user));
            map.insert("caddieUserId".into(), serde_json::json!(caddie_user));
        }

        for user_id in [golfer_user, caddie_user].into_iter().flatten() {
            if let Err(e) = self.notifier.publish(user_id, event, &payload).await {
                warn!("Notify {event} to {user_id} failed: {e:#}");
            }
        }
    }
}

fn is_active(status: BookingStatus) -> bool {
    matches!(status, BookingStatus::Accepted | BookingStatus::InProgress)
}

/// Hourly rate times duration, rounded to whole currency units.
pub fn price_for(hourly_rate: i64, slot: &SlotRange) -> i64 {
    (hourly_rate as f64 * f64::from(slot.duration_minutes()) / 60.0).round() as i64
}
