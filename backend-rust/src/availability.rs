//! # availability
//!
//! Resolves a caddie's bookable time for one club and calendar date.
//!
//! Recurring weekly slots for `(club, weekday)` and date-specific slots are
//! parsed into [`SlotRange`]s, merged into maximal free blocks, and reduced by
//! every pending/accepted booking the caddie already holds that date. The
//! weekday is the plain calendar weekday of the date (0 = Sunday); no time zone
//! takes part in it.

use chrono::{Datelike, NaiveDate};
use schedule_types::{containing, merge, subtract, SlotRange, TimeBlock};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::persistence::BookingStore;
use crate::state::{Booking, Caddie, RecurringAvailability, SpecificAvailability};

/// 0 = Sunday … 6 = Saturday.
pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

fn parse_stored(caddie_id: Uuid, raw: &str) -> Option<SlotRange> {
    match SlotRange::parse_slot(raw) {
        Ok(slot) => Some(slot),
        Err(e) => {
            warn!("Caddie {caddie_id}: skipping unparsable slot '{raw}': {e}");
            None
        }
    }
}

/// Every slot the caddie declared for that club and date, unmerged.
pub fn declared_slots(caddie: &Caddie, date: NaiveDate, club_id: Uuid) -> Vec<SlotRange> {
    let weekday = day_of_week(date);

    let recurring = caddie
        .recurring_availability
        .iter()
        .filter(|r| r.club_id == club_id && r.day_of_week == weekday)
        .flat_map(|r| r.time_slots.iter());
    let specific = caddie
        .availability
        .iter()
        .filter(|s| s.date == date)
        .flat_map(|s| s.time_slots.iter());

    recurring
        .chain(specific)
        .filter_map(|raw| parse_stored(caddie.id, raw))
        .collect()
}

/// Merged declared time minus the intervals held by `bookings` on `date`.
pub fn free_blocks(caddie: &Caddie, date: NaiveDate, club_id: Uuid, bookings: &[Booking]) -> Vec<SlotRange> {
    let declared = merge(declared_slots(caddie, date, club_id));
    let busy: Vec<SlotRange> = bookings
        .iter()
        .filter(|b| b.caddie_id == caddie.id && b.date == date && b.status.holds_slot())
        .map(Booking::slot)
        .collect();
    subtract(&declared, &busy)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub caddie_id: Uuid,
    pub club_id: Uuid,
    pub date: NaiveDate,
    pub day_of_week: u8,
    pub free: Vec<TimeBlock>,
    /// Present when a window was asked about.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fits: Option<bool>,
    /// The free block that wholly contains the requested window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub containing_block: Option<TimeBlock>,
}

/// Loads the caddie's bookings for `date` and resolves the free blocks.
pub async fn resolve(
    store: &dyn BookingStore,
    caddie: &Caddie,
    date: NaiveDate,
    club_id: Uuid,
) -> anyhow::Result<Vec<SlotRange>> {
    let bookings = store.bookings_for_caddie_on(caddie.id, date).await?;
    Ok(free_blocks(caddie, date, club_id, &bookings))
}

/// Id-based entry used by the HTTP surface.
pub async fn resolve_availability(
    store: &dyn BookingStore,
    caddie_id: Uuid,
    date: NaiveDate,
    club_id: Uuid,
    requested: Option<SlotRange>,
) -> AppResult<Resolution> {
    let caddie = store
        .get_caddie(caddie_id)
        .await?
        .ok_or(AppError::NotFound("caddie.notFound"))?;
    let free = resolve(store, &caddie, date, club_id).await?;
    let hit = requested.and_then(|r| containing(&free, &r));

    Ok(Resolution {
        caddie_id,
        club_id,
        date,
        day_of_week: day_of_week(date),
        fits: requested.map(|_| hit.is_some()),
        containing_block: hit.map(TimeBlock::from),
        free: free.into_iter().map(TimeBlock::from).collect(),
    })
}

// ─── Editing Validation ──────────────────────────────────────────────────────

/// Parses every slot and rewrites it in canonical `HH:mm-HH:mm` form.
pub fn normalize_slots(slots: &[String]) -> AppResult<Vec<String>> {
    slots
        .iter()
        .map(|raw| {
            SlotRange::parse_slot(raw)
                .map(|s| s.to_string())
                .map_err(|_| AppError::Validation("availability.invalidSlot"))
        })
        .collect()
}

pub fn normalize_specific(entries: Vec<SpecificAvailability>) -> AppResult<Vec<SpecificAvailability>> {
    entries
        .into_iter()
        .map(|e| {
            Ok(SpecificAvailability {
                time_slots: normalize_slots(&e.time_slots)?,
                date: e.date,
            })
        })
        .collect()
}

pub fn normalize_recurring(entries: Vec<RecurringAvailability>) -> AppResult<Vec<RecurringAvailability>> {
    entries
        .into_iter()
        .map(|e| {
            if e.day_of_week > 6 {
                return Err(AppError::Validation("availability.invalidDay"));
            }
            Ok(RecurringAvailability {
                time_slots: normalize_slots(&e.time_slots)?,
                club_id: e.club_id,
                day_of_week: e.day_of_week,
            })
        })
        .collect()
}
