//! Nearby alternatives when a requested window does not fit.
//!
//! Scans forward day by day from the requested date, keeps the free blocks long
//! enough for the requested duration, and places the suggested window as close
//! to the requested start as each block allows.

use chrono::{Days, NaiveDate};
use schedule_types::{containing, format_minutes, SlotRange, TimeBlock};
use serde::Serialize;
use uuid::Uuid;

use crate::availability::{day_of_week, resolve};
use crate::error::{AppError, AppResult};
use crate::persistence::BookingStore;

/// Days scanned, the requested date included.
pub const SEARCH_HORIZON_DAYS: u64 = 14;
/// Stop once this many distinct days produced candidates.
pub const MAX_DAYS_WITH_AVAILABILITY: usize = 2;
pub const MAX_SUGGESTIONS: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub date: NaiveDate,
    pub day_of_week: u8,
    /// Free block the suggestion sits in.
    pub start_time: String,
    pub end_time: String,
    /// Window of the requested length inside that block.
    pub suggested_start: String,
    pub suggested_end: String,
    /// Minutes between the suggested and the requested start.
    pub distance: u16,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestions {
    pub requested_time: TimeBlock,
    pub is_available: bool,
    pub alternatives: Vec<Suggestion>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityCheck {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_block: Option<TimeBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_available: Option<Suggestion>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<Suggestion>,
}

/// Candidates from one day's free blocks, nearest to the requested start first.
pub fn candidates_for_day(date: NaiveDate, free: &[SlotRange], requested: &SlotRange) -> Vec<Suggestion> {
    let duration = requested.duration_minutes();
    let mut out: Vec<Suggestion> = free
        .iter()
        .filter(|block| block.duration_minutes() >= duration)
        .map(|block| {
            let start = requested
                .start_minute
                .clamp(block.start_minute, block.end_minute - duration);
            Suggestion {
                date,
                day_of_week: day_of_week(date),
                start_time: block.start_label(),
                end_time: block.end_label(),
                suggested_start: format_minutes(start),
                suggested_end: format_minutes(start + duration),
                distance: start.abs_diff(requested.start_minute),
            }
        })
        .collect();
    out.sort_by_key(|s| s.distance);
    out
}

pub async fn suggest_alternatives(
    store: &dyn BookingStore,
    caddie_id: Uuid,
    club_id: Uuid,
    date: NaiveDate,
    requested: SlotRange,
) -> AppResult<Suggestions> {
    let caddie = store
        .get_caddie(caddie_id)
        .await?
        .ok_or(AppError::NotFound("caddie.notFound"))?;

    let mut alternatives = Vec::new();
    let mut days_found = 0;
    let mut is_available = false;

    for offset in 0..SEARCH_HORIZON_DAYS {
        let Some(day) = date.checked_add_days(Days::new(offset)) else {
            break;
        };
        let free = resolve(store, &caddie, day, club_id).await?;
        if offset == 0 {
            is_available = containing(&free, &requested).is_some();
        }

        let found = candidates_for_day(day, &free, &requested);
        if found.is_empty() {
            continue;
        }
        days_found += 1;
        alternatives.extend(found);
        if days_found >= MAX_DAYS_WITH_AVAILABILITY || alternatives.len() >= MAX_SUGGESTIONS {
            break;
        }
    }
    alternatives.truncate(MAX_SUGGESTIONS);

    Ok(Suggestions {
        requested_time: TimeBlock::from(requested),
        is_available,
        alternatives,
    })
}

/// The containing free block when the window fits, otherwise the suggestions.
pub async fn check_availability(
    store: &dyn BookingStore,
    caddie_id: Uuid,
    club_id: Uuid,
    date: NaiveDate,
    requested: SlotRange,
) -> AppResult<AvailabilityCheck> {
    let caddie = store
        .get_caddie(caddie_id)
        .await?
        .ok_or(AppError::NotFound("caddie.notFound"))?;
    let free = resolve(store, &caddie, date, club_id).await?;

    if let Some(block) = containing(&free, &requested) {
        return Ok(AvailabilityCheck {
            available: true,
            available_block: Some(block.into()),
            next_available: None,
            alternatives: Vec::new(),
        });
    }

    let suggestions = suggest_alternatives(store, caddie_id, club_id, date, requested).await?;
    Ok(AvailabilityCheck {
        available: false,
        available_block: None,
        next_available: suggestions.alternatives.first().cloned(),
        alternatives: suggestions.alternatives,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::JsonFileStore;
    use crate::state::{Caddie, RecurringAvailability, VettingStatus};

    fn slot(s: &str) -> SlotRange {
        SlotRange::parse_slot(s).unwrap()
    }

    fn tuesday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 3).unwrap()
    }

    fn weekly(club: Uuid, day_of_week: u8, slots: &[&str]) -> RecurringAvailability {
        RecurringAvailability {
            club_id: club,
            day_of_week,
            time_slots: slots.iter().map(|s| s.to_string()).collect(),
        }
    }

    async fn store_with(recurring: Vec<RecurringAvailability>) -> (JsonFileStore, Uuid) {
        let store = JsonFileStore::in_memory();
        let caddie = Caddie {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            display_name: String::new(),
            status: VettingStatus::Approved,
            suggested_rate: 5000,
            clubs: vec![],
            availability: vec![],
            recurring_availability: recurring,
            rating: 0.0,
            total_ratings: 0,
        };
        store.save_caddie(&caddie).await.unwrap();
        (store, caddie.id)
    }

    #[test]
    fn window_is_clamped_into_each_block() {
        let day = tuesday();
        let free = [slot("7-9"), slot("11-16"), slot("9:30-10")];
        let found = candidates_for_day(day, &free, &slot("10-12"));

        // 30-minute block is too short
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].suggested_start, "11:00");
        assert_eq!(found[0].suggested_end, "13:00");
        assert_eq!(found[0].distance, 60);
        assert_eq!(found[1].suggested_start, "07:00");
        assert_eq!(found[1].suggested_end, "09:00");
        assert_eq!(found[1].distance, 180);
    }

    #[tokio::test]
    async fn skips_empty_days_and_stops_after_two_days() {
        let club = Uuid::new_v4();
        // Wed, Thu, Fri have time; Tue does not.
        let (store, caddie) = store_with(vec![
            weekly(club, 3, &["8-10", "14-18"]),
            weekly(club, 4, &["9-12"]),
            weekly(club, 5, &["9-12"]),
        ])
        .await;

        let s = suggest_alternatives(&store, caddie, club, tuesday(), slot("9-11")).await.unwrap();
        assert!(!s.is_available);
        let dates: Vec<NaiveDate> = s.alternatives.iter().map(|a| a.date).collect();
        let wed = tuesday().succ_opt().unwrap();
        let thu = wed.succ_opt().unwrap();
        assert_eq!(dates, vec![wed, wed, thu]);
        // closest to 09:00 first within the day
        assert_eq!(s.alternatives[0].suggested_start, "08:00");
    }

    #[tokio::test]
    async fn caps_the_number_of_suggestions() {
        let club = Uuid::new_v4();
        let many = ["6-7", "8-9", "10-11", "12-13", "14-15"];
        let (store, caddie) = store_with(vec![weekly(club, 2, &many), weekly(club, 3, &many)]).await;

        let s = suggest_alternatives(&store, caddie, club, tuesday(), slot("9:30-10:30")).await.unwrap();
        assert_eq!(s.alternatives.len(), MAX_SUGGESTIONS);
    }

    #[tokio::test]
    async fn nothing_within_the_horizon_is_empty_not_an_error() {
        let (store, caddie) = store_with(vec![]).await;
        let s = suggest_alternatives(&store, caddie, Uuid::new_v4(), tuesday(), slot("9-10")).await.unwrap();
        assert!(s.alternatives.is_empty());
    }

    #[tokio::test]
    async fn check_returns_block_or_next_available() {
        let club = Uuid::new_v4();
        let (store, caddie) = store_with(vec![weekly(club, 2, &["9-12", "12-15"])]).await;

        let hit = check_availability(&store, caddie, club, tuesday(), slot("10-13")).await.unwrap();
        assert!(hit.available);
        assert_eq!(hit.available_block.unwrap(), TimeBlock::from(slot("9-15")));

        let miss = check_availability(&store, caddie, club, tuesday(), slot("14-16")).await.unwrap();
        assert!(!miss.available);
        let next = miss.next_available.unwrap();
        assert_eq!((next.suggested_start.as_str(), next.suggested_end.as_str()), ("13:00", "15:00"));
    }
}
