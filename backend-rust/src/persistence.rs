use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::{Booking, BookingStatus, Caddie, Club, Golfer, Payment, PaymentStatus, StoreSnapshot};

/// In-place edit of one stored profile, applied under the store's write lock.
pub type CaddieEdit = Box<dyn FnOnce(&mut Caddie) + Send>;
pub type GolferEdit = Box<dyn FnOnce(&mut Golfer) + Send>;

/// Persistence for profiles, bookings and payments.
///
/// The booking core reaches storage only through this trait. Writes that must
/// not race (slot insertion, status transitions) are expressed as conditional
/// operations so an implementation can make them atomic.
#[async_trait]
pub trait BookingStore: Send + Sync {
    // ── Clubs ──

    async fn get_club(&self, id: Uuid) -> Result<Option<Club>>;
    async fn save_club(&self, club: &Club) -> Result<()>;

    // ── Caddies ──

    async fn get_caddie(&self, id: Uuid) -> Result<Option<Caddie>>;
    async fn find_caddie_by_user(&self, user_id: Uuid) -> Result<Option<Caddie>>;
    async fn save_caddie(&self, caddie: &Caddie) -> Result<()>;
    /// Applies `edit` to the stored caddie and returns the result, `None` if absent.
    /// Fields the edit does not touch keep whatever a concurrent writer stored.
    async fn update_caddie(&self, id: Uuid, edit: CaddieEdit) -> Result<Option<Caddie>>;
    async fn list_caddies(&self) -> Result<Vec<Caddie>>;

    // ── Golfers ──

    async fn get_golfer(&self, id: Uuid) -> Result<Option<Golfer>>;
    async fn find_golfer_by_user(&self, user_id: Uuid) -> Result<Option<Golfer>>;
    async fn save_golfer(&self, golfer: &Golfer) -> Result<()>;
    async fn update_golfer(&self, id: Uuid, edit: GolferEdit) -> Result<Option<Golfer>>;
    async fn list_golfers(&self) -> Result<Vec<Golfer>>;

    // ── Bookings ──

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>>;

    /// Re-checks that no pending/accepted booking of the same caddie overlaps on
    /// that date and inserts in the same critical section. Returns `false` on overlap.
    async fn insert_booking_if_free(&self, booking: &Booking) -> Result<bool>;

    /// Replaces the stored booking only if its status is still `expected`.
    /// Returns `false` when another writer moved it first.
    async fn update_booking(&self, booking: &Booking, expected: BookingStatus) -> Result<bool>;

    /// All bookings of a caddie on one date, ordered by start time.
    async fn bookings_for_caddie_on(&self, caddie_id: Uuid, date: NaiveDate) -> Result<Vec<Booking>>;
    /// Newest first.
    async fn bookings_for_caddie(&self, caddie_id: Uuid) -> Result<Vec<Booking>>;
    /// Newest first.
    async fn bookings_for_golfer(&self, golfer_id: Uuid) -> Result<Vec<Booking>>;
    /// Bookings with `from <= date < to`, ordered by date then start time.
    async fn bookings_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Booking>>;

    // ── Payments ──

    async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>>;
    async fn find_payment_by_booking(&self, booking_id: Uuid) -> Result<Option<Payment>>;
    async fn save_payment(&self, payment: &Payment) -> Result<()>;
    /// Completed and not yet liquidated, most recently paid first.
    async fn payments_pending_liquidation(&self) -> Result<Vec<Payment>>;
}

// ─── JSON Snapshot Store ─────────────────────────────────────────────────────

/// In-memory store mirrored to a single JSON file after every mutation.
/// Without a path it is purely in-memory (tests, dry runs).
pub struct JsonFileStore {
    snapshot: RwLock<StoreSnapshot>,
    path: Option<PathBuf>,
}

impl JsonFileStore {
    pub fn in_memory() -> Self {
        Self {
            snapshot: RwLock::new(StoreSnapshot::default()),
            path: None,
        }
    }

    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let snapshot = load_snapshot(&path).await;
        Self {
            snapshot: RwLock::new(snapshot),
            path: Some(path),
        }
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        self.snapshot.read().await.clone()
    }

    /// Applies `mutate` to a copy, persists it, then swaps it in, so a failed
    /// write leaves memory untouched. In-memory stores mutate in place.
    async fn write<T>(&self, mutate: impl FnOnce(&mut StoreSnapshot) -> T) -> Result<T> {
        let mut guard = self.snapshot.write().await;
        match &self.path {
            None => Ok(mutate(&mut guard)),
            Some(path) => {
                let mut next = guard.clone();
                let out = mutate(&mut next);
                save_snapshot(path, &next).await?;
                *guard = next;
                Ok(out)
            }
        }
    }
}

#[async_trait]
impl BookingStore for JsonFileStore {
    async fn get_club(&self, id: Uuid) -> Result<Option<Club>> {
        Ok(self.snapshot.read().await.clubs.get(&id).cloned())
    }

    async fn save_club(&self, club: &Club) -> Result<()> {
        let club = club.clone();
        self.write(|s| {
            s.clubs.insert(club.id, club);
        })
        .await
    }

    async fn get_caddie(&self, id: Uuid) -> Result<Option<Caddie>> {
        Ok(self.snapshot.read().await.caddies.get(&id).cloned())
    }

    async fn find_caddie_by_user(&self, user_id: Uuid) -> Result<Option<Caddie>> {
        let s = self.snapshot.read().await;
        Ok(s.caddies.values().find(|c| c.user_id == user_id).cloned())
    }

    async fn save_caddie(&self, caddie: &Caddie) -> Result<()> {
        let caddie = caddie.clone();
        self.write(|s| {
            s.caddies.insert(caddie.id, caddie);
        })
        .await
    }

    async fn update_caddie(&self, id: Uuid, edit: CaddieEdit) -> Result<Option<Caddie>> {
        self.write(|s| {
            s.caddies.get_mut(&id).map(|c| {
                edit(c);
                c.clone()
            })
        })
        .await
    }

    async fn list_caddies(&self) -> Result<Vec<Caddie>> {
        Ok(self.snapshot.read().await.caddies.values().cloned().collect())
    }

    async fn get_golfer(&self, id: Uuid) -> Result<Option<Golfer>> {
        Ok(self.snapshot.read().await.golfers.get(&id).cloned())
    }

    async fn find_golfer_by_user(&self, user_id: Uuid) -> Result<Option<Golfer>> {
        let s = self.snapshot.read().await;
        Ok(s.golfers.values().find(|g| g.user_id == user_id).cloned())
    }

    async fn save_golfer(&self, golfer: &Golfer) -> Result<()> {
        let golfer = golfer.clone();
        self.write(|s| {
            s.golfers.insert(golfer.id, golfer);
        })
        .await
    }

    async fn update_golfer(&self, id: Uuid, edit: GolferEdit) -> Result<Option<Golfer>> {
        self.write(|s| {
            s.golfers.get_mut(&id).map(|g| {
                edit(g);
                g.clone()
            })
        })
        .await
    }

    async fn list_golfers(&self) -> Result<Vec<Golfer>> {
        Ok(self.snapshot.read().await.golfers.values().cloned().collect())
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>> {
        Ok(self.snapshot.read().await.bookings.get(&id).cloned())
    }

    async fn insert_booking_if_free(&self, booking: &Booking) -> Result<bool> {
        let booking = booking.clone();
        let slot = booking.slot();
        self.write(|s| {
            let taken = s.bookings.values().any(|b| {
                b.caddie_id == booking.caddie_id
                    && b.date == booking.date
                    && b.status.holds_slot()
                    && b.slot().overlaps(&slot)
            });
            if taken {
                return false;
            }
            s.bookings.insert(booking.id, booking);
            true
        })
        .await
    }

    async fn update_booking(&self, booking: &Booking, expected: BookingStatus) -> Result<bool> {
        let booking = booking.clone();
        self.write(|s| match s.bookings.get_mut(&booking.id) {
            Some(current) if current.status == expected => {
                *current = booking;
                true
            }
            _ => false,
        })
        .await
    }

    async fn bookings_for_caddie_on(&self, caddie_id: Uuid, date: NaiveDate) -> Result<Vec<Booking>> {
        let s = self.snapshot.read().await;
        let mut out: Vec<Booking> = s
            .bookings
            .values()
            .filter(|b| b.caddie_id == caddie_id && b.date == date)
            .cloned()
            .collect();
        out.sort_by_key(|b| b.start_time);
        Ok(out)
    }

    async fn bookings_for_caddie(&self, caddie_id: Uuid) -> Result<Vec<Booking>> {
        let s = self.snapshot.read().await;
        let mut out: Vec<Booking> = s.bookings.values().filter(|b| b.caddie_id == caddie_id).cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn bookings_for_golfer(&self, golfer_id: Uuid) -> Result<Vec<Booking>> {
        let s = self.snapshot.read().await;
        let mut out: Vec<Booking> = s.bookings.values().filter(|b| b.golfer_id == golfer_id).cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn bookings_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Booking>> {
        let s = self.snapshot.read().await;
        let mut out: Vec<Booking> = s
            .bookings
            .values()
            .filter(|b| b.date >= from && b.date < to)
            .cloned()
            .collect();
        out.sort_by_key(|b| (b.date, b.start_time));
        Ok(out)
    }

    async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>> {
        Ok(self.snapshot.read().await.payments.get(&id).cloned())
    }

    async fn find_payment_by_booking(&self, booking_id: Uuid) -> Result<Option<Payment>> {
        let s = self.snapshot.read().await;
        Ok(s.payments.values().find(|p| p.booking_id == booking_id).cloned())
    }

    async fn save_payment(&self, payment: &Payment) -> Result<()> {
        let payment = payment.clone();
        self.write(|s| {
            s.payments.insert(payment.id, payment);
        })
        .await
    }

    async fn payments_pending_liquidation(&self) -> Result<Vec<Payment>> {
        let s = self.snapshot.read().await;
        let mut out: Vec<Payment> = s
            .payments
            .values()
            .filter(|p| p.status == PaymentStatus::Completed && p.liquidated_at.is_none())
            .cloned()
            .collect();
        out.sort_by(|a, b| b.paid_at.cmp(&a.paid_at));
        Ok(out)
    }
}

// ─── Snapshot File ───────────────────────────────────────────────────────────

/// Load a persisted snapshot. Returns an empty one if the file is missing or corrupt.
pub async fn load_snapshot(path: &Path) -> StoreSnapshot {
    if !path.exists() {
        info!("No snapshot at {}, starting empty", path.display());
        return StoreSnapshot::default();
    }

    match fs::read_to_string(path).await {
        Ok(data) => match serde_json::from_str::<StoreSnapshot>(&data) {
            Ok(snapshot) => {
                info!(
                    "Loaded snapshot from {} ({} clubs, {} caddies, {} golfers, {} bookings)",
                    path.display(),
                    snapshot.clubs.len(),
                    snapshot.caddies.len(),
                    snapshot.golfers.len(),
                    snapshot.bookings.len()
                );
                snapshot
            }
            Err(e) => {
                warn!("Failed to parse {}: {e}, starting empty", path.display());
                StoreSnapshot::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {}: {e}, starting empty", path.display());
            StoreSnapshot::default()
        }
    }
}

/// Write the snapshot through a temp file and rename, so readers never see half a file.
pub async fn save_snapshot(path: &Path, snapshot: &StoreSnapshot) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(snapshot)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("renaming {}", tmp.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::VettingStatus;
    use chrono::Utc;
    use schedule_types::TimeOfDay;

    fn booking(caddie_id: Uuid, start: &str, end: &str, status: BookingStatus) -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            golfer_id: Uuid::new_v4(),
            caddie_id,
            club_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            start_time: TimeOfDay::parse_hhmm(start).unwrap(),
            end_time: TimeOfDay::parse_hhmm(end).unwrap(),
            total_price: 1000,
            status,
            qr_code: None,
            caddie_rating: None,
            golfer_rating: None,
            payment_id: None,
            cancellation: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn insert_rejects_overlap_with_held_slot() {
        let store = JsonFileStore::in_memory();
        let caddie = Uuid::new_v4();

        assert!(store.insert_booking_if_free(&booking(caddie, "10:00", "11:00", BookingStatus::Accepted)).await.unwrap());
        assert!(!store.insert_booking_if_free(&booking(caddie, "09:30", "10:30", BookingStatus::Pending)).await.unwrap());
        assert!(store.insert_booking_if_free(&booking(caddie, "11:00", "12:00", BookingStatus::Pending)).await.unwrap());
        // another caddie is unaffected
        assert!(store.insert_booking_if_free(&booking(Uuid::new_v4(), "10:00", "11:00", BookingStatus::Pending)).await.unwrap());
    }

    #[tokio::test]
    async fn cancelled_bookings_release_the_slot() {
        let store = JsonFileStore::in_memory();
        let caddie = Uuid::new_v4();
        assert!(store.insert_booking_if_free(&booking(caddie, "10:00", "11:00", BookingStatus::Cancelled)).await.unwrap());
        assert!(store.insert_booking_if_free(&booking(caddie, "10:00", "11:00", BookingStatus::Pending)).await.unwrap());
    }

    #[tokio::test]
    async fn update_is_conditional_on_prior_status() {
        let store = JsonFileStore::in_memory();
        let mut b = booking(Uuid::new_v4(), "10:00", "11:00", BookingStatus::Pending);
        store.insert_booking_if_free(&b).await.unwrap();

        b.status = BookingStatus::Accepted;
        assert!(store.update_booking(&b, BookingStatus::Pending).await.unwrap());
        b.status = BookingStatus::Rejected;
        assert!(!store.update_booking(&b, BookingStatus::Pending).await.unwrap());

        let stored = store.get_booking(b.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Accepted);
    }

    #[tokio::test]
    async fn range_query_is_half_open_and_ordered() {
        let store = JsonFileStore::in_memory();
        let caddie = Uuid::new_v4();
        let mut late = booking(caddie, "14:00", "15:00", BookingStatus::Pending);
        let early = booking(caddie, "08:00", "09:00", BookingStatus::Pending);
        let mut next_day = booking(caddie, "08:00", "09:00", BookingStatus::Pending);
        next_day.date = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();
        late.caddie_id = Uuid::new_v4();
        for b in [&late, &early, &next_day] {
            store.insert_booking_if_free(b).await.unwrap();
        }

        let from = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let to = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();
        let ids: Vec<Uuid> = store.bookings_between(from, to).await.unwrap().iter().map(|b| b.id).collect();
        assert_eq!(ids, [early.id, late.id]);
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let caddie = Caddie {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            display_name: "Ana".into(),
            status: VettingStatus::Approved,
            suggested_rate: 4000,
            clubs: vec![],
            availability: vec![],
            recurring_availability: vec![],
            rating: 0.0,
            total_ratings: 0,
        };

        {
            let store = JsonFileStore::open(&path).await;
            store.save_caddie(&caddie).await.unwrap();
        }

        let reopened = JsonFileStore::open(&path).await;
        let loaded = reopened.get_caddie(caddie.id).await.unwrap().unwrap();
        assert_eq!(loaded.display_name, "Ana");
        assert_eq!(reopened.find_caddie_by_user(caddie.user_id).await.unwrap().unwrap().id, caddie.id);
    }

    #[tokio::test]
    async fn profile_edits_touch_only_their_fields() {
        let store = JsonFileStore::in_memory();
        let caddie = Caddie {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            display_name: "Ana".into(),
            status: VettingStatus::Approved,
            suggested_rate: 4000,
            clubs: vec![],
            availability: vec![],
            recurring_availability: vec![],
            rating: 0.0,
            total_ratings: 0,
        };
        store.save_caddie(&caddie).await.unwrap();

        // a copy read before the edit
        let stale = store.get_caddie(caddie.id).await.unwrap().unwrap();
        store
            .update_caddie(caddie.id, Box::new(|c| c.clubs.push(Uuid::nil())))
            .await
            .unwrap();
        let updated = store
            .update_caddie(
                stale.id,
                Box::new(|c| {
                    c.rating = 4.5;
                    c.total_ratings = 2;
                }),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.clubs, [Uuid::nil()]);
        assert_eq!((updated.rating, updated.total_ratings), (4.5, 2));

        assert!(store.update_caddie(Uuid::new_v4(), Box::new(|_| {})).await.unwrap().is_none());
        assert!(store.update_golfer(Uuid::new_v4(), Box::new(|_| {})).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_snapshot_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();
        let snapshot = load_snapshot(&path).await;
        assert!(snapshot.bookings.is_empty());
    }
}
