//! Rating aggregates, always recomputed from the full booking history of the
//! rated party.

use anyhow::Result;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::persistence::BookingStore;
use crate::state::{Booking, Party};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub rating: f64,
    pub total_ratings: u32,
}

/// Mean and count of every rating given to `rated` across `bookings`.
pub fn aggregate<'a>(bookings: impl IntoIterator<Item = &'a Booking>, rated: Party) -> Aggregate {
    let (sum, count) = bookings
        .into_iter()
        .filter_map(|b| b.rating_of(rated))
        .fold((0u32, 0u32), |(sum, count), r| (sum + u32::from(r.rating), count + 1));
    Aggregate {
        rating: if count == 0 { 0.0 } else { f64::from(sum) / f64::from(count) },
        total_ratings: count,
    }
}

/// Writes only the aggregate fields, so a concurrent profile edit survives.
pub async fn recompute_caddie(store: &dyn BookingStore, caddie_id: Uuid) -> Result<Option<Aggregate>> {
    let bookings = store.bookings_for_caddie(caddie_id).await?;
    let agg = aggregate(&bookings, Party::Caddie);
    let updated = store
        .update_caddie(
            caddie_id,
            Box::new(move |c| {
                c.rating = agg.rating;
                c.total_ratings = agg.total_ratings;
            }),
        )
        .await?;
    Ok(updated.map(|_| agg))
}

pub async fn recompute_golfer(store: &dyn BookingStore, golfer_id: Uuid) -> Result<Option<Aggregate>> {
    let bookings = store.bookings_for_golfer(golfer_id).await?;
    let agg = aggregate(&bookings, Party::Golfer);
    let updated = store
        .update_golfer(
            golfer_id,
            Box::new(move |g| {
                g.rating = agg.rating;
                g.total_ratings = agg.total_ratings;
            }),
        )
        .await?;
    Ok(updated.map(|_| agg))
}

pub async fn recompute(store: &dyn BookingStore, rated: Party, profile_id: Uuid) -> Result<Option<Aggregate>> {
    match rated {
        Party::Caddie => recompute_caddie(store, profile_id).await,
        Party::Golfer => recompute_golfer(store, profile_id).await,
    }
}

/// Rebuilds every aggregate. Returns `(caddies, golfers)` touched.
pub async fn recompute_all(store: &dyn BookingStore) -> Result<(usize, usize)> {
    let caddies = store.list_caddies().await?;
    for c in &caddies {
        recompute_caddie(store, c.id).await?;
    }
    let golfers = store.list_golfers().await?;
    for g in &golfers {
        recompute_golfer(store, g.id).await?;
    }
    info!("Recomputed ratings for {} caddies and {} golfers", caddies.len(), golfers.len());
    Ok((caddies.len(), golfers.len()))
}
