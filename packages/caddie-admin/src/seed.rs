//! TOML fixtures for clubs, caddies and golfers.
//!
//! Records are upserted by id, so re-running a fixture is harmless. Slot
//! strings are validated and stored in canonical form, and every club a
//! recurring entry points at must exist (in the fixture or the store).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::info;

use caddie_backend::availability::{normalize_recurring, normalize_specific};
use caddie_backend::persistence::BookingStore;
use caddie_backend::state::{Caddie, Club, Golfer};

#[derive(Debug, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub clubs: Vec<Club>,
    #[serde(default)]
    pub caddies: Vec<Caddie>,
    #[serde(default)]
    pub golfers: Vec<Golfer>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub clubs: usize,
    pub caddies: usize,
    pub golfers: usize,
}

pub fn parse(text: &str) -> Result<Fixture> {
    toml::from_str(text).context("invalid fixture")
}

pub async fn apply(store: &dyn BookingStore, fixture: Fixture) -> Result<SeedReport> {
    for club in &fixture.clubs {
        store.save_club(club).await?;
    }

    for mut caddie in fixture.caddies.iter().cloned() {
        caddie.availability = normalize_specific(caddie.availability)
            .with_context(|| format!("caddie {}: specific availability", caddie.id))?;
        caddie.recurring_availability = normalize_recurring(caddie.recurring_availability)
            .with_context(|| format!("caddie {}: recurring availability", caddie.id))?;

        for entry in &caddie.recurring_availability {
            if store.get_club(entry.club_id).await?.is_none() {
                bail!("caddie {}: unknown club {}", caddie.id, entry.club_id);
            }
            if !caddie.clubs.contains(&entry.club_id) {
                caddie.clubs.push(entry.club_id);
            }
        }
        store.save_caddie(&caddie).await?;
    }

    for golfer in &fixture.golfers {
        store.save_golfer(golfer).await?;
    }

    let report = SeedReport {
        clubs: fixture.clubs.len(),
        caddies: fixture.caddies.len(),
        golfers: fixture.golfers.len(),
    };
    info!(
        "Seeded {} clubs, {} caddies, {} golfers",
        report.clubs, report.caddies, report.golfers
    );
    Ok(report)
}
