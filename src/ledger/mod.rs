//! Booking ledger: the set of reservations and the rules that admit new ones.
//!
//! The ledger answers two questions for a requested window: which slots are
//! free, and whether a particular booking may be admitted. Admission is a
//! single conditional insert, so the availability check and the write cannot
//! be split by a concurrent request.

pub mod catalogue;
pub mod error;
pub mod window;

pub use catalogue::{SlotCatalogue, SlotId};
pub use error::LedgerError;
pub use window::Window;

use chrono::{NaiveDateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{Account, Reservation};
use crate::DbPool;
use window::{format_timestamp, truncate_to_minute};

/// Rounds of re-checking when a conditional insert loses a race without a visible winner.
const MAX_ADMIT_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct Ledger {
    db: DbPool,
    catalogue: Arc<SlotCatalogue>,
}

impl Ledger {
    pub fn new(db: DbPool, catalogue: SlotCatalogue) -> Self {
        Self {
            db,
            catalogue: Arc::new(catalogue),
        }
    }

    pub fn catalogue(&self) -> &SlotCatalogue {
        &self.catalogue
    }

    /// Slots held by some reservation whose window contains `at`, in catalogue order.
    pub async fn occupancy(&self, at: NaiveDateTime) -> Result<Vec<SlotId>, LedgerError> {
        let at = format_timestamp(truncate_to_minute(at));
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT slot FROM reservations WHERE start_at <= ? AND end_at > ?",
        )
        .bind(&at)
        .bind(&at)
        .fetch_all(&self.db)
        .await?;

        Ok(self.known_slots(rows))
    }

    /// Slots with at least one reservation overlapping `window`, whoever owns it.
    /// Catalogue order.
    pub async fn blocked_slots(&self, window: &Window) -> Result<Vec<SlotId>, LedgerError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT slot FROM reservations WHERE NOT (end_at <= ? OR start_at >= ?)",
        )
        .bind(window.start_text())
        .bind(window.end_text())
        .fetch_all(&self.db)
        .await?;

        Ok(self.known_slots(rows))
    }

    /// Catalogue minus `blocked_slots(window)`, in catalogue order.
    pub async fn available_slots(&self, window: &Window) -> Result<Vec<SlotId>, LedgerError> {
        let blocked = self.blocked_slots(window).await?;
        Ok(self
            .catalogue
            .slots()
            .iter()
            .filter(|slot| !blocked.contains(*slot))
            .cloned()
            .collect())
    }

    /// Whether `account` already holds a reservation overlapping `window`.
    pub async fn has_conflict(&self, account: &Account, window: &Window) -> Result<bool, LedgerError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM reservations
                WHERE account_id = ? AND NOT (end_at <= ? OR start_at >= ?)
            )
            "#,
        )
        .bind(&account.id)
        .bind(window.start_text())
        .bind(window.end_text())
        .fetch_one(&self.db)
        .await?;

        Ok(exists)
    }

    /// Admit a booking of `slot` for `window` on behalf of `account`.
    ///
    /// Guards, in order: the slot exists, the account has a vehicle on record,
    /// the slot is free for the window, the account has no overlapping booking.
    pub async fn reserve(
        &self,
        account: &Account,
        slot: &str,
        window: &Window,
    ) -> Result<Reservation, LedgerError> {
        let slot = self.catalogue.parse(slot)?;

        if account.vehicle_number.is_none() {
            return Err(LedgerError::VehicleRequired);
        }

        if let Some(rejection) = self.classify_conflict(account, &slot, window).await? {
            tracing::debug!(
                account = %account.username,
                slot = %slot,
                window = %window,
                reason = %rejection,
                "Booking rejected"
            );
            return Err(rejection);
        }

        for _ in 0..MAX_ADMIT_ATTEMPTS {
            if let Some(reservation) = self.try_insert(account, &slot, window).await? {
                tracing::info!(
                    reservation = %reservation.id,
                    account = %account.username,
                    slot = %slot,
                    window = %window,
                    "Reservation created"
                );
                return Ok(reservation);
            }

            // A concurrent writer got there first; report what it collided with
            if let Some(rejection) = self.classify_conflict(account, &slot, window).await? {
                tracing::info!(
                    account = %account.username,
                    slot = %slot,
                    window = %window,
                    reason = %rejection,
                    "Booking lost a concurrent race"
                );
                return Err(rejection);
            }
        }

        Err(LedgerError::SlotOccupied {
            slot: slot.to_string(),
        })
    }

    /// Remove a reservation owned by `account`.
    pub async fn cancel(&self, account: &Account, reservation_id: &str) -> Result<(), LedgerError> {
        let result = sqlx::query("DELETE FROM reservations WHERE id = ? AND account_id = ?")
            .bind(reservation_id)
            .bind(&account.id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            let owner: Option<String> =
                sqlx::query_scalar("SELECT account_id FROM reservations WHERE id = ?")
                    .bind(reservation_id)
                    .fetch_optional(&self.db)
                    .await?;
            return Err(match owner {
                Some(_) => LedgerError::NotOwner,
                None => LedgerError::ReservationNotFound,
            });
        }

        tracing::info!(
            reservation = %reservation_id,
            account = %account.username,
            "Reservation cancelled"
        );
        Ok(())
    }

    pub async fn get(&self, reservation_id: &str) -> Result<Reservation, LedgerError> {
        sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = ?")
            .bind(reservation_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(LedgerError::ReservationNotFound)
    }

    /// All reservations of `account`, latest start first.
    pub async fn list_for_account(&self, account: &Account) -> Result<Vec<Reservation>, LedgerError> {
        let reservations = sqlx::query_as::<_, Reservation>(
            "SELECT * FROM reservations WHERE account_id = ? ORDER BY start_at DESC, created_at DESC",
        )
        .bind(&account.id)
        .fetch_all(&self.db)
        .await?;
        Ok(reservations)
    }

    /// All reservations overlapping `window`, by slot then start.
    pub async fn list_overlapping(&self, window: &Window) -> Result<Vec<Reservation>, LedgerError> {
        let reservations = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT * FROM reservations
            WHERE NOT (end_at <= ? OR start_at >= ?)
            ORDER BY slot, start_at
            "#,
        )
        .bind(window.start_text())
        .bind(window.end_text())
        .fetch_all(&self.db)
        .await?;
        Ok(reservations)
    }

    /// Number of distinct slots occupied at `at`.
    pub async fn occupied_count(&self, at: NaiveDateTime) -> Result<usize, LedgerError> {
        Ok(self.occupancy(at).await?.len())
    }

    async fn slot_taken(&self, slot: &SlotId, window: &Window) -> Result<bool, LedgerError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM reservations
                WHERE slot = ? AND NOT (end_at <= ? OR start_at >= ?)
            )
            "#,
        )
        .bind(slot.as_str())
        .bind(window.start_text())
        .bind(window.end_text())
        .fetch_one(&self.db)
        .await?;
        Ok(exists)
    }

    /// Slot conflicts take precedence over the owner's own overlaps.
    async fn classify_conflict(
        &self,
        account: &Account,
        slot: &SlotId,
        window: &Window,
    ) -> Result<Option<LedgerError>, LedgerError> {
        if self.slot_taken(slot, window).await? {
            return Ok(Some(LedgerError::SlotOccupied {
                slot: slot.to_string(),
            }));
        }
        if self.has_conflict(account, window).await? {
            return Ok(Some(LedgerError::OverlappingBooking));
        }
        Ok(None)
    }

    /// Insert only if neither the slot nor the owner has an overlapping row.
    /// SQLite runs the statement under its write lock, so the guard and the
    /// write are one atomic step.
    async fn try_insert(
        &self,
        account: &Account,
        slot: &SlotId,
        window: &Window,
    ) -> Result<Option<Reservation>, LedgerError> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let start = window.start_text();
        let end = window.end_text();

        let result = sqlx::query(
            r#"
            INSERT INTO reservations (id, account_id, slot, start_at, end_at, created_at)
            SELECT ?, ?, ?, ?, ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM reservations
                WHERE slot = ? AND NOT (end_at <= ? OR start_at >= ?)
            )
            AND NOT EXISTS (
                SELECT 1 FROM reservations
                WHERE account_id = ? AND NOT (end_at <= ? OR start_at >= ?)
            )
            "#,
        )
        .bind(&id)
        .bind(&account.id)
        .bind(slot.as_str())
        .bind(&start)
        .bind(&end)
        .bind(&created_at)
        .bind(slot.as_str())
        .bind(&start)
        .bind(&end)
        .bind(&account.id)
        .bind(&start)
        .bind(&end)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        Ok(Some(Reservation {
            id,
            account_id: account.id.clone(),
            slot: slot.to_string(),
            start_at: start,
            end_at: end,
            created_at,
        }))
    }

    /// Catalogue slots named in `rows`; labels outside the catalogue are dropped.
    fn known_slots(&self, rows: Vec<(String,)>) -> Vec<SlotId> {
        let held: HashSet<String> = rows.into_iter().map(|(slot,)| slot).collect();
        self.catalogue
            .slots()
            .iter()
            .filter(|slot| held.contains(slot.as_str()))
            .cloned()
            .collect()
    }
}
