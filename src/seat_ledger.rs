use async_trait::async_trait;
use chrono::NaiveDate;
use std::future::Future;
use std::time::Duration;

use crate::error::Result;
use crate::models::{Claim, Reservation, SlotKey};

const COMPENSATION_ATTEMPTS: u32 = 4;
const COMPENSATION_BACKOFF: Duration = Duration::from_millis(25);

/// The separate writes a store without multi-row transactions needs to
/// take and give back a seat. `claim` and `release` sequence them so that
/// a failure at any step leaves the ledger consistent or retryable.
#[async_trait]
pub trait SeatLedger: Send + Sync {
    /// Marks the member's date as taken by `reservation`. `false` if
    /// another reservation already holds it.
    async fn claim_day(&self, reservation: &Reservation) -> Result<bool>;

    /// Frees the member's date if `reservation` holds it.
    async fn release_day(&self, reservation: &Reservation) -> Result<()>;

    /// Whether the member has a stored reservation on that date other
    /// than `reservation`.
    async fn holds_other_on_day(&self, reservation: &Reservation) -> Result<bool>;

    /// Moves the seat counter by `delta`; `None` when `limit` would be
    /// exceeded.
    async fn shift_occupancy(
        &self,
        key: SlotKey,
        date: NaiveDate,
        delta: i32,
        limit: Option<u32>,
    ) -> Result<Option<u32>>;

    /// Writes every row of the reservation as one unit.
    async fn write_rows(&self, reservation: &Reservation) -> Result<()>;

    /// Deletes the by-day and by-member rows.
    async fn delete_index_rows(&self, reservation: &Reservation) -> Result<()>;

    /// Deletes the primary row; `false` if it was already gone.
    async fn remove_primary(&self, reservation: &Reservation) -> Result<bool>;
}

async fn retry<T, F, Fut>(what: &str, mut step: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match step().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < COMPENSATION_ATTEMPTS => {
                tracing::warn!("{} failed (attempt {}): {}", what, attempt, e);
                tokio::time::sleep(COMPENSATION_BACKOFF * attempt).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!("{} failed after {} attempts: {}", what, attempt, e);
                return Err(e);
            }
        }
    }
}

pub async fn claim<L: SeatLedger + ?Sized>(
    ledger: &L,
    reservation: &Reservation,
    capacity: u32,
    exclusive_day: bool,
) -> Result<Claim> {
    if exclusive_day {
        if !ledger.claim_day(reservation).await? {
            return Ok(Claim::DayTaken);
        }
        // Manager-added reservations take no day claim but still count.
        match ledger.holds_other_on_day(reservation).await {
            Ok(false) => {}
            outcome => {
                retry("releasing day claim", || ledger.release_day(reservation)).await?;
                return outcome.map(|_| Claim::DayTaken);
            }
        }
    }

    let current = match ledger
        .shift_occupancy(reservation.key(), reservation.date, 1, Some(capacity))
        .await
    {
        Ok(Some(current)) => current,
        outcome => {
            if exclusive_day {
                retry("releasing day claim", || ledger.release_day(reservation)).await?;
            }
            return outcome.map(|_| Claim::Full);
        }
    };

    if let Err(e) = ledger.write_rows(reservation).await {
        tracing::error!("Writing reservation {} failed, undoing the claim: {}", reservation.id, e);
        undo_claim(ledger, reservation, exclusive_day).await?;
        return Err(e);
    }

    Ok(Claim::Claimed { current })
}

async fn undo_claim<L: SeatLedger + ?Sized>(
    ledger: &L,
    reservation: &Reservation,
    exclusive_day: bool,
) -> Result<()> {
    // A failed batch may still have landed.
    retry("deleting reservation lookup rows", || ledger.delete_index_rows(reservation)).await?;
    retry("deleting reservation row", || ledger.remove_primary(reservation)).await?;
    retry("giving back seat", || {
        ledger.shift_occupancy(reservation.key(), reservation.date, -1, None)
    })
    .await?;
    if exclusive_day {
        retry("releasing day claim", || ledger.release_day(reservation)).await?;
    }
    Ok(())
}

/// Removes the reservation and frees its seat; `false` if it was already
/// gone. Lookup rows go first, so a failure before the primary row is
/// deleted leaves the reservation in place for a retry.
pub async fn release<L: SeatLedger + ?Sized>(ledger: &L, reservation: &Reservation) -> Result<bool> {
    ledger.delete_index_rows(reservation).await?;
    if !ledger.remove_primary(reservation).await? {
        return Ok(false);
    }

    retry("giving back seat", || {
        ledger.shift_occupancy(reservation.key(), reservation.date, -1, None)
    })
    .await?;
    retry("releasing day claim", || ledger.release_day(reservation)).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::Weekday;
    use crate::error::AppError;
    use crate::models::ReservationSource;
    use crate::slot_time::SlotTime;
    use chrono::Utc;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct Tables {
        day_claims: HashMap<(Uuid, NaiveDate), Uuid>,
        occupancy: HashMap<(SlotKey, NaiveDate), u32>,
        primary: HashMap<Uuid, Reservation>,
        by_day: HashSet<Uuid>,
        by_member: HashSet<Uuid>,
    }

    /// Ledger in memory that fails chosen steps a given number of times.
    #[derive(Default)]
    struct FlakyLedger {
        tables: Mutex<Tables>,
        failures: Mutex<HashMap<&'static str, u32>>,
    }

    impl FlakyLedger {
        fn fail(&self, step: &'static str, times: u32) {
            self.failures.lock().unwrap().insert(step, times);
        }

        fn check(&self, step: &'static str) -> Result<()> {
            let mut failures = self.failures.lock().unwrap();
            match failures.get_mut(step) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    Err(AppError::Internal(format!("{} timed out", step)))
                }
                _ => Ok(()),
            }
        }

        fn occupancy(&self, reservation: &Reservation) -> u32 {
            let tables = self.tables.lock().unwrap();
            tables
                .occupancy
                .get(&(reservation.key(), reservation.date))
                .copied()
                .unwrap_or(0)
        }

        fn day_holder(&self, reservation: &Reservation) -> Option<Uuid> {
            let tables = self.tables.lock().unwrap();
            tables
                .day_claims
                .get(&(reservation.member_id, reservation.date))
                .copied()
        }

        fn has_rows(&self, reservation: &Reservation) -> (bool, bool, bool) {
            let tables = self.tables.lock().unwrap();
            (
                tables.primary.contains_key(&reservation.id),
                tables.by_day.contains(&reservation.id),
                tables.by_member.contains(&reservation.id),
            )
        }
    }

    #[async_trait]
    impl SeatLedger for FlakyLedger {
        async fn claim_day(&self, reservation: &Reservation) -> Result<bool> {
            self.check("claim_day")?;
            let mut tables = self.tables.lock().unwrap();
            let key = (reservation.member_id, reservation.date);
            if tables.day_claims.contains_key(&key) {
                return Ok(false);
            }
            tables.day_claims.insert(key, reservation.id);
            Ok(true)
        }

        async fn release_day(&self, reservation: &Reservation) -> Result<()> {
            self.check("release_day")?;
            let mut tables = self.tables.lock().unwrap();
            let key = (reservation.member_id, reservation.date);
            if tables.day_claims.get(&key) == Some(&reservation.id) {
                tables.day_claims.remove(&key);
            }
            Ok(())
        }

        async fn holds_other_on_day(&self, reservation: &Reservation) -> Result<bool> {
            self.check("holds_other_on_day")?;
            let tables = self.tables.lock().unwrap();
            Ok(tables.primary.values().any(|r| {
                r.member_id == reservation.member_id
                    && r.date == reservation.date
                    && r.id != reservation.id
            }))
        }

        async fn shift_occupancy(
            &self,
            key: SlotKey,
            date: NaiveDate,
            delta: i32,
            limit: Option<u32>,
        ) -> Result<Option<u32>> {
            self.check(if delta > 0 { "take_seat" } else { "give_back_seat" })?;
            let mut tables = self.tables.lock().unwrap();
            let current = tables.occupancy.entry((key, date)).or_insert(0);
            let next = (*current as i32 + delta).max(0) as u32;
            if limit.map_or(false, |limit| next > limit) {
                return Ok(None);
            }
            *current = next;
            Ok(Some(next))
        }

        async fn write_rows(&self, reservation: &Reservation) -> Result<()> {
            self.check("write_rows")?;
            let mut tables = self.tables.lock().unwrap();
            tables.primary.insert(reservation.id, reservation.clone());
            tables.by_day.insert(reservation.id);
            tables.by_member.insert(reservation.id);
            Ok(())
        }

        async fn delete_index_rows(&self, reservation: &Reservation) -> Result<()> {
            self.check("delete_index_rows")?;
            let mut tables = self.tables.lock().unwrap();
            tables.by_day.remove(&reservation.id);
            tables.by_member.remove(&reservation.id);
            Ok(())
        }

        async fn remove_primary(&self, reservation: &Reservation) -> Result<bool> {
            self.check("remove_primary")?;
            Ok(self.tables.lock().unwrap().primary.remove(&reservation.id).is_some())
        }
    }

    fn reservation(member_id: Uuid, time: &str, source: ReservationSource) -> Reservation {
        Reservation {
            id: Uuid::new_v4(),
            member_id,
            weekday: Weekday::Monday,
            time: SlotTime::parse(time).unwrap(),
            date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            created_at: Utc::now(),
            source,
        }
    }

    fn own(member_id: Uuid, time: &str) -> Reservation {
        reservation(member_id, time, ReservationSource::SelfService)
    }

    #[tokio::test]
    async fn claim_and_release_move_every_row() {
        let ledger = FlakyLedger::default();
        let booked = own(Uuid::new_v4(), "6:00 AM");

        assert_eq!(claim(&ledger, &booked, 2, true).await.unwrap(), Claim::Claimed { current: 1 });
        assert_eq!(ledger.has_rows(&booked), (true, true, true));
        assert_eq!(ledger.day_holder(&booked), Some(booked.id));

        assert!(release(&ledger, &booked).await.unwrap());
        assert!(!release(&ledger, &booked).await.unwrap());
        assert_eq!(ledger.occupancy(&booked), 0);
        assert_eq!(ledger.has_rows(&booked), (false, false, false));
        assert_eq!(ledger.day_holder(&booked), None);
    }

    #[tokio::test]
    async fn failed_row_write_leaves_nothing_behind() {
        let ledger = FlakyLedger::default();
        let booked = own(Uuid::new_v4(), "6:00 AM");
        ledger.fail("write_rows", 1);

        assert!(claim(&ledger, &booked, 2, true).await.is_err());
        assert_eq!(ledger.occupancy(&booked), 0);
        assert_eq!(ledger.day_holder(&booked), None);
        assert_eq!(ledger.has_rows(&booked), (false, false, false));

        assert_eq!(claim(&ledger, &booked, 2, true).await.unwrap(), Claim::Claimed { current: 1 });
    }

    #[tokio::test]
    async fn undo_retries_a_flaky_seat_give_back() {
        let ledger = FlakyLedger::default();
        let booked = own(Uuid::new_v4(), "6:00 AM");
        ledger.fail("write_rows", 1);
        ledger.fail("give_back_seat", 2);
        ledger.fail("release_day", 1);

        assert!(claim(&ledger, &booked, 2, true).await.is_err());
        assert_eq!(ledger.occupancy(&booked), 0);
        assert_eq!(ledger.day_holder(&booked), None);
    }

    #[tokio::test]
    async fn undo_that_keeps_failing_is_reported() {
        let ledger = FlakyLedger::default();
        let booked = own(Uuid::new_v4(), "6:00 AM");
        ledger.fail("write_rows", 1);
        ledger.fail("give_back_seat", COMPENSATION_ATTEMPTS);

        let err = claim(&ledger, &booked, 2, true).await.unwrap_err();
        assert!(err.to_string().contains("give_back_seat"));
        // The seat stays counted: never more bookings than seats.
        assert_eq!(ledger.occupancy(&booked), 1);
    }

    #[tokio::test]
    async fn failed_cancel_can_be_retried() {
        let ledger = FlakyLedger::default();
        let booked = own(Uuid::new_v4(), "6:00 AM");
        claim(&ledger, &booked, 2, true).await.unwrap();

        ledger.fail("delete_index_rows", 1);
        assert!(release(&ledger, &booked).await.is_err());
        assert_eq!(ledger.has_rows(&booked), (true, true, true));
        assert_eq!(ledger.occupancy(&booked), 1);

        ledger.fail("remove_primary", 1);
        assert!(release(&ledger, &booked).await.is_err());
        assert!(ledger.has_rows(&booked).0);
        assert_eq!(ledger.occupancy(&booked), 1);

        assert!(release(&ledger, &booked).await.unwrap());
        assert_eq!(ledger.occupancy(&booked), 0);
        assert_eq!(ledger.has_rows(&booked), (false, false, false));
    }

    #[tokio::test]
    async fn full_class_gives_the_day_back() {
        let ledger = FlakyLedger::default();
        claim(&ledger, &own(Uuid::new_v4(), "6:00 AM"), 1, true).await.unwrap();

        let late = own(Uuid::new_v4(), "6:00 AM");
        assert_eq!(claim(&ledger, &late, 1, true).await.unwrap(), Claim::Full);
        assert_eq!(ledger.day_holder(&late), None);
        assert_eq!(ledger.occupancy(&late), 1);
    }

    #[tokio::test]
    async fn manager_added_reservation_blocks_the_day() {
        let ledger = FlakyLedger::default();
        let member = Uuid::new_v4();
        let added = reservation(member, "6:00 AM", ReservationSource::ManagerAdded);
        claim(&ledger, &added, 14, false).await.unwrap();

        let evening = own(member, "7:00 PM");
        assert_eq!(claim(&ledger, &evening, 14, true).await.unwrap(), Claim::DayTaken);
        assert_eq!(ledger.day_holder(&evening), None);
        assert_eq!(ledger.occupancy(&evening), 0);
    }
}
