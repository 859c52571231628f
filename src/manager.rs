use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::booking::{Booking, BookingEngine, BookingRequest, BookingResult, Caller};
use crate::calendar::Weekday;
use crate::error::BookingError;
use crate::models::{Reservation, ReservationSource, Slot, SlotKey};
use crate::slot_time::SlotTime;
use crate::store::BookingStore;

/// A reservation joined with the member it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct Attendee {
    #[serde(flatten)]
    pub reservation: Reservation,
    pub member_name: Option<String>,
    pub member_email: Option<String>,
}

/// Manager console operations. Attendees added here skip the advance-window
/// and one-per-day rules and are tagged `manager_added`.
#[derive(Clone)]
pub struct ManagerConsole {
    engine: BookingEngine,
    store: Arc<dyn BookingStore>,
    manager_id: Uuid,
}

impl ManagerConsole {
    pub fn new(engine: BookingEngine, store: Arc<dyn BookingStore>, manager_id: Uuid) -> Self {
        Self {
            engine,
            store,
            manager_id,
        }
    }

    pub async fn add_attendee(
        &self,
        member_id: Uuid,
        weekday: Weekday,
        time: SlotTime,
        date: Option<NaiveDate>,
    ) -> BookingResult<Booking> {
        let booking = self
            .engine
            .authorize_and_claim(BookingRequest {
                member_id,
                key: SlotKey::new(weekday, time),
                date,
                source: ReservationSource::ManagerAdded,
            })
            .await?;
        tracing::info!(
            "Manager {} added member {} to {} on {}",
            self.manager_id,
            member_id,
            booking.reservation.key(),
            booking.reservation.date
        );
        Ok(booking)
    }

    pub async fn upsert_slot(
        &self,
        weekday: Weekday,
        time: SlotTime,
        capacity: i64,
        available: bool,
    ) -> BookingResult<Slot> {
        self.engine.slots().upsert_slot(weekday, time, capacity, available).await
    }

    pub async fn cancel_attendee(&self, reservation_id: Uuid) -> BookingResult<Reservation> {
        self.engine.cancel(reservation_id, Caller::manager(self.manager_id)).await
    }

    /// Everyone booked on `date`, both sources, earliest class first.
    pub async fn attendees_for_day(&self, weekday: Weekday, date: NaiveDate) -> BookingResult<Vec<Attendee>> {
        if Weekday::from_chrono(date.weekday()) != Some(weekday) {
            return Err(BookingError::InvalidDate(format!("{} is not a {}", date, weekday)));
        }

        let mut reservations = self.store.reservations_on(date).await?;
        reservations.retain(|r| r.weekday == weekday);
        reservations.sort_by_key(|r| (r.time, r.created_at));

        let mut attendees = Vec::with_capacity(reservations.len());
        for reservation in reservations {
            let member = self.store.get_member(reservation.member_id).await?;
            if member.is_none() {
                tracing::warn!(
                    "Reservation {} points at missing member {}",
                    reservation.id,
                    reservation.member_id
                );
            }
            attendees.push(Attendee {
                member_name: member.as_ref().map(|m| m.name.clone()),
                member_email: member.map(|m| m.email),
                reservation,
            });
        }
        Ok(attendees)
    }
}
