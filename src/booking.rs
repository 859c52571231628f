//! The booking rules. Every caller (member self-service, manager console)
//! goes through [`BookingEngine::authorize_and_claim`], so the gates below are
//! evaluated in one place and in one order.

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::calendar::{Calendar, Clock, Weekday};
use crate::config::BookingPolicy;
use crate::error::BookingError;
use crate::models::{Claim, Occupancy, Reservation, ReservationSource, Role, SlotKey};
use crate::slot_time::SlotTime;
use crate::slots::SlotDirectory;
use crate::store::BookingStore;

pub type BookingResult<T> = std::result::Result<T, BookingError>;

/// Who is asking, as vouched for by the auth provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub member_id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn member(member_id: Uuid) -> Self {
        Self { member_id, role: Role::Member }
    }

    pub fn manager(member_id: Uuid) -> Self {
        Self { member_id, role: Role::Manager }
    }

    pub fn is_manager(&self) -> bool {
        self.role == Role::Manager
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Booking {
    pub reservation: Reservation,
    pub occupancy: Occupancy,
}

/// A booking attempt before any gate has run.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BookingRequest {
    pub member_id: Uuid,
    pub key: SlotKey,
    /// Explicit date (manager console); otherwise the next occurrence.
    pub date: Option<NaiveDate>,
    pub source: ReservationSource,
}

#[derive(Clone)]
pub struct BookingEngine {
    store: Arc<dyn BookingStore>,
    slots: SlotDirectory,
    clock: Arc<dyn Clock>,
    calendar: Calendar,
    policy: BookingPolicy,
}

impl BookingEngine {
    pub fn new(
        store: Arc<dyn BookingStore>,
        slots: SlotDirectory,
        clock: Arc<dyn Clock>,
        calendar: Calendar,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            store,
            slots,
            clock,
            calendar,
            policy,
        }
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn slots(&self) -> &SlotDirectory {
        &self.slots
    }

    /// Self-service booking of the next occurrence of (weekday, time).
    pub async fn book(
        &self,
        member_id: Uuid,
        weekday: Weekday,
        time: SlotTime,
    ) -> BookingResult<Booking> {
        self.authorize_and_claim(BookingRequest {
            member_id,
            key: SlotKey::new(weekday, time),
            date: None,
            source: ReservationSource::SelfService,
        })
        .await
    }

    pub(crate) async fn authorize_and_claim(&self, request: BookingRequest) -> BookingResult<Booking> {
        let self_service = request.source == ReservationSource::SelfService;
        let now = self.clock.now();
        let key = request.key;

        let member = self
            .store
            .get_member(request.member_id)
            .await?
            .ok_or(BookingError::MemberNotFound)?;
        if self_service && !member.is_active(now) {
            tracing::debug!("Member {} tried to book without an active membership", member.id);
            return Err(BookingError::MembershipInactive);
        }

        // Slot exists (or defaults) and is open.
        let resolved = self
            .slots
            .resolve(key)
            .await?
            .ok_or_else(|| BookingError::SlotNotFound(key.to_string()))?;
        if !resolved.slot.available {
            return Err(BookingError::SlotUnavailable(key.to_string()));
        }

        // Not already started.
        let date = match request.date {
            Some(date) => {
                if Weekday::from_chrono(date.weekday()) != Some(key.weekday) {
                    return Err(BookingError::InvalidDate(format!("{} is not a {}", date, key.weekday)));
                }
                date
            }
            None => self.calendar.date_for_weekday(key.weekday, now),
        };
        if self.calendar.instant_of(date, key.time) <= now {
            return Err(BookingError::SlotInPast(format!("{} on {}", key, date)));
        }

        if self_service {
            // Advance window.
            let last_bookable = self.calendar.today(now) + Duration::days(self.policy.advance_days);
            if date > last_bookable {
                return Err(BookingError::TooFarAhead(self.policy.advance_days));
            }

            // One booking per calendar day.
            if !self.store.member_reservations(member.id, Some(date)).await?.is_empty() {
                return Err(BookingError::DuplicateDayBooking(date));
            }
        }

        // Capacity, atomically with the insert. The stored template is
        // authoritative, so availability is checked again against it.
        let slot = self.slots.materialize(&resolved).await?;
        if !slot.available {
            return Err(BookingError::SlotUnavailable(key.to_string()));
        }
        let reservation = Reservation {
            id: Uuid::new_v4(),
            member_id: member.id,
            weekday: key.weekday,
            time: key.time,
            date,
            created_at: now,
            source: request.source,
        };

        match self.store.claim_seat(&reservation, slot.capacity, self_service).await? {
            Claim::Claimed { current } => {
                // A member deleted while we were claiming must not keep a seat.
                if self.store.get_member(member.id).await?.is_none() {
                    tracing::warn!("Member {} was deleted during booking, releasing seat", member.id);
                    self.store.release_seat(&reservation).await?;
                    return Err(BookingError::MemberNotFound);
                }
                tracing::info!(
                    "Member {} booked {} on {} ({:?}), {}/{}",
                    member.id,
                    key,
                    date,
                    request.source,
                    current,
                    slot.capacity
                );
                Ok(Booking {
                    reservation,
                    occupancy: Occupancy::new(current, slot.capacity),
                })
            }
            Claim::Full => {
                tracing::debug!("{} on {} is full", key, date);
                Err(BookingError::SlotFull(format!("{} on {}", key, date)))
            }
            Claim::DayTaken => Err(BookingError::DuplicateDayBooking(date)),
        }
    }

    /// Cancels a reservation on behalf of `caller`. Members only see their
    /// own reservations; a foreign id reads as `NotFound`.
    pub async fn cancel(&self, reservation_id: Uuid, caller: Caller) -> BookingResult<Reservation> {
        let reservation = self
            .store
            .get_reservation(reservation_id)
            .await?
            .filter(|r| caller.is_manager() || r.member_id == caller.member_id)
            .ok_or(BookingError::NotFound)?;

        let now = self.clock.now();
        let starts_at = self.calendar.instant_of(reservation.date, reservation.time);
        if starts_at <= now {
            return Err(BookingError::AlreadyPast);
        }
        if starts_at - now < self.policy.cancellation_cutoff {
            return Err(BookingError::CancellationTooLate(
                self.policy.cancellation_cutoff.num_minutes(),
            ));
        }
        if reservation.source == ReservationSource::ManagerAdded && !caller.is_manager() {
            return Err(BookingError::ManagerOwned);
        }

        if !self.store.release_seat(&reservation).await? {
            return Err(BookingError::NotFound);
        }
        tracing::info!(
            "Reservation {} ({} on {}) cancelled by {}",
            reservation.id,
            reservation.key(),
            reservation.date,
            caller.member_id
        );
        Ok(reservation)
    }

    /// The member's reservations from today on.
    pub async fn upcoming_for(&self, member_id: Uuid) -> BookingResult<Vec<Reservation>> {
        let today = self.calendar.today(self.clock.now());
        let mut reservations = self.store.member_reservations(member_id, None).await?;
        reservations.retain(|r| r.date >= today);
        Ok(reservations)
    }
}
