use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Claim, Member, Reservation, Slot, SlotKey};
use crate::store::BookingStore;

#[derive(Debug, Default)]
struct Tables {
    slots: HashMap<SlotKey, Slot>,
    members: HashMap<Uuid, Member>,
    reservations: HashMap<Uuid, Reservation>,
}

impl Tables {
    fn count(&self, key: SlotKey, date: NaiveDate) -> u32 {
        self.reservations
            .values()
            .filter(|r| r.date == date && r.key() == key)
            .count() as u32
    }
}

/// In-process store; nothing survives a restart. Every operation runs under
/// one lock, which is what makes `claim_seat` atomic.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted(mut reservations: Vec<Reservation>) -> Vec<Reservation> {
    reservations.sort_by(|a, b| {
        (a.date, a.time, a.created_at).cmp(&(b.date, b.time, b.created_at))
    });
    reservations
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn get_slot(&self, key: SlotKey) -> Result<Option<Slot>> {
        Ok(self.tables.read().await.slots.get(&key).cloned())
    }

    async fn upsert_slot(&self, slot: Slot) -> Result<Slot> {
        self.tables.write().await.slots.insert(slot.key(), slot.clone());
        Ok(slot)
    }

    async fn insert_slot_if_absent(&self, slot: Slot) -> Result<Slot> {
        let mut tables = self.tables.write().await;
        Ok(tables.slots.entry(slot.key()).or_insert(slot).clone())
    }

    async fn list_slots(&self) -> Result<Vec<Slot>> {
        let mut slots: Vec<Slot> = self.tables.read().await.slots.values().cloned().collect();
        slots.sort_by_key(|slot| slot.key());
        Ok(slots)
    }

    async fn insert_member(&self, member: &Member) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let taken = tables
            .members
            .values()
            .any(|existing| existing.email.eq_ignore_ascii_case(&member.email));
        if taken {
            return Ok(false);
        }
        tables.members.insert(member.id, member.clone());
        Ok(true)
    }

    async fn get_member(&self, member_id: Uuid) -> Result<Option<Member>> {
        Ok(self.tables.read().await.members.get(&member_id).cloned())
    }

    async fn set_member_approval(&self, member_id: Uuid, approved: bool) -> Result<bool> {
        match self.tables.write().await.members.get_mut(&member_id) {
            Some(member) => {
                member.approved = approved;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_member(&self, member_id: Uuid) -> Result<bool> {
        Ok(self.tables.write().await.members.remove(&member_id).is_some())
    }

    async fn get_reservation(&self, reservation_id: Uuid) -> Result<Option<Reservation>> {
        Ok(self.tables.read().await.reservations.get(&reservation_id).cloned())
    }

    async fn member_reservations(
        &self,
        member_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Reservation>> {
        let tables = self.tables.read().await;
        Ok(sorted(
            tables
                .reservations
                .values()
                .filter(|r| r.member_id == member_id && date.map_or(true, |d| r.date == d))
                .cloned()
                .collect(),
        ))
    }

    async fn reservations_on(&self, date: NaiveDate) -> Result<Vec<Reservation>> {
        let tables = self.tables.read().await;
        Ok(sorted(
            tables
                .reservations
                .values()
                .filter(|r| r.date == date)
                .cloned()
                .collect(),
        ))
    }

    async fn count_reservations(&self, key: SlotKey, date: NaiveDate) -> Result<u32> {
        Ok(self.tables.read().await.count(key, date))
    }

    async fn claim_seat(
        &self,
        reservation: &Reservation,
        capacity: u32,
        exclusive_day: bool,
    ) -> Result<Claim> {
        let mut tables = self.tables.write().await;

        if exclusive_day
            && tables
                .reservations
                .values()
                .any(|r| r.member_id == reservation.member_id && r.date == reservation.date)
        {
            return Ok(Claim::DayTaken);
        }

        let current = tables.count(reservation.key(), reservation.date);
        if current >= capacity {
            return Ok(Claim::Full);
        }

        tables.reservations.insert(reservation.id, reservation.clone());
        Ok(Claim::Claimed { current: current + 1 })
    }

    async fn release_seat(&self, reservation: &Reservation) -> Result<bool> {
        Ok(self
            .tables
            .write()
            .await
            .reservations
            .remove(&reservation.id)
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::Weekday;
    use crate::models::ReservationSource;
    use crate::slot_time::SlotTime;
    use chrono::Utc;

    fn reservation(member_id: Uuid, time: &str, date: NaiveDate) -> Reservation {
        Reservation {
            id: Uuid::new_v4(),
            member_id,
            weekday: Weekday::Monday,
            time: SlotTime::parse(time).unwrap(),
            date,
            created_at: Utc::now(),
            source: ReservationSource::SelfService,
        }
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[tokio::test]
    async fn claim_stops_at_capacity() {
        let store = MemoryStore::new();
        let first = reservation(Uuid::new_v4(), "6:00 AM", monday());
        let second = reservation(Uuid::new_v4(), "6:00 AM", monday());

        assert_eq!(store.claim_seat(&first, 1, true).await.unwrap(), Claim::Claimed { current: 1 });
        assert_eq!(store.claim_seat(&second, 1, true).await.unwrap(), Claim::Full);
        assert_eq!(store.count_reservations(first.key(), monday()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn exclusive_claim_refuses_a_second_booking_that_day() {
        let store = MemoryStore::new();
        let member = Uuid::new_v4();
        let morning = reservation(member, "6:00 AM", monday());
        let evening = reservation(member, "7:00 PM", monday());

        store.claim_seat(&morning, 14, true).await.unwrap();
        assert_eq!(store.claim_seat(&evening, 14, true).await.unwrap(), Claim::DayTaken);
        assert_eq!(
            store.claim_seat(&evening, 14, false).await.unwrap(),
            Claim::Claimed { current: 1 }
        );
    }

    #[tokio::test]
    async fn manager_added_reservation_also_blocks_the_day() {
        let store = MemoryStore::new();
        let member = Uuid::new_v4();
        let added = Reservation {
            source: ReservationSource::ManagerAdded,
            ..reservation(member, "6:00 AM", monday())
        };
        store.claim_seat(&added, 14, false).await.unwrap();

        let own = reservation(member, "7:00 PM", monday());
        assert_eq!(store.claim_seat(&own, 14, true).await.unwrap(), Claim::DayTaken);
    }

    #[tokio::test]
    async fn lazy_slot_insert_keeps_an_existing_template() {
        let store = MemoryStore::new();
        let key = reservation(Uuid::new_v4(), "6:00 AM", monday()).key();
        let closed = Slot {
            capacity: 3,
            available: false,
            ..Slot::with_defaults(key, 14)
        };
        store.upsert_slot(closed.clone()).await.unwrap();

        let stored = store.insert_slot_if_absent(Slot::with_defaults(key, 14)).await.unwrap();
        assert_eq!(stored, closed);
        assert_eq!(store.get_slot(key).await.unwrap(), Some(closed));
    }

    #[tokio::test]
    async fn release_frees_the_seat_once() {
        let store = MemoryStore::new();
        let booked = reservation(Uuid::new_v4(), "6:00 AM", monday());
        store.claim_seat(&booked, 1, true).await.unwrap();

        assert!(store.release_seat(&booked).await.unwrap());
        assert!(!store.release_seat(&booked).await.unwrap());
        assert_eq!(store.count_reservations(booked.key(), monday()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn member_emails_are_unique_ignoring_case() {
        let store = MemoryStore::new();
        let member = Member {
            id: Uuid::new_v4(),
            name: "Ana".into(),
            email: "ana@example.com".into(),
            subscription_expires_at: None,
            approved: false,
            created_at: Utc::now(),
        };
        assert!(store.insert_member(&member).await.unwrap());

        let twin = Member {
            id: Uuid::new_v4(),
            email: "ANA@example.com".into(),
            ..member.clone()
        };
        assert!(!store.insert_member(&twin).await.unwrap());
    }
}
