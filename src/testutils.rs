use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::Result;
use crate::memory_store::MemoryStore;
use crate::models::{Claim, Member, Reservation, Slot, SlotKey};
use crate::store::BookingStore;

type Hook = Box<dyn FnOnce(MemoryStore) -> BoxFuture<'static, ()> + Send>;

fn boxed<F, Fut>(action: F) -> Hook
where
    F: FnOnce(MemoryStore) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Box::new(move |inner: MemoryStore| -> BoxFuture<'static, ()> { Box::pin(action(inner)) })
}

/// `MemoryStore` that runs a one-shot action at a fixed point of a booking,
/// standing in for a request that lands in between two store calls.
#[derive(Default)]
pub(crate) struct HookedStore {
    pub inner: MemoryStore,
    on_slot_miss: Mutex<Option<Hook>>,
    after_claim: Mutex<Option<Hook>>,
}

impl HookedStore {
    /// Runs after the first `get_slot` that finds no template.
    pub fn set_on_slot_miss<F, Fut>(&self, action: F)
    where
        F: FnOnce(MemoryStore) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        *self.on_slot_miss.lock().unwrap() = Some(boxed(action));
    }

    /// Runs after the first successful `claim_seat`.
    pub fn set_after_claim<F, Fut>(&self, action: F)
    where
        F: FnOnce(MemoryStore) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        *self.after_claim.lock().unwrap() = Some(boxed(action));
    }

    async fn fire(&self, hook: &Mutex<Option<Hook>>) {
        let hook = hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook(self.inner.clone()).await;
        }
    }
}

#[async_trait]
impl BookingStore for HookedStore {
    async fn get_slot(&self, key: SlotKey) -> Result<Option<Slot>> {
        let slot = self.inner.get_slot(key).await?;
        if slot.is_none() {
            self.fire(&self.on_slot_miss).await;
        }
        Ok(slot)
    }

    async fn upsert_slot(&self, slot: Slot) -> Result<Slot> {
        self.inner.upsert_slot(slot).await
    }

    async fn insert_slot_if_absent(&self, slot: Slot) -> Result<Slot> {
        self.inner.insert_slot_if_absent(slot).await
    }

    async fn list_slots(&self) -> Result<Vec<Slot>> {
        self.inner.list_slots().await
    }

    async fn insert_member(&self, member: &Member) -> Result<bool> {
        self.inner.insert_member(member).await
    }

    async fn get_member(&self, member_id: Uuid) -> Result<Option<Member>> {
        self.inner.get_member(member_id).await
    }

    async fn set_member_approval(&self, member_id: Uuid, approved: bool) -> Result<bool> {
        self.inner.set_member_approval(member_id, approved).await
    }

    async fn delete_member(&self, member_id: Uuid) -> Result<bool> {
        self.inner.delete_member(member_id).await
    }

    async fn get_reservation(&self, reservation_id: Uuid) -> Result<Option<Reservation>> {
        self.inner.get_reservation(reservation_id).await
    }

    async fn member_reservations(
        &self,
        member_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Reservation>> {
        self.inner.member_reservations(member_id, date).await
    }

    async fn reservations_on(&self, date: NaiveDate) -> Result<Vec<Reservation>> {
        self.inner.reservations_on(date).await
    }

    async fn count_reservations(&self, key: SlotKey, date: NaiveDate) -> Result<u32> {
        self.inner.count_reservations(key, date).await
    }

    async fn claim_seat(
        &self,
        reservation: &Reservation,
        capacity: u32,
        exclusive_day: bool,
    ) -> Result<Claim> {
        let claim = self.inner.claim_seat(reservation, capacity, exclusive_day).await?;
        if matches!(claim, Claim::Claimed { .. }) {
            self.fire(&self.after_claim).await;
        }
        Ok(claim)
    }

    async fn release_seat(&self, reservation: &Reservation) -> Result<bool> {
        self.inner.release_seat(reservation).await
    }
}
