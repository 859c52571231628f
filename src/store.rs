use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Claim, Member, Reservation, Slot, SlotKey};

/// Persistence behind the booking core. Implementations must make
/// `claim_seat` and `release_seat` atomic per (slot, date).
#[async_trait]
pub trait BookingStore: Send + Sync + 'static {
    async fn get_slot(&self, key: SlotKey) -> Result<Option<Slot>>;
    async fn upsert_slot(&self, slot: Slot) -> Result<Slot>;
    /// Stores `slot` only if no template exists for its key. Returns the
    /// template that is stored afterwards, which may be someone else's.
    async fn insert_slot_if_absent(&self, slot: Slot) -> Result<Slot>;
    async fn list_slots(&self) -> Result<Vec<Slot>>;

    /// Returns `false` when the email is already registered.
    async fn insert_member(&self, member: &Member) -> Result<bool>;
    async fn get_member(&self, member_id: Uuid) -> Result<Option<Member>>;
    /// Returns `false` when the member does not exist.
    async fn set_member_approval(&self, member_id: Uuid, approved: bool) -> Result<bool>;
    async fn delete_member(&self, member_id: Uuid) -> Result<bool>;

    async fn get_reservation(&self, reservation_id: Uuid) -> Result<Option<Reservation>>;
    /// All reservations of a member, restricted to one date when given.
    async fn member_reservations(
        &self,
        member_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Reservation>>;
    async fn reservations_on(&self, date: NaiveDate) -> Result<Vec<Reservation>>;
    async fn count_reservations(&self, key: SlotKey, date: NaiveDate) -> Result<u32>;

    /// Stores `reservation` if its class has fewer than `capacity` seats
    /// taken on its date and, when `exclusive_day` is set, the member holds
    /// no other reservation of any source that date. Exclusive claims are
    /// atomic against each other; a failed claim leaves nothing behind.
    async fn claim_seat(
        &self,
        reservation: &Reservation,
        capacity: u32,
        exclusive_day: bool,
    ) -> Result<Claim>;

    /// Removes the reservation and frees its seat. `false` if it was
    /// already gone.
    async fn release_seat(&self, reservation: &Reservation) -> Result<bool>;
}
