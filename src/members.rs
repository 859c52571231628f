use chrono::{DateTime, Utc};
use email_address::EmailAddress;
use std::sync::Arc;
use uuid::Uuid;

use crate::booking::BookingResult;
use crate::calendar::Clock;
use crate::error::BookingError;
use crate::models::Member;
use crate::store::BookingStore;

#[derive(Clone)]
pub struct MemberRegistry {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
}

impl MemberRegistry {
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// New members start unapproved.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        subscription_expires_at: Option<DateTime<Utc>>,
    ) -> BookingResult<Member> {
        let name = name.trim();
        let email = email.trim();
        if name.is_empty() {
            return Err(BookingError::InvalidMember("name is required".into()));
        }
        if !EmailAddress::is_valid(email) {
            return Err(BookingError::InvalidMember(format!("{} is not a valid email", email)));
        }

        let member = Member {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            subscription_expires_at,
            approved: false,
            created_at: self.clock.now(),
        };
        if !self.store.insert_member(&member).await? {
            return Err(BookingError::EmailTaken(member.email));
        }
        tracing::info!("Registered member {} ({})", member.id, member.email);
        Ok(member)
    }

    pub async fn get(&self, member_id: Uuid) -> BookingResult<Member> {
        self.store
            .get_member(member_id)
            .await?
            .ok_or(BookingError::MemberNotFound)
    }

    pub async fn set_approval(&self, member_id: Uuid, approved: bool) -> BookingResult<Member> {
        if !self.store.set_member_approval(member_id, approved).await? {
            return Err(BookingError::MemberNotFound);
        }
        tracing::info!("Member {} approval set to {}", member_id, approved);
        self.get(member_id).await
    }

    /// Deletes the member, then removes every reservation it holds.
    /// Returns how many reservations were cancelled.
    ///
    /// The member row goes first so new bookings stop at the member gate;
    /// a booking already past that gate releases its own seat once it sees
    /// the member gone.
    pub async fn delete(&self, member_id: Uuid) -> BookingResult<usize> {
        let member = self.get(member_id).await?;
        if !self.store.delete_member(member.id).await? {
            return Err(BookingError::MemberNotFound);
        }
        let mut cancelled = 0;
        for reservation in self.store.member_reservations(member.id, None).await? {
            if self.store.release_seat(&reservation).await? {
                cancelled += 1;
            }
        }
        tracing::info!("Deleted member {}, cancelled {} reservation(s)", member.id, cancelled);
        Ok(cancelled)
    }
}
