use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::calendar::Weekday;
use crate::slot_time::SlotTime;

pub const DEFAULT_CAPACITY: u32 = 14;
pub const MAX_CAPACITY: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Manager,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationSource {
    SelfService,
    ManagerAdded,
}

impl ReservationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationSource::SelfService => "self_service",
            ReservationSource::ManagerAdded => "manager_added",
        }
    }

    pub fn from_db(raw: &str) -> Option<ReservationSource> {
        match raw {
            "self_service" => Some(ReservationSource::SelfService),
            "manager_added" => Some(ReservationSource::ManagerAdded),
            _ => None,
        }
    }
}

/// Identity of a recurring class: one per (weekday, time).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    pub weekday: Weekday,
    pub time: SlotTime,
}

impl SlotKey {
    pub fn new(weekday: Weekday, time: SlotTime) -> Self {
        Self { weekday, time }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.weekday, self.time)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub weekday: Weekday,
    pub time: SlotTime,
    pub capacity: u32,
    pub available: bool,
}

impl Slot {
    pub fn with_defaults(key: SlotKey, capacity: u32) -> Self {
        Self {
            weekday: key.weekday,
            time: key.time,
            capacity,
            available: true,
        }
    }

    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.weekday, self.time)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupancy {
    pub current: u32,
    pub capacity: u32,
    pub remaining: u32,
}

impl Occupancy {
    pub fn new(current: u32, capacity: u32) -> Self {
        Self {
            current,
            capacity,
            remaining: capacity.saturating_sub(current),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub subscription_expires_at: Option<DateTime<Utc>>,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
}

impl Member {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.approved && self.subscription_expires_at.map_or(true, |expiry| expiry > now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub member_id: Uuid,
    pub weekday: Weekday,
    pub time: SlotTime,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub source: ReservationSource,
}

impl Reservation {
    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.weekday, self.time)
    }
}

/// Result of trying to take a seat in a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// Reservation stored; `current` counts it.
    Claimed { current: u32 },
    Full,
    /// The member already holds a self-service booking on that date.
    DayTaken,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn member(approved: bool, expires: Option<DateTime<Utc>>) -> Member {
        Member {
            id: Uuid::new_v4(),
            name: "Ana".into(),
            email: "ana@example.com".into(),
            subscription_expires_at: expires,
            approved,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn membership_needs_approval_and_a_live_subscription() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 5, 0, 0).unwrap();
        assert!(member(true, None).is_active(now));
        assert!(member(true, Some(now + Duration::days(3))).is_active(now));
        assert!(!member(true, Some(now - Duration::days(1))).is_active(now));
        assert!(!member(false, None).is_active(now));
    }

    #[test]
    fn remaining_never_underflows() {
        assert_eq!(Occupancy::new(3, 2).remaining, 0);
        assert_eq!(Occupancy::new(1, 14).remaining, 13);
    }

    #[test]
    fn source_tags_round_trip_through_storage_form() {
        for source in [ReservationSource::SelfService, ReservationSource::ManagerAdded] {
            assert_eq!(ReservationSource::from_db(source.as_str()), Some(source));
        }
        assert_eq!(ReservationSource::from_db("walk_in"), None);
    }
}
