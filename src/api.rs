use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::booking::Booking;
use crate::manager::Attendee;
use crate::models::{Member, Reservation, Slot};
use crate::slots::SlotView;

#[derive(Debug, Serialize)]
pub struct ListSlotsResponse {
    pub success: bool,
    pub error_message: Option<String>,
    pub slots: Vec<SlotView>,
}

// Weekday and time stay raw strings so that bad values come back as
// InvalidWeekday / InvalidTimeFormat instead of a generic JSON error.
#[derive(Debug, Deserialize, Serialize)]
pub struct CreateReservationRequest {
    pub weekday: String,
    pub time: String,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub success: bool,
    pub error_message: Option<String>,
    pub booking: Option<Booking>,
}

#[derive(Debug, Serialize)]
pub struct ReservationListResponse {
    pub success: bool,
    pub error_message: Option<String>,
    pub reservations: Vec<Reservation>,
}

#[derive(Debug, Serialize)]
pub struct CancelReservationResponse {
    pub success: bool,
    pub error_message: Option<String>,
    pub reservation_id: Uuid,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UpsertSlotRequest {
    pub weekday: String,
    pub time: String,
    pub capacity: i64,
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct SlotResponse {
    pub success: bool,
    pub error_message: Option<String>,
    pub slot: Option<Slot>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AddAttendeeRequest {
    pub member_id: Uuid,
    pub weekday: String,
    pub time: String,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct AttendeesQuery {
    pub weekday: String,
    pub date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct AttendeesResponse {
    pub success: bool,
    pub error_message: Option<String>,
    pub attendees: Vec<Attendee>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RegisterMemberRequest {
    pub name: String,
    pub email: String,
    pub subscription_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MemberApprovalRequest {
    pub approved: bool,
}

#[derive(Debug, Serialize)]
pub struct MemberResponse {
    pub success: bool,
    pub error_message: Option<String>,
    pub member: Option<Member>,
}

#[derive(Debug, Serialize)]
pub struct DeleteMemberResponse {
    pub success: bool,
    pub error_message: Option<String>,
    pub cancelled_reservations: usize,
}
