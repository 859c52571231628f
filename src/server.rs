use actix_web::web;

/// Registers every route on an actix `App`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // Member routes
        .service(handlers::list_slots)
        .service(handlers::create_reservation)
        .service(handlers::my_reservations)
        .service(handlers::cancel_reservation)
        .service(handlers::register_member)

        // Manager routes
        .service(handlers::upsert_slot)
        .service(handlers::add_attendee)
        .service(handlers::list_attendees)
        .service(handlers::set_member_approval)
        .service(handlers::delete_member);
}

pub mod handlers {
    use actix_web::{delete, get, post, put, web, HttpResponse};
    use std::sync::Arc;
    use uuid::Uuid;

    use crate::api::{
        AddAttendeeRequest, AttendeesQuery, AttendeesResponse, BookingResponse,
        CancelReservationResponse, CreateReservationRequest, DeleteMemberResponse,
        ListSlotsResponse, MemberApprovalRequest, MemberResponse, RegisterMemberRequest,
        ReservationListResponse, SlotResponse, UpsertSlotRequest,
    };
    use crate::auth::AuthenticatedCaller;
    use crate::calendar::Weekday;
    use crate::error::BookingError;
    use crate::slot_time::SlotTime;
    use crate::state::StoreStateManager;

    type StateData = web::Data<Arc<StoreStateManager>>;

    fn slot_params(weekday: &str, time: &str) -> Result<(Weekday, SlotTime), BookingError> {
        Ok((Weekday::from_name(weekday)?, SlotTime::parse(time)?))
    }

    #[get("/api/slots")]
    pub async fn list_slots(
        state_manager: StateData,
        _caller: AuthenticatedCaller,
    ) -> Result<HttpResponse, actix_web::Error> {
        let engine = &state_manager.bookings;
        let slots = engine
            .slots()
            .week(engine.calendar(), engine.clock().now())
            .await
            .map_err(BookingError::from)?;

        Ok(HttpResponse::Ok().json(ListSlotsResponse {
            success: true,
            error_message: None,
            slots,
        }))
    }

    #[post("/api/reservations")]
    pub async fn create_reservation(
        state_manager: StateData,
        caller: AuthenticatedCaller,
        request: web::Json<CreateReservationRequest>,
    ) -> Result<HttpResponse, actix_web::Error> {
        let req = request.into_inner();
        let (weekday, time) = slot_params(&req.weekday, &req.time)?;

        let booking = state_manager
            .bookings
            .book(caller.0.member_id, weekday, time)
            .await?;

        Ok(HttpResponse::Created().json(BookingResponse {
            success: true,
            error_message: None,
            booking: Some(booking),
        }))
    }

    #[get("/api/reservations/mine")]
    pub async fn my_reservations(
        state_manager: StateData,
        caller: AuthenticatedCaller,
    ) -> Result<HttpResponse, actix_web::Error> {
        let reservations = state_manager.bookings.upcoming_for(caller.0.member_id).await?;

        Ok(HttpResponse::Ok().json(ReservationListResponse {
            success: true,
            error_message: None,
            reservations,
        }))
    }

    #[delete("/api/reservations/{reservation_id}")]
    pub async fn cancel_reservation(
        state_manager: StateData,
        caller: AuthenticatedCaller,
        path: web::Path<Uuid>,
    ) -> Result<HttpResponse, actix_web::Error> {
        let reservation = state_manager
            .bookings
            .cancel(path.into_inner(), caller.0)
            .await?;

        Ok(HttpResponse::Ok().json(CancelReservationResponse {
            success: true,
            error_message: None,
            reservation_id: reservation.id,
        }))
    }

    // Open to any authenticated caller; approval is a manager step.
    #[post("/api/members")]
    pub async fn register_member(
        state_manager: StateData,
        _caller: AuthenticatedCaller,
        request: web::Json<RegisterMemberRequest>,
    ) -> Result<HttpResponse, actix_web::Error> {
        let req = request.into_inner();
        let member = state_manager
            .members
            .register(&req.name, &req.email, req.subscription_expires_at)
            .await?;

        Ok(HttpResponse::Created().json(MemberResponse {
            success: true,
            error_message: None,
            member: Some(member),
        }))
    }

    #[put("/api/manager/slots")]
    pub async fn upsert_slot(
        state_manager: StateData,
        caller: AuthenticatedCaller,
        request: web::Json<UpsertSlotRequest>,
    ) -> Result<HttpResponse, actix_web::Error> {
        let manager_id = caller.require_manager()?;
        let req = request.into_inner();
        let (weekday, time) = slot_params(&req.weekday, &req.time)?;

        let slot = state_manager
            .console(manager_id)
            .upsert_slot(weekday, time, req.capacity, req.available)
            .await?;

        Ok(HttpResponse::Ok().json(SlotResponse {
            success: true,
            error_message: None,
            slot: Some(slot),
        }))
    }

    #[post("/api/manager/attendees")]
    pub async fn add_attendee(
        state_manager: StateData,
        caller: AuthenticatedCaller,
        request: web::Json<AddAttendeeRequest>,
    ) -> Result<HttpResponse, actix_web::Error> {
        let manager_id = caller.require_manager()?;
        let req = request.into_inner();
        let (weekday, time) = slot_params(&req.weekday, &req.time)?;

        let booking = state_manager
            .console(manager_id)
            .add_attendee(req.member_id, weekday, time, req.date)
            .await?;

        Ok(HttpResponse::Created().json(BookingResponse {
            success: true,
            error_message: None,
            booking: Some(booking),
        }))
    }

    #[get("/api/manager/attendees")]
    pub async fn list_attendees(
        state_manager: StateData,
        caller: AuthenticatedCaller,
        query: web::Query<AttendeesQuery>,
    ) -> Result<HttpResponse, actix_web::Error> {
        let manager_id = caller.require_manager()?;
        let weekday = Weekday::from_name(&query.weekday)?;

        let attendees = state_manager
            .console(manager_id)
            .attendees_for_day(weekday, query.date)
            .await?;

        Ok(HttpResponse::Ok().json(AttendeesResponse {
            success: true,
            error_message: None,
            attendees,
        }))
    }

    #[post("/api/manager/members/{member_id}/approval")]
    pub async fn set_member_approval(
        state_manager: StateData,
        caller: AuthenticatedCaller,
        path: web::Path<Uuid>,
        request: web::Json<MemberApprovalRequest>,
    ) -> Result<HttpResponse, actix_web::Error> {
        caller.require_manager()?;
        let member = state_manager
            .members
            .set_approval(path.into_inner(), request.approved)
            .await?;

        Ok(HttpResponse::Ok().json(MemberResponse {
            success: true,
            error_message: None,
            member: Some(member),
        }))
    }

    #[delete("/api/manager/members/{member_id}")]
    pub async fn delete_member(
        state_manager: StateData,
        caller: AuthenticatedCaller,
        path: web::Path<Uuid>,
    ) -> Result<HttpResponse, actix_web::Error> {
        caller.require_manager()?;
        let cancelled = state_manager.members.delete(path.into_inner()).await?;

        Ok(HttpResponse::Ok().json(DeleteMemberResponse {
            success: true,
            error_message: None,
            cancelled_reservations: cancelled,
        }))
    }
}
