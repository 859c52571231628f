use actix_web::{
    dev::Payload, error::ErrorForbidden, error::ErrorUnauthorized, FromRequest, HttpRequest,
};
use futures_util::future::{ready, Ready};
use uuid::Uuid;

use crate::booking::Caller;
use crate::models::Role;

pub const MEMBER_ID_HEADER: &str = "x-member-id";
pub const MEMBER_ROLE_HEADER: &str = "x-member-role";

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
}

/// Identity forwarded by the auth proxy in front of this service.
pub struct AuthenticatedCaller(pub Caller);

impl FromRequest for AuthenticatedCaller {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let member_id = match header(req, MEMBER_ID_HEADER).map(str::parse::<Uuid>) {
            Some(Ok(member_id)) => member_id,
            Some(Err(e)) => {
                tracing::warn!("Invalid member id header received: {:?}", e);
                return ready(Err(ErrorUnauthorized("Invalid member identity")));
            }
            None => {
                tracing::debug!("Member id header missing.");
                return ready(Err(ErrorUnauthorized("Authentication credentials missing")));
            }
        };

        let role = match header(req, MEMBER_ROLE_HEADER).map(str::to_lowercase).as_deref() {
            None | Some("member") => Role::Member,
            Some("manager") => Role::Manager,
            Some(other) => {
                tracing::warn!("Unknown role header received: {}", other);
                return ready(Err(ErrorUnauthorized("Invalid member role")));
            }
        };

        ready(Ok(AuthenticatedCaller(Caller { member_id, role })))
    }
}

impl AuthenticatedCaller {
    /// Rejects callers without the manager role.
    pub fn require_manager(&self) -> Result<Uuid, actix_web::Error> {
        if self.0.is_manager() {
            Ok(self.0.member_id)
        } else {
            tracing::warn!("Member {} attempted a manager operation", self.0.member_id);
            Err(ErrorForbidden("Manager role required"))
        }
    }
}
