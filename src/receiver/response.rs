use rocket::{
    http::Status,
    response::{self, Responder},
    Request,
};

use crate::receiver::markup::strip_tags;

/// The final word on a delivery: a status and a short plain-text body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Termination {
    pub status: Status,
    pub body: String,
}

impl Termination {
    pub fn ok() -> Self {
        Self {
            status: Status::Ok,
            body: "OK".to_owned(),
        }
    }

    pub fn failure(message: &str) -> Self {
        Self::with_status(Status::BadRequest, message)
    }

    pub fn internal_error(message: &str) -> Self {
        Self::with_status(Status::InternalServerError, message)
    }

    pub fn with_status(status: Status, message: &str) -> Self {
        Self {
            status,
            body: strip_tags(message),
        }
    }
}

impl<'r> Responder<'r, 'static> for Termination {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        (self.status, self.body).respond_to(request)
    }
}
