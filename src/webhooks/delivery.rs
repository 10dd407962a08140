use std::{io, net::IpAddr};

use anyhow::anyhow;
use rocket::{
    data::{ByteUnit, FromData, Outcome},
    http::{ContentType, HeaderMap, Status},
    Data, Request,
};
use tracing::trace;

const X_GITHUB_EVENT: &str = "X-GitHub-Event";
const X_GITLAB_EVENT: &str = "X-Gitlab-Event";
const X_GITHUB_SIGNATURE: &str = "X-Hub-Signature-256";

const GITLAB_PUSH_HOOK: &str = "Push Hook";
const PAYLOAD_FIELD: &str = "payload";

const LIMIT: ByteUnit = ByteUnit::Mebibyte(1);

/// Everything the receiver needs from one inbound webhook call, independent of
/// the HTTP layer it came through.
#[derive(Debug, Clone, Default)]
pub struct Delivery {
    pub remote_addr: Option<IpAddr>,
    pub event_type: Option<String>,
    pub signature: Option<String>,
    /// The raw request body, as signed by the sender.
    pub body: String,
    pub payload: Option<String>,
}

impl Delivery {
    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }
}

/// Finds the event type announced by the sender.
///
/// GitHub sends `X-GitHub-Event: push`, GitLab sends `X-Gitlab-Event: Push
/// Hook`; both come out as `push`.
pub fn get_event_type(headers: &HeaderMap<'_>) -> Option<String> {
    if let Some(event) = headers.get_one(X_GITHUB_EVENT) {
        return Some(event.to_owned());
    }

    headers.get_one(X_GITLAB_EVENT).map(|event| {
        if event == GITLAB_PUSH_HOOK {
            "push".to_owned()
        } else {
            event.to_owned()
        }
    })
}

/// Pulls the JSON payload out of a request body.
///
/// JSON bodies are the payload themselves, anything else is treated as an
/// urlencoded form with a `payload` field.
pub fn extract_payload(content_type: Option<&ContentType>, body: &str) -> Option<String> {
    if content_type.map_or(false, |ct| ct.is_json()) {
        return Some(body.to_owned());
    }

    url::form_urlencoded::parse(body.as_bytes())
        .find(|(name, _)| name == PAYLOAD_FIELD)
        .map(|(_, value)| value.into_owned())
}

#[rocket::async_trait]
impl<'r> FromData<'r> for Delivery {
    type Error = anyhow::Error;

    async fn from_data(request: &'r Request<'_>, data: Data<'r>) -> Outcome<'r, Self> {
        trace!("received payload on receiver endpoint: {:?}", request);

        let size_limit = request.limits().get("webhook").unwrap_or(LIMIT);
        let body = match data.open(size_limit).into_string().await {
            Ok(s) if s.is_complete() => s.into_inner(),
            Ok(_) => {
                let eof = io::ErrorKind::UnexpectedEof;
                trace!("payload was too big");
                return Outcome::Error((
                    Status::BadRequest,
                    io::Error::new(eof, "data limit exceeded").into(),
                ));
            }
            Err(e) => return Outcome::Error((Status::BadRequest, anyhow!(e))),
        };

        let headers = request.headers();
        let delivery = Delivery {
            // peer address only, forwarding headers are caller-controlled
            remote_addr: request.remote().map(|addr| addr.ip()),
            event_type: get_event_type(headers),
            signature: headers.get_one(X_GITHUB_SIGNATURE).map(str::to_owned),
            payload: extract_payload(request.content_type(), &body),
            body,
        };

        trace!("delivery: {:?}", delivery);
        Outcome::Success(delivery)
    }
}
