use std::net::IpAddr;

use serde::Deserialize;
use tracing::trace;

use crate::webhooks::{signing::validate_signature, Delivery};

const PUSH_EVENT: &str = "push";

/// Who is allowed to trigger the receiver.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum GuardPolicy {
    /// Accept anything announcing itself as a push event.
    EventHeader,
    /// Only accept push events coming from one of these addresses.
    IpAllowlist { addresses: Vec<IpAddr> },
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self::EventHeader
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("Unrecognised IP address")]
    UnrecognisedAddress(Option<IpAddr>),

    #[error("Unrecognised event{}", offending(.0))]
    UnrecognisedEvent(Option<String>),

    #[error("Couldn't verify signature")]
    InvalidSignature,
}

#[derive(Debug, Default)]
pub struct AccessGuard {
    policy: GuardPolicy,
    secret: Option<String>,
}

impl AccessGuard {
    pub fn new(policy: GuardPolicy, secret: Option<String>) -> Self {
        Self { policy, secret }
    }

    pub fn check(&self, delivery: &Delivery) -> Result<(), Rejection> {
        if let GuardPolicy::IpAllowlist { addresses } = &self.policy {
            let allowed = delivery
                .remote_addr
                .map_or(false, |addr| addresses.contains(&addr));
            if !allowed {
                trace!("{:?} isn't allowlisted", delivery.remote_addr);
                return Err(Rejection::UnrecognisedAddress(delivery.remote_addr));
            }
        }

        match delivery.event_type() {
            Some(PUSH_EVENT) => {}
            other => return Err(Rejection::UnrecognisedEvent(other.map(str::to_owned))),
        }

        if let Some(secret) = &self.secret {
            let signed = delivery
                .signature
                .as_deref()
                .map_or(false, |signature| {
                    validate_signature(secret, signature, &delivery.body)
                });
            if !signed {
                trace!("signature validation failed, stopping here...");
                return Err(Rejection::InvalidSignature);
            }
        }

        Ok(())
    }
}

fn offending(event: &Option<String>) -> String {
    event
        .as_ref()
        .map(|event| format!(" '{}'", event))
        .unwrap_or_default()
}
