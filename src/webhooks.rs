use std::sync::Arc;

use rocket::State;
use tracing::{debug, warn};

pub mod delivery;
pub mod guard;
pub mod push;
pub(crate) mod signing;

pub use delivery::Delivery;
pub use guard::{AccessGuard, GuardPolicy, Rejection};
pub use push::{parse_push, PayloadError};

use crate::receiver::{Receiver, Termination};

#[rocket::post("/github-receiver/<_..>", data = "<delivery>")]
pub(crate) async fn github_receiver(
    delivery: Delivery,
    receiver: &State<Arc<Receiver>>,
) -> Termination {
    debug!("received delivery on github-receiver");
    intake(delivery, receiver.inner().clone()).await
}

#[rocket::post("/commit-receiver/<_..>", data = "<delivery>")]
pub(crate) async fn commit_receiver(
    delivery: Delivery,
    receiver: &State<Arc<Receiver>>,
) -> Termination {
    debug!("received delivery on commit-receiver");
    intake(delivery, receiver.inner().clone()).await
}

/// Runs the receiver off the async executor, the content store may block.
async fn intake(delivery: Delivery, receiver: Arc<Receiver>) -> Termination {
    match tokio::task::spawn_blocking(move || receiver.handle(&delivery)).await {
        Ok(termination) => termination,
        Err(e) => {
            warn!("receiver task failed: {}", e);
            Termination::internal_error("Internal error")
        }
    }
}
