use std::sync::Arc;

use rocket::{response::Redirect, State};
use tracing::{trace, warn};

use crate::{
    receiver::Receiver,
    store::{RecordId, COMMIT_URL_KEY},
};

/// Short link to a record's commit: `/gh/<id>` redirects to the hosting service.
#[rocket::get("/gh/<id>/<_..>")]
pub(crate) fn jump(id: u64, receiver: &State<Arc<Receiver>>) -> Option<Redirect> {
    let id = RecordId(id);
    let url = match receiver.store().metadata(id, COMMIT_URL_KEY) {
        Ok(url) => url?,
        Err(e) => {
            warn!("couldn't look up commit url of record {}: {}", id, e);
            return None;
        }
    };

    trace!("redirecting record {} to {}", id, url);
    url.as_str().map(|url| Redirect::to(url.to_owned()))
}
