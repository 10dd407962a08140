use std::sync::Arc;

use rocket::http::Status;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, info, trace, warn};

mod markup;
mod response;
pub mod transform;

pub use markup::Sanitizer;
pub use response::Termination;
pub use transform::{Disposition, TitleStyle, TransformError};

use crate::{
    store::{
        ContentStore, NormalizedRecord, RecordId, StoreError, COMMIT_DATA_KEY, COMMIT_URL_KEY,
    },
    webhooks::{parse_push, AccessGuard, Delivery, PayloadError, Rejection},
};

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error("Couldn't process commit {id}")]
    Transform {
        id: String,
        #[source]
        source: TransformError,
    },

    #[error("Couldn't store commit {id}")]
    Store {
        id: String,
        #[source]
        source: StoreError,
    },
}

impl IntakeError {
    pub fn status(&self) -> Status {
        match self {
            Self::Rejected(_) | Self::Payload(_) => Status::BadRequest,
            Self::Transform { .. } | Self::Store { .. } => Status::InternalServerError,
        }
    }
}

impl From<IntakeError> for Termination {
    fn from(err: IntakeError) -> Self {
        Termination::with_status(err.status(), &err.to_string())
    }
}

/// Turns push deliveries into published records.
///
/// Built once at startup and shared between requests; holds no state of its
/// own besides its collaborators.
pub struct Receiver {
    guard: AccessGuard,
    title_style: TitleStyle,
    sanitizer: Sanitizer,
    store: Arc<dyn ContentStore>,
}

impl Receiver {
    pub fn new(
        guard: AccessGuard,
        title_style: TitleStyle,
        sanitizer: Sanitizer,
        store: Arc<dyn ContentStore>,
    ) -> Self {
        Self {
            guard,
            title_style,
            sanitizer,
            store,
        }
    }

    pub fn store(&self) -> &dyn ContentStore {
        self.store.as_ref()
    }

    /// Processes one delivery from start to finish.
    pub fn handle(&self, delivery: &Delivery) -> Termination {
        match self.process(delivery) {
            Ok(created) => {
                info!("webhook succeeded, created {} record(s)", created.len());
                Termination::ok()
            }
            Err(e) => {
                match &e {
                    IntakeError::Transform { source, .. } => {
                        warn!("webhook failed: {}: {}", e, source)
                    }
                    IntakeError::Store { source, .. } => warn!("webhook failed: {}: {}", e, source),
                    _ => warn!("webhook failed: {}", e),
                }
                e.into()
            }
        }
    }

    /// Creates one record per accepted commit, in push order.
    ///
    /// Nothing is rolled back on failure: records created before the failing
    /// commit stay. Redelivering a payload creates its records again.
    pub fn process(&self, delivery: &Delivery) -> Result<Vec<RecordId>, IntakeError> {
        self.guard.check(delivery)?;

        let event = parse_push(delivery.payload.as_deref())?;
        let branch = transform::branch_path(&event.r#ref);
        trace!(
            "push to {}{} with {} commit(s)",
            event.repository.name,
            branch,
            event.commits.len()
        );

        let mut created = Vec::new();
        let mut received_at = OffsetDateTime::now_utc();
        for entry in &event.commits {
            let commit = &entry.commit;
            // never earlier than the commit before it, even if the clock steps back
            received_at = received_at.max(OffsetDateTime::now_utc());
            let disposition = transform::transform(
                commit,
                &event.repository.name,
                branch,
                self.title_style,
                &self.sanitizer,
                received_at,
            )
            .map_err(|source| IntakeError::Transform {
                id: commit.id.clone(),
                source,
            })?;

            let record = match disposition {
                Disposition::Skip => {
                    debug!("skipping merge commit {}", commit.id);
                    continue;
                }
                Disposition::Publish(record) => record,
            };

            let id = self
                .publish(record, commit.url.as_str(), &entry.raw)
                .map_err(|source| IntakeError::Store {
                    id: commit.id.clone(),
                    source,
                })?;
            debug!("commit {} published as record {}", commit.id, id);
            created.push(id);
        }

        Ok(created)
    }

    fn publish(
        &self,
        record: NormalizedRecord,
        url: &str,
        raw: &Value,
    ) -> Result<RecordId, StoreError> {
        let id = self.store.create(record)?;
        self.store
            .attach_metadata(id, COMMIT_URL_KEY, Value::String(url.to_owned()))?;
        self.store.attach_metadata(id, COMMIT_DATA_KEY, raw.clone())?;
        Ok(id)
    }
}
