use serde::{de::Error as _, Deserialize, Deserializer};
use serde_json::Value;
use tracing::trace;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("No payload data found")]
    MissingPayload,

    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}

/// One push notification, as sent by GitHub or GitLab.
#[derive(Debug, Deserialize)]
pub struct PushEvent {
    pub r#ref: String,
    pub repository: Repository,
    /// In push order. Missing or non-array `commits` decode as empty.
    #[serde(default, deserialize_with = "commits_or_empty")]
    pub commits: Vec<CommitEntry>,
}

#[derive(Debug, Deserialize)]
pub struct Repository {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Commit {
    pub id: String,
    pub message: String,
    pub timestamp: String,
    pub url: Url,
    pub author: Author,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

/// A decoded commit along with the JSON it was decoded from.
#[derive(Debug, Clone)]
pub struct CommitEntry {
    pub commit: Commit,
    pub raw: Value,
}

fn commits_or_empty<'de, D>(deserializer: D) -> Result<Vec<CommitEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items,
        _ => return Ok(Vec::new()),
    };

    items
        .into_iter()
        .map(|raw| {
            let commit = Commit::deserialize(&raw).map_err(D::Error::custom)?;
            Ok(CommitEntry { commit, raw })
        })
        .collect()
}

/// Decodes the `payload` field of a delivery.
pub fn parse_push(payload: Option<&str>) -> Result<PushEvent, PayloadError> {
    let payload = match payload {
        Some(p) if !p.trim().is_empty() => p,
        _ => return Err(PayloadError::MissingPayload),
    };
    trace!("payload: {}", payload);

    match serde_json::from_str(payload) {
        Ok(event) => Ok(event),
        // some transports backslash-escape quotes in form fields
        Err(e) if payload.contains('\\') => {
            trace!("payload didn't decode as-is ({}), retrying unescaped", e);
            serde_json::from_str(&strip_slashes(payload)).map_err(|_| e.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Removes one level of backslash escaping: `\x` becomes `x`, `\\` becomes `\`.
fn strip_slashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
