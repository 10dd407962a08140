use std::path::PathBuf;

use serde::Deserialize;

use crate::{receiver::TitleStyle, webhooks::GuardPolicy};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReceiverConfig {
    /// Which callers may trigger the receiver
    #[serde(default)]
    pub guard: GuardPolicy,
    /// How record titles are built
    #[serde(default)]
    pub title_style: TitleStyle,
    /// Shared secret used to verify `X-Hub-Signature-256`. Signatures aren't checked if this is
    /// unset.
    pub github_secret: Option<String>,
    /// Directory where records and options are kept. Records are only kept in memory if this is
    /// unset.
    pub store_dir: Option<PathBuf>,
    /// Markup tags allowed in record bodies
    pub allowed_tags: Option<Vec<String>>,
}
