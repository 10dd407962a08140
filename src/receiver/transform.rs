use serde::Deserialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime, UtcOffset};

use crate::{
    receiver::markup::{strip_tags, Sanitizer},
    store::{NormalizedRecord, RecordStatus},
    webhooks::push::Commit,
};

const BRANCH_PREFIX: &str = "refs/heads";
const MERGE_PREFIX: &str = "Merge";

/// How record titles are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleStyle {
    /// `[repo/branch] Author – first line`
    Full,
    /// Just the first line of the message.
    FirstLine,
}

impl Default for TitleStyle {
    fn default() -> Self {
        Self::Full
    }
}

#[derive(Debug)]
pub enum Disposition {
    Skip,
    Publish(NormalizedRecord),
}

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("invalid timestamp `{timestamp}`: {source}")]
    InvalidTimestamp {
        timestamp: String,
        source: time::error::Parse,
    },
}

/// `refs/heads/release/1.2` becomes `/release/1.2`. Refs outside of
/// `refs/heads` are kept whole.
pub fn branch_path(r#ref: &str) -> &str {
    r#ref.strip_prefix(BRANCH_PREFIX).unwrap_or(r#ref)
}

/// Merge commits aren't published. Only the first five characters are
/// compared, so "Merged" and "Mergers" count too.
pub fn is_merge(message: &str) -> bool {
    message.starts_with(MERGE_PREFIX)
}

/// The text before the first newline, without markup.
pub fn first_line(message: &str) -> String {
    let line = message.split('\n').next().unwrap_or_default();
    strip_tags(line.trim_end_matches('\r'))
}

/// The commit's own timestamp, in UTC.
fn commit_time(commit: &Commit) -> Result<OffsetDateTime, TransformError> {
    OffsetDateTime::parse(&commit.timestamp, &Rfc3339)
        .map(|time| time.to_offset(UtcOffset::UTC))
        .map_err(|source| TransformError::InvalidTimestamp {
            timestamp: commit.timestamp.clone(),
            source,
        })
}

/// Decides what to publish for one commit.
///
/// With [`TitleStyle::Full`] the record is dated `received_at`, so records
/// come out in push order. Only [`TitleStyle::FirstLine`] dates records by
/// the commit timestamp.
pub fn transform(
    commit: &Commit,
    repository: &str,
    branch: &str,
    style: TitleStyle,
    sanitizer: &Sanitizer,
    received_at: OffsetDateTime,
) -> Result<Disposition, TransformError> {
    if is_merge(&commit.message) {
        return Ok(Disposition::Skip);
    }

    let summary = first_line(&commit.message);
    let (title, published_at) = match style {
        TitleStyle::Full => (
            format!(
                "[{}{}] {} – {}",
                repository, branch, commit.author.name, summary
            ),
            received_at.to_offset(UtcOffset::UTC),
        ),
        TitleStyle::FirstLine => (summary, commit_time(commit)?),
    };

    Ok(Disposition::Publish(NormalizedRecord {
        title,
        body: sanitizer.sanitize(&commit.message),
        status: RecordStatus::Published,
        published_at,
    }))
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use crate::webhooks::push::Author;

    use super::*;

    fn commit(message: &str) -> Commit {
        Commit {
            id: "abc".to_owned(),
            message: message.to_owned(),
            timestamp: "2013-01-14T10:10:14-08:00".to_owned(),
            url: "https://host/commit/abc".parse().unwrap(),
            author: Author {
                name: "Jane Doe".to_owned(),
                email: "jane@x.com".to_owned(),
            },
        }
    }

    const RECEIVED: OffsetDateTime = datetime!(2024-03-01 12:00:00 UTC);

    fn publish(commit: &Commit, style: TitleStyle) -> NormalizedRecord {
        let result = transform(
            commit,
            "demo",
            "/master",
            style,
            &Sanitizer::default(),
            RECEIVED,
        );
        match result.unwrap() {
            Disposition::Publish(record) => record,
            Disposition::Skip => panic!("commit shouldn't be skipped"),
        }
    }

    #[test]
    fn branch_paths() {
        assert_eq!(branch_path("refs/heads/master"), "/master");
        assert_eq!(branch_path("refs/heads/foo"), "/foo");
        assert_eq!(branch_path("refs/heads/release/1.2"), "/release/1.2");
        assert_eq!(branch_path("refs/tags/v1.0"), "refs/tags/v1.0");
    }

    #[test]
    fn merge_prefix() {
        assert!(is_merge("Merge branch 'x' into master"));
        assert!(is_merge("Merged upstream"));
        assert!(is_merge("Mergers and acquisitions"));
        assert!(!is_merge("merge lowercase"));
        assert!(!is_merge("Fix Merge"));
        assert!(!is_merge("Merg"));
    }

    #[test]
    fn merge_commits_are_skipped() {
        let result = transform(
            &commit("Merge branch 'x' into master"),
            "demo",
            "/master",
            TitleStyle::Full,
            &Sanitizer::default(),
            RECEIVED,
        )
        .unwrap();

        assert!(matches!(result, Disposition::Skip));
    }

    #[test]
    fn full_title() {
        let record = publish(&commit("Fix bug"), TitleStyle::Full);

        assert_eq!(record.title, "[demo/master] Jane Doe – Fix bug");
        assert_eq!(record.body, "Fix bug");
        assert_eq!(record.status, RecordStatus::Published);
    }

    #[test]
    fn first_line_title() {
        let record = publish(
            &commit("Add <em>event</em> template\r\n\nSigned-off-by: Jane Doe"),
            TitleStyle::FirstLine,
        );

        assert_eq!(record.title, "Add event template");
        assert_eq!(
            record.body,
            "Add <em>event</em> template\r\n\nSigned-off-by: Jane Doe"
        );
    }

    #[test]
    fn full_style_is_dated_on_receipt() {
        let record = publish(&commit("Fix bug"), TitleStyle::Full);
        assert_eq!(record.published_at, RECEIVED);

        let mut odd = commit("Fix bug");
        odd.timestamp = "2013-01-14 10:10:14".to_owned();
        let record = publish(&odd, TitleStyle::Full);
        assert_eq!(record.published_at, RECEIVED);
    }

    #[test]
    fn first_line_style_is_dated_by_commit_in_utc() {
        let record = publish(&commit("Fix bug"), TitleStyle::FirstLine);

        assert_eq!(record.published_at, datetime!(2013-01-14 18:10:14 UTC));
        assert_eq!(record.published_at.offset(), UtcOffset::UTC);
    }

    #[test]
    fn bad_timestamp() {
        let mut bad = commit("Fix bug");
        bad.timestamp = "yesterday".to_owned();

        let err = transform(
            &bad,
            "demo",
            "/master",
            TitleStyle::FirstLine,
            &Sanitizer::default(),
            RECEIVED,
        )
        .unwrap_err();
        assert!(matches!(err, TransformError::InvalidTimestamp { .. }));
    }
}
