use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

use crate::store::{ContentStore, StoreError};

/// Layout version this build expects. Bump it when adding a step to
/// [`maybe_upgrade`].
pub const SCHEMA_VERSION: i64 = 1;

const VERSION_OPTION: &str = "receiver_version";
const LOCK_OPTION: &str = "receiver_version_running";

/// An upgrade lock younger than this means another process is still upgrading.
const LOCK_STALE_AFTER: Duration = Duration::minutes(30);

/// Durable integer settings, used to remember which upgrades already ran.
pub trait OptionStore: Send + Sync {
    fn get_option(&self, name: &str) -> Result<Option<i64>, StoreError>;
    fn set_option(&self, name: &str, value: i64) -> Result<(), StoreError>;
    fn delete_option(&self, name: &str) -> Result<(), StoreError>;
}

#[derive(Debug, PartialEq, Eq)]
pub enum UpgradeOutcome {
    UpToDate,
    /// Someone else took the lock less than 30 minutes ago.
    Locked { held_for: Duration },
    Upgraded { from: i64, to: i64 },
}

/// Brings the store up to [`SCHEMA_VERSION`], unless it's already there or
/// another upgrade is in progress. The store layout is prepared either way.
pub fn maybe_upgrade(
    options: &dyn OptionStore,
    store: &dyn ContentStore,
    now: OffsetDateTime,
) -> Result<UpgradeOutcome, StoreError> {
    let version = options.get_option(VERSION_OPTION)?.unwrap_or(0);
    if version == SCHEMA_VERSION {
        return Ok(UpgradeOutcome::UpToDate);
    }

    match options.get_option(LOCK_OPTION)? {
        Some(started) => {
            let held_for = Duration::seconds(now.unix_timestamp() - started);
            if held_for < LOCK_STALE_AFTER {
                warn!(
                    "existing upgrade has been running for less than 30 minutes ({}s), skipping",
                    held_for.whole_seconds()
                );
                // the layout is needed to serve requests meanwhile
                store.prepare()?;
                return Ok(UpgradeOutcome::Locked { held_for });
            }
            warn!("upgrade lock is older than 30 minutes, going ahead regardless");
        }
        None => options.set_option(LOCK_OPTION, now.unix_timestamp())?,
    }

    if version < 1 {
        store.prepare()?;
        info!("prepared the store layout");
    }

    options.delete_option(LOCK_OPTION)?;
    options.set_option(VERSION_OPTION, SCHEMA_VERSION)?;
    info!("done upgrading, now at version {}", SCHEMA_VERSION);

    Ok(UpgradeOutcome::Upgraded {
        from: version,
        to: SCHEMA_VERSION,
    })
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use crate::store::{DirectoryStore, MemoryStore};

    use super::*;

    const NOW: OffsetDateTime = datetime!(2013-09-03 16:45:21 UTC);

    #[test]
    fn fresh_store_gets_upgraded_once() {
        let store = MemoryStore::new();

        assert_eq!(
            maybe_upgrade(&store, &store, NOW).unwrap(),
            UpgradeOutcome::Upgraded { from: 0, to: 1 }
        );
        assert_eq!(store.get_option(LOCK_OPTION).unwrap(), None);
        assert_eq!(
            store.get_option(VERSION_OPTION).unwrap(),
            Some(SCHEMA_VERSION)
        );

        assert_eq!(
            maybe_upgrade(&store, &store, NOW).unwrap(),
            UpgradeOutcome::UpToDate
        );
    }

    #[test]
    fn recent_lock_blocks_upgrade() {
        let store = MemoryStore::new();
        let started = NOW - Duration::minutes(10);
        store
            .set_option(LOCK_OPTION, started.unix_timestamp())
            .unwrap();

        assert_eq!(
            maybe_upgrade(&store, &store, NOW).unwrap(),
            UpgradeOutcome::Locked {
                held_for: Duration::minutes(10)
            }
        );
        assert_eq!(store.get_option(VERSION_OPTION).unwrap(), None);
        assert_eq!(
            store.get_option(LOCK_OPTION).unwrap(),
            Some(started.unix_timestamp())
        );
    }

    #[test]
    fn stale_lock_is_ignored() {
        let store = MemoryStore::new();
        let started = NOW - Duration::minutes(30);
        store
            .set_option(LOCK_OPTION, started.unix_timestamp())
            .unwrap();

        assert_eq!(
            maybe_upgrade(&store, &store, NOW).unwrap(),
            UpgradeOutcome::Upgraded { from: 0, to: 1 }
        );
        assert_eq!(store.get_option(LOCK_OPTION).unwrap(), None);
    }

    #[test]
    fn upgrade_prepares_directory_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();

        maybe_upgrade(&store, &store, NOW).unwrap();

        assert!(dir.path().join("records").is_dir());
    }

    #[test]
    fn locked_upgrade_still_prepares_directory_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        store
            .set_option(LOCK_OPTION, (NOW - Duration::minutes(5)).unix_timestamp())
            .unwrap();

        assert!(matches!(
            maybe_upgrade(&store, &store, NOW).unwrap(),
            UpgradeOutcome::Locked { .. }
        ));
        assert!(dir.path().join("records").is_dir());
        assert_eq!(store.get_option(VERSION_OPTION).unwrap(), None);
    }
}
