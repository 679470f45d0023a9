//! Redundancy priority resolution
//!
//! Priorities order Active versions for eviction, 0 being the preferred
//! (running) image. Assigning a priority pushes any other version holding the
//! same value one step down, in a single ascending sweep over a snapshot of
//! the current priorities.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tracing::{debug, warn};

use crate::error::{UpdaterError, UpdaterResult};
use crate::repository::VersionRepository;

impl VersionRepository {
    /// Assign `priority` to the version with `id`.
    ///
    /// The value is persisted, conflicting versions are pushed down via
    /// [`VersionRepository::free_priority`], then the value is committed.
    ///
    /// # Errors
    ///
    /// Returns [`UpdaterError::VersionNotFound`] if `id` is unknown.
    pub fn set_priority(&mut self, id: &str, priority: u8) -> UpdaterResult<()> {
        if !self.activations.contains_key(id) {
            return Err(UpdaterError::VersionNotFound(id.to_string()));
        }

        if let Err(e) = self.store.store(id, priority) {
            warn!(version_id = %id, priority, error = %e, "Failed to persist priority");
        }
        self.free_priority(priority, id);
        self.set_priority_value(id, Some(priority));
        Ok(())
    }

    /// Make `value` free for the version `version_id`.
    ///
    /// Versions holding a priority are visited once each, lowest
    /// `(priority, id)` first. Every visited version other than `version_id`
    /// whose priority equals the value being freed is bumped by one, and the
    /// bumped number becomes the value freed for the rest of the sweep.
    /// Bumped versions are not revisited.
    pub fn free_priority(&mut self, value: u8, version_id: &str) {
        let mut worklist: BinaryHeap<Reverse<(u8, String)>> = self
            .activations
            .values()
            .filter_map(|record| {
                record
                    .priority()
                    .map(|priority| Reverse((priority, record.id().to_string())))
            })
            .collect();

        let mut value = value;
        while let Some(Reverse((priority, id))) = worklist.pop() {
            if priority != value || id == version_id {
                continue;
            }

            value = value.saturating_add(1);
            if let Err(e) = self.store.store(&id, value) {
                warn!(version_id = %id, priority = value, error = %e, "Failed to persist priority");
            }
            debug!(version_id = %id, priority = value, "Priority bumped to resolve conflict");
            self.set_priority_value(&id, Some(value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::{Activation, ActivationState};
    use crate::bus::{BusEvent, BusPublisher, RunningImage, UnitManager};
    use crate::config::UpdaterConfig;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct PriorityLog(Arc<Mutex<Vec<(String, Option<u8>)>>>);

    impl BusPublisher for PriorityLog {
        fn publish(&self, event: BusEvent) {
            if let BusEvent::Priority { id, priority } = event {
                if let Ok(mut log) = self.0.lock() {
                    log.push((id, priority));
                }
            }
        }

        fn delete_pending_image(&self, _object_path: &str) -> UpdaterResult<()> {
            Ok(())
        }
    }

    struct IdleUnits;

    impl UnitManager for IdleUnits {
        fn subscribe(&self) -> UpdaterResult<()> {
            Ok(())
        }

        fn unsubscribe(&self) -> UpdaterResult<()> {
            Ok(())
        }

        fn start_unit(&self, _unit: &str) -> UpdaterResult<()> {
            Ok(())
        }
    }

    struct NotRunning;

    impl RunningImage for NotRunning {
        fn running_id(&self) -> Option<String> {
            None
        }
    }

    fn repository_with(
        dir: &std::path::Path,
        priorities: &[(&str, u8)],
    ) -> UpdaterResult<(VersionRepository, PriorityLog)> {
        let config = UpdaterConfig::builder()
            .media_dir(dir.join("media"))
            .persist_dir(dir.join("state"))
            .build()?;
        let log = PriorityLog::default();
        let mut repo = VersionRepository::new(
            config,
            Box::new(log.clone()),
            Box::new(IdleUnits),
            Box::new(NotRunning),
        );
        for (id, priority) in priorities {
            let path = repo.config().object_path(id);
            repo.activations.insert(
                (*id).to_string(),
                Activation::new(id, &path, ActivationState::Active, Vec::new(), None),
            );
            repo.set_priority_value(id, Some(*priority));
        }
        Ok((repo, log))
    }

    fn priority_of(repo: &VersionRepository, id: &str) -> Option<u8> {
        repo.activation(id).and_then(Activation::priority)
    }

    #[test]
    fn test_free_priority_bumps_one_of_two_duplicates() -> UpdaterResult<()> {
        let dir = tempfile::tempdir()?;
        let (mut repo, _log) = repository_with(
            dir.path(),
            &[("0000000a", 0), ("0000000b", 1), ("0000000c", 1), ("0000000d", 2)],
        )?;

        repo.free_priority(1, "0000000b");

        assert_eq!(priority_of(&repo, "0000000a"), Some(0));
        assert_eq!(priority_of(&repo, "0000000b"), Some(1));
        assert_eq!(priority_of(&repo, "0000000c"), Some(2));
        assert_eq!(priority_of(&repo, "0000000d"), Some(3));
        Ok(())
    }

    #[test]
    fn test_free_priority_never_decreases() -> UpdaterResult<()> {
        let dir = tempfile::tempdir()?;
        let before = [("0000000a", 0), ("0000000b", 1), ("0000000c", 1), ("0000000d", 2)];
        let (mut repo, _log) = repository_with(dir.path(), &before)?;

        repo.free_priority(1, "0000000c");

        for (id, old) in before {
            let new = priority_of(&repo, id).unwrap_or_default();
            assert!(new >= old, "{id} went from {old} to {new}");
        }
        assert_eq!(priority_of(&repo, "0000000b"), Some(2));
        assert_eq!(priority_of(&repo, "0000000c"), Some(1));
        Ok(())
    }

    #[test]
    fn test_free_priority_persists_bumps() -> UpdaterResult<()> {
        let dir = tempfile::tempdir()?;
        let (mut repo, _log) = repository_with(dir.path(), &[("0000000a", 0)])?;

        repo.free_priority(0, "0000000b");

        assert_eq!(priority_of(&repo, "0000000a"), Some(1));
        assert_eq!(repo.store.restore("0000000a"), Some(1));
        Ok(())
    }

    #[test]
    fn test_free_priority_saturates() -> UpdaterResult<()> {
        let dir = tempfile::tempdir()?;
        let (mut repo, _log) = repository_with(dir.path(), &[("0000000a", u8::MAX)])?;

        repo.free_priority(u8::MAX, "0000000b");

        assert_eq!(priority_of(&repo, "0000000a"), Some(u8::MAX));
        Ok(())
    }

    #[test]
    fn test_set_priority_takes_value_and_publishes() -> UpdaterResult<()> {
        let dir = tempfile::tempdir()?;
        let (mut repo, log) =
            repository_with(dir.path(), &[("0000000a", 0), ("0000000b", 1)])?;

        repo.set_priority("0000000b", 0)?;

        assert_eq!(priority_of(&repo, "0000000a"), Some(1));
        assert_eq!(priority_of(&repo, "0000000b"), Some(0));
        assert_eq!(repo.store.restore("0000000b"), Some(0));

        let events = log.0.lock().map(|log| log.clone()).unwrap_or_default();
        assert!(events.ends_with(&[
            ("0000000a".to_string(), Some(1)),
            ("0000000b".to_string(), Some(0)),
        ]));
        Ok(())
    }

    #[test]
    fn test_set_priority_unknown_version() -> UpdaterResult<()> {
        let dir = tempfile::tempdir()?;
        let (mut repo, _log) = repository_with(dir.path(), &[])?;

        let result = repo.set_priority("deadbeef", 3);

        assert!(matches!(result, Err(UpdaterError::VersionNotFound(_))));
        assert_eq!(repo.store.restore("deadbeef"), None);
        Ok(())
    }
}
