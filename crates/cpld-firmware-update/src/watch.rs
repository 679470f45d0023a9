//! Running-image tracking
//!
//! The running image is published as a symlink inside the persistence
//! directory pointing at the image's media directory. [`ActiveLink`] resolves
//! it on demand, [`ActiveImageWatch`] reports whenever it is (re)created.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::bus::RunningImage;
use crate::config::UpdaterConfig;
use crate::error::UpdaterResult;

/// Resolves the running-image symlink to a version id
#[derive(Debug, Clone)]
pub struct ActiveLink {
    link: PathBuf,
    image_prefix: String,
    release_file_name: String,
}

impl ActiveLink {
    /// Create a resolver for the link described by `config`.
    pub fn new(config: &UpdaterConfig) -> Self {
        Self {
            link: config.active_link(),
            image_prefix: config.image_prefix.clone(),
            release_file_name: config.release_file_name.clone(),
        }
    }

    /// Path of the symlink.
    pub fn link(&self) -> &Path {
        &self.link
    }

    /// Determine the version id the link points at.
    ///
    /// Returns `None` if the link is missing, dangling, points at a directory
    /// without a release file, or at a directory not named like an image.
    pub fn determine_id(&self) -> Option<String> {
        let target = fs::canonicalize(&self.link).ok()?;
        if !target.join(&self.release_file_name).is_file() {
            return None;
        }
        target
            .file_name()?
            .to_str()?
            .strip_prefix(self.image_prefix.as_str())
            .map(str::to_string)
    }
}

impl RunningImage for ActiveLink {
    fn running_id(&self) -> Option<String> {
        self.determine_id()
    }
}

/// Watches the persistence directory for changes of the running-image link
///
/// Dropping the watch stops it.
pub struct ActiveImageWatch {
    _watcher: RecommendedWatcher,
}

impl ActiveImageWatch {
    /// Start watching.
    ///
    /// `on_change` is called from the watcher's thread with the resolved id
    /// each time the link is created.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistence directory cannot be created or
    /// the watch cannot be installed.
    pub fn new<F>(config: &UpdaterConfig, on_change: F) -> UpdaterResult<Self>
    where
        F: Fn(Option<String>) + Send + 'static,
    {
        fs::create_dir_all(&config.persist_dir)?;
        let link = ActiveLink::new(config);

        let mut watcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Create(_)) {
                        return;
                    }
                    if event.paths.iter().any(|path| is_link_path(path, link.link())) {
                        let id = link.determine_id();
                        debug!(?id, "Running image link created");
                        on_change(id);
                    }
                }
                Err(e) => warn!(error = %e, "Watch error"),
            })?;

        watcher.watch(&config.persist_dir, RecursiveMode::NonRecursive)?;
        info!(path = ?config.persist_dir, "Watching for running image changes");

        Ok(Self { _watcher: watcher })
    }
}

fn is_link_path(path: &Path, link: &Path) -> bool {
    path == link || (path.file_name().is_some() && path.file_name() == link.file_name())
}
