//! Watch targets and event relevance.

use notify::event::{EventKind, ModifyKind};
use notify::{Event, RecursiveMode};
use std::path::{Path, PathBuf};

use crate::config::ServerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    File,
    Directory,
}

/// A path whose changes trigger a recompile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    pub path: PathBuf,
    pub kind: TargetKind,
    pub recursive: bool,
}

impl WatchTarget {
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            path: absolute(path.as_ref()),
            kind: TargetKind::File,
            recursive: false,
        }
    }

    pub fn directory(path: impl AsRef<Path>) -> Self {
        Self {
            path: absolute(path.as_ref()),
            kind: TargetKind::Directory,
            recursive: true,
        }
    }

    /// The script, custom CSS/JS files and the assets directory, in that order.
    pub fn from_config(config: &ServerConfig) -> Vec<Self> {
        let project = &config.project;
        let mut targets = vec![Self::file(&project.script)];
        targets.extend(project.custom_css.iter().map(Self::file));
        targets.extend(project.custom_js.iter().map(Self::file));
        targets.extend(project.assets_dir.iter().map(Self::directory));
        targets
    }

    /// What to hand to the OS watcher.
    ///
    /// Files are watched through their parent directory so that editors which
    /// save by writing a temp file and renaming it over the original keep
    /// being observed.
    pub fn watch_root(&self) -> (PathBuf, RecursiveMode) {
        match self.kind {
            TargetKind::File => {
                let parent = self
                    .path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                (parent, RecursiveMode::NonRecursive)
            }
            TargetKind::Directory if self.recursive => {
                (self.path.clone(), RecursiveMode::Recursive)
            }
            TargetKind::Directory => (self.path.clone(), RecursiveMode::NonRecursive),
        }
    }

    /// Whether `event` should schedule a recompile for this target.
    pub fn is_relevant(&self, event: &Event) -> bool {
        let structural = match event.kind {
            EventKind::Create(_) => true,
            // mtime/atime/chmod noise
            EventKind::Modify(ModifyKind::Metadata(_)) => false,
            EventKind::Modify(_) => true,
            EventKind::Remove(_) => self.kind == TargetKind::Directory,
            _ => false,
        };
        structural && event.paths.iter().any(|path| self.covers(path))
    }

    fn covers(&self, path: &Path) -> bool {
        match self.kind {
            TargetKind::File => path == self.path,
            TargetKind::Directory => path.starts_with(&self.path) && !is_temp_file(path),
        }
    }
}

impl std::fmt::Display for WatchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            TargetKind::File => write!(f, "file {}", self.path.display()),
            TargetKind::Directory => write!(f, "dir {}", self.path.display()),
        }
    }
}

/// Canonical form when the path exists, so it compares equal to OS event paths.
fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with(".#")
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};

    fn event(kind: EventKind, path: &Path) -> Event {
        Event::new(kind).add_path(path.to_path_buf())
    }

    #[test]
    fn file_target_ignores_siblings_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("main.yaml");
        std::fs::write(&script, "").unwrap();
        let target = WatchTarget::file(&script);
        let script = target.path.clone();
        let sibling = script.with_file_name("other.yaml");

        let content = EventKind::Modify(ModifyKind::Data(DataChange::Content));
        let metadata = EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any));
        assert!(target.is_relevant(&event(content, &script)));
        assert!(target.is_relevant(&event(EventKind::Create(CreateKind::File), &script)));
        assert!(!target.is_relevant(&event(metadata, &script)));
        assert!(!target.is_relevant(&event(EventKind::Remove(RemoveKind::File), &script)));
        assert!(!target.is_relevant(&event(EventKind::Modify(ModifyKind::Any), &sibling)));
    }

    #[test]
    fn directory_target_sees_removals_but_not_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = WatchTarget::directory(dir.path());
        let image = target.path.join("bg").join("forest.png");

        assert!(target.is_relevant(&event(EventKind::Remove(RemoveKind::File), &image)));
        assert!(target.is_relevant(&event(EventKind::Create(CreateKind::File), &image)));
        let swap = target.path.join("a.swp");
        let outside = Path::new("/elsewhere/x.png");
        assert!(!target.is_relevant(&event(EventKind::Create(CreateKind::File), &swap)));
        assert!(!target.is_relevant(&event(EventKind::Modify(ModifyKind::Any), outside)));
    }

    #[test]
    fn targets_follow_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::from(dir.path().join("main.yaml").as_path());
        config.project.custom_css = Some(dir.path().join("theme.css"));
        config.project.assets_dir = Some(dir.path().join("assets"));

        let targets = WatchTarget::from_config(&config);
        let kinds: Vec<_> = targets.iter().map(|t| (t.kind, t.recursive)).collect();
        assert_eq!(
            kinds,
            vec![
                (TargetKind::File, false),
                (TargetKind::File, false),
                (TargetKind::Directory, true),
            ]
        );
        assert_eq!(targets[0].watch_root().1, RecursiveMode::NonRecursive);
        assert_eq!(targets[2].watch_root().1, RecursiveMode::Recursive);
    }
}
