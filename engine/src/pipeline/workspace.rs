//! Run directories
//!
//! Every execution gets a fresh directory named `<UTC %Y%m%d-%H%M%S>-<slug>`
//! under the runs directory. The directory is claimed with a non-recursive
//! `create_dir`, so two runs started in the same second with the same prompt
//! end up in different directories (`-2`, `-3`, ... suffixes). Artifact
//! writes only accept relative paths that stay inside the run root.

use chrono::{DateTime, Utc};
use sdk::{EngineError, RunManifest, RUN_REPORT_FILE};
use std::io;
use std::path::{Component, Path, PathBuf};

use super::StageError;

const SLUG_MAX_CHARS: usize = 40;
const MAX_SUFFIX: u32 = 1000;

#[derive(Debug, Clone)]
pub struct RunWorkspace {
    root: PathBuf,
    run_id: String,
}

impl RunWorkspace {
    /// Claim a new run directory for a prompt
    pub fn create(runs_dir: &Path, prompt: &str) -> Result<Self, EngineError> {
        Self::create_at(runs_dir, prompt, Utc::now())
    }

    pub fn create_at(
        runs_dir: &Path,
        prompt: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        std::fs::create_dir_all(runs_dir)
            .map_err(|e| EngineError::RunDirectory(runs_dir.to_path_buf(), e.to_string()))?;

        let base = format!("{}-{}", now.format("%Y%m%d-%H%M%S"), slugify(prompt));

        for n in 1..=MAX_SUFFIX {
            let run_id = if n == 1 {
                base.clone()
            } else {
                format!("{}-{}", base, n)
            };
            let root = runs_dir.join(&run_id);

            match std::fs::create_dir(&root) {
                Ok(()) => {
                    tracing::debug!(run_id = %run_id, path = %root.display(), "Created run directory");
                    return Ok(Self { root, run_id });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(EngineError::RunDirectory(root, e.to_string())),
            }
        }

        Err(EngineError::RunDirectory(
            runs_dir.join(&base),
            "too many runs with the same id".to_string(),
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Resolve a run-relative path, rejecting anything that leaves the root
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, StageError> {
        match normalize_relative(relative) {
            Some(clean) => Ok(self.root.join(clean)),
            None => Err(StageError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("artifact path escapes the run directory: {}", relative),
            ))),
        }
    }

    /// Write an artifact and return its normalized run-relative path
    pub fn write_file(&self, relative: &str, contents: &str) -> Result<String, StageError> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, contents)?;

        normalize_relative(relative)
            .map(|p| to_forward_slashes(&p))
            .ok_or_else(|| {
                StageError::Io(io::Error::new(io::ErrorKind::InvalidInput, relative.to_string()))
            })
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.resolve(relative).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Persist the terminal manifest as `run_report.json`
    ///
    /// Written to a temporary file and renamed so pollers never read a
    /// partial report.
    pub fn write_report(&self, manifest: &RunManifest) -> Result<PathBuf, EngineError> {
        let path = self.root.join(RUN_REPORT_FILE);
        let tmp = self.root.join(format!("{}.tmp", RUN_REPORT_FILE));
        let json = serde_json::to_string_pretty(manifest)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(path)
    }
}

/// Load the terminal report of a run directory
pub fn load_report(run_dir: &Path) -> Result<RunManifest, EngineError> {
    if !run_dir.is_dir() {
        return Err(EngineError::RunNotFound(run_dir.to_path_buf()));
    }
    let path = run_dir.join(RUN_REPORT_FILE);
    if !path.is_file() {
        return Err(EngineError::RunIncomplete(run_dir.display().to_string()));
    }
    let contents = std::fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// True when a generated path can be written inside a run root
pub fn is_safe_relative(relative: &str) -> bool {
    normalize_relative(relative).is_some()
}

/// Lowercase alphanumerics, `-` and `_`, spaces turned into dashes
pub fn slugify(prompt: &str) -> String {
    let kept: String = prompt
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ' '))
        .collect();

    let slug: String = kept
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .take(SLUG_MAX_CHARS)
        .collect();

    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "project".to_string()
    } else {
        slug
    }
}

fn normalize_relative(relative: &str) -> Option<PathBuf> {
    let relative = relative.replace('\\', "/");
    let path = Path::new(&relative);
    let mut clean = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}

fn to_forward_slashes(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 5).unwrap()
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Build a Todo App!"), "build-a-todo-app");
        assert_eq!(slugify("   "), "project");
        assert_eq!(slugify("../../etc/passwd"), "etcpasswd");
        assert_eq!(slugify(&"x".repeat(100)).len(), 40);
    }

    #[test]
    fn test_run_id_format() {
        let dir = TempDir::new().unwrap();
        let ws = RunWorkspace::create_at(dir.path(), "todo app", fixed_time()).unwrap();
        assert_eq!(ws.run_id(), "20240517-093005-todo-app");
        assert!(ws.root().is_dir());
    }

    #[test]
    fn test_collision_gets_suffix() {
        let dir = TempDir::new().unwrap();
        let first = RunWorkspace::create_at(dir.path(), "todo app", fixed_time()).unwrap();
        let second = RunWorkspace::create_at(dir.path(), "todo app", fixed_time()).unwrap();
        assert_ne!(first.root(), second.root());
        assert_eq!(second.run_id(), "20240517-093005-todo-app-2");
    }

    #[test]
    fn test_write_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let ws = RunWorkspace::create(dir.path(), "p").unwrap();
        assert!(ws.write_file("../escape.txt", "x").is_err());
        assert!(ws.write_file("/etc/passwd", "x").is_err());
        assert!(ws.write_file("", "x").is_err());
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn test_write_normalizes_path() {
        let dir = TempDir::new().unwrap();
        let ws = RunWorkspace::create(dir.path(), "p").unwrap();
        let rel = ws.write_file("./frontend/src/App.jsx", "x").unwrap();
        assert_eq!(rel, "frontend/src/App.jsx");
        assert!(ws.exists("frontend/src/App.jsx"));
    }

    #[test]
    fn test_load_report_states() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load_report(&dir.path().join("missing")),
            Err(EngineError::RunNotFound(_))
        ));

        let ws = RunWorkspace::create(dir.path(), "p").unwrap();
        assert!(matches!(
            load_report(ws.root()),
            Err(EngineError::RunIncomplete(_))
        ));

        let mut manifest = RunManifest::new(ws.run_id(), "p");
        manifest.finish(sdk::RunStatus::Succeeded, "done");
        ws.write_report(&manifest).unwrap();

        let loaded = load_report(ws.root()).unwrap();
        assert_eq!(loaded.run_id, ws.run_id());
        assert_eq!(loaded.status, sdk::RunStatus::Succeeded);
        assert!(!ws.root().join("run_report.json.tmp").exists());
    }
}
