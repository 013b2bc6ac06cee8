//! Local filesystem side of the client
//!
//! `LocalFs` is the capability the mirror needs; `StdFs` implements it over
//! `std::fs` with its own working directory instead of the process-wide one.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::session::Report;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    pub name: String,
    pub is_dir: bool,
    /// Regular-file size; 0 for everything else.
    pub size: u64,
}

pub trait LocalFs {
    fn current(&self) -> &Path;
    fn list(&self, path: &Path) -> io::Result<Vec<LocalEntry>>;
    fn set_current(&mut self, path: &Path) -> io::Result<PathBuf>;
    fn create(&self, path: &Path) -> io::Result<()>;
    /// Remove a file or an empty directory.
    fn remove(&self, path: &Path) -> io::Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct StdFs {
    cwd: PathBuf,
}

impl StdFs {
    pub fn new(cwd: PathBuf) -> Self {
        Self { cwd }
    }

    /// Start in the process working directory.
    pub fn from_process() -> io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    /// Resolve `path` against the working directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }
}

/// Fold `.` and `..` without touching the filesystem.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

impl LocalFs for StdFs {
    fn current(&self) -> &Path {
        &self.cwd
    }

    fn list(&self, path: &Path) -> io::Result<Vec<LocalEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.resolve(path))? {
            let entry = entry?;
            let meta = fs::metadata(entry.path()).or_else(|_| entry.metadata())?;
            entries.push(LocalEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: meta.is_dir(),
                size: if meta.is_file() { meta.len() } else { 0 },
            });
        }
        Ok(entries)
    }

    fn set_current(&mut self, path: &Path) -> io::Result<PathBuf> {
        let next = lexical_normalize(&self.resolve(path));
        if !fs::metadata(&next)?.is_dir() {
            return Err(io::Error::new(io::ErrorKind::Other, "not a directory"));
        }
        self.cwd = next.clone();
        Ok(next)
    }

    fn create(&self, path: &Path) -> io::Result<()> {
        fs::create_dir(self.resolve(path))
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        let target = self.resolve(path);
        if fs::symlink_metadata(&target)?.is_dir() {
            fs::remove_dir(target)
        } else {
            fs::remove_file(target)
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(self.resolve(from), self.resolve(to))
    }
}

#[derive(Debug, Error)]
pub enum LocalError {
    #[error("{action}: {source}")]
    Io {
        action: String,
        #[source]
        source: io::Error,
    },
    #[error("local directory '{}' already exists", .0.display())]
    AlreadyExists(PathBuf),
}

pub type LocalOutcome<T> = Result<Report<T>, LocalError>;

/// Local verbs reported the same way as the remote ones.
pub struct LocalMirror<F: LocalFs> {
    fs: F,
}

impl<F: LocalFs> LocalMirror<F> {
    pub fn new(fs: F) -> Self {
        Self { fs }
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn current(&self) -> &Path {
        self.fs.current()
    }

    /// Directories first, then by name.
    pub fn list(&self) -> LocalOutcome<Vec<LocalEntry>> {
        let cwd = self.fs.current().to_path_buf();
        let mut entries = self.fs.list(&cwd).map_err(|source| LocalError::Io {
            action: format!("Failed to list local directory '{}'", cwd.display()),
            source,
        })?;
        entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
        let detail = format!("{} entries in {}", entries.len(), cwd.display());
        Ok(Report {
            value: entries,
            detail,
        })
    }

    pub fn change_directory(&mut self, path: &str) -> LocalOutcome<PathBuf> {
        let next = self
            .fs
            .set_current(Path::new(path))
            .map_err(|source| LocalError::Io {
                action: format!("Failed to change local directory to '{}'", path),
                source,
            })?;
        let detail = format!("Local directory is now {}", next.display());
        Ok(Report { value: next, detail })
    }

    pub fn make_directory(&self, path: &str) -> LocalOutcome<()> {
        match self.fs.create(Path::new(path)) {
            Ok(()) => Ok(Report {
                value: (),
                detail: format!("Local directory '{}' created", path),
            }),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(LocalError::AlreadyExists(PathBuf::from(path)))
            }
            Err(source) => Err(LocalError::Io {
                action: format!("Failed to create local directory '{}'", path),
                source,
            }),
        }
    }

    pub fn remove(&self, path: &str) -> LocalOutcome<()> {
        self.fs
            .remove(Path::new(path))
            .map_err(|source| LocalError::Io {
                action: format!("Failed to remove '{}'", path),
                source,
            })?;
        Ok(Report {
            value: (),
            detail: format!("'{}' removed", path),
        })
    }

    pub fn rename(&self, from: &str, to: &str) -> LocalOutcome<()> {
        self.fs
            .rename(Path::new(from), Path::new(to))
            .map_err(|source| LocalError::Io {
                action: format!("Failed to move '{}' to '{}'", from, to),
                source,
            })?;
        Ok(Report {
            value: (),
            detail: format!("Moved '{}' to '{}'", from, to),
        })
    }
}
