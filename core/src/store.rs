//! # Target Store
//!
//! The durable side of a run: the list of targets and the verdict marks that
//! make runs resumable. Marks are buffered by [`TargetStore::record`] and only
//! written by [`TargetStore::flush`]; a failed flush keeps them buffered so the
//! next flush retries them.
//!
//! The file format is one target per line, optionally followed by `,mark`
//! where the mark is `0`, `1` or `2`. Blank lines and `#` comments survive
//! rewrites untouched.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use sitewatch_common::error::StoreError;
use sitewatch_common::model::{Target, Verdict};
use tracing::{debug, info};

pub trait TargetStore: Send + Sync {
    /// All targets in list order, with their persisted marks.
    fn load(&self) -> Result<Vec<Target>, StoreError>;

    /// Buffers a verdict for the target with this normalized URL.
    fn record(&self, url: &str, verdict: Verdict) -> Result<(), StoreError>;

    /// Writes buffered marks and returns how many were written.
    fn flush(&self) -> Result<usize, StoreError>;

    /// Marks recorded but not yet written.
    fn pending(&self) -> usize;

    /// Clears marks (all of them, or only those with the given verdict) and
    /// writes the result. Returns the number of entries cleared.
    fn reset_marks(&self, only: Option<Verdict>) -> Result<usize, StoreError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// File store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Line {
    /// Blank line or comment, written back verbatim.
    Raw(String),
    Entry { raw: String, target: Target },
}

impl Line {
    fn parse(number: usize, text: &str) -> Result<Self, StoreError> {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(Line::Raw(text.to_string()));
        }

        // Only a trailing empty or numeric field is a mark column; any other
        // comma belongs to the URL.
        let (raw, mark) = match trimmed.rsplit_once(',') {
            Some((raw, mark)) if mark.trim().chars().all(|c| c.is_ascii_digit()) => (raw.trim(), mark.trim()),
            _ => (trimmed, ""),
        };

        let mark = if mark.is_empty() {
            None
        } else {
            let verdict = mark
                .parse::<u8>()
                .ok()
                .and_then(Verdict::from_mark)
                .ok_or_else(|| StoreError::InvalidMark {
                    line: number,
                    value: mark.to_string(),
                })?;
            Some(verdict)
        };

        Ok(Line::Entry {
            raw: raw.to_string(),
            target: Target::with_mark(raw, mark),
        })
    }

    fn render(&self) -> String {
        match self {
            Line::Raw(text) => text.clone(),
            Line::Entry { raw, target } => match target.mark {
                Some(verdict) => format!("{raw},{}", verdict.mark()),
                None => raw.clone(),
            },
        }
    }
}

#[derive(Debug, Default)]
struct FileState {
    lines: Vec<Line>,
    /// Normalized URL to the line numbers carrying it.
    index: HashMap<String, Vec<usize>>,
    dirty: HashSet<String>,
    backed_up: bool,
}

impl FileState {
    fn set_mark(&mut self, url: &str, mark: Option<Verdict>) -> bool {
        let Some(positions) = self.index.get(url) else {
            return false;
        };
        for &pos in positions {
            if let Line::Entry { target, .. } = &mut self.lines[pos] {
                target.mark = mark;
            }
        }
        true
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.render());
            out.push('\n');
        }
        out
    }
}

/// Line-based target list on disk.
#[derive(Debug)]
pub struct FileTargetStore {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl FileTargetStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let content = fs::read_to_string(&path).map_err(|source| StoreError::Read {
            path: path.clone(),
            source,
        })?;

        let mut state = FileState::default();
        for (i, text) in content.lines().enumerate() {
            let line = Line::parse(i + 1, text)?;
            if let Line::Entry { target, .. } = &line {
                state.index.entry(target.url().to_string()).or_default().push(state.lines.len());
            }
            state.lines.push(line);
        }

        debug!(path = %path.display(), entries = state.index.len(), "target list opened");
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".backup");
        PathBuf::from(name)
    }

    /// Normalized URLs currently carrying `verdict`, in list order, without repeats.
    pub fn urls_with(&self, verdict: Verdict) -> Vec<String> {
        let state = lock(&self.state);
        let mut seen = HashSet::new();
        state
            .lines
            .iter()
            .filter_map(|line| match line {
                Line::Entry { target, .. } if target.mark == Some(verdict) => Some(target.url()),
                _ => None,
            })
            .filter(|url| seen.insert(*url))
            .map(str::to_string)
            .collect()
    }

    fn write_out(&self, state: &mut FileState) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if !state.backed_up {
            let backup = self.backup_path();
            fs::copy(&self.path, &backup).map_err(write_err)?;
            state.backed_up = true;
            info!("original target list backed up to {}", backup.display());
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let mut file = fs::File::create(&tmp).map_err(write_err)?;
        file.write_all(state.render().as_bytes()).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        drop(file);

        fs::rename(&tmp, &self.path).map_err(write_err)
    }
}

impl TargetStore for FileTargetStore {
    fn load(&self) -> Result<Vec<Target>, StoreError> {
        let state = lock(&self.state);
        Ok(state
            .lines
            .iter()
            .filter_map(|line| match line {
                Line::Entry { target, .. } => Some(target.clone()),
                Line::Raw(_) => None,
            })
            .collect())
    }

    fn record(&self, url: &str, verdict: Verdict) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        if !state.set_mark(url, Some(verdict)) {
            return Err(StoreError::UnknownTarget(url.to_string()));
        }
        state.dirty.insert(url.to_string());
        Ok(())
    }

    fn flush(&self) -> Result<usize, StoreError> {
        let mut state = lock(&self.state);
        if state.dirty.is_empty() {
            return Ok(0);
        }

        self.write_out(&mut state)?;
        let written = state.dirty.len();
        state.dirty.clear();
        debug!(written, path = %self.path.display(), "marks flushed");
        Ok(written)
    }

    fn pending(&self) -> usize {
        lock(&self.state).dirty.len()
    }

    fn reset_marks(&self, only: Option<Verdict>) -> Result<usize, StoreError> {
        let mut state = lock(&self.state);
        let mut cleared = 0;
        for line in &mut state.lines {
            if let Line::Entry { target, .. } = line {
                let matches = match (target.mark, only) {
                    (None, _) => false,
                    (Some(_), None) => true,
                    (Some(mark), Some(wanted)) => mark == wanted,
                };
                if matches {
                    target.mark = None;
                    cleared += 1;
                }
            }
        }

        if cleared > 0 {
            self.write_out(&mut state)?;
            state.dirty.clear();
        }
        Ok(cleared)
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryState {
    targets: Vec<Target>,
    persisted: HashMap<String, Verdict>,
    pending: HashMap<String, Verdict>,
    failing_flushes: usize,
    always_fail: bool,
    flushes: usize,
}

/// Store kept entirely in memory, with switchable flush failures.
#[derive(Debug, Default)]
pub struct MemoryTargetStore {
    state: Mutex<MemoryState>,
}

impl MemoryTargetStore {
    pub fn new(targets: Vec<Target>) -> Self {
        let persisted = targets
            .iter()
            .filter_map(|t| t.mark.map(|m| (t.url().to_string(), m)))
            .collect();
        Self {
            state: Mutex::new(MemoryState {
                targets,
                persisted,
                ..MemoryState::default()
            }),
        }
    }

    pub fn from_urls<'a>(urls: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(urls.into_iter().map(Target::new).collect())
    }

    /// Makes the next `n` flushes fail.
    pub fn fail_next_flushes(&self, n: usize) {
        lock(&self.state).failing_flushes = n;
    }

    pub fn fail_all_flushes(&self, fail: bool) {
        lock(&self.state).always_fail = fail;
    }

    /// Marks that reached "disk".
    pub fn persisted(&self) -> HashMap<String, Verdict> {
        lock(&self.state).persisted.clone()
    }

    /// Successful flushes so far.
    pub fn flushes(&self) -> usize {
        lock(&self.state).flushes
    }
}

impl TargetStore for MemoryTargetStore {
    fn load(&self) -> Result<Vec<Target>, StoreError> {
        let state = lock(&self.state);
        Ok(state
            .targets
            .iter()
            .map(|t| Target::with_mark(t.url(), state.persisted.get(t.url()).copied()))
            .collect())
    }

    fn record(&self, url: &str, verdict: Verdict) -> Result<(), StoreError> {
        lock(&self.state).pending.insert(url.to_string(), verdict);
        Ok(())
    }

    fn flush(&self) -> Result<usize, StoreError> {
        let mut state = lock(&self.state);
        if state.pending.is_empty() {
            return Ok(0);
        }
        if state.always_fail {
            return Err(StoreError::Unavailable("flushes disabled".to_string()));
        }
        if state.failing_flushes > 0 {
            state.failing_flushes -= 1;
            return Err(StoreError::Unavailable("injected flush failure".to_string()));
        }

        let pending = std::mem::take(&mut state.pending);
        let written = pending.len();
        state.persisted.extend(pending);
        state.flushes += 1;
        Ok(written)
    }

    fn pending(&self) -> usize {
        lock(&self.state).pending.len()
    }

    fn reset_marks(&self, only: Option<Verdict>) -> Result<usize, StoreError> {
        let mut state = lock(&self.state);
        let before = state.persisted.len();
        state.persisted.retain(|_, mark| only.is_some_and(|wanted| *mark != wanted));
        Ok(before - state.persisted.len())
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
