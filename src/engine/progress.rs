use super::handle::Handle;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Durable, append-only record of handles already unfollowed.
///
/// Loaded once at startup; the in-memory set and the file only grow through
/// [`ProgressLedger::append`].
pub struct ProgressLedger {
    path: PathBuf,
    processed: HashSet<Handle>,
}

impl ProgressLedger {
    /// Open the ledger at `path`. A missing file is an empty ledger; lines
    /// that are not valid handles are skipped.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let mut processed = HashSet::new();
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
                    match Handle::parse(line) {
                        Some(handle) => {
                            processed.insert(handle);
                        }
                        None => tracing::warn!(line, "skipping invalid ledger entry"),
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        tracing::info!(path = %path.display(), entries = processed.len(), "progress ledger loaded");
        Ok(Self { path, processed })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, handle: &Handle) -> bool {
        self.processed.contains(handle)
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }

    /// Truncate the file and rewrite it with the previously processed set,
    /// one handle per line. Only called once, at the start of a run.
    pub fn start_run(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut handles: Vec<&Handle> = self.processed.iter().collect();
        handles.sort();
        let mut content = String::new();
        for handle in handles {
            content.push_str(handle.as_str());
            content.push('\n');
        }
        std::fs::write(&self.path, content)
    }

    /// Record a success durably. Returns false if it was already recorded.
    pub fn append(&mut self, handle: &Handle) -> io::Result<bool> {
        if self.processed.contains(handle) {
            return Ok(false);
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", handle)?;
        file.flush()?;
        self.processed.insert(handle.clone());
        Ok(true)
    }
}
