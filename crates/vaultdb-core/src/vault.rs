//! Vault scanning: discovers note files and reads them into [`Note`]s.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use walkdir::{DirEntry, WalkDir};

use crate::error::{Error, Result};
use crate::settings::VaultSettings;
use crate::types::Note;

pub struct VaultReader {
    root: PathBuf,
    settings: VaultSettings,
}

impl VaultReader {
    pub fn new(root: impl Into<PathBuf>, settings: VaultSettings) -> Self {
        Self { root: root.into(), settings }
    }

    /// Read every note under the root, sorted by vault-relative path.
    pub fn read_notes(&self) -> Result<Vec<Note>> {
        if !self.root.is_dir() {
            return Err(Error::NotFound(format!("vault directory {}", self.root.display())));
        }
        let files = self.list_note_files();
        let mut notes = Vec::with_capacity(files.len());
        for path in files {
            let note = self.read_note(&path)?;
            if note.text.lines().count() < self.settings.min_lines {
                tracing::debug!(path = %note.path, "skipping note below min_lines");
                continue;
            }
            notes.push(note);
        }
        tracing::info!(root = %self.root.display(), notes = notes.len(), "vault scanned");
        Ok(notes)
    }

    fn list_note_files(&self) -> Vec<PathBuf> {
        let skip_hidden = self.settings.skip_hidden;
        let mut files: Vec<PathBuf> = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| !(skip_hidden && e.depth() > 0 && is_hidden(e)))
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unreadable vault entry");
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some(self.settings.extension.as_str()))
            .map(DirEntry::into_path)
            .collect();
        files.sort();
        files
    }

    fn read_note(&self, file_path: &Path) -> Result<Note> {
        let bytes = fs::read(file_path)?;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(path = %file_path.display(), "note is not valid UTF-8; decoding lossily");
                String::from_utf8_lossy(err.as_bytes()).into_owned()
            }
        };
        let modified: DateTime<Utc> = fs::metadata(file_path)?.modified()?.into();
        Ok(Note::new(self.relative_path(file_path), text, modified))
    }

    fn relative_path(&self, file_path: &Path) -> String {
        let relative = file_path.strip_prefix(&self.root).unwrap_or(file_path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_str().is_some_and(|name| name.starts_with('.'))
}
