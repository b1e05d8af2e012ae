//! Storage backends for the persisted template document.

use std::fs;
use std::path::PathBuf;

use crate::util::{BlueMarbleError, BlueMarbleResult};

/// Key-value style persistence for one serialized document.
pub trait TemplateStore: Send {
    /// Returns the stored document text, if any.
    fn load(&self) -> BlueMarbleResult<Option<String>>;

    /// Replaces the stored document text.
    fn save(&mut self, text: &str) -> BlueMarbleResult<()>;
}

/// Store that keeps the document in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    contents: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `text`.
    pub fn with_contents(text: impl Into<String>) -> Self {
        Self {
            contents: Some(text.into()),
        }
    }
}

impl TemplateStore for MemoryStore {
    fn load(&self) -> BlueMarbleResult<Option<String>> {
        Ok(self.contents.clone())
    }

    fn save(&mut self, text: &str) -> BlueMarbleResult<()> {
        self.contents = Some(text.to_string());
        Ok(())
    }
}

/// Store backed by a JSON file on disk.
///
/// Writes go to a sibling temporary file that is renamed over the target,
/// so a failed write leaves the previous document intact.
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TemplateStore for FileStore {
    fn load(&self) -> BlueMarbleResult<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(BlueMarbleError::storage(format!(
                "{}: {err}",
                self.path.display()
            ))),
        }
    }

    fn save(&mut self, text: &str) -> BlueMarbleResult<()> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, text)
            .and_then(|()| fs::rename(&tmp, &self.path))
            .map_err(|err| BlueMarbleError::storage(format!("{}: {err}", self.path.display())))
    }
}
