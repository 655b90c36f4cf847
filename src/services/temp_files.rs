//! Per-call temporary files
//!
//! Audio downloaded or produced during a call lives in a directory named
//! after the call id and is removed when the call is released.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct TempFileManager {
    folder: PathBuf,
    files: Vec<PathBuf>,
    folder_created: bool,
}

impl TempFileManager {
    pub fn new(root: &Path, call_id: &str) -> Self {
        Self {
            folder: root.join(sanitize(call_id)),
            files: Vec::new(),
            folder_created: false,
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Create an empty uniquely named file and track it for cleanup
    pub fn create_file(&mut self, extension: &str) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.folder)?;
        self.folder_created = true;

        let path = self
            .folder
            .join(format!("{}.{extension}", uuid::Uuid::new_v4()));
        fs::File::create(&path)?;
        self.files.push(path.clone());
        Ok(path)
    }

    pub fn tracked(&self) -> &[PathBuf] {
        &self.files
    }

    /// Remove every tracked file and the call folder.
    ///
    /// Failures are logged and skipped; cleanup never fails the call.
    pub fn delete_files_and_folders(&mut self) -> usize {
        let mut removed = 0;
        for path in self.files.drain(..) {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to delete temporary file");
                }
            }
        }

        if self.folder_created {
            self.folder_created = false;
            if let Err(e) = fs::remove_dir_all(&self.folder) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.folder.display(), error = %e, "Failed to delete temporary folder");
                }
            }
        }

        if removed > 0 {
            tracing::debug!(count = removed, "Temporary files deleted");
        }
        removed
    }
}

impl Drop for TempFileManager {
    fn drop(&mut self) {
        if !self.files.is_empty() || self.folder_created {
            self.delete_files_and_folders();
        }
    }
}

/// Call ids come from the platform; keep them path-safe
fn sanitize(call_id: &str) -> String {
    let cleaned: String = call_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}
