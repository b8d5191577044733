use crate::snapshot::CrewSnapshot;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Append-only JSON-lines sink for expired crews. Writes are
/// fire-and-forget: a failed write is logged and the crews are gone, the
/// engine never hears about it.
pub struct ArchiveWriter {
    path: PathBuf,
}

impl ArchiveWriter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        ArchiveWriter {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn append(&self, crews: &[CrewSnapshot]) {
        if crews.is_empty() {
            return;
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&self.path);
        let mut file = match file {
            Ok(f) => f,
            Err(e) => {
                error!("Failed to open archive {}: {}", self.path.display(), e);
                return;
            }
        };
        let mut written = 0;
        for crew in crews {
            match serde_json::to_string(crew) {
                Ok(line) => {
                    if let Err(e) = writeln!(file, "{}", line) {
                        error!("Failed to write archive line: {}", e);
                        return;
                    }
                    written += 1;
                }
                Err(e) => error!("Failed to serialize crew {}: {}", crew.id, e),
            }
        }
        info!("Archived {} expired crews", written);
    }
}
