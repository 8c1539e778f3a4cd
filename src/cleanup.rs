use std::fs;
use std::io;
use std::path::Path;

use tracing::warn;

/// What happened to one path during cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Deleted,
    NotFound,
    Failed,
}

/// Best-effort removal of intermediate files. Never fails; prints one
/// status line per path.
pub fn delete_files<P: AsRef<Path>>(paths: &[P]) -> Vec<Removal> {
    paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            match fs::remove_file(path) {
                Ok(()) => {
                    println!("File {} deleted.", path.display());
                    Removal::Deleted
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    println!("File {} not found.", path.display());
                    Removal::NotFound
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to delete intermediate file");
                    println!("File {} could not be deleted: {e}", path.display());
                    Removal::Failed
                }
            }
        })
        .collect()
}
