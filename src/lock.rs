// 🔒 Ledger Lock - One cycle at a time per ledger file
//
// `<ledger>.lock` is created exclusively on acquire and removed on drop.
// A stale lock left by a killed process has to be deleted by hand.

use crate::error::{ReconError, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct LedgerLock {
    path: PathBuf,
}

impl LedgerLock {
    pub fn acquire(ledger_path: &Path) -> Result<LedgerLock> {
        let path = lock_path(ledger_path);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(ReconError::LedgerLocked(path));
            }
            Err(e) => return Err(ReconError::io(path, e)),
        };

        writeln!(file, "{}", std::process::id()).map_err(|e| ReconError::io(&path, e))?;
        debug!(lock = %path.display(), "ledger lock acquired");
        Ok(LedgerLock { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "failed to release ledger lock");
        }
    }
}

pub fn lock_path(ledger_path: &Path) -> PathBuf {
    let mut name = ledger_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    ledger_path.with_file_name(name)
}
