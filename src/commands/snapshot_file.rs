use anyhow::{anyhow, Result};
use std::fs;
use std::path::Path;

pub fn ensure_snapshot_file(path: &Path) -> Result<()> {
    if fs::metadata(path).is_ok() {
        return Ok(());
    }

    Err(anyhow!(
        "Bar snapshot not found at {}. Generate it with `import` before running this command.",
        path.display()
    ))
}
