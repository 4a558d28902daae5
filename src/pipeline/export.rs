use std::fs;
use std::path::Path;

use tracing::info;

use crate::common::error::Result;
use crate::domain::ReconciledRecord;

/// Write the master sheet to `path`, replacing any previous output
/// entirely. Returns the number of data rows written.
pub fn write_master_sheet(path: &Path, records: &[ReconciledRecord]) -> Result<usize> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    info!("wrote {} rows to {}", records.len(), path.display());
    Ok(records.len())
}
