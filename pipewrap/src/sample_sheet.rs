use std::path::Path;

use anyhow::Context;
use compress_io::compress::CompressIo;

use crate::utils::next_fields;

const REQUIRED_COLUMNS: [&str; 2] = ["name", "condition"];

/// Check that the first non-empty line of a sample sheet is a tab separated header
/// containing the required columns
pub fn check_sample_sheet<P: AsRef<Path>>(fname: P) -> anyhow::Result<()> {
    let fname = fname.as_ref();
    debug!("Checking sample sheet {}", fname.display());
    let mut rdr = CompressIo::new()
        .path(fname)
        .bufreader()
        .with_context(|| format!("Could not open sample sheet {}", fname.display()))?;
    let mut buf = String::new();

    let fields = next_fields(&mut rdr, &mut buf)
        .with_context(|| format!("Error reading from sample sheet {}", fname.display()))?
        .ok_or_else(|| anyhow!("Sample sheet {} is empty", fname.display()))?;

    let missing: Vec<_> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !fields.contains(c))
        .copied()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(
            "Sample sheet {} header is missing column(s): {} (the header must be tab separated)",
            fname.display(),
            missing.join(", ")
        ))
    }
}
