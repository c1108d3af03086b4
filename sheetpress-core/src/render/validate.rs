//! Gate every engine output must pass before it counts as a rendering

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};

/// Anything smaller is an empty or truncated document
pub const MIN_PDF_BYTES: u64 = 1024;

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// True when `path` exists, holds at least [`MIN_PDF_BYTES`] and starts with `%PDF`
pub fn validate_pdf(path: impl AsRef<Path>) -> bool {
    check_pdf(path.as_ref(), "validator").is_ok()
}

/// Size of the PDF at `path`, or a `ValidationFailure` attributed to `engine`
pub fn check_pdf(path: &Path, engine: &str) -> Result<u64> {
    let failure = |reason: String| Error::ValidationFailure {
        engine: engine.to_string(),
        reason,
    };

    let size = match path.metadata() {
        Ok(meta) if meta.is_file() => meta.len(),
        Ok(_) => return Err(failure(format!("{} is not a file", path.display()))),
        Err(_) => return Err(failure(format!("no output at {}", path.display()))),
    };
    if size < MIN_PDF_BYTES {
        return Err(failure(format!("output is {size} bytes, expected at least {MIN_PDF_BYTES}")));
    }

    let mut magic = [0u8; 4];
    File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .map_err(|e| failure(format!("cannot read output: {e}")))?;
    if &magic != PDF_MAGIC {
        return Err(failure("output does not start with %PDF".to_string()));
    }
    Ok(size)
}
