//! Hand a saved image to the desktop's default viewer.

use crate::image_io::MediaError;
use std::path::Path;

/// Open `path` in the system image viewer without waiting for it to exit.
pub fn show(path: impl AsRef<Path>) -> Result<(), MediaError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(MediaError::NotFound(path.display().to_string()));
    }
    open::that_detached(path)?;
    tracing::debug!(path = %path.display(), "launched viewer");
    Ok(())
}
