//! Bundled still images and the clear/obstructed state that selects them.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AssetError;

/// Which still image the camera shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageState {
    #[default]
    Clear,
    Obstructed,
}

impl ImageState {
    pub fn toggled(self) -> Self {
        match self {
            ImageState::Clear => ImageState::Obstructed,
            ImageState::Obstructed => ImageState::Clear,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageState::Clear => "clear",
            ImageState::Obstructed => "obstructed",
        }
    }
}

impl fmt::Display for ImageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves image states to files in an asset directory.
#[derive(Debug, Clone)]
pub struct AssetBundle {
    directory: PathBuf,
    clear: String,
    obstructed: String,
}

impl AssetBundle {
    pub fn new(directory: impl Into<PathBuf>, clear: impl Into<String>, obstructed: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            clear: clear.into(),
            obstructed: obstructed.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path the given state's image is expected at.
    pub fn path_for(&self, state: ImageState) -> PathBuf {
        let name = match state {
            ImageState::Clear => &self.clear,
            ImageState::Obstructed => &self.obstructed,
        };
        self.directory.join(name)
    }

    /// Reads and decodes the image for `state`.
    ///
    /// Errors are logged here; callers treat them as a skipped start.
    pub fn load(&self, state: ImageState) -> Result<DynamicImage, AssetError> {
        let result = self.load_inner(state);
        if let Err(e) = &result {
            warn!("Could not load {} image: {}", state, e);
        }
        result
    }

    fn load_inner(&self, state: ImageState) -> Result<DynamicImage, AssetError> {
        let path = self.path_for(state);
        if !path.is_file() {
            return Err(AssetError::NotFound { state, path });
        }

        let bytes = fs::read(&path).map_err(|source| AssetError::Unreadable {
            path: path.clone(),
            source,
        })?;

        let image = image::load_from_memory(&bytes)
            .map_err(|source| AssetError::Undecodable { path: path.clone(), source })?;

        debug!(
            "Decoded {} image {} ({}x{})",
            state,
            path.display(),
            image.width(),
            image.height()
        );
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn bundle_in(dir: &Path) -> AssetBundle {
        AssetBundle::new(dir, "clear.png", "obstructed.png")
    }

    #[test]
    fn test_state_toggles() {
        assert_eq!(ImageState::Clear.toggled(), ImageState::Obstructed);
        assert_eq!(ImageState::Obstructed.toggled(), ImageState::Clear);
        assert_eq!(ImageState::default(), ImageState::Clear);
    }

    #[test]
    fn test_loads_existing_image() {
        let dir = tempfile::tempdir().unwrap();
        RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 255]))
            .save(dir.path().join("clear.png"))
            .unwrap();

        let image = bundle_in(dir.path()).load(ImageState::Clear).unwrap();
        assert_eq!((image.width(), image.height()), (3, 2));
    }

    #[test]
    fn test_missing_image_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = bundle_in(dir.path()).load(ImageState::Obstructed).unwrap_err();
        assert!(matches!(err, AssetError::NotFound { state: ImageState::Obstructed, .. }));
    }

    #[test]
    fn test_garbage_bytes_are_undecodable() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("clear.png"), b"definitely not a png").unwrap();

        let err = bundle_in(dir.path()).load(ImageState::Clear).unwrap_err();
        assert!(matches!(err, AssetError::Undecodable { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_in_place_of_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("clear.png")).unwrap();

        let err = bundle_in(dir.path()).load(ImageState::Clear).unwrap_err();
        assert!(matches!(err, AssetError::NotFound { .. }));
    }
}
