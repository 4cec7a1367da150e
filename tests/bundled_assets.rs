use std::path::Path;

use offcuts_cam::{CameraConfig, ImageState};

fn manifest_dir() -> &'static Path {
    Path::new(env!("CARGO_MANIFEST_DIR"))
}

#[test]
fn test_sample_config_matches_defaults() {
    let config = CameraConfig::load(&manifest_dir().join("offcuts-cam.yaml")).unwrap();
    assert_eq!(config, CameraConfig::default());
}

#[test]
fn test_bundled_images_decode() {
    let mut config = CameraConfig::default();
    config.assets.directory = manifest_dir().join("assets");
    let bundle = config.asset_bundle();

    for state in [ImageState::Clear, ImageState::Obstructed] {
        let image = bundle.load(state).unwrap();
        assert_eq!((image.width(), image.height()), (16, 12), "{} image", state);
    }
}
