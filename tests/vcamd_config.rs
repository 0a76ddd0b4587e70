use std::sync::Mutex;

use tempfile::NamedTempFile;

use virtual_cam::config::VcamConfig;
use virtual_cam::{Region, SourceKind, SourceOrigin};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "VCAM_CONFIG",
        "VCAM_ADDR",
        "VCAM_MODE",
        "VCAM_DEVICE",
        "VCAM_DATASET_DIR",
        "VCAM_DATASET_PREFIX",
        "VCAM_FPS",
        "VCAM_CYCLE",
        "VCAM_TIMESTAMP",
        "VCAM_JPEG_QUALITY",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let toml = r#"
        [server]
        addr = "0.0.0.0:9000"

        [camera]
        mode = "simulated"
        fps = 12
        jpeg_quality = 80

        [camera.dataset]
        folder = "/srv/frames"
        prefix = "frame_"
        extension = "png"
        cycle_length = 4

        [camera.screen]
        region = { x = 10, y = 20, width = 300, height = 200 }
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    std::env::set_var("VCAM_CONFIG", file.path());
    std::env::set_var("VCAM_FPS", "25");
    std::env::set_var("VCAM_TIMESTAMP", "on");
    std::env::set_var("VCAM_CYCLE", "9");

    let cfg = VcamConfig::load().expect("load config");

    assert_eq!(cfg.addr, "0.0.0.0:9000");
    assert_eq!(cfg.mode, SourceKind::Dataset);
    assert_eq!(cfg.fps, 25);
    assert!(cfg.show_timestamp);
    assert_eq!(cfg.jpeg_quality, 80);
    assert_eq!(cfg.dataset.folder.to_str(), Some("/srv/frames"));
    assert_eq!(cfg.dataset.prefix, "frame_");
    assert_eq!(cfg.dataset.extension, "png");
    assert_eq!(cfg.dataset.cycle_length, 9);
    assert_eq!(cfg.screen.region, Some(Region::new(10, 20, 300, 200)));

    let source = cfg.source_config();
    assert!(matches!(source.origin, SourceOrigin::Dataset(_)));
    assert_eq!(source.fps, 25);
    assert!(source.show_timestamp);

    clear_env();
}

#[test]
fn defaults_apply_without_a_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("VCAM_MODE", "device");
    std::env::set_var("VCAM_DEVICE", "stub://desk");

    let cfg = VcamConfig::load().expect("load config");
    assert_eq!(cfg.addr, "127.0.0.1:8080");
    assert_eq!(cfg.mode, SourceKind::Device);
    assert_eq!(cfg.device.device, "stub://desk");
    assert_eq!((cfg.device.width, cfg.device.height), (640, 480));
    assert_eq!(cfg.fps, 10);
    assert!(!cfg.show_timestamp);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("VCAM_FPS", "0");
    assert!(VcamConfig::load().is_err());
    clear_env();

    std::env::set_var("VCAM_MODE", "webcam");
    assert!(VcamConfig::load().is_err());
    clear_env();

    std::env::set_var("VCAM_TIMESTAMP", "sometimes");
    assert!(VcamConfig::load().is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"[camera]\nframerate = 5\n").expect("write config");
    std::env::set_var("VCAM_CONFIG", file.path());
    assert!(VcamConfig::load().is_err());

    clear_env();
}
