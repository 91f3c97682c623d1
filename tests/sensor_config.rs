use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use camera_sensor::config::SensorConfig;
use camera_sensor::SourceDescriptor;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SENSOR_CONFIG",
        "SENSOR_URL",
        "SENSOR_LOGIN",
        "SENSOR_PASSWORD",
        "SENSOR_LOCAL_INDEX",
        "SENSOR_TARGET_FPS",
        "SENSOR_CONNECT_TIMEOUT_MS",
        "SENSOR_READ_TIMEOUT_MS",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(json.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_to_first_local_camera() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = SensorConfig::load().expect("load defaults");
    assert_eq!(cfg.source, SourceDescriptor::local(0));
    assert_eq!(cfg.capture.target_fps, 10);
    assert_eq!((cfg.capture.width, cfg.capture.height), (640, 480));
    assert_eq!(cfg.capture.connect_timeout, Duration::from_secs(5));
    assert_eq!(cfg.capture.read_timeout, Duration::from_secs(10));
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "source": {
                "url": "http://192.168.1.20/video.mjpg",
                "login": "viewer"
            },
            "capture": {
                "target_fps": 12,
                "width": 800,
                "height": 600,
                "read_timeout_ms": 2500
            }
        }"#,
    );

    std::env::set_var("SENSOR_CONFIG", file.path());
    std::env::set_var("SENSOR_PASSWORD", "hunter2");
    std::env::set_var("SENSOR_CONNECT_TIMEOUT_MS", "750");

    let cfg = SensorConfig::load().expect("load config");

    assert_eq!(
        cfg.source,
        SourceDescriptor::remote("http://192.168.1.20/video.mjpg", "viewer", "hunter2")
    );
    assert_eq!(cfg.capture.target_fps, 12);
    assert_eq!((cfg.capture.width, cfg.capture.height), (800, 600));
    assert_eq!(cfg.capture.connect_timeout, Duration::from_millis(750));
    assert_eq!(cfg.capture.read_timeout, Duration::from_millis(2500));

    std::env::set_var("SENSOR_READ_TIMEOUT_MS", "4000");
    let cfg = SensorConfig::load().expect("load config");
    assert_eq!(cfg.capture.read_timeout, Duration::from_millis(4000));

    std::env::set_var("SENSOR_READ_TIMEOUT_MS", "soon");
    let err = SensorConfig::load().expect_err("non-numeric read timeout");
    assert!(err.to_string().contains("SENSOR_READ_TIMEOUT_MS"));

    clear_env();
}

#[test]
fn env_local_index_replaces_configured_url() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(r#"{ "source": { "url": "http://cam/video" } }"#);
    std::env::set_var("SENSOR_LOCAL_INDEX", "2");

    let cfg = SensorConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.source, SourceDescriptor::local(2));

    clear_env();
}

#[test]
fn rejects_invalid_configuration() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let both = write_config(r#"{ "source": { "local_index": 1, "url": "http://cam/video" } }"#);
    let err = SensorConfig::load_from(Some(both.path())).expect_err("both sources");
    assert!(err.to_string().contains("not both"));

    let zero = write_config(r#"{ "capture": { "width": 0 } }"#);
    assert!(SensorConfig::load_from(Some(zero.path())).is_err());

    let unknown = write_config(r#"{ "rtsp": { "url": "rtsp://camera-1" } }"#);
    let err = SensorConfig::load_from(Some(unknown.path())).expect_err("unknown field");
    assert!(err.to_string().contains("invalid config file"));

    std::env::set_var("SENSOR_TARGET_FPS", "fast");
    let err = SensorConfig::load().expect_err("non-numeric fps");
    assert!(err.to_string().contains("SENSOR_TARGET_FPS"));

    clear_env();
}
