use anyhow::Result;
use std::sync::Mutex;
use tempfile::tempdir;

use virtual_cam::{
    create_frame_source, open_stream, Cycle, DatasetConfig, Region, ScreenConfig, SourceConfig,
};

struct RecordingLogger {
    records: Mutex<Vec<(log::Level, String)>>,
}

impl log::Log for RecordingLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        self.records
            .lock()
            .unwrap()
            .push((record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}

static LOGGER: RecordingLogger = RecordingLogger {
    records: Mutex::new(Vec::new()),
};

fn take_records() -> Vec<(log::Level, String)> {
    std::mem::take(&mut *LOGGER.records.lock().unwrap())
}

fn warnings(records: &[(log::Level, String)]) -> Vec<&str> {
    records
        .iter()
        .filter(|(level, _)| *level <= log::Level::Warn)
        .map(|(_, message)| message.as_str())
        .collect()
}

// One test per binary: the logger is process-wide.
#[test]
fn repeated_capture_failures_warn_once_per_streak() -> Result<()> {
    log::set_logger(&LOGGER).expect("install logger");
    log::set_max_level(log::LevelFilter::Trace);

    let dir = tempdir()?;
    std::fs::write(dir.path().join("test-0.jpeg"), b"not a jpeg")?;
    let dataset = create_frame_source(
        SourceConfig::dataset(DatasetConfig {
            folder: dir.path().to_path_buf(),
            ..DatasetConfig::default()
        })
        .with_fps(50),
    )?;
    let screen = create_frame_source(
        SourceConfig::screen(ScreenConfig {
            region: Some(Region::new(100, 100, 10, 10)),
            monitor: Some("stub://40x30".to_string()),
        })
        .with_fps(50),
    )?;
    take_records();

    for _ in 0..3 {
        assert!(dataset.get_one_frame().is_none());
        assert!(screen.get_one_frame().is_none());
    }
    let records = take_records();
    assert!(warnings(&records).is_empty(), "{:?}", warnings(&records));
    assert!(records.iter().any(|(_, m)| m.contains("cannot decode")));
    assert!(records.iter().any(|(_, m)| m.contains("outside")));

    let mut stream = open_stream(Some(dataset));
    for _ in 0..3 {
        assert_eq!(stream.poll_cycle(), Cycle::Idle);
    }
    let records = take_records();
    assert_eq!(warnings(&records).len(), 1, "{:?}", warnings(&records));
    Ok(())
}
