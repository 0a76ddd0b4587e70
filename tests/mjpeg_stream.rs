use anyhow::Result;
use image::RgbImage;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;

use virtual_cam::overlay::{text_bounds, TIMESTAMP_ORIGIN};
use virtual_cam::{
    create_frame_source, fetch_one_frame, open_stream, Cycle, DatasetConfig, DeviceConfig, Frame,
    FrameEncoder, FrameSource, MjpegStream, SourceConfig,
};

struct FixedEncoder;

impl FrameEncoder for FixedEncoder {
    fn encode(&self, _frame: &Frame) -> Result<Vec<u8>> {
        Ok(vec![0xAB, 0xCD, 0xEF])
    }
}

fn stub_device(name: &str, fps: u32) -> Arc<FrameSource> {
    create_frame_source(SourceConfig::device(DeviceConfig::new(name)).with_fps(fps))
        .expect("stub device")
}

fn black_dataset(dir: &Path) -> Result<Arc<FrameSource>> {
    RgbImage::new(320, 240).save(dir.join("test-0.png"))?;
    create_frame_source(SourceConfig::dataset(DatasetConfig {
        folder: dir.to_path_buf(),
        prefix: "test-".to_string(),
        extension: "png".to_string(),
        cycle_length: 0,
    }))
}

#[test]
fn parts_use_exact_multipart_framing() {
    let source = stub_device("stub://cam", 50);
    let mut stream = MjpegStream::new(Some(source), Arc::new(FixedEncoder));

    let part = stream.next().expect("part");
    assert_eq!(
        part,
        b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\xAB\xCD\xEF\r\n".to_vec()
    );
    assert_eq!(stream.parts_sent(), 1);
}

#[test]
fn default_encoder_emits_jpeg_payloads() {
    let source = stub_device("stub://cam", 50);
    let mut stream = open_stream(Some(source));
    let part = stream.next().expect("part");
    let header = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
    assert!(part.starts_with(header));
    assert_eq!(&part[header.len()..header.len() + 2], &[0xFF, 0xD8]);
    assert_eq!(&part[part.len() - 4..], &[0xFF, 0xD9, b'\r', b'\n']);
}

#[test]
fn paused_stream_emits_nothing_but_stays_open() {
    let source = stub_device("stub://cam", 50);
    let mut stream = MjpegStream::new(Some(source.clone()), Arc::new(FixedEncoder));
    assert!(matches!(stream.poll_cycle(), Cycle::Part(_)));

    source.set_capture_enabled(false);
    let pulls = |source: &FrameSource| {
        let stats = source.stats();
        stats.frames_captured + stats.frames_missed
    };
    let pulls_before = pulls(source.as_ref());
    for _ in 0..3 {
        assert_eq!(stream.poll_cycle(), Cycle::Idle);
    }
    assert!(!stream.is_ended());
    assert_eq!(stream.parts_sent(), 1);
    assert_eq!(pulls(source.as_ref()), pulls_before);
    assert_eq!(pulls_before, 1);

    source.set_capture_enabled(true);
    assert!(matches!(stream.poll_cycle(), Cycle::Part(_)));
}

#[test]
fn exhausted_device_idles_instead_of_ending() {
    let source = stub_device("stub://cam?frames=2", 50);
    let mut stream = MjpegStream::new(Some(source), Arc::new(FixedEncoder));

    assert!(matches!(stream.poll_cycle(), Cycle::Part(_)));
    assert!(matches!(stream.poll_cycle(), Cycle::Part(_)));
    assert_eq!(stream.poll_cycle(), Cycle::Idle);
    assert_eq!(stream.poll_cycle(), Cycle::Idle);
    assert!(!stream.is_ended());
}

#[test]
fn stop_ends_every_stream_within_one_interval() {
    let source = stub_device("stub://cam", 20);
    let readers: Vec<_> = (0..2)
        .map(|_| {
            let stream = MjpegStream::new(Some(source.clone()), Arc::new(FixedEncoder));
            thread::spawn(move || stream.count())
        })
        .collect();

    thread::sleep(Duration::from_millis(150));
    let stopped_at = Instant::now();
    source.stop();
    for reader in readers {
        let parts = reader.join().expect("reader thread");
        assert!(parts > 0);
    }
    assert!(stopped_at.elapsed() < Duration::from_millis(500));
    assert!(source.is_terminated());
}

#[test]
fn stop_while_paused_ends_the_stream() {
    let source = stub_device("stub://cam", 50);
    let mut stream = MjpegStream::new(Some(source.clone()), Arc::new(FixedEncoder));
    source.set_capture_enabled(false);
    assert_eq!(stream.poll_cycle(), Cycle::Idle);

    source.stop();
    assert_eq!(stream.poll_cycle(), Cycle::Ended);
    assert_eq!(stream.next(), None);
    assert!(stream.is_ended());
}

#[test]
fn stopped_source_yields_empty_new_streams() {
    let source = stub_device("stub://cam", 50);
    source.stop();
    let mut stream = open_stream(Some(source));
    assert_eq!(stream.next(), None);
}

#[test]
fn parts_are_paced_by_frame_rate() {
    let source = stub_device("stub://cam", 20);
    let mut stream = MjpegStream::new(Some(source), Arc::new(FixedEncoder));

    stream.next().expect("first part");
    let started = Instant::now();
    for _ in 0..3 {
        stream.next().expect("part");
    }
    // Three more parts at 20 fps take at least three 50 ms intervals.
    assert!(started.elapsed() >= Duration::from_millis(150));
}

#[test]
fn frame_rate_changes_apply_to_running_streams() {
    let source = stub_device("stub://cam", 2);
    let mut stream = MjpegStream::new(Some(source.clone()), Arc::new(FixedEncoder));
    stream.next().expect("first part");

    source.set_frames_per_second(50).expect("fps");
    assert!(source.set_frames_per_second(0).is_err());
    assert_eq!(source.controls().fps(), 50);

    let started = Instant::now();
    stream.next().expect("second part");
    assert!(started.elapsed() < Duration::from_millis(400));
}

#[test]
fn absent_frame_gives_no_snapshot() -> Result<()> {
    let dir = tempdir()?;
    let source = create_frame_source(SourceConfig::dataset(DatasetConfig {
        folder: dir.path().to_path_buf(),
        ..DatasetConfig::default()
    }))?;
    assert!(fetch_one_frame(&source).is_none());
    Ok(())
}

#[test]
fn snapshot_is_a_jpeg() {
    let source = stub_device("stub://cam", 10);
    let jpeg = fetch_one_frame(&source).expect("snapshot");
    let decoded = image::load_from_memory(&jpeg).expect("decode snapshot");
    assert_eq!((decoded.width(), decoded.height()), (640, 480));
}

#[test]
fn timestamp_only_marks_the_top_left_corner() -> Result<()> {
    let dir = tempdir()?;
    let source = black_dataset(dir.path())?;

    let plain = image::load_from_memory(&fetch_one_frame(&source).expect("plain"))?.into_rgb8();
    assert!(plain.pixels().all(|px| px.0.iter().all(|&c| c < 40)));

    source.set_show_timestamp(true);
    let stamped =
        image::load_from_memory(&fetch_one_frame(&source).expect("stamped"))?.into_rgb8();

    let bounds = text_bounds("0000-00-00 00:00:00", TIMESTAMP_ORIGIN);
    let mut brightest_inside = 0u8;
    for (x, y, px) in stamped.enumerate_pixels() {
        // JPEG blocks around the glyphs may ring a little.
        let near_text = x + 16 >= bounds.x
            && x < bounds.x + bounds.width + 16
            && y + 16 >= bounds.y
            && y < bounds.y + bounds.height + 16;
        if near_text {
            brightest_inside = brightest_inside.max(px.0[0]);
        } else {
            assert!(px.0.iter().all(|&c| c < 40), "pixel ({}, {}) changed", x, y);
        }
    }
    assert!(brightest_inside > 150);
    Ok(())
}
