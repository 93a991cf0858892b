mod common;

use common::{files, FixedSpace};
use multishot::{
    config::{CaptureSet, ImageFormat, KindOutput},
    encoder::frames::{FramesEncoder, VolumeSpace},
    error::FailureCategory,
    host::Environment,
    job::{CapturedImage, PixelData},
    CaptureKind, FrameJob, SaveError, Statistics,
};
use std::{
    fs,
    path::Path,
    time::{Duration, SystemTime},
};
use tempdir::TempDir;

const MB: u64 = 1024 * 1024;

fn job(base: &Path, set: CaptureSet) -> FrameJob {
    let environment = Environment {
        base_path: base.to_owned(),
        executable_path: Some("/opt/game/Game.exe".into()),
        preset_path: None,
    };
    FrameJob::new(set, Statistics::default(), environment, 0, (2, 2))
}

fn rgba(width: u32, height: u32) -> CapturedImage {
    CapturedImage {
        width,
        height,
        pixels: PixelData::Rgba8(vec![200; (width * height * 4) as usize]),
    }
}

fn roomy() -> FixedSpace {
    FixedSpace(VolumeSpace {
        free: 500 * MB,
        total: 1000 * MB,
    })
}

#[test]
fn every_kind_gets_its_own_file() {
    let dir = TempDir::new("multishot").unwrap();
    let mut set = CaptureSet::new("shots");
    set.outputs.after = KindOutput::new("<APP>/after_<INDEX>");
    set.outputs.overlay = KindOutput::new("<APP>/overlay_<INDEX>");
    set.outputs.depth = KindOutput::new("<APP>/depth_<INDEX>");
    set.encoder.image_format = ImageFormat::FastPngRgba;

    let mut job = job(dir.path(), set);
    job.images.insert(CaptureKind::After, rgba(2, 2));
    job.images.insert(CaptureKind::Overlay, rgba(2, 2));
    job.images.insert(
        CaptureKind::Depth,
        CapturedImage {
            width: 2,
            height: 2,
            pixels: PixelData::R32Float(vec![0.25; 4]),
        },
    );

    let results = FramesEncoder::new(roomy()).encode_job(job);
    let kinds: Vec<_> = results.iter().map(|(kind, _)| *kind).collect();
    assert_eq!(kinds, [CaptureKind::After, CaptureKind::Overlay, CaptureKind::Depth]);
    assert!(results.iter().all(|(_, result)| result.is_ok()));

    assert_eq!(
        files(dir.path()),
        ["Game/after_0.png", "Game/depth_0.tiff", "Game/overlay_0.png"]
    );
    let after = image::open(dir.path().join("Game/after_0.png")).unwrap();
    assert_eq!(after.color(), image::ColorType::Rgba8);
}

#[test]
fn rgb_formats_drop_alpha() {
    let dir = TempDir::new("multishot").unwrap();
    let mut set = CaptureSet::new("shots");
    set.outputs.original = KindOutput::new("original");
    set.encoder.image_format = ImageFormat::PngRgb;

    let mut job = job(dir.path(), set);
    job.images.insert(CaptureKind::Original, rgba(2, 2));
    let results = FramesEncoder::new(roomy()).encode_job(job);
    assert!(results[0].1.is_ok());

    let image = image::open(dir.path().join("original.png")).unwrap();
    assert_eq!(image.color(), image::ColorType::Rgb8);
    assert_eq!(image.to_rgb8().get_pixel(1, 1).0, [200, 200, 200]);
}

#[test]
fn failed_writes_leave_no_file() {
    let dir = TempDir::new("multishot").unwrap();
    let mut set = CaptureSet::new("shots");
    set.outputs.after = KindOutput::new("broken");
    set.encoder.image_format = ImageFormat::PngRgba;

    let mut job = job(dir.path(), set);
    job.images.insert(
        CaptureKind::After,
        CapturedImage {
            width: 2,
            height: 2,
            pixels: PixelData::Rgba8(vec![0; 5]),
        },
    );

    let results = FramesEncoder::new(roomy()).encode_job(job);
    let err = results[0].1.as_ref().unwrap_err();
    assert!(matches!(err, SaveError::Write { .. }), "{err}");
    assert_eq!(err.category(), FailureCategory::Write);
    assert!(files(dir.path()).is_empty());
}

#[test]
fn unusable_directories_leave_the_destination_untouched() {
    let dir = TempDir::new("multishot").unwrap();
    fs::write(dir.path().join("blocker"), "keep").unwrap();
    let mut set = CaptureSet::new("shots");
    set.outputs.after = KindOutput::new("blocker/after");

    let mut job = job(dir.path(), set);
    job.images.insert(CaptureKind::After, rgba(2, 2));

    let results = FramesEncoder::new(roomy()).encode_job(job);
    let err = results[0].1.as_ref().unwrap_err();
    assert!(matches!(err, SaveError::CreateDir { .. }), "{err}");
    assert_eq!(err.category(), FailureCategory::Open);
    assert_eq!(files(dir.path()), ["blocker"]);
    assert_eq!(
        fs::read_to_string(dir.path().join("blocker")).unwrap(),
        "keep"
    );
}

#[test]
fn low_space_refuses_before_creating_anything() {
    let dir = TempDir::new("multishot").unwrap();
    let mut set = CaptureSet::new("shots");
    set.outputs.after = KindOutput {
        free_space_limit: 60,
        ..KindOutput::new("after")
    };
    set.outputs.overlay = KindOutput {
        free_space_limit: 400,
        ..KindOutput::new("overlay")
    };

    let mut job = job(dir.path(), set);
    job.images.insert(CaptureKind::After, rgba(2, 2));
    job.images.insert(CaptureKind::Overlay, rgba(2, 2));

    let results = FramesEncoder::new(roomy()).encode_job(job);
    let (kind, after) = &results[0];
    assert_eq!(*kind, CaptureKind::After);
    let err = after.as_ref().unwrap_err();
    assert_eq!(err.category(), FailureCategory::Admission);
    assert!(err.raw_os_error().is_none());
    assert!(results[1].1.is_ok());

    assert_eq!(files(dir.path()), ["overlay.png"]);
}

#[test]
fn files_are_stamped_with_the_capture_time() {
    let dir = TempDir::new("multishot").unwrap();
    let mut set = CaptureSet::new("shots");
    set.outputs.after = KindOutput::new("after");
    set.outputs.depth = KindOutput::new("depth");

    let captured = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
    let mut job = job(dir.path(), set);
    job.frame_time = captured;
    job.images.insert(CaptureKind::After, rgba(2, 2));
    job.images.insert(
        CaptureKind::Depth,
        CapturedImage {
            width: 2,
            height: 2,
            pixels: PixelData::R32Float(vec![0.5; 4]),
        },
    );

    for (kind, result) in FramesEncoder::new(roomy()).encode_job(job) {
        let path = result.unwrap();
        let modified = fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(modified, captured, "{kind}");
    }
}
