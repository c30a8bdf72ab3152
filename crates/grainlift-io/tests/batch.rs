//! End-to-end runs of the batch driver over temporary directories.

#![allow(clippy::unwrap_used)]

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use grainlift_io::codec::{self, OutputFormat};
use grainlift_io::{
    BatchDriver, BatchObserver, CancelToken, ItemReport, ItemStatus, Layout, Progress, RunOptions,
    RunReport, RunStatistics,
};
use grainlift_pipeline::{EnhancementConfig, PixelBuffer, RgbImage};

/// Small seeded config so debug-build runs stay quick.
fn quick_config() -> EnhancementConfig {
    let mut config = EnhancementConfig {
        grain_seed: Some(42),
        ..EnhancementConfig::default()
    };
    config.denoise.template_window = 3;
    config.denoise.search_window = 5;
    config
}

fn write_image(path: &Path, w: u32, h: u32) {
    let buffer = PixelBuffer::new(RgbImage::from_fn(w, h, |x, y| {
        let v = if (x / 8 + y / 8) % 2 == 0 { 60 } else { 190 };
        image::Rgb([v, v.saturating_add(20), 255 - v])
    }))
    .unwrap();
    let format = OutputFormat::from_path(path).unwrap();
    codec::encode(&buffer, path, format).unwrap();
}

fn run(
    source: &Path,
    destination: &Path,
    config: EnhancementConfig,
    options: RunOptions,
    observer: &mut impl BatchObserver,
) -> RunReport {
    BatchDriver::new(config, options)
        .unwrap()
        .run(source, destination, observer)
        .unwrap()
}

fn completed(report: RunReport) -> RunStatistics {
    match report {
        RunReport::Completed(stats) => stats,
        RunReport::NoImagesFound => unreachable!("expected images to be found"),
    }
}

#[derive(Default)]
struct Recorder {
    started: Option<usize>,
    no_images: bool,
    reports: Vec<(ItemReport, Progress)>,
}

impl BatchObserver for Recorder {
    fn on_start(&mut self, total: usize) {
        self.started = Some(total);
    }

    fn on_item(&mut self, report: &ItemReport, progress: Progress) {
        self.reports.push((report.clone(), progress));
    }

    fn on_no_images(&mut self, _source: &Path) {
        self.no_images = true;
    }
}

#[test]
fn empty_source_reports_no_images_and_writes_nothing() {
    let src = tempfile::tempdir().unwrap();
    fs::write(src.path().join("readme.txt"), b"not an image").unwrap();
    let dst = src.path().join("out");

    let mut recorder = Recorder::default();
    let report = run(
        src.path(),
        &dst,
        quick_config(),
        RunOptions::default(),
        &mut recorder,
    );

    assert!(matches!(report, RunReport::NoImagesFound));
    assert!(recorder.no_images);
    assert!(recorder.started.is_none());
    assert!(!dst.exists());
}

#[test]
fn every_item_is_accounted_for_and_corrupt_files_are_skipped() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    write_image(&src.path().join("a.png"), 24, 16);
    write_image(&src.path().join("b.jpg"), 20, 20);
    write_image(&src.path().join("c.bmp"), 16, 12);
    fs::write(src.path().join("broken.png"), b"\x89PNG but not really").unwrap();
    fs::write(src.path().join("empty.jpg"), b"").unwrap();

    let stats = completed(run(
        src.path(),
        dst.path(),
        quick_config(),
        RunOptions::default(),
        &mut (),
    ));

    assert_eq!(stats.total, 5);
    assert_eq!(stats.processed + stats.skipped + stats.errors, 5);
    assert!(stats.skipped >= 2);
    assert_eq!(stats.processed, 3);
    assert_eq!(stats.cancelled, 0);
    assert!(stats.original_bytes > 0);
    assert!(stats.size_ratio().is_some());
    assert!(!dst.path().join("broken.png").exists());
}

#[test]
fn doubling_a_100px_png_gives_200px_output() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    write_image(&src.path().join("square.png"), 100, 100);

    let stats = completed(run(
        src.path(),
        dst.path(),
        EnhancementConfig::with_scale(2.0),
        RunOptions::default(),
        &mut (),
    ));

    assert_eq!(stats.processed, 1);
    let out = dst.path().join("square.png");
    assert!(fs::metadata(&out).unwrap().len() > 0);
    let decoded = codec::decode(&out).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (200, 200));
}

#[test]
fn mirror_layout_recreates_subdirectories() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    write_image(&src.path().join("top.png"), 12, 12);
    write_image(&src.path().join("trip/day1/beach.webp"), 12, 10);

    let stats = completed(run(
        src.path(),
        dst.path(),
        quick_config(),
        RunOptions::default(),
        &mut (),
    ));

    assert_eq!(stats.processed, 2);
    assert!(dst.path().join("top.png").is_file());
    let nested = dst.path().join("trip/day1/beach.webp");
    assert_eq!(codec::decode(&nested).unwrap().width(), 24);
}

#[test]
fn flat_layout_ignores_subdirectories() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    write_image(&src.path().join("top.png"), 12, 12);
    write_image(&src.path().join("sub/inner.png"), 12, 12);

    let options = RunOptions {
        layout: Layout::Flat,
        ..RunOptions::default()
    };
    let stats = completed(run(src.path(), dst.path(), quick_config(), options, &mut ()));

    assert_eq!(stats.total, 1);
    assert!(dst.path().join("top.png").is_file());
    assert!(!dst.path().join("sub").exists());
    assert!(!dst.path().join("inner.png").exists());
}

#[test]
fn single_worker_matches_parallel_output() {
    let src = tempfile::tempdir().unwrap();
    for i in 0..4 {
        write_image(&src.path().join(format!("img{i}.png")), 20 + i, 14);
    }

    let sequential = tempfile::tempdir().unwrap();
    let parallel = tempfile::tempdir().unwrap();
    let one = RunOptions {
        workers: NonZeroUsize::new(1),
        ..RunOptions::default()
    };
    let four = RunOptions {
        workers: NonZeroUsize::new(4),
        ..RunOptions::default()
    };
    let a = completed(run(src.path(), sequential.path(), quick_config(), one, &mut ()));
    let b = completed(run(src.path(), parallel.path(), quick_config(), four, &mut ()));

    assert_eq!(a.processed, 4);
    assert_eq!(b.processed, 4);
    for i in 0..4 {
        let name = format!("img{i}.png");
        assert_eq!(
            fs::read(sequential.path().join(&name)).unwrap(),
            fs::read(parallel.path().join(&name)).unwrap(),
            "{name}"
        );
    }
}

#[test]
fn cancelled_run_reports_every_item_as_cancelled() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    for name in ["a.png", "b.png", "c.png"] {
        write_image(&src.path().join(name), 10, 10);
    }

    let cancel = CancelToken::new();
    cancel.cancel();
    let options = RunOptions {
        cancel,
        ..RunOptions::default()
    };
    let mut recorder = Recorder::default();
    let stats = completed(run(src.path(), dst.path(), quick_config(), options, &mut recorder));

    assert_eq!(stats.cancelled, 3);
    assert_eq!(stats.processed, 0);
    assert_eq!(stats.accounted(), 3);
    assert!(
        recorder
            .reports
            .iter()
            .all(|(r, _)| r.status == ItemStatus::Cancelled)
    );
    assert_eq!(fs::read_dir(dst.path()).unwrap().count(), 0);
}

#[test]
fn observer_sees_monotonic_progress() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    let names = ["one.png", "two.jpeg", "three.tiff"];
    for name in names {
        write_image(&src.path().join(name), 14, 9);
    }

    let mut recorder = Recorder::default();
    completed(run(
        src.path(),
        dst.path(),
        quick_config(),
        RunOptions::default(),
        &mut recorder,
    ));

    assert_eq!(recorder.started, Some(3));
    let completed_counts: Vec<usize> = recorder.reports.iter().map(|(_, p)| p.completed).collect();
    assert_eq!(completed_counts, [1, 2, 3]);
    assert!(recorder.reports.iter().all(|(_, p)| p.total == 3));

    let mut sources: Vec<PathBuf> = recorder
        .reports
        .iter()
        .map(|(r, _)| r.source.clone())
        .collect();
    sources.sort();
    let mut expected: Vec<PathBuf> = names.iter().map(|n| src.path().join(n)).collect();
    expected.sort();
    assert_eq!(sources, expected);

    for (report, _) in &recorder.reports {
        assert_eq!(report.status, ItemStatus::Processed);
        assert_eq!(report.message, "success");
        assert!(report.output_bytes > 0);
        let gates = report.gates.unwrap();
        assert!(gates.denoise);
        assert!(!gates.texture);
        assert!(gates.sharpen);
        assert!(report.diagnostics.as_ref().unwrap().denoise.is_some());
    }
}

#[test]
fn missing_source_is_a_run_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = BatchDriver::new(quick_config(), RunOptions::default())
        .unwrap()
        .run(&dir.path().join("absent"), dir.path(), &mut ());
    assert!(result.is_err());
}

#[test]
fn destination_inside_source_is_not_reprocessed() {
    let src = tempfile::tempdir().unwrap();
    write_image(&src.path().join("a.png"), 10, 10);
    let dst = src.path().join("enhanced");

    let first = completed(run(
        src.path(),
        &dst,
        quick_config(),
        RunOptions::default(),
        &mut (),
    ));
    let second = completed(run(
        src.path(),
        &dst,
        quick_config(),
        RunOptions::default(),
        &mut (),
    ));
    assert_eq!(first.total, 1);
    assert_eq!(second.total, 1);
}
