use std::io::Cursor;
use std::sync::Arc;

use anyhow::Result;
use image::{ImageFormat, Rgb, RgbImage};

use traffic_density::artifact::BOUNDED_IMAGES_DIR;
use traffic_density::ingest::CAPTURED_IMAGES_DIR;
use traffic_density::{
    build_map, load_detector, plan_map, ArtifactStore, CameraRecord, CapturedImageDir,
    DensityTier, DetectionOutcome, DetectorKind, DetectorParams, FilesystemArtifactStore,
    FixedBoxesDetector, ImageSource, InMemoryArtifactStore, LayerKind, LeafletRenderer, Pipeline,
    PopupComposer, RecordStore, SqliteRecordStore,
};

const CASCADE: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier">
  <stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>12</height>
  <width>12</width>
  <stageNum>1</stageNum>
  <stages>
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>0.5</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>0 -1 0 0.1</internalNodes>
          <leafValues>-1. 1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>0 0 12 6 1.</_>
        <_>0 6 12 6 -1.</_></rects></_></features></cascade>
</opencv_storage>
"#;

fn encode(img: &RgbImage) -> Vec<u8> {
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .expect("encode snapshot");
    out
}

fn street_snapshot() -> Vec<u8> {
    encode(&RgbImage::from_fn(704, 480, |x, y| {
        Rgb([(x / 3 % 256) as u8, (y / 2 % 256) as u8, 90])
    }))
}

fn camera(id: &str, lat: f64, lon: f64) -> CameraRecord {
    CameraRecord::new(id, format!("Camera {id}"), lat, lon, format!("https://cam/{id}.jpg"))
}

#[test]
fn detect_then_render_over_sqlite_and_disk() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let root = temp_dir.path();
    let mut store = SqliteRecordStore::open(root.join("out.db"))?;
    store.replace_all(&[
        camera("low", 40.7300, -73.9350),
        camera("high", 40.7301, -73.9351),
        camera("dark", 40.7500, -73.9800),
    ])?;

    let frames = CapturedImageDir::new(root.join(CAPTURED_IMAGES_DIR));
    frames.store("low", &street_snapshot())?;
    frames.store("high", &street_snapshot())?;
    frames.store("dark", b"")?;

    let artifacts = FilesystemArtifactStore::new(root.join(BOUNDED_IMAGES_DIR))?;

    let low = Pipeline::new(Arc::new(FixedBoxesDetector::with_count(5)));
    let high = Pipeline::new(Arc::new(FixedBoxesDetector::with_count(20)));
    let low_outcome = low.detect_camera(&camera("low", 0.0, 0.0), &frames, &artifacts, None)?;
    let high_outcome = high.detect_camera(&camera("high", 0.0, 0.0), &frames, &artifacts, None)?;
    let dark_outcome = high.detect_camera(&camera("dark", 0.0, 0.0), &frames, &artifacts, None)?;
    store.update("low", low_outcome.car_count())?;
    store.update("high", high_outcome.car_count())?;
    store.update("dark", dark_outcome.car_count())?;
    store.persist()?;

    assert_eq!(low_outcome.car_count(), 5);
    assert_eq!(high_outcome.car_count(), 20);
    assert!(matches!(dark_outcome, DetectionOutcome::NoData { .. }));
    assert!(!artifacts.has("dark")?);
    assert_eq!(store.get("dark")?.and_then(|r| r.car_count), Some(0));

    let composer = PopupComposer::new(ImageSource::Embedded);
    let entries = plan_map(&store.list()?, &artifacts, &composer)?;
    let order: Vec<&str> = entries.iter().map(|e| e.camera.record.id.as_str()).collect();
    assert_eq!(order, vec!["low", "high"]);
    assert_eq!(entries[1].camera.tier, DensityTier::DarkRed);
    assert!(entries[1].popup.image_reference.starts_with("data:image/jpeg;base64,"));

    let map_path = root.join("trafficMap.html");
    let drawn = build_map(
        &mut store,
        &artifacts,
        &composer,
        &LeafletRenderer::default(),
        &map_path,
    )?;
    assert_eq!(drawn, 2);
    let html = std::fs::read_to_string(&map_path)?;
    assert!(html.contains("Cars Found: 20"));
    assert!(html.contains("\"Heatmap\""));
    assert!(html.contains("\"Camera Icons\""));
    Ok(())
}

#[test]
fn busy_camera_gets_black_halo_and_opaque_marker() -> Result<()> {
    let artifacts = InMemoryArtifactStore::new();
    artifacts.write("42", b"thumb")?;
    let record = camera("42", 40.73, -73.93).with_car_count(30);
    let composer = PopupComposer::new(ImageSource::Remote {
        base_url: "https://images.example.com/images".to_string(),
    });

    let entries = plan_map(&[record], &artifacts, &composer)?;
    assert_eq!(entries.len(), 1);
    let planned = &entries[0].camera;
    assert_eq!(planned.tier, DensityTier::Black);
    let halo = planned.style(LayerKind::Halo);
    assert_eq!((halo.fill_opacity, halo.opacity), (0.4, 0.4));
    assert_eq!(halo.color, "black");
    let marker = planned.style(LayerKind::Marker);
    assert_eq!(marker.fill_color, "black");
    assert_eq!((marker.opacity, marker.fill_opacity), (1.0, 1.0));
    assert_eq!(entries[0].popup.subtitle, "Cars Found: 30");
    assert_eq!(
        entries[0].popup.image_reference,
        "https://images.example.com/images/img42.jpg"
    );
    Ok(())
}

#[test]
fn cascade_from_disk_counts_flat_frame_as_zero_and_writes_thumbnail() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let cascade_path = temp_dir.path().join("cars.xml");
    std::fs::write(&cascade_path, CASCADE)?;

    let detector = load_detector(DetectorKind::Haar, &cascade_path, DetectorParams::default())?;
    let pipeline = Pipeline::new(detector);
    let artifacts = InMemoryArtifactStore::new();
    let flat = encode(&RgbImage::from_pixel(352, 240, Rgb([128, 128, 128])));

    let first = pipeline.detect_bytes("7", Some(&flat), &artifacts, None)?;
    let thumbnail = artifacts.read("7")?;
    let second = pipeline.detect_bytes("7", Some(&flat), &artifacts, None)?;

    assert_eq!(first.car_count(), 0);
    assert!(matches!(first, DetectionOutcome::Counted { .. }));
    assert_eq!(first, second);
    assert_eq!(thumbnail, artifacts.read("7")?);
    assert_eq!(image::load_from_memory(&thumbnail)?.width(), 352);
    Ok(())
}

#[test]
fn missing_cascade_is_fatal_for_detection() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let result = load_detector(
        DetectorKind::Haar,
        &temp_dir.path().join("cars.xml"),
        DetectorParams::default(),
    );
    assert!(result.is_err());
}
