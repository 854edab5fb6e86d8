//! The handler against a directory-backed store.

use image::{ImageFormat, Rgb, RgbImage};
use image_fanout::config::{HandlerConfig, ResolutionConfig};
use image_fanout::handler::Handler;
use image_fanout::imaging::RustBackend;
use image_fanout::status::check_status;
use image_fanout::store::{FileSystemStore, ObjectStore};
use std::io::Cursor;
use tempfile::TempDir;

fn small_config() -> HandlerConfig {
    HandlerConfig {
        output_bucket: Some("renditions".into()),
        resolutions: vec![
            ResolutionConfig {
                label: "medium".into(),
                width: 96,
                height: 54,
            },
            ResolutionConfig {
                label: "small".into(),
                width: 48,
                height: 27,
            },
        ],
        ..HandlerConfig::default()
    }
}

fn seed_png(store: &FileSystemStore, key: &str) {
    let img = RgbImage::from_fn(50, 50, |x, y| Rgb([x as u8 * 5, y as u8 * 5, 60]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    store
        .put("uploads", key, &buf.into_inner(), "image/png")
        .unwrap();
}

#[test]
fn notification_to_files_on_disk() {
    let tmp = TempDir::new().unwrap();
    let store = FileSystemStore::new(tmp.path());
    seed_png(&store, "albums/summer beach.png");
    let config = small_config();
    let profiles = config.profiles().unwrap();
    let handler = Handler::new(config, RustBackend::new(), &store);

    let event = r#"{"Records":[{"s3":{"bucket":{"name":"uploads"},
        "object":{"key":"albums/summer+beach.png"}}}]}"#;
    let result = handler.invoke(event, None);

    assert!(result.is_success(), "{result:?}");
    assert_eq!(
        result.keys,
        vec![
            "medium/summer beach.jpg",
            "medium/summer beach.webp",
            "small/summer beach.jpg",
            "small/summer beach.webp",
        ]
    );
    let jpg = tmp.path().join("renditions/medium/summer beach.jpg");
    let decoded = image::open(&jpg).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (96, 54));

    let meta = store.head("renditions", "small/summer beach.webp").unwrap();
    assert_eq!(meta.content_type, "image/webp");
    assert_eq!(meta.sha256.len(), 64);

    let report = check_status(
        &store,
        &profiles,
        "uploads",
        "renditions",
        "albums/summer beach.png",
    )
    .unwrap();
    assert!(report.original_exists);
    assert!(report.is_complete());
}

#[test]
fn missing_source_file_fails_without_output() {
    let tmp = TempDir::new().unwrap();
    let store = FileSystemStore::new(tmp.path());
    let handler = Handler::new(small_config(), RustBackend::new(), &store);

    let event = r#"{"Records":[{"s3":{"bucket":{"name":"uploads"},"object":{"key":"nope.png"}}}]}"#;
    let result = handler.invoke(event, None);

    assert_eq!(result.status_code, 500);
    assert!(result.body.contains("nope.png"), "{}", result.body);
    assert!(!tmp.path().join("renditions").exists());
}
