//! Property: every artifact has exactly its target's dimensions, whatever
//! the source size and aspect ratio.

use image::{ImageFormat, Rgb, RgbImage};
use image_fanout::imaging::{OutputFormat, Profiles, RustBackend, TargetSpec};
use image_fanout::process::{ProcessOptions, SourceImage, Transcoder};
use image_fanout::store::MemoryStore;
use proptest::prelude::*;
use std::io::Cursor;

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 7]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]
    #[test]
    fn prop_artifacts_match_target_dimensions(
        (src_w, src_h) in (1u32..64, 1u32..64),
        (dst_w, dst_h) in (1u32..48, 1u32..48),
    ) {
        let profiles = Profiles::new(
            vec![TargetSpec::new("t", dst_w, dst_h).unwrap()],
            vec![OutputFormat::jpeg(), OutputFormat::webp()],
        )
        .unwrap();
        let backend = RustBackend::new();
        let store = MemoryStore::new();
        let source = SourceImage::new("p.png", png(src_w, src_h));

        let artifacts = Transcoder::new(&backend, &store, &profiles, "out")
            .with_options(ProcessOptions { parallel: false, ..ProcessOptions::default() })
            .run(&source)
            .unwrap();

        prop_assert_eq!(artifacts.len(), 2);
        for artifact in &artifacts {
            prop_assert_eq!((artifact.width, artifact.height), (dst_w, dst_h));
            let body = store.object("out", &artifact.key).unwrap().body;
            let decoded = image::load_from_memory(&body).unwrap();
            prop_assert_eq!((decoded.width(), decoded.height()), (dst_w, dst_h));
        }
    }
}
