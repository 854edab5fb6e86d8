//! # image-fanout
//!
//! A reactive media-transcoding handler. When a new image lands in a bucket,
//! it is decoded once, resized to a fixed set of resolutions and encoded into
//! a fixed set of formats, and every artifact is written to an output bucket
//! under a deterministic key.
//!
//! # Architecture: One Source, One Matrix
//!
//! ```text
//! notification ─▶ handler ─▶ store.get ─▶ decode ─┬─ 1080p ─┬─ jpg ─▶ store.put
//!                                                 │         └─ webp ─▶ store.put
//!                                                 ├─ 720p  ─┬─ …
//!                                                 └─ 480p  ─┴─ …
//! ```
//!
//! With the standard profiles one invocation writes six artifacts:
//! `{1080p,720p,480p}/{name}.{jpg,webp}`. Reprocessing the same source writes
//! the same keys again, so redelivered notifications are harmless.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`handler`] | Invocation entry point: config checks, source read, result/status code |
//! | [`process`] | The transcode matrix: decode once, render per target, encode + publish per format |
//! | [`imaging`] | Profile types and the `ImageBackend` trait with its `image`/mozjpeg/webp implementation |
//! | [`store`] | `ObjectStore` trait with filesystem and in-memory implementations |
//! | [`event`] | Storage notification model and object-key decoding |
//! | [`naming`] | Source-name extraction and the artifact key scheme |
//! | [`config`] | `image-fanout.toml` loading, merging over stock defaults, validation |
//! | [`status`] | Which expected artifacts exist for a source |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Exact Dimensions
//!
//! Every target is produced at exactly its width and height, upscaling small
//! sources and distorting mismatched aspect ratios. Consumers can rely on a
//! `720p` artifact being 1280×720 without inspecting it.
//!
//! ## Explicit Profiles
//!
//! The resolution and format sets are an immutable [`imaging::Profiles`]
//! value built from config and passed into the pipeline, never globals.
//! Format names are parsed when the profiles are built, so an unsupported
//! format fails an invocation before any source is read.
//!
//! ## Narrow Capabilities
//!
//! The pipeline sees storage only through [`store::ObjectStore`] (`get`,
//! `put`) and pixels only through [`imaging::ImageBackend`] (`decode`,
//! `resize`, `encode`). Tests run the whole handler against a
//! [`store::MemoryStore`] and a recording mock backend.

pub mod config;
pub mod event;
pub mod handler;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod process;
pub mod status;
pub mod store;
