//! # imgfly
//!
//! An on-demand image transform service. Source images live in a bucket;
//! clients request them by key with an optional target size and output
//! format, and get back a resized, re-encoded image:
//!
//! ```text
//! GET /albums/cat.jpg?w=400&h=400&format=webp&quality=80
//! ```
//!
//! # Request Flow
//!
//! ```text
//! 1. Cache     full URL        →  cached response?      (hit: done)
//! 2. Bucket    path as key     →  source bytes          (miss: 404)
//! 3. Validate  query string    →  TransformRequest      (bad: 400)
//! 4. Plan      requested box   →  Pipeline              (empty: pass-through)
//! 5. Execute   Pipeline        →  ImageHandle           (fail: 415)
//! 6. Encode    format/quality  →  bytes                 (cached in background)
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`service`] | Request orchestration and status mapping; transport-agnostic |
//! | [`server`] | axum router, listener, wiring of production gateways |
//! | [`request`] | Query-string validation (`w`, `h`, `format`, `quality`) |
//! | [`imaging`] | Aspect resolution, pipeline language, executor, codecs, secondary fetch |
//! | [`store`] | Object store gateway; filesystem-backed bucket |
//! | [`cache`] | Response cache gateway; on-disk cache |
//! | [`config`] | `imgfly.toml` loading, env overrides, validation |
//! | [`output`] | CLI output formatting for `plan` and `check` |
//!
//! # Design Decisions
//!
//! ## Never Upscale
//!
//! A request that exceeds the source on either axis is answered with the
//! stored bytes unchanged. Upscaling only costs bandwidth and adds no detail;
//! clients that need a fixed box can scale on their side.
//!
//! ## Cover, Then Crop From The Top-Left
//!
//! When both dimensions are given and the aspect ratio differs, the image is
//! resized until it covers the box and then cropped at the origin. There is
//! no gravity or smart cropping.
//!
//! ## Pipelines As Text
//!
//! The resolver emits a [`imaging::Pipeline`], a list of stages with a
//! compact text form (`resize!800,400,1|crop!0,0,400,400`). The same syntax
//! is used in the config to append operator stages such as a watermark, and
//! in log lines, so what the service did to an image is always readable.
//!
//! ## Gateways Behind Traits
//!
//! The bucket ([`store::ObjectStore`]), the cache ([`cache::ResponseCache`]),
//! the image library ([`imaging::ImageBackend`]) and the secondary-image
//! fetcher ([`imaging::SecondaryFetcher`]) are all traits. Production wiring
//! lives in [`server::build_service`]; tests swap in mocks and in-memory
//! stores.

pub mod cache;
pub mod config;
pub mod imaging;
pub mod output;
pub mod request;
pub mod server;
pub mod service;
pub mod store;

#[cfg(test)]
pub(crate) mod test_helpers;
