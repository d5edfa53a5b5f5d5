// src/lib.rs
// =============================================================================
// sitewarden: discover a site's pages, crawl them, and watch them drift.
//
// Modules, leaf first:
// - store: one-JSON-file-per-URL snapshots
// - cache: TTL-bounded document cache on top of the store
// - fetch: the swappable document backends
// - discovery: seed URL -> full same-site page set
// - crawl: URL set -> stream of extracted pages
// - monitor: change detection, translation sync, cache writes
// - config / telemetry: settings and log setup for the binary
// =============================================================================

pub mod cache;
pub mod config;
pub mod crawl;
pub mod discovery;
pub mod fetch;
pub mod monitor;
pub mod store;
pub mod telemetry;
