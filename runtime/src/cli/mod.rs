//! Command-line surface for the `scout` binary.

pub mod crawl_cmd;
pub mod logging;
pub mod scan_bundle_cmd;
