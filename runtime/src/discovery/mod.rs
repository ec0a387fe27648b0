//! API endpoint discovery: static script scanning and report aggregation.

pub mod bundle;
pub mod report;
pub mod scanner;

pub use report::{build_report, ApiDiscoveryReport, DiscoverySummary, NetworkApi};
pub use bundle::{fetch_and_scan, BundleScan};
pub use scanner::{scan_bundle, scan_page, scan_scripts};
