// Copyright 2026 Scout Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scout runtime library: network-telemetry correlation and API discovery
//! for headless-browser crawls.
//!
//! A crawl observes every request a page makes, finalizes one record per
//! request, captures the bodies of API-like responses, scans page scripts
//! for endpoint literals, and folds both into a discovery report.

pub mod cli;
pub mod config;
pub mod crawl;
pub mod discovery;
pub mod error;
pub mod network;
pub mod renderer;

pub use config::CrawlOptions;
pub use crawl::{crawl, crawl_with, CrawlResult, Link};
pub use error::ScoutError;
