//! `scout scan-bundle <js-url>`: fetch one script bundle and list its endpoints.

use crate::discovery::bundle::{fetch_and_scan, BundleScan};
use anyhow::{Context, Result};
use std::time::Duration;

/// Fetch, scan, and print the result as pretty JSON on stdout.
pub async fn run(url: &str, timeout_ms: u64) -> Result<()> {
    let scan = fetch_and_scan(url, Duration::from_millis(timeout_ms)).await?;
    println!("{}", render(&scan)?);
    Ok(())
}

pub fn render(scan: &BundleScan) -> Result<String> {
    serde_json::to_string_pretty(scan).context("failed to serialize bundle scan")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_is_pretty_json() {
        let scan = BundleScan {
            url: "https://cdn.example.com/app.js".to_string(),
            size_bytes: 42,
            endpoints: vec!["/api/a".to_string()],
        };
        assert_eq!(
            render(&scan).unwrap(),
            "{\n  \"url\": \"https://cdn.example.com/app.js\",\n  \"sizeBytes\": 42,\n  \"endpoints\": [\n    \"/api/a\"\n  ]\n}"
        );
    }

    #[test]
    fn test_invalid_url_is_reported() {
        let err = tokio_test::block_on(run("::nope::", 1000)).unwrap_err();
        assert!(format!("{err:#}").starts_with("invalid options:"));
    }
}
