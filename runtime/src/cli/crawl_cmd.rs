//! `scout <url> [options-json]`: crawl one page and print the result.

use crate::config::CrawlOptions;
use crate::crawl::{crawl, CrawlResult};
use anyhow::{Context, Result};

/// Parse options, crawl, and print the result as pretty JSON on stdout.
pub async fn run(url: &str, options_json: Option<&str>) -> Result<()> {
    let options = CrawlOptions::from_json(options_json)?;
    tracing::debug!(?options, "crawl options");

    let result = crawl(url, &options).await?;
    println!("{}", render(&result)?);
    Ok(())
}

/// Pretty JSON with two-space indentation.
pub fn render(result: &CrawlResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize crawl result")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_is_pretty_json() {
        let result = CrawlResult {
            url: "https://example.com/".to_string(),
            title: "Example".to_string(),
            text: None,
            links: None,
            network_requests: None,
            api_discovery: None,
            screenshot_path: None,
            js_result: None,
        };
        let out = render(&result).unwrap();
        assert_eq!(
            out,
            "{\n  \"url\": \"https://example.com/\",\n  \"title\": \"Example\"\n}"
        );
    }

    #[test]
    fn test_malformed_options_are_reported() {
        let err = tokio_test::block_on(run("https://example.com", Some("{oops"))).unwrap_err();
        assert!(format!("{err:#}").starts_with("invalid options:"));
    }
}
