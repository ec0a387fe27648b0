//! Static endpoint scanning of the rendered page's script text.
//!
//! The page is asked for the `textContent` of every `<script>` element
//! (inline scripts, plus whatever text an external script element carries).
//! External sources are not re-fetched; their URLs surface separately as
//! loaded script resources. Each script is then matched against a fixed,
//! ordered list of pattern families and every captured literal goes into
//! one deduplicating set.
//!
//! A fetched bundle is scanned with a wider list: the page patterns plus
//! object-key and relative `.json` families, which are too noisy for inline
//! scripts. Static asset paths are dropped from bundle results.

use crate::renderer::RenderContext;
use anyhow::{Context, Result};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

/// In-page collection of script texts, skipping empty ones.
const COLLECT_SCRIPTS_JS: &str = r#"
(() => Array.from(document.querySelectorAll('script'))
    .map(s => s.textContent || '')
    .filter(t => t.length > 0))()
"#;

/// Which kind of literal a pattern looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PatternFamily {
    /// `/api/...`
    ApiPath,
    /// `/v1/...`, `/v2/...`
    VersionedPath,
    /// `/graphql...`
    GraphQlPath,
    /// `/rest/...`
    RestPath,
    /// `/data/...`, `/ajax/...`, `/rpc/...`
    GenericDataPath,
    /// `/wp-json/...`, `/_next/data/...`
    FrameworkDataPath,
    /// `https://host/.../api/...`
    AbsoluteApiUrl,
    /// `https://host/....json`
    AbsoluteJsonUrl,
    /// First string argument of `fetch(`, `axios.x(`, `.open(`, `.get(`, ...
    CallSite,
    /// `url: "/..."` and `action: "/..."` object keys (bundles only)
    ConfigKey,
    /// Any quoted `.json` path, relative or absolute (bundles only)
    RelativeJson,
}

/// One compiled pattern; capture group 1 is the endpoint.
pub struct EndpointPattern {
    pub family: PatternFamily,
    pub regex: Regex,
}

const PATTERN_SOURCES: &[(PatternFamily, &str)] = &[
    (PatternFamily::ApiPath, r#"["'`](/api/[^"'`\s]{2,})["'`]"#),
    (PatternFamily::VersionedPath, r#"["'`](/v[0-9]+/[^"'`\s]{2,})["'`]"#),
    (PatternFamily::GraphQlPath, r#"["'`](/graphql[^"'`\s]*)["'`]"#),
    (PatternFamily::RestPath, r#"["'`](/rest/[^"'`\s]{2,})["'`]"#),
    (PatternFamily::GenericDataPath, r#"["'`](/data/[^"'`\s]{2,})["'`]"#),
    (PatternFamily::GenericDataPath, r#"["'`](/ajax/[^"'`\s]{2,})["'`]"#),
    (PatternFamily::GenericDataPath, r#"["'`](/rpc/[^"'`\s]{2,})["'`]"#),
    (PatternFamily::FrameworkDataPath, r#"["'`](/wp-json/[^"'`\s]{2,})["'`]"#),
    (PatternFamily::FrameworkDataPath, r#"["'`](/_next/data/[^"'`\s]{2,})["'`]"#),
    (
        PatternFamily::AbsoluteApiUrl,
        r#"["'`](https?://[^"'`\s]*/api/[^"'`\s]{2,})["'`]"#,
    ),
    (
        PatternFamily::AbsoluteJsonUrl,
        r#"["'`](https?://[^"'`\s]*\.json[^"'`\s]*)["'`]"#,
    ),
    (PatternFamily::CallSite, r#"fetch\s*\(\s*["'`]([^"'`\s]+)["'`]"#),
    (PatternFamily::CallSite, r#"axios\.\w+\s*\(\s*["'`]([^"'`\s]+)["'`]"#),
    (
        PatternFamily::CallSite,
        r#"\.open\s*\(\s*["'`]\w+["'`]\s*,\s*["'`]([^"'`\s]+)["'`]"#,
    ),
    (PatternFamily::CallSite, r#"\.get\s*\(\s*["'`](/[^"'`\s]+)["'`]"#),
    (PatternFamily::CallSite, r#"\.post\s*\(\s*["'`](/[^"'`\s]+)["'`]"#),
    (PatternFamily::CallSite, r#"\.put\s*\(\s*["'`](/[^"'`\s]+)["'`]"#),
    (PatternFamily::CallSite, r#"\.delete\s*\(\s*["'`](/[^"'`\s]+)["'`]"#),
];

/// Extra families applied to fetched bundles, after the page patterns.
const BUNDLE_PATTERN_SOURCES: &[(PatternFamily, &str)] = &[
    (
        PatternFamily::CallSite,
        r#"\.ajax\s*\(\s*\{[^}]*url\s*:\s*["'`]([^"'`\s]+)["'`]"#,
    ),
    (
        PatternFamily::RelativeJson,
        r#"["'`]([^"'`\s]*\.json(?:\?[^"'`\s]*)?)["'`]"#,
    ),
    (PatternFamily::ConfigKey, r#"url\s*:\s*["'`](/[^"'`\s]+)["'`]"#),
    (PatternFamily::ConfigKey, r#"action\s*:\s*["'`](/[^"'`\s]+)["'`]"#),
];

fn compile(sources: &[(PatternFamily, &str)]) -> Vec<EndpointPattern> {
    sources
        .iter()
        .map(|(family, source)| EndpointPattern {
            family: *family,
            regex: Regex::new(source).expect("endpoint pattern is valid"),
        })
        .collect()
}

/// The ordered pattern list for page scripts, compiled once.
pub fn patterns() -> &'static [EndpointPattern] {
    static PATTERNS: OnceLock<Vec<EndpointPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| compile(PATTERN_SOURCES))
}

/// Page patterns followed by the bundle-only families, compiled once.
pub fn bundle_patterns() -> &'static [EndpointPattern] {
    static PATTERNS: OnceLock<Vec<EndpointPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let mut all = compile(PATTERN_SOURCES);
        all.extend(compile(BUNDLE_PATTERN_SOURCES));
        all
    })
}

fn static_asset_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\.(css|png|jpg|gif|svg|woff|ttf|ico|eot)$")
            .expect("static asset regex is valid")
    })
}

/// Whether a literal names a stylesheet, image, or font rather than an endpoint.
pub fn is_static_asset(endpoint: &str) -> bool {
    static_asset_regex().is_match(endpoint)
}

/// Endpoints found by one scan, plus how many matches each family produced.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub endpoints: BTreeSet<String>,
    pub hits: BTreeMap<PatternFamily, usize>,
}

impl ScanOutcome {
    fn log_hits(&self, what: &str) {
        for (family, hits) in &self.hits {
            tracing::debug!(?family, hits, "{what}: pattern family matches");
        }
    }
}

fn scan_with<I, S>(
    patterns: &[EndpointPattern],
    texts: I,
    keep: impl Fn(&str) -> bool,
) -> ScanOutcome
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut outcome = ScanOutcome::default();
    for text in texts {
        let text = text.as_ref();
        if text.is_empty() {
            continue;
        }
        for pattern in patterns {
            for caps in pattern.regex.captures_iter(text) {
                let Some(endpoint) = caps.get(1).map(|m| m.as_str()) else {
                    continue;
                };
                if !keep(endpoint) {
                    continue;
                }
                *outcome.hits.entry(pattern.family).or_default() += 1;
                outcome.endpoints.insert(endpoint.to_string());
            }
        }
    }
    outcome
}

/// Scan script texts and return the deduplicated endpoint literals.
///
/// Every pattern runs over the full text of every script, so the same
/// literal found twice (by two patterns, or in two scripts) appears once.
pub fn scan_scripts<I, S>(scripts: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    scan_with(patterns(), scripts, |_| true).endpoints
}

/// Scan one fetched script bundle with the wider bundle pattern list,
/// dropping static asset paths.
pub fn scan_bundle(text: &str) -> ScanOutcome {
    let outcome = scan_with(bundle_patterns(), [text], |endpoint| {
        !is_static_asset(endpoint)
    });
    outcome.log_hits("bundle");
    outcome
}

/// Collect script texts from the live page and scan them.
pub async fn scan_page(context: &dyn RenderContext) -> Result<BTreeSet<String>> {
    let value = context
        .execute_js(COLLECT_SCRIPTS_JS)
        .await
        .context("failed to collect page scripts")?;
    let scripts: Vec<String> =
        serde_json::from_value(value).context("page scripts were not a list of strings")?;
    let outcome = scan_with(patterns(), &scripts, |_| true);
    outcome.log_hits("page scripts");
    tracing::debug!(
        scripts = scripts.len(),
        endpoints = outcome.endpoints.len(),
        "scanned page scripts"
    );
    Ok(outcome.endpoints)
}
