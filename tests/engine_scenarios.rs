//! End-to-end engine scenarios driven by a scripted mock fetcher
//!
//! The fetcher is an injected capability, so these tests exercise the whole
//! pipeline (queue, politeness, retries, change detection, writer) without a
//! browser: the mock serves canned HTML and scripted status sequences.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use webgrazer::config::{CrawlConfig, OperationMode};
use webgrazer::engine::CrawlEngine;
use webgrazer::fetcher::{
    FetchError, FetchedPage, FetcherFactory, NavigateOptions, PageFetcher,
};
use webgrazer::scrape::ScrapedContent;

/// One scripted page on the mock site
struct MockPage {
    /// Statuses returned per visit; the last one repeats
    statuses: VecDeque<u16>,
    html: String,
    etag: Option<String>,
}

/// Scripted site shared by every mock fetcher context
#[derive(Default)]
struct MockSite {
    pages: Mutex<HashMap<String, MockPage>>,
    hits: Mutex<HashMap<String, usize>>,
}

impl MockSite {
    fn add_page(&self, url: &str, html: &str) {
        self.add_page_full(url, html, vec![200], None);
    }

    fn add_page_full(&self, url: &str, html: &str, statuses: Vec<u16>, etag: Option<&str>) {
        self.pages.lock().insert(
            url.to_string(),
            MockPage {
                statuses: statuses.into_iter().collect(),
                html: html.to_string(),
                etag: etag.map(str::to_string),
            },
        );
    }

    fn hits(&self, url: &str) -> usize {
        self.hits.lock().get(url).copied().unwrap_or(0)
    }
}

struct MockFetcher {
    site: Arc<MockSite>,
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn navigate(&self, url: &str, _opts: &NavigateOptions) -> Result<FetchedPage, FetchError> {
        *self.site.hits.lock().entry(url.to_string()).or_insert(0) += 1;

        let mut pages = self.site.pages.lock();
        let Some(page) = pages.get_mut(url) else {
            return Ok(FetchedPage {
                status_code: 404,
                content_type: Some("text/html".to_string()),
                etag: None,
                last_modified: None,
                final_url: url.to_string(),
                html: "<html><body>not found</body></html>".to_string(),
                dom: None,
                fetch_duration: Duration::from_millis(2),
            });
        };

        let status = if page.statuses.len() > 1 {
            page.statuses.pop_front().unwrap_or(200)
        } else {
            page.statuses.front().copied().unwrap_or(200)
        };

        Ok(FetchedPage {
            status_code: status,
            content_type: Some("text/html".to_string()),
            etag: page.etag.clone(),
            last_modified: None,
            final_url: url.to_string(),
            html: page.html.clone(),
            dom: None,
            fetch_duration: Duration::from_millis(5),
        })
    }

    async fn close(&self) -> Result<(), FetchError> {
        Ok(())
    }
}

struct MockFactory {
    site: Arc<MockSite>,
}

#[async_trait]
impl FetcherFactory for MockFactory {
    async fn create(&self) -> anyhow::Result<Arc<dyn PageFetcher>> {
        Ok(Arc::new(MockFetcher {
            site: Arc::clone(&self.site),
        }))
    }
}

/// Base configuration: fast delays, no robots fetch, temp directories
fn test_config(seed: &str, dirs: &tempfile::TempDir) -> CrawlConfig {
    let mut config = CrawlConfig::default();
    config.seed_url = seed.to_string();
    config.politeness.respect_robots = false;
    config.politeness.delay_ms = 1;
    config.politeness.min_delay_ms = 1;
    config.discovery_concurrency = 2;
    config.pages_per_worker = 2;
    config.resilience.retry_initial_delay_ms = 20;
    config.resilience.retry_jitter = 0.0;
    config.results_dir = dirs.path().join("results");
    config.fingerprint_dir = dirs.path().join("fingerprints");
    config.storage_dir = dirs.path().join("storage");
    config
}

fn read_jsonl_records(path: &std::path::Path) -> Vec<ScrapedContent> {
    let contents = std::fs::read_to_string(path).expect("output file readable");
    contents
        .lines()
        .map(|line| serde_json::from_str(line).expect("every line is a valid record"))
        .collect()
}

#[tokio::test]
async fn single_page_crawl_without_subpages() {
    let dirs = tempfile::tempdir().expect("tempdir");
    let site = Arc::new(MockSite::default());
    site.add_page(
        "https://site.test/",
        "<html><head><title>Home</title></head><body><main>\
         <h1>Welcome home</h1><p>The only page in this crawl links elsewhere.</p>\
         <a href=\"/other\">Other</a></main></body></html>",
    );

    let mut config = test_config("https://site.test/", &dirs);
    config.include_subpages = false;

    let engine = CrawlEngine::new(config).expect("engine");
    let report = engine
        .run(&MockFactory {
            site: Arc::clone(&site),
        })
        .await
        .expect("crawl succeeds");

    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.total_results, 1);
    // The linked page was never enqueued, let alone fetched
    assert_eq!(site.hits("https://site.test/other"), 0);

    let records = read_jsonl_records(&report.output_path);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].url, "https://site.test/");
    assert_eq!(records[0].metadata.depth, 0);
    assert_eq!(records[0].metadata.parent_url, None);
    assert_eq!(records[0].title, "Home");

    let discovered = engine.discovered_urls();
    assert_eq!(discovered.len(), 1);
    assert_eq!(discovered[0].link_type, webgrazer::engine::LinkType::Internal);
    assert_eq!(discovered[0].status_code, Some(200));
    assert!(discovered[0].skip_reason.is_none());
}

#[tokio::test]
async fn two_level_crawl_rejects_duplicate_links() {
    let dirs = tempfile::tempdir().expect("tempdir");
    let site = Arc::new(MockSite::default());
    site.add_page(
        "https://site.test/",
        "<html><body><main><h1>Hub</h1>\
         <a href=\"/a\">A</a><a href=\"/b\">B</a></main></body></html>",
    );
    site.add_page(
        "https://site.test/a",
        "<html><body><main><p>Page A links back.</p><a href=\"/\">Home</a></main></body></html>",
    );
    site.add_page(
        "https://site.test/b",
        "<html><body><main><p>Page B links back.</p><a href=\"/\">Home</a></main></body></html>",
    );

    let mut config = test_config("https://site.test/", &dirs);
    config.max_depth = 2;

    let engine = CrawlEngine::new(config).expect("engine");
    let report = engine
        .run(&MockFactory {
            site: Arc::clone(&site),
        })
        .await
        .expect("crawl succeeds");

    assert_eq!(report.processed, 3);
    assert_eq!(report.total_results, 3);

    let records = read_jsonl_records(&report.output_path);
    let mut urls: Vec<&str> = records.iter().map(|r| r.url.as_str()).collect();
    urls.sort_unstable();
    assert_eq!(
        urls,
        vec!["https://site.test/", "https://site.test/a", "https://site.test/b"]
    );

    // Both back-links to the seed were rejected as duplicates
    assert!(engine.health().queue.duplicates >= 2);
    // Each page was fetched exactly once
    assert_eq!(site.hits("https://site.test/"), 1);
    assert_eq!(site.hits("https://site.test/a"), 1);
    assert_eq!(site.hits("https://site.test/b"), 1);
}

#[tokio::test]
async fn robots_disallow_blocks_fetch() {
    let mut server = mockito::Server::new_async().await;
    let robots = server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body("User-agent: *\nDisallow: /private\n")
        .expect_at_least(1)
        .create_async()
        .await;

    let base = server.url();
    let dirs = tempfile::tempdir().expect("tempdir");
    let site = Arc::new(MockSite::default());
    site.add_page(
        &format!("{base}/"),
        "<html><body><main><h1>Hub</h1>\
         <a href=\"/private/x\">Secret</a><a href=\"/public\">Public</a></main></body></html>",
    );
    site.add_page(
        &format!("{base}/private/x"),
        "<html><body><main>should never be fetched</main></body></html>",
    );
    site.add_page(
        &format!("{base}/public"),
        "<html><body><main><p>Open content.</p></main></body></html>",
    );

    let mut config = test_config(&format!("{base}/"), &dirs);
    config.politeness.respect_robots = true;
    config.max_depth = 1;

    let engine = CrawlEngine::new(config).expect("engine");
    let report = engine
        .run(&MockFactory {
            site: Arc::clone(&site),
        })
        .await
        .expect("crawl succeeds");

    robots.assert_async().await;
    assert_eq!(site.hits(&format!("{base}/private/x")), 0);
    assert!(report.skipped >= 1);
    assert_eq!(report.processed, 2);
    assert!(engine.health().rate_limiter.blocked_requests >= 1);
}

#[tokio::test]
async fn transient_503_recovers_on_third_attempt() {
    let dirs = tempfile::tempdir().expect("tempdir");
    let site = Arc::new(MockSite::default());
    site.add_page_full(
        "https://site.test/",
        "<html><body><main><p>finally up</p></main></body></html>",
        vec![503, 503, 200],
        None,
    );

    let mut config = test_config("https://site.test/", &dirs);
    config.include_subpages = false;
    config.resilience.max_retries = 2;

    let engine = CrawlEngine::new(config).expect("engine");
    let report = engine
        .run(&MockFactory {
            site: Arc::clone(&site),
        })
        .await
        .expect("crawl succeeds");

    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(site.hits("https://site.test/"), 3);

    let retry_stats = engine.health().retry;
    assert_eq!(retry_stats.successful_retries, 1);
    assert_eq!(retry_stats.total_attempts, 3);
}

#[tokio::test]
async fn permanent_404_fails_without_retry() {
    let dirs = tempfile::tempdir().expect("tempdir");
    let site = Arc::new(MockSite::default());
    site.add_page(
        "https://site.test/",
        "<html><body><main><a href=\"/missing\">gone</a><p>hub page</p></main></body></html>",
    );

    let mut config = test_config("https://site.test/", &dirs);
    config.max_depth = 1;

    let engine = CrawlEngine::new(config).expect("engine");
    let report = engine
        .run(&MockFactory {
            site: Arc::clone(&site),
        })
        .await
        .expect("crawl succeeds");

    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 1);
    // Permanent 4xx is fetched exactly once
    assert_eq!(site.hits("https://site.test/missing"), 1);
    assert_eq!(engine.health().retry.permanent_failures, 1);
}

#[tokio::test]
async fn unchanged_pages_are_not_re_emitted() {
    let dirs = tempfile::tempdir().expect("tempdir");
    let site = Arc::new(MockSite::default());
    for (path, title) in [("/", "Hub"), ("/a", "A"), ("/b", "B")] {
        let links = if path == "/" {
            "<a href=\"/a\">A</a><a href=\"/b\">B</a>"
        } else {
            ""
        };
        site.add_page_full(
            &format!("https://site.test{path}"),
            &format!(
                "<html><head><title>{title}</title></head><body><main>\
                 <h1>{title}</h1><p>Stable content body.</p>{links}</main></body></html>"
            ),
            vec![200],
            Some(&format!("\"etag-{title}\"")),
        );
    }

    let first = {
        let mut config = test_config("https://site.test/", &dirs);
        config.max_depth = 1;
        let engine = CrawlEngine::new(config).expect("engine");
        engine
            .run(&MockFactory {
                site: Arc::clone(&site),
            })
            .await
            .expect("first run succeeds")
    };
    assert_eq!(first.processed, 3);
    assert_eq!(first.unchanged, 0);

    let second = {
        let mut config = test_config("https://site.test/", &dirs);
        config.max_depth = 1;
        let engine = CrawlEngine::new(config).expect("engine");
        engine
            .run(&MockFactory {
                site: Arc::clone(&site),
            })
            .await
            .expect("second run succeeds")
    };

    assert!(second.unchanged >= first.processed - first.failed);
    assert_eq!(second.processed, 0);
    // Unchanged URLs are not re-emitted, and the writer still closes cleanly
    assert_eq!(second.total_results, second.processed);
    let records = read_jsonl_records(&second.output_path);
    assert!(records.is_empty());
}

#[tokio::test]
async fn crawl_only_mode_emits_records_without_bodies() {
    let dirs = tempfile::tempdir().expect("tempdir");
    let site = Arc::new(MockSite::default());
    site.add_page(
        "https://site.test/",
        "<html><body><main><h1>Hub</h1><p>body text</p><a href=\"/a\">A</a></main></body></html>",
    );
    site.add_page(
        "https://site.test/a",
        "<html><body><main><p>child body</p></main></body></html>",
    );

    let mut config = test_config("https://site.test/", &dirs);
    config.max_depth = 1;
    config.operation_mode = OperationMode::CrawlOnly;

    let engine = CrawlEngine::new(config).expect("engine");
    let report = engine
        .run(&MockFactory {
            site: Arc::clone(&site),
        })
        .await
        .expect("crawl succeeds");

    assert_eq!(report.processed, 2);
    let records = read_jsonl_records(&report.output_path);
    assert_eq!(records.len(), 2);
    for record in &records {
        assert!(record.body_text.is_empty());
        assert!(record.cleaned_html.is_empty());
    }
    // Discovery still worked: the hub record carries its outbound link
    let hub = records
        .iter()
        .find(|r| r.url == "https://site.test/")
        .expect("hub record");
    assert_eq!(hub.links, vec!["https://site.test/a".to_string()]);
}

#[tokio::test]
async fn invalid_seed_fails_the_run() {
    let dirs = tempfile::tempdir().expect("tempdir");
    let site = Arc::new(MockSite::default());

    let config = test_config("not a url at all", &dirs);
    let engine = CrawlEngine::new(config).expect("engine");
    let result = engine
        .run(&MockFactory {
            site: Arc::clone(&site),
        })
        .await;

    assert!(matches!(
        result,
        Err(webgrazer::engine::CrawlError::InvalidSeed(_))
    ));
}

#[tokio::test]
async fn cancellation_stops_dispatch_and_closes_cleanly() {
    let dirs = tempfile::tempdir().expect("tempdir");
    let site = Arc::new(MockSite::default());
    site.add_page(
        "https://site.test/",
        "<html><body><main><p>page</p><a href=\"/a\">A</a></main></body></html>",
    );
    site.add_page(
        "https://site.test/a",
        "<html><body><main><p>child</p></main></body></html>",
    );

    let mut config = test_config("https://site.test/", &dirs);
    config.max_depth = 3;

    let engine = CrawlEngine::new(config).expect("engine");
    // Cancel before the run starts: nothing is dispatched, teardown still
    // produces a complete (empty) output file
    engine.cancel_token().cancel();
    let report = engine
        .run(&MockFactory {
            site: Arc::clone(&site),
        })
        .await
        .expect("cancelled run still reports");

    assert_eq!(report.processed, 0);
    assert_eq!(report.total_results, 0);
    assert!(report.output_path.exists());
}
