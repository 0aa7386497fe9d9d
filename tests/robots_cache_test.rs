//! robots.txt cache behavior against a mock HTTP server

use std::sync::Arc;

use webgrazer::robots::{RobotsConfig, RobotsPolicyCache};

fn config_for(user_agent: &str) -> RobotsConfig {
    RobotsConfig {
        respect_robots: true,
        user_agent: user_agent.to_string(),
        timeout_secs: 5,
        cache_ttl_secs: 3600,
        default_delay_ms: 500,
        min_delay_ms: 100,
        max_delay_ms: 10_000,
    }
}

#[tokio::test]
async fn fetches_parses_and_caches_rules() {
    let mut server = mockito::Server::new_async().await;
    let robots = server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body("User-agent: *\nDisallow: /admin\nAllow: /admin/help\nCrawl-delay: 2\n")
        .expect(1)
        .create_async()
        .await;

    let cache =
        RobotsPolicyCache::new(config_for("webgrazer/0.4")).expect("client builds");
    let base = server.url();

    assert!(!cache.is_allowed(&format!("{base}/admin/users")).await);
    assert!(cache.is_allowed(&format!("{base}/admin/help/faq")).await);
    assert!(cache.is_allowed(&format!("{base}/open")).await);
    assert_eq!(cache.crawl_delay_ms(&format!("{base}/open")).await, 2000);

    // All four queries above hit the cache after one fetch
    robots.assert_async().await;
    assert_eq!(cache.cached_host_count(), 1);
}

#[tokio::test]
async fn missing_robots_allows_everything() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/robots.txt")
        .with_status(404)
        .create_async()
        .await;

    let cache =
        RobotsPolicyCache::new(config_for("webgrazer/0.4")).expect("client builds");
    let base = server.url();

    assert!(cache.is_allowed(&format!("{base}/anything")).await);
    // No crawl-delay declared, so the default applies
    assert_eq!(cache.crawl_delay_ms(&format!("{base}/x")).await, 500);
}

#[tokio::test]
async fn crawl_delay_is_clamped_to_bounds() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body("User-agent: *\nCrawl-delay: 600\n")
        .create_async()
        .await;

    let cache =
        RobotsPolicyCache::new(config_for("webgrazer/0.4")).expect("client builds");
    let base = server.url();

    // 600s would be 600_000ms; the configured ceiling wins
    assert_eq!(cache.crawl_delay_ms(&format!("{base}/")).await, 10_000);
}

#[tokio::test]
async fn agent_specific_section_applies() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body(
            "User-agent: othercrawler\nDisallow: /\n\n\
             User-agent: webgrazer\nDisallow: /internal\n",
        )
        .create_async()
        .await;

    let cache = RobotsPolicyCache::new(config_for("webgrazer/0.4 (+https://webgrazer.dev/bot)"))
        .expect("client builds");
    let base = server.url();

    // The blanket ban in the other agent's section does not apply to us
    assert!(cache.is_allowed(&format!("{base}/public")).await);
    assert!(!cache.is_allowed(&format!("{base}/internal/docs")).await);
}

#[tokio::test]
async fn wildcard_and_anchor_patterns() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body("User-agent: *\nDisallow: /*.php$\nDisallow: /search*results\n")
        .create_async()
        .await;

    let cache =
        RobotsPolicyCache::new(config_for("webgrazer/0.4")).expect("client builds");
    let base = server.url();

    assert!(!cache.is_allowed(&format!("{base}/index.php")).await);
    assert!(cache.is_allowed(&format!("{base}/index.php?q=1")).await);
    assert!(!cache.is_allowed(&format!("{base}/search-all-results")).await);
    assert!(cache.is_allowed(&format!("{base}/searching")).await);
}

#[tokio::test]
async fn shared_cache_across_concurrent_checks() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body("User-agent: *\nDisallow: /private\n")
        .create_async()
        .await;

    let cache = Arc::new(
        RobotsPolicyCache::new(config_for("webgrazer/0.4")).expect("client builds"),
    );
    let base = server.url();

    let checks = (0..8).map(|i| {
        let cache = Arc::clone(&cache);
        let url = format!("{base}/page/{i}");
        tokio::spawn(async move { cache.is_allowed(&url).await })
    });
    for check in checks {
        assert!(check.await.expect("task completes"));
    }
    assert_eq!(cache.cached_host_count(), 1);
}
