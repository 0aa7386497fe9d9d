// webgrazer CLI
//
// Adapts an operator request (seed URL argument + environment-configured
// tunables) into an engine run and prints the final report as JSON.

use std::str::FromStr;

use anyhow::{Context, Result, bail};
use log::info;

use webgrazer::config::{CrawlConfig, OperationMode};
use webgrazer::engine::{CrawlEngine, CrawlRequest, CrawlResponse, RequestedFormat};
use webgrazer::fetcher::ChromiumFetcherFactory;

fn usage() -> ! {
    eprintln!(
        "Usage: webgrazer <seed-url> [depth] [mode] [format]\n\
         \n\
         depth   0-10 (clamped to 5 by engine policy; default 2)\n\
         mode    CRAWL_ONLY | SCRAPE_ONLY | CRAWL_AND_SCRAPE (default)\n\
         format  JSON | MARKDOWN | SUMMARY | LINKS_ONLY | HTML (default JSON)\n\
         \n\
         All tunables are overridable via environment variables\n\
         (CRAWLER_*, CRAWL_*, RETRY_*, CIRCUIT_BREAKER_*)."
    );
    std::process::exit(2)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(seed_url) = args.first() else {
        usage();
    };
    if seed_url == "-h" || seed_url == "--help" {
        usage();
    }

    let depth = match args.get(1) {
        Some(raw) => raw
            .parse::<u32>()
            .with_context(|| format!("Invalid depth: {raw}"))?,
        None => 2,
    };
    let operation_mode = match args.get(2) {
        Some(raw) => OperationMode::from_str(raw)?,
        None => OperationMode::CrawlAndScrape,
    };
    let output_format = match args.get(3) {
        Some(raw) => RequestedFormat::from_str(raw)?,
        None => RequestedFormat::Json,
    };

    let request = CrawlRequest {
        seed_url: seed_url.clone(),
        include_subpages: depth > 0,
        depth,
        operation_mode,
        output_format,
        university_name: None,
        process_id: None,
    };

    let config = match request.into_config(CrawlConfig::from_env()) {
        Ok(config) => config,
        Err(e) => bail!("Invalid request: {e}"),
    };

    let engine = CrawlEngine::new(config)?;
    let factory = ChromiumFetcherFactory::new(engine.config().fetcher_options(engine.job_id()));

    // Ctrl-C triggers cooperative cancellation; in-flight pages finish
    let cancel = engine.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling crawl");
            cancel.cancel();
        }
    });

    let report = engine.run(&factory).await?;
    let response = CrawlResponse::from(&report);
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
