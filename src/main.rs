// src/main.rs
// =============================================================================
// This is the entry point of the sitewarden CLI.
//
// What happens here:
// 1. Parse command-line arguments and load layered settings
// 2. Dispatch to the subcommand handler
// 3. Print a human-readable report (or JSON with --json)
// 4. Exit with a proper code:
//    0 = all pages ok, nothing serious found
//    1 = failed pages, an interrupted crawl, or high-severity findings
//    2 = internal error
//
// Ctrl-C during a crawl is the caller-disconnect signal: dispatch stops,
// in-flight pages finish, and the report covers what was processed.
// =============================================================================

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, CommonArgs, SelectorKind};
use sitewarden::cache::CacheStore;
use sitewarden::config::Settings;
use sitewarden::crawl::{CrawlEvent, CrawlOptions, FailedPage, Orchestrator};
use sitewarden::discovery::Discoverer;
use sitewarden::fetch::{build_fetcher, Fetcher, SelectorMode, TargetSelector};
use sitewarden::monitor::{
    LanguageSyncReport, Monitor, MonitoringStats, ProcessingResult, Severity,
};
use sitewarden::telemetry;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    telemetry::init();

    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    let settings = Settings::new()?;

    match cli.command {
        Commands::Discover { url, max_depth, common } => {
            handle_discover(&settings, &url, max_depth, &common).await
        }
        Commands::Crawl {
            url,
            max_depth,
            max_pages,
            concurrency,
            selector,
            selector_kind,
            element,
            common,
        } => {
            let mode = if element {
                SelectorMode::Element
            } else {
                SelectorMode::Content
            };
            let target = match selector {
                Some(value) => Some(
                    TargetSelector::from_kind(selector_kind.as_str(), &value, mode)
                        .ok_or_else(|| anyhow::anyhow!("empty --selector"))?,
                ),
                None => None,
            };
            let request = CrawlRequest {
                url,
                max_depth,
                max_pages,
                concurrency,
                target,
            };
            handle_crawl(&settings, request, &common).await
        }
        Commands::Sweep { json } => handle_sweep(&settings, json).await,
    }
}

struct CrawlRequest {
    url: String,
    max_depth: usize,
    max_pages: usize,
    concurrency: Option<usize>,
    target: Option<TargetSelector>,
}

fn fetcher_for(settings: &Settings, common: &CommonArgs) -> Result<Arc<dyn Fetcher>> {
    let backend = common.backend.unwrap_or(settings.crawler.backend);
    Ok(build_fetcher(backend, settings.collector_config())?)
}

// Handles the 'discover' subcommand
async fn handle_discover(
    settings: &Settings,
    url: &str,
    max_depth: usize,
    common: &CommonArgs,
) -> Result<i32> {
    let fetcher = fetcher_for(settings, common)?;
    if !common.json {
        println!("🔍 Discovering pages from: {}", url);
    }

    let discovered = Discoverer::new(fetcher).discover(url, max_depth).await?;

    if common.json {
        println!("{}", serde_json::to_string_pretty(&discovered)?);
    } else {
        println!("{:<70} {:<30}", "URL", "SOURCE");
        println!("{}", "=".repeat(100));
        for item in &discovered {
            println!("{:<70} {:<30}", truncate(item.url.as_str(), 67), item.provenance.to_string());
        }
        println!();
        println!("📄 Discovered {} page(s)", discovered.len());
    }
    Ok(0)
}

// Handles the 'crawl' subcommand
async fn handle_crawl(settings: &Settings, request: CrawlRequest, common: &CommonArgs) -> Result<i32> {
    let json = common.json;
    let fetcher = fetcher_for(settings, common)?;

    if !json {
        println!("🔍 Discovering pages from: {}", request.url);
    }
    let discovered = Discoverer::new(fetcher.clone())
        .discover(&request.url, request.max_depth)
        .await?;
    if !json {
        println!("📄 Discovered {} page(s)", discovered.len());
    }

    let monitor = Monitor::new(&settings.site_name, settings.monitor_config());

    let mut limits = settings.crawl_limits();
    if let Some(concurrency) = request.concurrency {
        limits.max_concurrent = concurrency.max(1);
    }
    let mut orchestrator = Orchestrator::new(fetcher, limits);
    if let Some(cache) = monitor.cache() {
        orchestrator = orchestrator.with_cache(cache);
    }

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping crawl");
                cancel.cancel();
            }
        })
    };

    let urls = discovered.iter().map(|d| d.url.to_string()).collect();
    let options = CrawlOptions {
        max_pages: request.max_pages,
        target: request.target,
        // A cached body would hide drift from the change detector.
        read_cache: !settings.monitoring.change_detection,
    };
    let mut run = orchestrator.run(urls, options, cancel);

    if !json {
        println!("\n🌐 Crawling...\n");
    }

    let mut results: Vec<ProcessingResult> = Vec::new();
    let mut failures: Vec<FailedPage> = Vec::new();
    while let Some(event) = run.events.next().await {
        match event {
            CrawlEvent::Page(page) => {
                let result = monitor.process_page(&page).await;
                if !json {
                    print_page_line(&page.url, page.word_count(), &result);
                }
                results.push(result);
            }
            CrawlEvent::Failed(failed) => {
                if !json {
                    println!(
                        "❌ {} ({} after {} attempt(s))",
                        failed.url, failed.error, failed.attempts
                    );
                }
                failures.push(failed);
            }
            CrawlEvent::Complete { processed, total } => {
                if !json {
                    println!("\n🏁 Crawl complete: {}/{} processed", processed, total);
                }
            }
        }
    }

    let summary = run.finished.await?;
    ctrl_c.abort();

    let stats = monitor.get_stats().await;
    let report = monitor.analyze_language_sync();
    let alerts_sent = match monitor.send_alerts().await {
        Ok(sent) => sent,
        Err(e) => {
            tracing::warn!(error = %e, "alert delivery failed, changes kept for next flush");
            0
        }
    };

    if json {
        let output = serde_json::json!({
            "discovered": discovered.len(),
            "summary": summary,
            "pages": results,
            "failures": failures,
            "stats": stats,
            "language_sync": report,
            "alerts_sent": alerts_sent,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!();
        println!("📊 Summary:");
        println!("   ✅ OK: {}", summary.succeeded);
        println!("   ❌ Failed: {}", summary.failed);
        println!("   🚫 Dropped (4xx): {}", summary.dropped);
        println!("   📋 Total: {}", summary.total);
        if summary.cancelled {
            println!("   ⚠️  Crawl was cancelled");
        }
        if summary.timed_out {
            println!("   ⏱️  Crawl hit the overall timeout");
        }
        print_stats(&stats);
        print_sync_report(&report);
        if alerts_sent > 0 {
            println!("\n📨 Sent {} change alert(s)", alerts_sent);
        }
    }

    let serious_change = results
        .iter()
        .filter_map(|r| r.change_info.as_ref())
        .any(|c| c.severity >= Severity::High);
    let serious_sync = report.sync_issues.iter().any(|i| i.severity >= Severity::High);
    let incomplete = summary.failed > 0 || summary.cancelled || summary.timed_out;

    if incomplete || serious_change || serious_sync {
        Ok(1)
    } else {
        Ok(0)
    }
}

// Handles the 'sweep' subcommand
async fn handle_sweep(settings: &Settings, json: bool) -> Result<i32> {
    let config = settings.monitor_config();
    let cache = CacheStore::open(&config.cache_dir, config.cache_ttl)?;
    let evicted = cache.sweep().await;
    let stats = cache.stats().await;

    if json {
        let output = serde_json::json!({ "evicted": evicted, "cache": stats });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("🧹 Evicted {} expired cache entr(ies)", evicted);
        println!("   💾 {} file(s), {} byte(s) remaining", stats.total_files, stats.total_bytes);
    }
    Ok(0)
}

fn print_page_line(url: &str, words: usize, result: &ProcessingResult) {
    let mut line = format!("✅ {} ({} words", url, words);
    if let Some(language) = &result.language_info {
        line.push_str(&format!(", {}", language.language));
    }
    line.push(')');
    if result.cache_hit {
        line.push_str(" 💾 cached");
    }
    if let Some(change) = &result.change_info {
        line.push_str(&format!(
            " 🔄 {} [{}]",
            change.change_type.as_str(),
            change.severity
        ));
    }
    println!("{}", line);
}

fn print_stats(stats: &MonitoringStats) {
    println!();
    println!("📈 Monitoring:");
    println!("   Pages processed: {}", stats.pages_processed);
    println!("   Cache hit rate: {:.1}%", stats.cache_hit_rate * 100.0);
    println!("   Languages detected: {}", stats.languages_detected);
    println!("   Changes detected: {}", stats.changes_detected);
    println!("   Avg processing time: {:.2}ms", stats.average_processing_ms);
}

fn print_sync_report(report: &LanguageSyncReport) {
    if !report.enabled {
        return;
    }
    println!();
    println!("🌍 Language sync ({} issue(s)):", report.issue_count);
    for (language, pages) in &report.languages {
        println!("   {}: {} page(s)", language.to_uppercase(), pages);
    }
    for issue in &report.sync_issues {
        println!("   [{}] {} ({})", issue.severity, issue.description, issue.url);
    }
    for recommendation in &report.recommendations {
        println!("   💡 {}", recommendation);
    }
}

// Keeps table columns aligned; cuts on a char boundary.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}...", s.chars().take(max).collect::<String>())
    } else {
        s.to_string()
    }
}
