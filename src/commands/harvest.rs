use clap::Args;
use std::sync::Arc;

use jurisharvest::context::HarvestContext;
use jurisharvest::engine::{self, PoolReport, TaskHandle};
use jurisharvest::error::Result;
use jurisharvest::pages::JsonPageSource;
use jurisharvest::storage::{
    ensure_index_with_retry, DocumentStore, InMemoryStore, OpenSearchStore,
};

#[derive(Args, Debug)]
pub struct HarvestArgs {
    /// Source (court) identifier
    #[arg(short, long)]
    pub source: String,

    /// Base identifier within the source, part of every document key
    #[arg(short, long, default_value = "")]
    pub base: String,

    /// Page URL template with an {index} and optional {size} placeholder
    #[arg(short, long)]
    pub url: String,

    /// Document type stored when a page item carries none
    #[arg(long, default_value = "ruling")]
    pub document_type: String,

    /// First index to fetch
    #[arg(long, default_value_t = 0)]
    pub start: i64,

    /// Last index to fetch (required with --replicas)
    #[arg(long)]
    pub end: Option<i64>,

    /// Documents per page
    #[arg(long, default_value_t = 1)]
    pub page_size: u32,

    /// Run on a replica pool of this size
    #[arg(long)]
    pub replicas: Option<usize>,

    /// Indexes handed to each replica
    #[arg(long, default_value_t = 100)]
    pub range_width: i64,

    /// Failures tolerated per attempt
    #[arg(long, default_value_t = 25)]
    pub max_failures: u32,

    /// Recovery attempts before giving up
    #[arg(long, default_value_t = 5)]
    pub max_recoveries: u32,

    /// Let the page loop alone decide when an attempt ends
    #[arg(long, default_value = "false")]
    pub no_aggregator: bool,

    /// Keep documents in memory instead of writing to OpenSearch
    #[arg(long, default_value = "false")]
    pub dry_run: bool,
}

pub async fn harvest(ctx: Arc<HarvestContext>, args: HarvestArgs) -> Result<PoolReport> {
    println!("Starting harvest: {} {}", args.source, args.base);
    println!("========================");

    let store: Arc<dyn DocumentStore> = if args.dry_run {
        println!("  Dry run: documents are kept in memory");
        Arc::new(InMemoryStore::new())
    } else {
        Arc::new(OpenSearchStore::connect_with_retry(&ctx.settings().store).await)
    };

    let pages = Arc::new(JsonPageSource::new(args.url, args.document_type, store.clone())?);
    let index_retry_delay = ctx.settings().store.retry_connection_delay();

    let mut builder = ctx
        .task_builder()
        .source(args.source)
        .base(args.base)
        .start(args.start)
        .page_size(args.page_size)
        .max_failures(args.max_failures)
        .max_recoveries(args.max_recoveries)
        .status_aggregator(!args.no_aggregator)
        .setup(move || {
            let store = store.clone();
            async move {
                match ensure_index_with_retry(store.as_ref(), index_retry_delay).await {
                    Ok(status) => tracing::info!(status = ?status, "Store index ready"),
                    Err(e) => tracing::error!(error = %e, "Failed to prepare store index"),
                }
            }
        })
        .entry_point(move |handle: TaskHandle| {
            let pages = pages.clone();
            async move { pages.run(handle).await }
        });

    if let Some(end) = args.end {
        builder = builder.end(end);
    }
    if let Some(replicas) = args.replicas {
        builder = builder.concurrency(replicas, args.range_width);
    }

    let report = engine::run(ctx, builder.build()?).await;
    print_report(&report);
    Ok(report)
}

fn print_report(report: &PoolReport) {
    println!("\nHarvest finished");
    if !report.assigned.is_empty() {
        let ranges: Vec<String> = report.assigned.iter().map(ToString::to_string).collect();
        println!("  Ranges: {}", ranges.join(" "));
    }
    for run in &report.reports {
        println!(
            "  {} {:?}: attempts={} recoveries={} last_index={}",
            run.run_id, run.outcome, run.attempts, run.recoveries, run.last_index
        );
    }
    println!("  Completed: {}", report.completed());
    println!("  Gave up: {}", report.gave_up());
}
