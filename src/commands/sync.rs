use anyhow::{Context, Result};
use log::{info, warn};
use std::collections::HashSet;
use std::io::BufReader;
use std::sync::Arc;
use std::time::Instant;

use crate::{
    corpus::{Corpus, CorpusBuilder, NameFilter},
    download::fetch_repositories,
    projection::project,
    runtime::Runtime,
    sink::{JsonSink, SqliteSink, TableSink, packages_to_json},
};

use super::config::Config;
use super::services::build_http_client;

/// What a sync run should produce.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub json: bool,
    pub sql: bool,
    /// Restrict the run to these package names.
    pub packages: Vec<String>,
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub fetched: Vec<String>,
    pub failed: Vec<String>,
    /// Repositories with no database to parse.
    pub skipped: Vec<String>,
    pub parsed: usize,
    pub live: usize,
    pub missing: Vec<String>,
}

/// Fetch, parse, project and export.
#[tracing::instrument(skip(runtime, config))]
pub async fn sync<R: Runtime + 'static>(
    runtime: R,
    config: Config,
    options: SyncOptions,
) -> Result<SyncSummary> {
    let runtime = Arc::new(runtime);

    let mut summary = SyncSummary::default();
    let failed = fetch(runtime.clone(), &config, &mut summary).await?;
    let corpus = parse(runtime.as_ref(), &config, &options, &failed, &mut summary)?;

    let projection = project(&corpus);
    summary.live = projection.packages.len();
    println!("=> {} packages ({} after removing duplicates)", summary.parsed, summary.live);

    let mut sinks: Vec<Box<dyn TableSink + '_>> = Vec::new();
    if options.json {
        sinks.push(Box::new(JsonSink::new(runtime.as_ref(), &config.json_path)));
    }
    if options.sql {
        sinks.push(Box::new(SqliteSink::new(runtime.as_ref(), &config.db_path)));
    }
    for sink in &sinks {
        let started = Instant::now();
        sink.write(&projection)
            .with_context(|| format!("Failed to write {} output", sink.label()))?;
        println!(
            "{}: {} ({:.2?})",
            sink.label(),
            sink.destination().display(),
            started.elapsed()
        );
    }

    if !options.packages.is_empty() {
        print!("{}", packages_to_json(&projection.packages)?);
    }

    Ok(summary)
}

/// Download every configured repository unless the mirror is local.
/// Returns the repositories whose download failed.
async fn fetch<R: Runtime + 'static>(
    runtime: Arc<R>,
    config: &Config,
    summary: &mut SyncSummary,
) -> Result<HashSet<String>> {
    let targets = config.fetch_targets();
    if targets.is_empty() {
        info!("reading databases from {:?}", config.sync_dir());
        return Ok(HashSet::new());
    }

    println!("--- Download repos...");
    let started = Instant::now();
    runtime
        .create_dir_all(&config.download_dir)
        .with_context(|| format!("Failed to create download directory {:?}", config.download_dir))?;

    let http_client = build_http_client(config)?;
    let reports = fetch_repositories(runtime, http_client, targets).await;

    let mut failed = HashSet::new();
    for report in reports {
        match report.outcome {
            Ok(_) => {
                println!("{}", report.url);
                summary.fetched.push(report.repo);
            }
            Err(e) => {
                println!("{}: {:#}", report.url, e);
                summary.failed.push(report.repo.clone());
                failed.insert(report.repo);
            }
        }
    }
    println!("duration: {:.2?}", started.elapsed());
    Ok(failed)
}

fn parse<R: Runtime>(
    runtime: &R,
    config: &Config,
    options: &SyncOptions,
    failed: &HashSet<String>,
    summary: &mut SyncSummary,
) -> Result<Corpus> {
    println!("--- Parse files...");
    let started = Instant::now();
    let mut builder = CorpusBuilder::new(NameFilter::new(options.packages.iter().cloned()));

    for repo in &config.repos {
        if builder.filter().is_satisfied() {
            break;
        }

        let path = config.archive_path(repo);
        if failed.contains(repo) || !runtime.exists(&path) {
            warn!("{}: no database at {:?}, skipping", repo, path);
            println!(":: {} skipped", repo);
            summary.skipped.push(repo.clone());
            continue;
        }

        let reader = runtime.open(&path)?;
        let added = builder
            .extend_from_archive(BufReader::new(reader), repo)
            .with_context(|| format!("Failed to parse {} database {:?}", repo, path))?;
        println!(":: {} {} packages", repo, added);
    }
    println!("duration: {:.2?}", started.elapsed());

    summary.missing = builder
        .filter()
        .missing()
        .into_iter()
        .map(String::from)
        .collect();
    if builder.filter().is_active() && !summary.missing.is_empty() {
        warn!("packages not found: {}", summary.missing.join(", "));
    }

    let corpus = builder.finish();
    summary.parsed = corpus.len();
    Ok(corpus)
}
