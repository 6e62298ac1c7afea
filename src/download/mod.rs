//! Fetching repository databases from a mirror.

use crate::http::HttpClient;
use crate::runtime::Runtime;
use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

/// One repository database to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    pub repo: String,
    pub url: String,
    pub dest: PathBuf,
}

/// Outcome of fetching one repository.
#[derive(Debug)]
pub struct FetchReport {
    pub repo: String,
    pub url: String,
    /// Bytes written on success.
    pub outcome: Result<u64>,
}

impl FetchReport {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Downloads a file from a URL to `dest` with retry support.
#[tracing::instrument(skip(runtime, dest, http_client))]
pub async fn download_file<R: Runtime>(
    runtime: &R,
    url: &str,
    dest: &Path,
    http_client: &HttpClient,
) -> Result<u64> {
    let dest = dest.to_path_buf();
    let bytes = http_client
        .download_file(url, || {
            runtime
                .create_file(&dest)
                .with_context(|| format!("Failed to create {:?}", dest))
        })
        .await?;

    debug!("{} -> {:?} ({} bytes)", url, dest, bytes);
    Ok(bytes)
}

/// Download every target concurrently, one task per repository.
///
/// Any archive already at a destination is removed first, so a failed
/// download never leaves a stale database to be parsed. Reports come back in
/// completion order; a failure only affects its own repository.
#[tracing::instrument(skip_all, fields(targets = targets.len()))]
pub async fn fetch_repositories<R>(
    runtime: Arc<R>,
    http_client: HttpClient,
    targets: Vec<FetchTarget>,
) -> Vec<FetchReport>
where
    R: Runtime + 'static,
{
    let (tx, mut rx) = mpsc::channel(targets.len().max(1));
    let expected: Vec<(String, String)> = targets
        .iter()
        .map(|t| (t.repo.clone(), t.url.clone()))
        .collect();

    for target in targets {
        if runtime.exists(&target.dest) {
            if let Err(e) = runtime.remove_file(&target.dest) {
                warn!("Could not remove stale {:?}: {:#}", target.dest, e);
            }
        }

        let runtime = runtime.clone();
        let http_client = http_client.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let outcome =
                download_file(runtime.as_ref(), &target.url, &target.dest, &http_client).await;
            let report = FetchReport {
                repo: target.repo,
                url: target.url,
                outcome,
            };
            if tx.send(report).await.is_err() {
                debug!("fetch receiver dropped");
            }
        });
    }
    drop(tx);

    let mut reports = Vec::with_capacity(expected.len());
    while let Some(report) = rx.recv().await {
        match &report.outcome {
            Ok(bytes) => info!("{}: fetched {} bytes from {}", report.repo, bytes, report.url),
            Err(e) => warn!("{}: fetch failed: {:#}", report.repo, e),
        }
        reports.push(report);
    }

    // a task that panicked never reports back
    let reported: HashSet<String> = reports.iter().map(|r| r.repo.clone()).collect();
    for (repo, url) in expected {
        if !reported.contains(&repo) {
            reports.push(FetchReport {
                outcome: Err(anyhow!("download task for {} did not complete", repo)),
                repo,
                url,
            });
        }
    }

    reports
}
