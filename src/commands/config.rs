use anyhow::{Context, Result, bail};
use log::debug;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{download::FetchTarget, runtime::Runtime};

pub const DEFAULT_MIRROR: &str = "https://mirror.netzspielplatz.de/manjaro/packages";
pub const DEFAULT_BRANCH: &str = "stable";
pub const DEFAULT_ARCH: &str = "x86_64";
pub const DEFAULT_REPOS: [&str; 4] = ["core", "extra", "community", "multilib"];
pub const DEFAULT_DB: &str = "pacman.db";
/// pacman's own copy of the sync databases.
pub const LOCAL_SYNC_DIR: &str = "/var/lib/pacman/sync";
pub const MIRROR_ENV: &str = "ALPMDB_MIRROR";
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(25);

/// Where repository databases come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mirror {
    /// Base URL of a package mirror.
    Remote(String),
    /// Directory already holding `<repo>.db` files; nothing is downloaded.
    Local(PathBuf),
}

impl Mirror {
    /// `local`, an http(s) URL, or an absolute or `./`-relative directory.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value == "local" {
            return Ok(Mirror::Local(PathBuf::from(LOCAL_SYNC_DIR)));
        }
        if value.starts_with("http://") || value.starts_with("https://") {
            return Ok(Mirror::Remote(value.trim_end_matches('/').to_string()));
        }
        if let Some(path) = value.strip_prefix("file://") {
            return Ok(Mirror::Local(PathBuf::from(path)));
        }
        if value.starts_with('/') || value.starts_with("./") || value.starts_with("../") {
            return Ok(Mirror::Local(PathBuf::from(value)));
        }
        bail!(
            "Invalid mirror {:?}: expected an http(s) URL, `local`, or a directory path",
            value
        )
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Mirror::Local(_))
    }
}

/// URL scheme of a mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MirrorLayout {
    /// `{mirror}/{branch}/{repo}/{arch}/{repo}.db`
    #[default]
    Manjaro,
    /// `{mirror}/{repo}/os/{arch}/{repo}.db`
    Arch,
}

impl MirrorLayout {
    pub fn database_url(self, mirror: &str, branch: &str, repo: &str, arch: &str) -> String {
        match self {
            MirrorLayout::Manjaro => format!("{}/{}/{}/{}/{}.db", mirror, branch, repo, arch, repo),
            MirrorLayout::Arch => format!("{}/{}/os/{}/{}.db", mirror, repo, arch, repo),
        }
    }
}

/// Values supplied on the command line; anything unset falls back to the
/// environment or the defaults.
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    pub mirror: Option<String>,
    pub branch: Option<String>,
    pub arch_layout: bool,
    pub architecture: Option<String>,
    pub repos: Vec<String>,
    pub root: Option<PathBuf>,
    pub db: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub mirror: Mirror,
    pub branch: String,
    pub layout: MirrorLayout,
    pub arch: String,
    /// Repositories in priority order.
    pub repos: Vec<String>,
    /// Where downloaded databases are stored.
    pub download_dir: PathBuf,
    pub timeout: Duration,
    pub db_path: PathBuf,
    pub json_path: PathBuf,
}

impl Config {
    pub fn load<R: Runtime>(runtime: &R, options: ConfigOptions) -> Result<Self> {
        let mirror = match options.mirror {
            Some(m) => m,
            None => runtime
                .env_var(MIRROR_ENV)
                .unwrap_or_else(|_| DEFAULT_MIRROR.to_string()),
        };
        let mirror = Mirror::parse(&mirror)?;

        let download_dir = match options.root {
            Some(root) => root,
            None => default_download_dir(runtime)?,
        };

        let repos = if options.repos.is_empty() {
            DEFAULT_REPOS.iter().map(|r| r.to_string()).collect()
        } else {
            options.repos
        };
        if let Some(bad) = repos.iter().find(|r| r.is_empty() || r.contains('/')) {
            bail!("Invalid repository name {:?}", bad);
        }

        let db_path = options.db.unwrap_or_else(|| PathBuf::from(DEFAULT_DB));
        let json_path = db_path.with_extension("json");

        let config = Config {
            mirror,
            branch: options.branch.unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            layout: if options.arch_layout {
                MirrorLayout::Arch
            } else {
                MirrorLayout::Manjaro
            },
            arch: options
                .architecture
                .unwrap_or_else(|| DEFAULT_ARCH.to_string()),
            repos,
            download_dir,
            timeout: HTTP_TIMEOUT,
            db_path,
            json_path,
        };
        debug!("config: {:?}", config);
        Ok(config)
    }

    /// Directory the parser reads `<repo>.db` files from.
    pub fn sync_dir(&self) -> &Path {
        match &self.mirror {
            Mirror::Local(dir) => dir,
            Mirror::Remote(_) => &self.download_dir,
        }
    }

    pub fn archive_path(&self, repo: &str) -> PathBuf {
        self.sync_dir().join(format!("{}.db", repo))
    }

    /// Downloads needed for this run; none for a local mirror.
    pub fn fetch_targets(&self) -> Vec<FetchTarget> {
        let Mirror::Remote(base) = &self.mirror else {
            return Vec::new();
        };
        self.repos
            .iter()
            .map(|repo| FetchTarget {
                repo: repo.clone(),
                url: self
                    .layout
                    .database_url(base, &self.branch, repo, &self.arch),
                dest: self.archive_path(repo),
            })
            .collect()
    }
}

pub fn default_download_dir<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    let data_dir = runtime
        .data_dir()
        .context("Could not find the user data directory; pass --root")?;
    Ok(data_dir.join("alpm-db").join("repos"))
}
