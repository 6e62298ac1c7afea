use alpm_db::commands::{self, ConfigOptions, SyncOptions};
use alpm_db::runtime::RealRuntime;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

/// alpm-db - ALPM repository metadata to JSON and SQLite
///
/// Download the sync databases of a Manjaro or Arch mirror, parse every
/// package descriptor and export packages with their resolved dependency,
/// provision and conflict links.
///
/// Examples:
///   alpm-db sync --sql                 # build ./pacman.db from the default mirror
///   alpm-db sync -m local --json       # use pacman's own sync databases
///   alpm-db sync -p pacman             # print one package as JSON
///   alpm-db query "SELECT * FROM repos"
#[derive(Parser, Debug)]
#[command(author, version = env!("ALPMDB_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory for downloaded databases (also via ALPMDB_ROOT)
    #[arg(long = "root", env = "ALPMDB_ROOT", value_name = "PATH", global = true)]
    pub root: Option<PathBuf>,

    /// SQLite database path; the JSON export goes next to it
    #[arg(long = "db", value_name = "PATH", global = true)]
    pub db: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Fetch, parse and export repository metadata
    Sync(SyncArgs),

    /// Run a read-only SQL statement against the database
    Query(QueryArgs),

    /// Show table layouts and per-packager package counts
    Info(InfoArgs),
}

#[derive(clap::Args, Debug)]
pub struct SyncArgs {
    /// Write the packages as JSON
    #[arg(long)]
    pub json: bool,

    /// Write the SQLite database
    #[arg(long)]
    pub sql: bool,

    /// Mirror URL, `local` for /var/lib/pacman/sync, or a directory (also via ALPMDB_MIRROR)
    #[arg(short = 'm', long = "mirror", value_name = "MIRROR")]
    pub mirror: Option<String>,

    /// Branch of a Manjaro mirror
    #[arg(short = 'b', long = "branch", value_name = "BRANCH")]
    pub branch: Option<String>,

    /// Use the Arch Linux mirror layout
    #[arg(long = "arch")]
    pub arch_layout: bool,

    /// Architecture to fetch
    #[arg(long = "architecture", value_name = "ARCH")]
    pub architecture: Option<String>,

    /// Repositories in priority order
    #[arg(short = 'r', long = "repo", value_name = "REPO")]
    pub repos: Vec<String>,

    /// Only keep these packages and print them as JSON
    #[arg(short = 'p', long = "package", value_name = "NAME", num_args = 1..)]
    pub packages: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct QueryArgs {
    /// The SQL statement
    #[arg(value_name = "SQL")]
    pub sql: String,
}

#[derive(clap::Args, Debug)]
pub struct InfoArgs {
    /// SQL LIKE pattern selecting packagers
    #[arg(long, value_name = "PATTERN", default_value = "%manjaro%")]
    pub packager: String,
}

fn db_path(cli_db: Option<PathBuf>) -> PathBuf {
    cli_db.unwrap_or_else(|| PathBuf::from(commands::config::DEFAULT_DB))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = RealRuntime;

    match cli.command {
        Commands::Sync(args) => {
            let options = ConfigOptions {
                mirror: args.mirror,
                branch: args.branch,
                arch_layout: args.arch_layout,
                architecture: args.architecture,
                repos: args.repos,
                root: cli.root,
                db: cli.db,
            };
            let config = commands::Config::load(&runtime, options)?;
            let sync_options = SyncOptions {
                json: args.json,
                sql: args.sql,
                packages: args.packages,
            };
            commands::sync(runtime, config, sync_options).await?;
        }
        Commands::Query(args) => {
            commands::query(&mut std::io::stdout().lock(), &db_path(cli.db), &args.sql)?
        }
        Commands::Info(args) => {
            commands::info(&mut std::io::stdout().lock(), &db_path(cli.db), &args.packager)?
        }
    }
    Ok(())
}
