use anyhow::{Context, Result};
use chrono::DateTime;
use log::{debug, info};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Transaction, params};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::TableSink;
use crate::package::INTEGER_SENTINEL;
use crate::projection::{EdgeKind, LookupTable, Projection, TableSet};
use crate::runtime::Runtime;

const SCHEMA: &str = "
CREATE TABLE pkgs (
    id INTEGER PRIMARY KEY,
    name TEXT UNIQUE NOT NULL,
    base TEXT DEFAULT NULL,
    version TEXT NOT NULL,
    repo INTEGER,
    desc TEXT,
    url TEXT,
    builddate TIME,
    csize INTEGER,
    isize INTEGER,
    packager INTEGER
);
CREATE TABLE depends (id INTEGER, depend TEXT, comp TEXT, ver TEXT, pkg INTEGER DEFAULT -1);
CREATE TABLE optdepends (id INTEGER, optdepend TEXT, comp TEXT, ver TEXT, pkg INTEGER DEFAULT -1);
CREATE TABLE makedepends (id INTEGER, depend TEXT, comp TEXT, ver TEXT, pkg INTEGER DEFAULT -1);
CREATE TABLE provides (id INTEGER, provide TEXT, comp TEXT, ver TEXT, pkg INTEGER DEFAULT -1);
CREATE TABLE conflicts (id INTEGER, conflict TEXT, comp TEXT, ver TEXT, pkg INTEGER DEFAULT -1);
CREATE TABLE licences (id INTEGER, licence TEXT);
CREATE TABLE packagers (id INTEGER PRIMARY KEY, packager TEXT UNIQUE);
CREATE TABLE repos (id INTEGER PRIMARY KEY, repo TEXT UNIQUE);
";

const INDEXES: &str = "
CREATE INDEX index_repo ON pkgs (repo ASC);
CREATE INDEX index_name ON pkgs (name ASC);
";

/// Build databases under unique names so concurrent runs never share one.
static BUILD_SEQ: AtomicUsize = AtomicUsize::new(0);

fn edge_table(kind: EdgeKind) -> (&'static str, &'static str) {
    match kind {
        EdgeKind::Depends => ("depends", "depend"),
        EdgeKind::OptDepends => ("optdepends", "optdepend"),
        EdgeKind::MakeDepends => ("makedepends", "depend"),
        EdgeKind::Provides => ("provides", "provide"),
        EdgeKind::Conflicts => ("conflicts", "conflict"),
    }
}

/// Render a build epoch as `YYYY-MM-DD HH:MM:SS` (UTC).
pub fn format_build_date(epoch: i64) -> Option<String> {
    if epoch == INTEGER_SENTINEL {
        return None;
    }
    DateTime::from_timestamp(epoch, 0).map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Writes the table set to a SQLite database.
///
/// The database is built in the temporary directory and only moved over the
/// destination once complete, so a failed run leaves the previous file alone.
pub struct SqliteSink<'a, R: Runtime> {
    runtime: &'a R,
    path: PathBuf,
}

impl<'a, R: Runtime> SqliteSink<'a, R> {
    pub fn new(runtime: &'a R, path: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            path: path.into(),
        }
    }

    fn build_path(&self) -> PathBuf {
        let seq = BUILD_SEQ.fetch_add(1, Ordering::Relaxed);
        self.runtime
            .temp_dir()
            .join(format!("alpm-db-{}-{}.db", std::process::id(), seq))
    }
}

impl<R: Runtime> TableSink for SqliteSink<'_, R> {
    fn label(&self) -> &'static str {
        "sqlite"
    }

    fn destination(&self) -> &Path {
        &self.path
    }

    #[tracing::instrument(skip(self, projection), fields(path = ?self.path))]
    fn write(&self, projection: &Projection<'_>) -> Result<()> {
        let build_path = self.build_path();
        if self.runtime.exists(&build_path) {
            self.runtime.remove_file(&build_path)?;
        }

        let populated = Connection::open(&build_path)
            .with_context(|| format!("Failed to create database {:?}", build_path))
            .and_then(|mut conn| populate(&mut conn, &projection.tables));
        if let Err(e) = populated {
            if self.runtime.exists(&build_path) {
                let _ = self.runtime.remove_file(&build_path);
            }
            return Err(e);
        }

        if self.runtime.exists(&self.path) {
            self.runtime.remove_file(&self.path)?;
        }
        self.runtime
            .move_file(&build_path, &self.path)
            .with_context(|| format!("Failed to move database into {:?}", self.path))?;

        info!("database written to {:?}", self.path);
        Ok(())
    }
}

fn populate(conn: &mut Connection, tables: &TableSet) -> Result<()> {
    conn.execute_batch(SCHEMA)
        .context("Failed to create database schema")?;

    let tx = conn.transaction().context("Failed to start transaction")?;
    insert_lookup(&tx, "packagers", "packager", &tables.packagers)?;
    insert_lookup(&tx, "repos", "repo", &tables.repos)?;
    insert_packages(&tx, tables)?;
    for kind in EdgeKind::ALL {
        insert_edges(&tx, kind, tables)?;
    }
    insert_licenses(&tx, tables)?;
    tx.execute_batch(INDEXES)
        .context("Failed to create indexes")?;
    tx.commit().context("Failed to commit database")?;

    debug!("inserted {} packages", tables.packages.len());
    Ok(())
}

fn insert_lookup(tx: &Transaction<'_>, table: &str, column: &str, lookup: &LookupTable) -> Result<()> {
    let sql = format!("INSERT INTO {} (id, {}) VALUES (?1, ?2)", table, column);
    let mut stmt = tx.prepare(&sql)?;
    for row in lookup.rows() {
        stmt.execute(params![row.id, row.value])
            .with_context(|| format!("Failed to insert {} {:?}", column, row.value))?;
    }
    Ok(())
}

fn insert_packages(tx: &Transaction<'_>, tables: &TableSet) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO pkgs (id, name, base, version, repo, desc, url, builddate, csize, isize, packager)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )?;
    for row in &tables.packages {
        stmt.execute(params![
            row.id,
            row.name,
            row.base,
            row.version,
            row.repo,
            row.description,
            row.url,
            format_build_date(row.build_date),
            row.compressed_size,
            row.installed_size,
            row.packager,
        ])
        .with_context(|| format!("Failed to insert package {}", row.name))?;
    }
    Ok(())
}

fn insert_edges(tx: &Transaction<'_>, kind: EdgeKind, tables: &TableSet) -> Result<()> {
    let (table, column) = edge_table(kind);
    let sql = format!(
        "INSERT INTO {} (id, {}, comp, ver, pkg) VALUES (?1, ?2, ?3, ?4, ?5)",
        table, column
    );
    let mut stmt = tx.prepare(&sql)?;
    for link in tables.edges(kind) {
        stmt.execute(params![
            link.owner,
            link.name,
            link.comparator.as_str(),
            link.version,
            link.target_id(),
        ])
        .with_context(|| format!("Failed to insert {} row {}", table, link.name))?;
    }
    Ok(())
}

fn insert_licenses(tx: &Transaction<'_>, tables: &TableSet) -> Result<()> {
    let mut stmt = tx.prepare("INSERT INTO licences (id, licence) VALUES (?1, ?2)")?;
    for row in &tables.licenses {
        stmt.execute(params![row.owner, row.license])?;
    }
    Ok(())
}

/// Column names and stringified rows of a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

fn open_read_only(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Failed to open database {:?} (run `alpm-db sync --sql` first)", path))
}

fn render(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

/// Run one statement against a database opened read-only.
#[tracing::instrument]
pub fn run_query(path: &Path, sql: &str) -> Result<QueryOutput> {
    let conn = open_read_only(path)?;
    let mut stmt = conn
        .prepare(sql)
        .with_context(|| format!("Invalid query: {}", sql))?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let mut rows = Vec::new();
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(render(row.get_ref(i)?));
        }
        rows.push(values);
    }

    Ok(QueryOutput { columns, rows })
}

/// One line of `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub cid: i64,
    pub name: String,
    pub kind: String,
    pub not_null: bool,
    pub default: Option<String>,
    pub primary_key: bool,
}

/// Column layout of `table`; empty when the table does not exist.
pub fn table_layout(path: &Path, table: &str) -> Result<Vec<ColumnInfo>> {
    let conn = open_read_only(path)?;
    let mut stmt = conn.prepare(
        "SELECT cid, name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1)",
    )?;
    let columns = stmt
        .query_map([table], |row| {
            Ok(ColumnInfo {
                cid: row.get(0)?,
                name: row.get(1)?,
                kind: row.get(2)?,
                not_null: row.get::<_, i64>(3)? != 0,
                default: row.get(4)?,
                primary_key: row.get::<_, i64>(5)? != 0,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .with_context(|| format!("Failed to read layout of table {}", table))?;
    Ok(columns)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagerCount {
    pub id: i64,
    pub packager: String,
    pub packages: i64,
}

/// Number of packages per packager whose identity matches a `LIKE` pattern,
/// most prolific first.
pub fn packager_counts(path: &Path, pattern: &str) -> Result<Vec<PackagerCount>> {
    let conn = open_read_only(path)?;
    let mut stmt = conn.prepare(
        "SELECT count(pkgs.id) AS packages, packagers.packager, packagers.id
         FROM pkgs JOIN packagers ON pkgs.packager = packagers.id
         WHERE packagers.packager LIKE ?1
         GROUP BY packagers.id
         ORDER BY packages DESC, packagers.id ASC",
    )?;
    let counts = stmt
        .query_map([pattern], |row| {
            Ok(PackagerCount {
                packages: row.get(0)?,
                packager: row.get(1)?,
                id: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to count packages per packager")?;
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Corpus;
    use crate::package::Package;
    use crate::projection::project;
    use crate::runtime::{MockRuntime, RealRuntime};
    use tempfile::tempdir;

    fn package(name: &str, repo: &str, packager: &str) -> Package {
        Package {
            name: name.to_string(),
            version: "1.0-1".to_string(),
            repo: repo.to_string(),
            packager: packager.to_string(),
            description: format!("{} package", name),
            build_date: 1_600_000_000,
            compressed_size: 100,
            installed_size: 400,
            ..Default::default()
        }
    }

    fn sample_corpus() -> Corpus {
        let mut corpus = Corpus::new();
        let mut foo = package("foo", "core", "Ann <ann@manjaro.org>");
        foo.depends = vec!["bar>=2.0".into(), "baz".into()];
        foo.optdepends = vec!["bar: extras".into()];
        foo.licenses = vec!["GPL".into(), "custom:foo".into()];
        foo.base = "foo-split".into();
        corpus.push(foo);
        corpus.push(package("bar", "core", "Ann <ann@manjaro.org>"));
        let mut qux = package("qux", "extra", "Bob <bob@archlinux.org>");
        qux.build_date = -1;
        qux.provides = vec!["libqux.so=1-64".into()];
        corpus.push(qux);
        corpus.push(package("bar", "extra", "Bob <bob@archlinux.org>"));
        corpus
    }

    fn write_sample(dir: &Path) -> PathBuf {
        let corpus = sample_corpus();
        let projection = project(&corpus);
        let path = dir.join("pacman.db");
        SqliteSink::new(&RealRuntime, &path)
            .write(&projection)
            .unwrap();
        path
    }

    #[test]
    fn test_format_build_date() {
        assert_eq!(format_build_date(0).as_deref(), Some("1970-01-01 00:00:00"));
        assert_eq!(
            format_build_date(1_600_000_000).as_deref(),
            Some("2020-09-13 12:26:40")
        );
        assert_eq!(format_build_date(INTEGER_SENTINEL), None);
    }

    #[test]
    fn test_writes_packages_and_links() {
        let dir = tempdir().unwrap();
        let path = write_sample(dir.path());

        let conn = Connection::open(&path).unwrap();
        let count: i64 = conn
            .query_row("SELECT count(*) FROM pkgs", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 3);

        let (comp, ver, pkg): (String, String, i64) = conn
            .query_row(
                "SELECT comp, ver, pkg FROM depends WHERE id = 1 AND depend = 'bar'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!((comp.as_str(), ver.as_str(), pkg), (">=", "2.0", 2));

        let baz: i64 = conn
            .query_row("SELECT pkg FROM depends WHERE depend = 'baz'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(baz, -1);

        let opt: i64 = conn
            .query_row("SELECT pkg FROM optdepends WHERE optdepend = 'bar'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(opt, 2);

        let provide: (String, i64) = conn
            .query_row("SELECT provide, pkg FROM provides", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(provide, ("libqux.so".to_string(), -1));

        let licences: i64 = conn
            .query_row("SELECT count(*) FROM licences WHERE id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(licences, 2);
    }

    #[test]
    fn test_package_columns() {
        let dir = tempdir().unwrap();
        let path = write_sample(dir.path());
        let conn = Connection::open(&path).unwrap();

        let (base, repo, packager, builddate): (Option<String>, i64, i64, Option<String>) = conn
            .query_row(
                "SELECT base, repo, packager, builddate FROM pkgs WHERE name = 'foo'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!(base.as_deref(), Some("foo-split"));
        assert_eq!(repo, 1);
        assert_eq!(packager, 1);
        assert_eq!(builddate.as_deref(), Some("2020-09-13 12:26:40"));

        let (base, repo, builddate): (Option<String>, String, Option<String>) = conn
            .query_row(
                "SELECT base, repos.repo, builddate FROM pkgs JOIN repos ON pkgs.repo = repos.id WHERE name = 'qux'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(base, None);
        assert_eq!(repo, "extra");
        assert_eq!(builddate, None);

        // the extra copy of bar was dropped
        let bar_repo: String = conn
            .query_row(
                "SELECT repos.repo FROM pkgs JOIN repos ON pkgs.repo = repos.id WHERE name = 'bar'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(bar_repo, "core");
    }

    #[test]
    fn test_overwrites_existing_database() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("pacman.db"), b"stale").unwrap();

        let path = write_sample(dir.path());
        let output = run_query(&path, "SELECT name FROM pkgs ORDER BY id").unwrap();
        assert_eq!(output.rows.len(), 3);
    }

    #[test]
    fn test_run_query() {
        let dir = tempdir().unwrap();
        let path = write_sample(dir.path());

        let output = run_query(
            &path,
            "SELECT id, name, base FROM pkgs WHERE repo = 1 ORDER BY id",
        )
        .unwrap();

        assert_eq!(output.columns, vec!["id", "name", "base"]);
        assert_eq!(
            output.rows,
            vec![
                vec!["1".to_string(), "foo".to_string(), "foo-split".to_string()],
                vec!["2".to_string(), "bar".to_string(), "NULL".to_string()],
            ]
        );
    }

    #[test]
    fn test_run_query_is_read_only() {
        let dir = tempdir().unwrap();
        let path = write_sample(dir.path());

        assert!(run_query(&path, "DELETE FROM pkgs").is_err());
        let output = run_query(&path, "SELECT count(*) FROM pkgs").unwrap();
        assert_eq!(output.rows[0][0], "3");
    }

    #[test]
    fn test_run_query_missing_database() {
        let dir = tempdir().unwrap();
        let err = run_query(&dir.path().join("missing.db"), "SELECT 1").unwrap_err();
        assert!(err.to_string().contains("sync --sql"));
    }

    #[test]
    fn test_table_layout() {
        let dir = tempdir().unwrap();
        let path = write_sample(dir.path());

        let layout = table_layout(&path, "pkgs").unwrap();
        assert_eq!(layout.len(), 11);
        assert_eq!(layout[0].name, "id");
        assert!(layout[0].primary_key);
        assert_eq!(layout[1].name, "name");
        assert!(layout[1].not_null);

        let depends = table_layout(&path, "depends").unwrap();
        assert_eq!(depends[4].name, "pkg");
        assert_eq!(depends[4].default.as_deref(), Some("-1"));

        assert!(table_layout(&path, "nope").unwrap().is_empty());
    }

    #[test]
    fn test_packager_counts() {
        let dir = tempdir().unwrap();
        let path = write_sample(dir.path());

        let counts = packager_counts(&path, "%manjaro%").unwrap();
        assert_eq!(
            counts,
            vec![PackagerCount {
                id: 1,
                packager: "Ann <ann@manjaro.org>".to_string(),
                packages: 2,
            }]
        );
        assert_eq!(packager_counts(&path, "%").unwrap().len(), 2);
    }

    #[test]
    fn test_move_failure_is_reported() {
        let dir = tempdir().unwrap();
        let mut corpus = Corpus::new();
        corpus.push(package("a", "core", "x"));
        let projection = project(&corpus);

        let temp = dir.path().to_path_buf();
        let mut runtime = MockRuntime::new();
        runtime.expect_temp_dir().returning(move || temp.clone());
        runtime.expect_exists().returning(|p| p.exists());
        runtime
            .expect_remove_file()
            .returning(|p| Ok(std::fs::remove_file(p)?));
        runtime
            .expect_move_file()
            .returning(|_, _| Err(anyhow::anyhow!("read-only destination")));

        let sink = SqliteSink::new(&runtime, dir.path().join("out").join("pacman.db"));
        let err = sink.write(&projection).unwrap_err();
        assert!(format!("{:#}", err).contains("read-only destination"));
    }
}
