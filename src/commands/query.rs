use anyhow::{Result, bail};
use std::io::Write;
use std::path::Path;

use crate::sink::{packager_counts, run_query, table_layout};

/// Tables described by `info`.
const INFO_TABLES: [&str; 5] = ["pkgs", "depends", "makedepends", "packagers", "repos"];

/// Run a read-only SQL statement and print a header line followed by
/// tab-separated rows.
#[tracing::instrument(skip(out))]
pub fn query<W: Write>(out: &mut W, db: &Path, sql: &str) -> Result<()> {
    if sql.trim().is_empty() {
        bail!("Empty query");
    }

    let output = run_query(db, sql)?;
    writeln!(out, "{}", output.columns.join("\t"))?;
    for row in &output.rows {
        writeln!(out, "{}", row.join("\t"))?;
    }
    Ok(())
}

/// Print the layout of the main tables and how many packages each matching
/// packager maintains.
#[tracing::instrument(skip(out))]
pub fn info<W: Write>(out: &mut W, db: &Path, packager_pattern: &str) -> Result<()> {
    for table in INFO_TABLES {
        writeln!(out, ":: {}", table)?;
        writeln!(out, "cid\tname\ttype\tnotnull\tdflt_value\tpk")?;
        for column in table_layout(db, table)? {
            writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}\t{}",
                column.cid,
                column.name,
                column.kind,
                u8::from(column.not_null),
                column.default.as_deref().unwrap_or(""),
                u8::from(column.primary_key)
            )?;
        }
        writeln!(out)?;
    }

    writeln!(out, ":: packagers like {}", packager_pattern)?;
    writeln!(out, "packages\tpackager\tid")?;
    for count in packager_counts(db, packager_pattern)? {
        writeln!(out, "{}\t{}\t{}", count.packages, count.packager, count.id)?;
    }
    Ok(())
}
