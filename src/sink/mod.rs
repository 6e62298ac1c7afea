//! Persistence sinks for a projected corpus.

mod json;
mod sqlite;

use anyhow::Result;
use std::path::Path;

use crate::projection::Projection;

pub use json::{JsonSink, packages_to_json};
pub use sqlite::{
    ColumnInfo, PackagerCount, QueryOutput, SqliteSink, format_build_date, packager_counts,
    run_query, table_layout,
};

/// Something that stores a projection.
pub trait TableSink {
    /// Short name used in progress output.
    fn label(&self) -> &'static str;

    /// Where the output ends up.
    fn destination(&self) -> &Path;

    fn write(&self, projection: &Projection<'_>) -> Result<()>;
}
