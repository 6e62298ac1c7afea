use anyhow::{Context, Result};
use log::debug;
use std::path::{Path, PathBuf};

use super::TableSink;
use crate::package::Package;
use crate::projection::Projection;
use crate::runtime::Runtime;

/// Serialize packages as a JSON array, one package per line.
///
/// Empty optional fields are omitted and HTML characters are written as-is.
pub fn packages_to_json(packages: &[&Package]) -> Result<String> {
    let lines = packages
        .iter()
        .map(|package| {
            serde_json::to_string(package)
                .with_context(|| format!("Failed to encode package {} as JSON", package.name))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("[{}]\n", lines.join(",\n")))
}

/// Writes the surviving package entities to a JSON file.
pub struct JsonSink<'a, R: Runtime> {
    runtime: &'a R,
    path: PathBuf,
}

impl<'a, R: Runtime> JsonSink<'a, R> {
    pub fn new(runtime: &'a R, path: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            path: path.into(),
        }
    }
}

impl<R: Runtime> TableSink for JsonSink<'_, R> {
    fn label(&self) -> &'static str {
        "json"
    }

    fn destination(&self) -> &Path {
        &self.path
    }

    #[tracing::instrument(skip(self, projection), fields(path = ?self.path))]
    fn write(&self, projection: &Projection<'_>) -> Result<()> {
        let json = packages_to_json(&projection.packages)?;
        self.runtime
            .write(&self.path, json.as_bytes())
            .with_context(|| format!("Failed to write JSON output to {:?}", self.path))?;
        debug!("wrote {} bytes to {:?}", json.len(), self.path);
        Ok(())
    }
}
