//! Accumulating packages from several repository databases.
//!
//! Repositories are fed in priority order. Identifiers are handed out as
//! `corpus length + 1` at insertion, so they are dense unless a name filter
//! drops entries.

use anyhow::Result;
use log::{debug, info};
use std::collections::HashSet;
use std::io::Read;

use crate::archive::{Visit, for_each_descriptor};
use crate::package::Package;

/// Set of package names a run is restricted to.
///
/// An empty filter accepts everything. Found names are tracked explicitly so
/// that a multi-repository run can stop once every requested name has been
/// seen, independently of how large the corpus has grown.
#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    names: HashSet<String>,
    found: HashSet<String>,
}

impl NameFilter {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            found: HashSet::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.names.is_empty()
    }

    /// A single-name filter is a point lookup: the first match ends the run.
    pub fn is_point_lookup(&self) -> bool {
        self.names.len() == 1
    }

    pub fn accepts(&self, name: &str) -> bool {
        !self.is_active() || self.names.contains(name)
    }

    pub fn mark_found(&mut self, name: &str) {
        if self.names.contains(name) {
            self.found.insert(name.to_string());
        }
    }

    /// True once every requested name has been found.
    pub fn is_satisfied(&self) -> bool {
        self.is_active() && self.found.len() == self.names.len()
    }

    /// Requested names not found so far, sorted.
    pub fn missing(&self) -> Vec<&str> {
        let mut missing: Vec<&str> = self
            .names
            .difference(&self.found)
            .map(String::as_str)
            .collect();
        missing.sort_unstable();
        missing
    }
}

/// In-memory package set of a run, in discovery order.
///
/// Same-named packages from lower priority repositories may be present; use
/// [`Corpus::live_packages`] for the deduplicated view.
#[derive(Debug, Default, Clone)]
pub struct Corpus {
    packages: Vec<Package>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    /// Append a package and assign it the next identifier.
    pub fn push(&mut self, mut package: Package) -> u32 {
        let id = self.packages.len() as u32 + 1;
        package.id = id;
        self.packages.push(package);
        id
    }

    /// One package per name: the first one inserted wins, which is the copy
    /// from the highest priority repository.
    pub fn live_packages(&self) -> Vec<&Package> {
        let mut seen = HashSet::with_capacity(self.packages.len());
        self.packages
            .iter()
            .filter(|pkg| seen.insert(pkg.name.as_str()))
            .collect()
    }
}

/// Builds a [`Corpus`] one repository database at a time.
#[derive(Debug, Default)]
pub struct CorpusBuilder {
    corpus: Corpus,
    filter: NameFilter,
}

impl CorpusBuilder {
    pub fn new(filter: NameFilter) -> Self {
        Self {
            corpus: Corpus::new(),
            filter,
        }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn filter(&self) -> &NameFilter {
        &self.filter
    }

    /// Parse a compressed repository database and append its packages.
    ///
    /// Returns the number of packages appended. Archive framing errors are
    /// returned as-is; callers treat them as fatal for the run.
    #[tracing::instrument(skip(self, reader))]
    pub fn extend_from_archive<R: Read>(&mut self, reader: R, repo: &str) -> Result<usize> {
        if self.filter.is_satisfied() {
            debug!("all filtered names already found, skipping {}", repo);
            return Ok(0);
        }

        let before = self.corpus.len();
        let corpus = &mut self.corpus;
        let filter = &mut self.filter;

        for_each_descriptor(reader, |entry| {
            let package = Package::from_desc(&entry.content, repo, &entry.path);
            if !filter.accepts(&package.name) {
                return Ok(Visit::Continue);
            }

            filter.mark_found(&package.name);
            let id = corpus.push(package);
            debug!("{} -> #{}", entry.path, id);

            if filter.is_point_lookup() {
                return Ok(Visit::Stop);
            }
            Ok(Visit::Continue)
        })?;

        let added = self.corpus.len() - before;
        info!("{}: {} packages", repo, added);
        Ok(added)
    }

    pub fn finish(self) -> Corpus {
        self.corpus
    }
}
