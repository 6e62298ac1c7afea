//! Projection of a corpus onto normalized tables.
//!
//! The corpus is deduplicated by name (first repository wins) before any
//! expression is resolved, so every link points at the surviving copy.
//! Packager and repository names are interned into lookup tables; package
//! rows reference them by identifier while the [`Package`] entities stay
//! untouched.

use serde::Serialize;
use std::collections::HashMap;

use crate::corpus::Corpus;
use crate::package::{Comparator, Package};
use crate::resolve::{ResolvedLink, Resolver};

/// Stored in place of a target identifier when a link did not resolve.
pub const UNRESOLVED: i64 = -1;

/// One row of the packages table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageRow {
    pub id: u32,
    pub name: String,
    pub base: Option<String>,
    pub version: String,
    pub repo: Option<u32>,
    pub description: String,
    pub url: String,
    pub build_date: i64,
    pub compressed_size: i64,
    pub installed_size: i64,
    pub packager: Option<u32>,
}

/// One edge of a dependency-like side table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkRow {
    pub owner: u32,
    pub name: String,
    pub comparator: Comparator,
    pub version: String,
    pub target: Option<u32>,
}

impl LinkRow {
    fn new(owner: u32, link: ResolvedLink) -> Self {
        LinkRow {
            owner,
            name: link.expr.name,
            comparator: link.expr.comparator,
            version: link.expr.version,
            target: link.target,
        }
    }

    /// Target identifier, or [`UNRESOLVED`].
    pub fn target_id(&self) -> i64 {
        self.target.map_or(UNRESOLVED, i64::from)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LicenseRow {
    pub owner: u32,
    pub license: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupRow {
    pub id: u32,
    pub value: String,
}

/// Distinct values with identifiers in first-seen order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LookupTable {
    rows: Vec<LookupRow>,
    #[serde(skip)]
    index: HashMap<String, u32>,
}

impl LookupTable {
    /// Identifier of `value`, inserting it if new. Empty values have none.
    pub fn intern(&mut self, value: &str) -> Option<u32> {
        if value.is_empty() {
            return None;
        }
        if let Some(id) = self.index.get(value) {
            return Some(*id);
        }

        let id = self.rows.len() as u32 + 1;
        self.rows.push(LookupRow {
            id,
            value: value.to_string(),
        });
        self.index.insert(value.to_string(), id);
        Some(id)
    }

    pub fn get(&self, value: &str) -> Option<u32> {
        self.index.get(value).copied()
    }

    pub fn rows(&self) -> &[LookupRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The side tables holding package-to-package edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Depends,
    OptDepends,
    MakeDepends,
    Provides,
    Conflicts,
}

impl EdgeKind {
    pub const ALL: [EdgeKind; 5] = [
        EdgeKind::Depends,
        EdgeKind::OptDepends,
        EdgeKind::MakeDepends,
        EdgeKind::Provides,
        EdgeKind::Conflicts,
    ];

    fn raw_entries(self, pkg: &Package) -> &[String] {
        match self {
            EdgeKind::Depends => &pkg.depends,
            EdgeKind::OptDepends => &pkg.optdepends,
            EdgeKind::MakeDepends => &pkg.makedepends,
            EdgeKind::Provides => &pkg.provides,
            EdgeKind::Conflicts => &pkg.conflicts,
        }
    }
}

/// The normalized model handed to a sink.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableSet {
    pub packages: Vec<PackageRow>,
    pub depends: Vec<LinkRow>,
    pub optdepends: Vec<LinkRow>,
    pub makedepends: Vec<LinkRow>,
    pub provides: Vec<LinkRow>,
    pub conflicts: Vec<LinkRow>,
    pub licenses: Vec<LicenseRow>,
    pub packagers: LookupTable,
    pub repos: LookupTable,
}

impl TableSet {
    pub fn edges(&self, kind: EdgeKind) -> &[LinkRow] {
        match kind {
            EdgeKind::Depends => &self.depends,
            EdgeKind::OptDepends => &self.optdepends,
            EdgeKind::MakeDepends => &self.makedepends,
            EdgeKind::Provides => &self.provides,
            EdgeKind::Conflicts => &self.conflicts,
        }
    }

    fn edges_mut(&mut self, kind: EdgeKind) -> &mut Vec<LinkRow> {
        match kind {
            EdgeKind::Depends => &mut self.depends,
            EdgeKind::OptDepends => &mut self.optdepends,
            EdgeKind::MakeDepends => &mut self.makedepends,
            EdgeKind::Provides => &mut self.provides,
            EdgeKind::Conflicts => &mut self.conflicts,
        }
    }

    pub fn package(&self, name: &str) -> Option<&PackageRow> {
        self.packages.iter().find(|row| row.name == name)
    }
}

/// Projected corpus: the surviving package entities and their tables.
#[derive(Debug, Clone)]
pub struct Projection<'a> {
    pub packages: Vec<&'a Package>,
    pub tables: TableSet,
}

/// Deduplicate, resolve and tabulate a fully built corpus.
#[tracing::instrument(skip(corpus), fields(packages = corpus.len()))]
pub fn project(corpus: &Corpus) -> Projection<'_> {
    let packages = corpus.live_packages();
    let resolver = Resolver::new(packages.iter().copied());
    let mut tables = TableSet::default();

    for pkg in &packages {
        let packager = tables.packagers.intern(&pkg.packager);
        let repo = tables.repos.intern(&pkg.repo);

        tables.packages.push(PackageRow {
            id: pkg.id,
            name: pkg.name.clone(),
            base: pkg.base().map(str::to_string),
            version: pkg.version.clone(),
            repo,
            description: pkg.description.clone(),
            url: pkg.homepage.clone(),
            build_date: pkg.build_date,
            compressed_size: pkg.compressed_size,
            installed_size: pkg.installed_size,
            packager,
        });

        for kind in EdgeKind::ALL {
            let rows = kind.raw_entries(pkg).iter().map(|raw| {
                let link = match kind {
                    EdgeKind::OptDepends => resolver.resolve_optional(raw),
                    _ => resolver.resolve(raw),
                };
                LinkRow::new(pkg.id, link)
            });
            tables.edges_mut(kind).extend(rows);
        }

        tables
            .licenses
            .extend(pkg.licenses.iter().map(|license| LicenseRow {
                owner: pkg.id,
                license: license.trim().to_string(),
            }));
    }

    log::debug!(
        "projected {} packages, {} packagers, {} repos",
        tables.packages.len(),
        tables.packagers.len(),
        tables.repos.len()
    );

    Projection { packages, tables }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(name: &str, version: &str, repo: &str) -> Package {
        Package {
            name: name.to_string(),
            version: version.to_string(),
            repo: repo.to_string(),
            packager: "Alice <alice@example.org>".to_string(),
            build_date: -1,
            compressed_size: -1,
            installed_size: -1,
            ..Default::default()
        }
    }

    #[test]
    fn test_duplicate_name_keeps_first_repository() {
        let mut corpus = Corpus::new();
        corpus.push(pkg("X", "1.0-1", "A"));
        corpus.push(pkg("X", "2.0-1", "B"));

        let projection = project(&corpus);
        let rows: Vec<&PackageRow> = projection
            .tables
            .packages
            .iter()
            .filter(|r| r.name == "X")
            .collect();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].version, "1.0-1");
        assert_eq!(rows[0].id, 1);
        assert_eq!(projection.packages.len(), 1);
        // B's copy is dropped, so B never gets a repo id
        assert_eq!(projection.tables.repos.len(), 1);
    }

    #[test]
    fn test_identifiers_dense_without_filtering() {
        let mut corpus = Corpus::new();
        for name in ["a", "b", "c", "d"] {
            corpus.push(pkg(name, "1", "core"));
        }

        let projection = project(&corpus);
        let ids: Vec<u32> = projection.tables.packages.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_links_resolve_against_survivors() {
        let mut corpus = Corpus::new();
        let mut foo = pkg("foo", "1.0-1", "core");
        foo.depends = vec!["bar>=2.0".into(), "baz".into(), "libz.so=1-64".into()];
        foo.optdepends = vec!["bar: for bar things".into()];
        foo.makedepends = vec!["foo".into()];
        foo.provides = vec!["foo-git=1.0".into()];
        foo.conflicts = vec!["bar<1.0".into()];
        foo.licenses = vec!["GPL".into(), "custom:foo".into()];
        corpus.push(foo);
        corpus.push(pkg("bar", "2.1-1", "core"));
        corpus.push(pkg("bar", "9.0-1", "extra"));

        let tables = project(&corpus).tables;

        assert_eq!(
            tables.depends[0],
            LinkRow {
                owner: 1,
                name: "bar".into(),
                comparator: Comparator::Ge,
                version: "2.0".into(),
                target: Some(2),
            }
        );
        assert_eq!(tables.depends[1].target_id(), UNRESOLVED);
        assert_eq!(tables.depends[2].name, "libz.so");
        assert_eq!(tables.depends[2].target, None);
        assert_eq!(tables.optdepends[0].name, "bar");
        assert_eq!(tables.optdepends[0].target, Some(2));
        assert_eq!(tables.makedepends[0].target, Some(1));
        assert_eq!(tables.provides[0].comparator, Comparator::Eq);
        assert_eq!(tables.provides[0].target, None);
        assert_eq!(tables.conflicts[0].comparator, Comparator::Lt);
        assert_eq!(tables.conflicts[0].target_id(), 2);
        assert_eq!(tables.licenses.len(), 2);
        assert_eq!(tables.licenses[1].license, "custom:foo");
        assert_eq!(tables.edges(EdgeKind::Depends).len(), 3);
    }

    #[test]
    fn test_lookup_tables_reuse_identifiers() {
        let mut corpus = Corpus::new();
        corpus.push(pkg("a", "1", "core"));
        let mut b = pkg("b", "1", "extra");
        b.packager = "Bob <bob@example.org>".into();
        corpus.push(b);
        corpus.push(pkg("c", "1", "core"));
        let mut d = pkg("d", "1", "core");
        d.packager.clear();
        corpus.push(d);

        let projection = project(&corpus);
        let tables = &projection.tables;

        assert_eq!(tables.packagers.len(), 2);
        assert_eq!(tables.repos.len(), 2);
        assert_eq!(tables.package("a").unwrap().packager, Some(1));
        assert_eq!(tables.package("b").unwrap().packager, Some(2));
        assert_eq!(tables.package("c").unwrap().packager, Some(1));
        assert_eq!(tables.package("d").unwrap().packager, None);
        assert_eq!(tables.package("c").unwrap().repo, tables.repos.get("core"));
        assert_eq!(tables.package("b").unwrap().repo, Some(2));
        // source entities keep their names
        assert_eq!(projection.packages[0].packager, "Alice <alice@example.org>");
        assert_eq!(projection.packages[1].repo, "extra");
    }

    #[test]
    fn test_base_only_when_distinct() {
        let mut corpus = Corpus::new();
        let mut a = pkg("python-a", "1", "core");
        a.base = "python-split".into();
        corpus.push(a);
        corpus.push(pkg("b", "1", "core"));

        let tables = project(&corpus).tables;
        assert_eq!(tables.packages[0].base.as_deref(), Some("python-split"));
        assert_eq!(tables.packages[1].base, None);
    }

    #[test]
    fn test_lookup_table_ignores_empty_values() {
        let mut table = LookupTable::default();
        assert_eq!(table.intern(""), None);
        assert_eq!(table.intern("core"), Some(1));
        assert_eq!(table.intern("extra"), Some(2));
        assert_eq!(table.intern("core"), Some(1));
        assert_eq!(table.rows()[1].value, "extra");
        assert!(!table.is_empty());
    }

    #[test]
    fn test_projection_is_deterministic() {
        let mut corpus = Corpus::new();
        let mut a = pkg("a", "1", "core");
        a.depends = vec!["b".into(), "c>1".into()];
        corpus.push(a);
        corpus.push(pkg("b", "1", "extra"));

        let first = serde_json::to_string(&project(&corpus).tables).unwrap();
        let second = serde_json::to_string(&project(&corpus).tables).unwrap();
        assert_eq!(first, second);
    }
}
