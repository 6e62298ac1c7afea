//! Resolving expression names to package identifiers.

use serde::Serialize;
use std::collections::HashMap;

use crate::package::{DependencyExpr, Package};

/// Names containing this marker are shared-object sonames, not packages.
pub const SONAME_MARKER: &str = ".so";

/// An expression together with the package it points at, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedLink {
    #[serde(flatten)]
    pub expr: DependencyExpr,
    pub target: Option<u32>,
}

impl ResolvedLink {
    pub fn is_resolved(&self) -> bool {
        self.target.is_some()
    }
}

/// Name to identifier index over a package set.
///
/// Lookups are exact and case-sensitive. Should the set contain the same name
/// twice, the first package handed to [`Resolver::new`] wins.
#[derive(Debug, Default, Clone)]
pub struct Resolver {
    index: HashMap<String, u32>,
}

impl Resolver {
    pub fn new<'a, I>(packages: I) -> Self
    where
        I: IntoIterator<Item = &'a Package>,
    {
        let mut index = HashMap::new();
        for pkg in packages {
            index.entry(pkg.name.clone()).or_insert(pkg.id);
        }
        Self { index }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Identifier of the package called `name`. Sonames never resolve.
    pub fn lookup(&self, name: &str) -> Option<u32> {
        if name.contains(SONAME_MARKER) {
            return None;
        }
        self.index.get(name).copied()
    }

    /// Parse and resolve a depends/makedepends/provides/conflicts entry.
    pub fn resolve(&self, raw: &str) -> ResolvedLink {
        self.link(DependencyExpr::parse(raw))
    }

    /// Parse and resolve an optdepends entry.
    pub fn resolve_optional(&self, raw: &str) -> ResolvedLink {
        self.link(DependencyExpr::parse_optional(raw))
    }

    fn link(&self, expr: DependencyExpr) -> ResolvedLink {
        let target = self.lookup(&expr.name);
        ResolvedLink { expr, target }
    }
}
