//! Dependency, provision and conflict expressions (`glibc>=2.30`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version constraint operator of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Comparator {
    /// No constraint, the name alone.
    #[default]
    #[serde(rename = "")]
    Any,
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
}

impl Comparator {
    /// Detection order: two-character operators must be tried before the
    /// single characters they contain.
    const SCAN_ORDER: [Comparator; 5] = [
        Comparator::Ge,
        Comparator::Le,
        Comparator::Eq,
        Comparator::Lt,
        Comparator::Gt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Comparator::Any => "",
            Comparator::Eq => "=",
            Comparator::Lt => "<",
            Comparator::Gt => ">",
            Comparator::Le => "<=",
            Comparator::Ge => ">=",
        }
    }

    /// First operator of the scan order that occurs anywhere in `raw`.
    pub fn detect(raw: &str) -> Comparator {
        Self::SCAN_ORDER
            .into_iter()
            .find(|op| raw.contains(op.as_str()))
            .unwrap_or(Comparator::Any)
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed `{name, comparator, version}` triple.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DependencyExpr {
    pub name: String,
    pub comparator: Comparator,
    pub version: String,
}

impl DependencyExpr {
    /// Split a depends/makedepends/provides/conflicts entry.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let comparator = Comparator::detect(raw);

        match raw.split_once(comparator.as_str()) {
            Some((name, version)) if comparator != Comparator::Any => DependencyExpr {
                name: name.trim().to_string(),
                comparator,
                version: version.trim().to_string(),
            },
            _ => DependencyExpr {
                name: raw.to_string(),
                comparator: Comparator::Any,
                version: String::new(),
            },
        }
    }

    /// Split an optdepends entry, ignoring its `: explanation` suffix.
    pub fn parse_optional(raw: &str) -> Self {
        let head = raw.split_once(':').map_or(raw, |(head, _)| head);
        Self::parse(head)
    }

    pub fn is_constrained(&self) -> bool {
        self.comparator != Comparator::Any
    }
}

impl fmt::Display for DependencyExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.name, self.comparator, self.version)
    }
}
