//! Package entities decoded from repository descriptor records.
//!
//! A repository database (`core.db`, `extra.db`, ...) is a compressed tar
//! archive holding one `desc` file per package. This module turns the text of
//! such a file into a [`Package`] and splits dependency strings into
//! [`DependencyExpr`] triples.

mod desc;
mod expr;

use serde::{Deserialize, Serialize};

pub use desc::{DescFields, Field, FieldKind, INTEGER_SENTINEL};
pub use expr::{Comparator, DependencyExpr};

/// One package as described by a repository database entry.
///
/// Serialized with the upper-case descriptor field names so the JSON export
/// reads like the descriptor it came from.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "UPPERCASE")]
pub struct Package {
    /// Identifier assigned by the corpus, 1-based in discovery order.
    #[serde(skip)]
    pub id: u32,
    /// Path of the archive entry this package was read from.
    #[serde(skip)]
    pub entry: String,
    pub filename: String,
    pub name: String,
    /// Base package name; empty when it matches `name`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub base: String,
    pub version: String,
    #[serde(rename = "DESC")]
    pub description: String,
    pub repo: String,
    #[serde(rename = "URL", default, skip_serializing_if = "String::is_empty")]
    pub homepage: String,
    #[serde(rename = "LICENSE", default, skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<String>,
    pub arch: String,
    pub packager: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub optdepends: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub makedepends: Vec<String>,
    #[serde(rename = "BUILDDATE")]
    pub build_date: i64,
    #[serde(rename = "ISIZE")]
    pub installed_size: i64,
    #[serde(rename = "CSIZE")]
    pub compressed_size: i64,
}

impl Package {
    /// Decode the text of one descriptor record.
    ///
    /// Never fails: missing fields become empty strings or lists and
    /// malformed numbers become [`INTEGER_SENTINEL`]. The identifier is left
    /// at 0 until the corpus assigns one.
    pub fn from_desc(text: &str, repo: &str, entry: &str) -> Self {
        let fields = DescFields::parse(text);

        let name = fields.scalar(Field::Name);
        let mut base = fields.scalar(Field::Base);
        if base == name {
            base.clear();
        }

        Package {
            id: 0,
            entry: entry.to_string(),
            filename: fields.scalar(Field::Filename),
            name,
            base,
            version: fields.scalar(Field::Version),
            description: fields.scalar(Field::Desc),
            repo: repo.to_string(),
            homepage: fields.scalar(Field::Url),
            licenses: fields.list(Field::License),
            arch: fields.scalar(Field::Arch),
            packager: fields.scalar(Field::Packager),
            provides: fields.list(Field::Provides),
            conflicts: fields.list(Field::Conflicts),
            depends: fields.list(Field::Depends),
            optdepends: fields.list(Field::OptDepends),
            makedepends: fields.list(Field::MakeDepends),
            build_date: fields.integer(Field::BuildDate),
            installed_size: fields.integer(Field::ISize),
            compressed_size: fields.integer(Field::CSize),
        }
    }

    /// Base package name, `None` unless it differs from the package name.
    pub fn base(&self) -> Option<&str> {
        if self.base.is_empty() || self.base == self.name {
            None
        } else {
            Some(&self.base)
        }
    }
}
