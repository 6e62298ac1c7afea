//! Descriptor record decoding.
//!
//! A descriptor is a sequence of blocks separated by blank lines. The first
//! line of a block is a `%FIELD%` marker, the remaining lines are its values:
//!
//! ```text
//! %NAME%
//! pacman
//!
//! %DEPENDS%
//! glibc
//! curl
//! ```

use std::collections::HashMap;

/// Value of integer fields that are absent or not a number.
pub const INTEGER_SENTINEL: i64 = -1;

/// How the value lines of a field are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// First value line, trimmed.
    Scalar,
    /// Every value line, trimmed.
    List,
    /// Every value line, trimmed, with any `: explanation` suffix dropped.
    AnnotatedList,
    /// First value line parsed as an integer.
    Integer,
}

/// Descriptor fields known to the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Filename,
    Name,
    Base,
    Version,
    Desc,
    Url,
    Arch,
    Packager,
    License,
    Depends,
    OptDepends,
    MakeDepends,
    Provides,
    Conflicts,
    BuildDate,
    CSize,
    ISize,
}

impl Field {
    /// Marker name as it appears between percent signs.
    pub fn key(self) -> &'static str {
        match self {
            Field::Filename => "FILENAME",
            Field::Name => "NAME",
            Field::Base => "BASE",
            Field::Version => "VERSION",
            Field::Desc => "DESC",
            Field::Url => "URL",
            Field::Arch => "ARCH",
            Field::Packager => "PACKAGER",
            Field::License => "LICENSE",
            Field::Depends => "DEPENDS",
            Field::OptDepends => "OPTDEPENDS",
            Field::MakeDepends => "MAKEDEPENDS",
            Field::Provides => "PROVIDES",
            Field::Conflicts => "CONFLICTS",
            Field::BuildDate => "BUILDDATE",
            Field::CSize => "CSIZE",
            Field::ISize => "ISIZE",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::Filename
            | Field::Name
            | Field::Base
            | Field::Version
            | Field::Desc
            | Field::Url
            | Field::Arch
            | Field::Packager => FieldKind::Scalar,
            // "pkg: why you might want it"
            Field::OptDepends => FieldKind::AnnotatedList,
            // Licenses ("custom:foo") and versions with an epoch ("1:2.0")
            // legitimately contain colons.
            Field::License
            | Field::Depends
            | Field::MakeDepends
            | Field::Provides
            | Field::Conflicts => FieldKind::List,
            Field::BuildDate | Field::CSize | Field::ISize => FieldKind::Integer,
        }
    }
}

/// Raw field map of one descriptor: marker name to value lines.
#[derive(Debug, Default)]
pub struct DescFields<'a> {
    fields: HashMap<String, Vec<&'a str>>,
}

impl<'a> DescFields<'a> {
    /// Split descriptor text into blocks. A repeated marker replaces the
    /// earlier block.
    pub fn parse(text: &'a str) -> Self {
        let mut fields = HashMap::new();
        let mut current: Option<(String, Vec<&'a str>)> = None;

        for line in text.lines() {
            if line.trim().is_empty() {
                if let Some((key, values)) = current.take() {
                    fields.insert(key, values);
                }
                continue;
            }

            match current.as_mut() {
                Some((_, values)) => values.push(line),
                None => current = Some((line.replace('%', "").trim().to_string(), Vec::new())),
            }
        }

        if let Some((key, values)) = current {
            fields.insert(key, values);
        }

        Self { fields }
    }

    /// Raw value lines of a marker, if present.
    pub fn get(&self, key: &str) -> Option<&[&'a str]> {
        self.fields.get(key).map(Vec::as_slice)
    }

    pub fn scalar(&self, field: Field) -> String {
        self.get(field.key())
            .and_then(|values| values.first())
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    }

    pub fn list(&self, field: Field) -> Vec<String> {
        let strip_annotation = field.kind() == FieldKind::AnnotatedList;

        self.get(field.key())
            .unwrap_or_default()
            .iter()
            .map(|line| {
                let value = if strip_annotation {
                    line.split_once(':').map_or(*line, |(head, _)| head)
                } else {
                    *line
                };
                value.trim().to_string()
            })
            .filter(|value| !value.is_empty())
            .collect()
    }

    pub fn integer(&self, field: Field) -> i64 {
        self.get(field.key())
            .and_then(|values| values.first())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(INTEGER_SENTINEL)
    }
}
