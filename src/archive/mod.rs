//! Reading repository databases (`<repo>.db`, a gzip-compressed tar archive).
//!
//! Every regular file in the archive is one descriptor record; directories
//! only group them per package and are skipped.

use anyhow::{Context, Result, bail};
use flate2::read::GzDecoder;
use log::debug;
use std::io::Read;
use tar::{Archive, EntryType};

const MAX_PREALLOC: u64 = 1 << 20;

/// Whether to keep reading after a descriptor has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Continue,
    Stop,
}

/// A descriptor read from the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorEntry {
    /// Path of the entry inside the archive, e.g. `pacman-6.0.2-5/desc`.
    pub path: String,
    pub content: String,
}

/// Stream the descriptor records of a compressed repository database.
///
/// Entries are visited in archive order until `visit` returns
/// [`Visit::Stop`] or the archive ends. Any framing problem (bad gzip
/// header, truncated data, unexpected entry type) is an error: the offsets
/// of everything after it can no longer be trusted.
#[tracing::instrument(skip(reader, visit))]
pub fn for_each_descriptor<R, F>(reader: R, mut visit: F) -> Result<()>
where
    R: Read,
    F: FnMut(DescriptorEntry) -> Result<Visit>,
{
    let mut archive = Archive::new(GzDecoder::new(reader));
    let entries = archive
        .entries()
        .context("Failed to read archive entries")?;

    for entry in entries {
        let mut entry = entry.context("Failed to read archive entry header")?;
        let path = entry
            .path()
            .context("Invalid entry path in archive")?
            .to_string_lossy()
            .into_owned();

        match entry.header().entry_type() {
            EntryType::Directory => {
                debug!("skipping directory {}", path);
                continue;
            }
            // bsdtar may lead with a pax global header; it carries no record
            EntryType::XGlobalHeader => {
                debug!("skipping pax global header {}", path);
                continue;
            }
            EntryType::Regular => {}
            other => bail!("Unsupported entry type {:?} for {}", other, path),
        }

        // the header size is untrusted; reserve at most one descriptor's worth
        let expected = entry.size();
        let mut buf = Vec::with_capacity(expected.min(MAX_PREALLOC) as usize);
        entry
            .read_to_end(&mut buf)
            .with_context(|| format!("Failed to read archive entry {}", path))?;
        if (buf.len() as u64) < expected {
            bail!(
                "Truncated archive entry {}: expected {} bytes, got {}",
                path,
                expected,
                buf.len()
            );
        }

        let content = String::from_utf8_lossy(&buf).into_owned();
        if visit(DescriptorEntry { path, content })? == Visit::Stop {
            debug!("stopping archive walk early");
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tar::Builder;

    /// Build an in-memory repository database. Each descriptor gets its own
    /// `<name>/` directory entry followed by a `<name>/desc` file.
    pub fn create_repo_db(descs: &[(&str, &str)]) -> Vec<u8> {
        let mut tar_builder = Builder::new(Vec::new());
        for (dir, content) in descs {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Directory);
            header.set_path(format!("{}/", dir)).unwrap();
            header.set_size(0);
            header.set_mode(0o755);
            header.set_cksum();
            tar_builder.append(&header, std::io::empty()).unwrap();

            let mut header = tar::Header::new_gnu();
            header.set_path(format!("{}/desc", dir)).unwrap();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            tar_builder.append(&header, content.as_bytes()).unwrap();
        }
        let tar = tar_builder.into_inner().unwrap();

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar).unwrap();
        encoder.finish().unwrap()
    }

    /// Minimal descriptor text for a package.
    pub fn desc(name: &str, version: &str) -> String {
        format!("%NAME%\n{}\n\n%VERSION%\n{}\n", name, version)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{create_repo_db, desc};
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tar::Builder;

    fn collect(bytes: &[u8]) -> Result<Vec<DescriptorEntry>> {
        let mut seen = Vec::new();
        for_each_descriptor(bytes, |entry| {
            seen.push(entry);
            Ok(Visit::Continue)
        })?;
        Ok(seen)
    }

    #[test]
    fn test_reads_regular_files_and_skips_directories() {
        let foo = desc("foo", "1.0-1");
        let bar = desc("bar", "2.0-1");
        let db = create_repo_db(&[("foo-1.0-1", &foo), ("bar-2.0-1", &bar)]);

        let entries = collect(&db).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "foo-1.0-1/desc");
        assert_eq!(entries[0].content, foo);
        assert_eq!(entries[1].path, "bar-2.0-1/desc");
    }

    #[test]
    fn test_stop_leaves_later_entries_unread() {
        let db = create_repo_db(&[("a", &desc("a", "1")), ("b", &desc("b", "1"))]);

        let mut visited = 0;
        for_each_descriptor(&db[..], |_| {
            visited += 1;
            Ok(Visit::Stop)
        })
        .unwrap();

        assert_eq!(visited, 1);
    }

    #[test]
    fn test_visitor_error_is_propagated() {
        let db = create_repo_db(&[("a", &desc("a", "1"))]);
        let result = for_each_descriptor(&db[..], |_| Err(anyhow::anyhow!("boom")));
        assert!(result.unwrap_err().to_string().contains("boom"));
    }

    #[test]
    fn test_not_gzip_is_an_error() {
        let result = collect(b"this is not a gzip stream");
        assert!(result.is_err());
    }

    #[test]
    fn test_truncated_archive_is_an_error() {
        let long: String = (0..2000).map(|i| format!("{:x}", i * 7919)).collect();
        let db = create_repo_db(&[("a", &desc("a", &long)), ("b", &desc("b", &long))]);
        let truncated = &db[..db.len() / 2];

        assert!(collect(truncated).is_err());
    }

    #[test]
    fn test_symlink_entry_is_an_error() {
        let mut tar_builder = Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_path("foo/desc").unwrap();
        header.set_link_name("../bar/desc").unwrap();
        header.set_size(0);
        header.set_cksum();
        tar_builder.append(&header, std::io::empty()).unwrap();
        let tar = tar_builder.into_inner().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar).unwrap();
        let db = encoder.finish().unwrap();

        let err = collect(&db).unwrap_err();
        assert!(err.to_string().contains("Unsupported entry type"));
    }

    #[test]
    fn test_oversized_entry_header_is_an_error() {
        let mut tar_builder = Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_path("foo/desc").unwrap();
        header.set_size(u64::MAX / 2);
        header.set_mode(0o644);
        header.set_cksum();
        tar_builder.append(&header, &[0u8; 1024][..]).unwrap();
        let tar = tar_builder.into_inner().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar).unwrap();
        let db = encoder.finish().unwrap();

        assert!(collect(&db).is_err());
    }

    #[test]
    fn test_empty_archive() {
        let db = create_repo_db(&[]);
        assert!(collect(&db).unwrap().is_empty());
    }
}
