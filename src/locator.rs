use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use walkdir::{DirEntry, WalkDir};

use crate::manifest::parser_for;
use crate::models::Provider;

#[cfg(unix)]
type DirKey = (u64, u64);
#[cfg(not(unix))]
type DirKey = PathBuf;

/// Walk `root` and yield every manifest belonging to one of `providers`.
///
/// Symlinks are followed, but each physical directory is entered at most
/// once. Directories named in `skip_dirs` are pruned. The walk is lazy and
/// sorted by file name.
pub fn locate(
    root: &Path,
    providers: &[Provider],
    skip_dirs: &[String],
) -> Result<impl Iterator<Item = (Provider, PathBuf)>> {
    if !root.exists() {
        bail!("path does not exist: {}", root.display());
    }

    let providers = providers.to_vec();
    let skip_dirs = skip_dirs.to_vec();
    let mut visited: HashSet<DirKey> = HashSet::new();

    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| {
            if !entry.file_type().is_dir() {
                return true;
            }
            if entry.depth() > 0 {
                let name = entry.file_name().to_string_lossy();
                if skip_dirs.iter().any(|s| *s == name) {
                    tracing::debug!("skipping {}", entry.path().display());
                    return false;
                }
            }
            match dir_key(entry) {
                Some(key) => visited.insert(key),
                None => true,
            }
        });

    Ok(walker.filter_map(move |entry| {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("skipping unreadable entry: {}", e);
                return None;
            }
        };
        if !entry.file_type().is_file() {
            return None;
        }
        let file_name = entry.file_name().to_str()?;
        providers
            .iter()
            .copied()
            .find(|p| parser_for(*p).matches(file_name))
            .map(|p| (p, entry.into_path()))
    }))
}

#[cfg(unix)]
fn dir_key(entry: &DirEntry) -> Option<DirKey> {
    use std::os::unix::fs::MetadataExt;
    entry.metadata().ok().map(|m| (m.dev(), m.ino()))
}

#[cfg(not(unix))]
fn dir_key(entry: &DirEntry) -> Option<DirKey> {
    entry.path().canonicalize().ok()
}
