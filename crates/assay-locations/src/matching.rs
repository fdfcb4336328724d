use assay_common::path::StoragePath;
use assay_crawler::Mount;

/// Longest-prefix lookup of locations against mount points.
///
/// Each mount is matched by its logical path (`dbfs:/mnt/...`) and by its
/// physical source, so a table registered under either form resolves to the
/// same mount.
pub(crate) struct MountIndex<'a> {
    entries: Vec<(StoragePath, &'a Mount)>,
    sources: Vec<StoragePath>,
}

impl<'a> MountIndex<'a> {
    pub fn new(mounts: &'a [Mount]) -> Self {
        let mut entries = vec![];
        let mut sources = vec![];
        for mount in mounts {
            if let Ok(path) = mount.path() {
                entries.push((path, mount));
            }
            if let Ok(source) = mount.source_path() {
                entries.push((source.clone(), mount));
                sources.push(source);
            }
        }
        Self { entries, sources }
    }

    pub fn sources(&self) -> &[StoragePath] {
        &self.sources
    }

    /// Returns the mount with the deepest prefix of `location`.
    /// The first listed mount wins between prefixes of equal depth.
    pub fn longest_match(&self, location: &StoragePath) -> Option<&'a Mount> {
        longest_prefix(location, self.entries.iter().map(|(path, mount)| (path, *mount)))
    }
}

/// Returns the deepest of `candidates` that equals or contains `location`.
pub(crate) fn longest_prefix<'a, T>(
    location: &StoragePath,
    candidates: impl IntoIterator<Item = (&'a StoragePath, T)>,
) -> Option<T> {
    let mut best: Option<(usize, T)> = None;
    for (prefix, item) in candidates {
        let deeper = best.as_ref().is_none_or(|(depth, _)| prefix.depth() > *depth);
        if deeper && location.starts_with(prefix) {
            best = Some((prefix.depth(), item));
        }
    }
    best.map(|(_, item)| item)
}
