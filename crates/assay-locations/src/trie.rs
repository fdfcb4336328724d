use std::collections::BTreeMap;

use assay_common::path::StoragePath;
use assay_crawler::error::TopologyWarning;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryKind {
    Table,
    Mount,
}

#[derive(Debug, Default)]
struct Node {
    children: BTreeMap<String, usize>,
    /// Entries located exactly at this node.
    tables: usize,
    mounts: usize,
    /// Entries located at or below this node.
    subtree_tables: usize,
    subtree_mounts: usize,
}

impl Node {
    fn here(&self) -> usize {
        self.tables + self.mounts
    }

    fn total(&self) -> usize {
        self.subtree_tables + self.subtree_mounts
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LocationRoot {
    pub path: StoragePath,
    pub table_count: usize,
    pub mount_count: usize,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Reduction {
    /// Roots are never placed above this many segments below the authority,
    /// unless an entry sits exactly there.
    pub min_depth: usize,
    pub isolation_threshold: Option<usize>,
}

#[derive(Debug, Default)]
pub(crate) struct Reduced {
    pub roots: Vec<LocationRoot>,
    pub warnings: Vec<TopologyWarning>,
}

/// A prefix trie of the locations under one `scheme://authority`.
/// Nodes live in an arena and refer to each other by index.
pub(crate) struct LocationTrie {
    root: StoragePath,
    nodes: Vec<Node>,
}

impl LocationTrie {
    pub fn new(root: StoragePath) -> Self {
        Self {
            root,
            nodes: vec![Node::default()],
        }
    }

    /// Adds an entry. `path` must share the scheme and authority of the trie.
    pub fn insert(&mut self, path: &StoragePath, kind: EntryKind) {
        let mut index = 0;
        self.count(index, kind);
        for segment in path.segments() {
            index = match self.nodes[index].children.get(segment) {
                Some(&child) => child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(Node::default());
                    self.nodes[index].children.insert(segment.clone(), child);
                    child
                }
            };
            self.count(index, kind);
        }
        match kind {
            EntryKind::Table => self.nodes[index].tables += 1,
            EntryKind::Mount => self.nodes[index].mounts += 1,
        }
    }

    fn count(&mut self, index: usize, kind: EntryKind) {
        match kind {
            EntryKind::Table => self.nodes[index].subtree_tables += 1,
            EntryKind::Mount => self.nodes[index].subtree_mounts += 1,
        }
    }

    /// Reduces the entries to a set of non-overlapping roots covering all of them.
    pub fn reduce(&self, reduction: &Reduction) -> Reduced {
        let mut reduced = Reduced::default();
        self.visit(0, self.root.clone(), reduction, &mut reduced);
        reduced
    }

    fn visit(&self, index: usize, path: StoragePath, reduction: &Reduction, out: &mut Reduced) {
        let node = &self.nodes[index];
        if node.total() == 0 {
            return;
        }
        if path.depth() < reduction.min_depth {
            if node.here() > 0 {
                out.roots.push(self.promote(index, path));
            } else {
                self.visit_children(index, &path, reduction, out);
            }
            return;
        }
        if let Some(root) = self.single_location(index, &path) {
            out.roots.push(root);
            return;
        }
        if node.here() == 0 && node.children.len() == 1 {
            self.visit_children(index, &path, reduction, out);
            return;
        }
        let isolated = reduction.isolation_threshold.is_some_and(|threshold| {
            node.children
                .values()
                .any(|&child| self.nodes[child].total() >= threshold)
        });
        if isolated {
            if node.here() == 0 {
                self.visit_children(index, &path, reduction, out);
                return;
            }
            out.warnings.push(TopologyWarning::new(
                path.to_string(),
                format!(
                    "{} locations sit above isolated subtrees, keeping a single root",
                    node.here()
                ),
            ));
        }
        out.roots.push(self.promote(index, path));
    }

    fn visit_children(
        &self,
        index: usize,
        path: &StoragePath,
        reduction: &Reduction,
        out: &mut Reduced,
    ) {
        for (segment, &child) in &self.nodes[index].children {
            self.visit(child, path.join(segment.clone()), reduction, out);
        }
    }

    fn promote(&self, index: usize, path: StoragePath) -> LocationRoot {
        let node = &self.nodes[index];
        LocationRoot {
            path,
            table_count: node.subtree_tables,
            mount_count: node.subtree_mounts,
        }
    }

    /// The root for a subtree whose entries all sit at one location: the
    /// parent directory of tables, or a mount source itself, never above
    /// the subtree. Returns `None` when the entries are spread out.
    fn single_location(&self, index: usize, path: &StoragePath) -> Option<LocationRoot> {
        let floor = path.depth();
        let mut index = index;
        let mut leaf = path.clone();
        while self.nodes[index].here() == 0 {
            let mut next = self.nodes[index]
                .children
                .iter()
                .filter(|&(_, &child)| self.nodes[child].total() > 0);
            let (segment, &child) = next.next()?;
            if next.next().is_some() {
                return None;
            }
            leaf = leaf.join(segment.clone());
            index = child;
        }
        let node = &self.nodes[index];
        if node.here() != node.total() {
            return None;
        }
        let path = if node.mounts == 0 {
            leaf.truncate(leaf.depth().saturating_sub(1).max(floor))
        } else {
            leaf
        };
        Some(LocationRoot {
            path,
            table_count: node.tables,
            mount_count: node.mounts,
        })
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use EntryKind::{Mount, Table};

    fn reduce(
        locations: &[(&str, EntryKind)],
        min_depth: usize,
        isolation_threshold: Option<usize>,
    ) -> Reduced {
        let first = StoragePath::parse(locations[0].0).unwrap();
        let mut trie = LocationTrie::new(first.root());
        for (location, kind) in locations {
            trie.insert(&StoragePath::parse(location).unwrap(), *kind);
        }
        trie.reduce(&Reduction {
            min_depth,
            isolation_threshold,
        })
    }

    fn roots(reduced: &Reduced) -> Vec<(String, usize, usize)> {
        reduced
            .roots
            .iter()
            .map(|x| (x.path.to_string(), x.table_count, x.mount_count))
            .collect()
    }

    #[test]
    fn test_sibling_tables_share_a_root() {
        let reduced = reduce(
            &[
                ("s3://bkt/x/t1", Table),
                ("s3://bkt/x/t2", Table),
                ("s3://bkt/y/t3", Table),
            ],
            1,
            None,
        );
        assert_eq!(
            roots(&reduced),
            vec![
                ("s3://bkt/x".to_string(), 2, 0),
                ("s3://bkt/y".to_string(), 1, 0),
            ]
        );
        assert!(reduced.warnings.is_empty());
    }

    #[test]
    fn test_single_branch_descends() {
        let reduced = reduce(
            &[
                ("s3://bkt/a/b/c/t1", Table),
                ("s3://bkt/a/b/c/t2", Table),
                ("s3://bkt/a/b/d/e/f/t3", Table),
            ],
            1,
            None,
        );
        assert_eq!(roots(&reduced), vec![("s3://bkt/a/b".to_string(), 3, 0)]);
    }

    #[test]
    fn test_single_table_uses_parent_directory() {
        let reduced = reduce(&[("gs://bkt/deep/path/to/t1", Table)], 1, None);
        assert_eq!(
            roots(&reduced),
            vec![("gs://bkt/deep/path/to".to_string(), 1, 0)]
        );
        let reduced = reduce(&[("gs://bkt/t1", Table)], 1, None);
        assert_eq!(roots(&reduced), vec![("gs://bkt/t1".to_string(), 1, 0)]);
        let reduced = reduce(&[("gs://bkt/a/t1", Table)], 2, None);
        assert_eq!(roots(&reduced), vec![("gs://bkt/a/t1".to_string(), 1, 0)]);
    }

    #[test]
    fn test_tables_sharing_a_location_use_parent_directory() {
        let reduced = reduce(&[("s3://b/x/t1", Table), ("s3://b/x/t1", Table)], 1, None);
        assert_eq!(roots(&reduced), vec![("s3://b/x".to_string(), 2, 0)]);
        let reduced = reduce(&[("s3://b/x/t1", Table), ("s3://b/x/t1", Mount)], 1, None);
        assert_eq!(roots(&reduced), vec![("s3://b/x/t1".to_string(), 1, 1)]);
    }

    #[test]
    fn test_mount_source_is_its_own_root() {
        let reduced = reduce(&[("s3://raw/landing/zone", Mount)], 1, None);
        assert_eq!(
            roots(&reduced),
            vec![("s3://raw/landing/zone".to_string(), 0, 1)]
        );
    }

    #[test]
    fn test_min_depth_keeps_roots_below_authority() {
        let reduced = reduce(&[("s3://bkt/x/t1", Table), ("s3://bkt/y/t2", Table)], 1, None);
        assert_eq!(
            roots(&reduced),
            vec![
                ("s3://bkt/x".to_string(), 1, 0),
                ("s3://bkt/y".to_string(), 1, 0),
            ]
        );
        let reduced = reduce(&[("s3://bkt/x/t1", Table), ("s3://bkt/y/t2", Table)], 0, None);
        assert_eq!(roots(&reduced), vec![("s3://bkt".to_string(), 2, 0)]);
    }

    #[test]
    fn test_entry_at_authority_covers_everything() {
        let reduced = reduce(&[("s3://bkt", Mount), ("s3://bkt/x/t1", Table)], 1, None);
        assert_eq!(roots(&reduced), vec![("s3://bkt".to_string(), 1, 1)]);
    }

    #[test]
    fn test_isolation_threshold_splits_large_subtrees() {
        let locations = [
            ("s3://b/x/a/t1", Table),
            ("s3://b/x/a/t2", Table),
            ("s3://b/x/c/t3", Table),
        ];
        let merged = reduce(&locations, 1, None);
        assert_eq!(roots(&merged), vec![("s3://b/x".to_string(), 3, 0)]);

        let isolated = reduce(&locations, 1, Some(2));
        assert_eq!(
            roots(&isolated),
            vec![
                ("s3://b/x/a".to_string(), 2, 0),
                ("s3://b/x/c".to_string(), 1, 0),
            ]
        );
    }

    #[test]
    fn test_isolation_with_entry_on_node_warns() {
        let reduced = reduce(
            &[
                ("s3://b/x", Table),
                ("s3://b/x/a/t1", Table),
                ("s3://b/x/a/t2", Table),
            ],
            1,
            Some(2),
        );
        assert_eq!(roots(&reduced), vec![("s3://b/x".to_string(), 3, 0)]);
        assert_eq!(reduced.warnings.len(), 1);
        assert_eq!(reduced.warnings[0].subject, "s3://b/x");
    }
}
