//! Duplicate detection over the reconstructed state.
//!
//! A read-only query: live files are grouped by blake3 and groups with
//! more than one member are reported. No events are written.

use std::collections::BTreeMap;

use historify_chain::StateMap;

/// A group of live files sharing identical content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    /// The shared blake3 digest.
    pub blake3: String,
    /// Size of one instance, in bytes.
    pub size: u64,
    /// The `(category, path)` members, sorted.
    pub files: Vec<(String, String)>,
}

/// Group the reconstructed state by blake3 and report groups of size > 1.
#[must_use]
pub fn find_duplicates(state: &StateMap) -> Vec<DuplicateGroup> {
    let mut by_digest: BTreeMap<&str, (u64, Vec<(String, String)>)> = BTreeMap::new();
    for ((category, path), record) in state {
        by_digest
            .entry(record.digests.blake3.as_str())
            .or_insert_with(|| (record.size, Vec::new()))
            .1
            .push((category.clone(), path.clone()));
    }

    by_digest
        .into_iter()
        .filter(|(_, (_, files))| files.len() > 1)
        .map(|(blake3, (size, files))| DuplicateGroup {
            blake3: blake3.to_string(),
            size,
            files,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use historify_chain::TrackedFile;
    use historify_crypto::FileDigests;

    fn insert(state: &mut StateMap, category: &str, path: &str, content: &[u8]) {
        state.insert(
            (category.to_string(), path.to_string()),
            TrackedFile {
                digests: FileDigests::of_bytes(content),
                size: content.len() as u64,
                mtime: 0,
            },
        );
    }

    #[test]
    fn reports_only_groups_larger_than_one() {
        let mut state = StateMap::new();
        insert(&mut state, "docs", "a.txt", b"same\n");
        insert(&mut state, "docs", "copy/a.txt", b"same\n");
        insert(&mut state, "photos", "unique.jpg", b"unique\n");

        let groups = find_duplicates(&state);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].files.len(), 2);
        assert_eq!(groups[0].size, 5);
        assert_eq!(groups[0].blake3, FileDigests::of_bytes(b"same\n").blake3);
    }

    #[test]
    fn duplicates_across_categories_are_grouped() {
        let mut state = StateMap::new();
        insert(&mut state, "docs", "a.txt", b"shared\n");
        insert(&mut state, "photos", "b.txt", b"shared\n");

        let groups = find_duplicates(&state);
        assert_eq!(groups.len(), 1);
        assert_eq!(
            groups[0].files,
            vec![
                ("docs".to_string(), "a.txt".to_string()),
                ("photos".to_string(), "b.txt".to_string())
            ]
        );
    }

    #[test]
    fn empty_state_no_groups() {
        assert!(find_duplicates(&StateMap::new()).is_empty());
    }
}
