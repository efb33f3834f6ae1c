//! Dataset walker: turns the input tree into groups and each group into its
//! residual work list (inputs whose derived output does not exist yet).

mod filter;
mod naming;

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

pub use filter::EntryFilter;
pub use naming::{is_staging_name, staging_name, OutputNaming};

use crate::error::EnumerationError;
use crate::types::{GroupSpec, WorkItem};

/// Two or more inputs of one group that derive the same output name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    pub output_name: String,
    pub inputs: Vec<PathBuf>,
}

/// Result of diffing a group's input against its output.
#[derive(Debug, Clone, Default)]
pub struct Residual {
    /// Items still to be produced, sorted by input path.
    pub pending: Vec<WorkItem>,
    /// Inputs whose output already exists.
    pub already_done: usize,
    /// Inputs excluded from scheduling because their output name is ambiguous.
    pub collisions: Vec<Collision>,
}

impl Residual {
    pub fn discovered(&self) -> usize {
        self.pending.len()
            + self.already_done
            + self.collisions.iter().map(|c| c.inputs.len()).sum::<usize>()
    }
}

/// Groups found under an input root, plus subtrees that could not be listed.
#[derive(Debug, Default)]
pub struct Discovery {
    pub groups: Vec<GroupSpec>,
    pub failures: Vec<(String, EnumerationError)>,
}

/// Discover groups `depth` levels below `input_root`.
///
/// Only the root itself is required to be readable; an unreadable
/// intermediate directory is returned in `failures` and the rest of the tree
/// is still discovered.
pub fn discover_groups(
    input_root: &Path,
    output_root: &Path,
    depth: usize,
) -> Result<Discovery, EnumerationError> {
    let mut discovery = Discovery::default();
    let mut frontier: Vec<String> = list_subdirs(input_root)?;

    for _ in 1..depth.max(1) {
        let mut next = Vec::new();
        for parent in frontier {
            let dir = input_root.join(&parent);
            match list_subdirs(&dir) {
                Ok(children) => next.extend(children.into_iter().map(|c| format!("{parent}/{c}"))),
                Err(e) => discovery.failures.push((parent, e)),
            }
        }
        frontier = next;
    }

    frontier.sort();
    discovery.groups = frontier
        .iter()
        .map(|id| GroupSpec::under(id, input_root, output_root))
        .collect();
    Ok(discovery)
}

fn list_subdirs(dir: &Path) -> Result<Vec<String>, EnumerationError> {
    let mut names = Vec::new();
    for entry in read_entries(dir)? {
        if entry.is_dir && !entry.name.starts_with('.') {
            names.push(entry.name);
        } else {
            tracing::trace!(path = %entry.path.display(), "skipping non-group entry");
        }
    }
    names.sort();
    Ok(names)
}

struct Entry {
    name: String,
    path: PathBuf,
    is_dir: bool,
}

fn read_entries(dir: &Path) -> Result<Vec<Entry>, EnumerationError> {
    let rd = std::fs::read_dir(dir).map_err(|e| EnumerationError::unreadable(dir, e))?;
    let mut out = Vec::new();
    for entry in rd {
        let entry = entry.map_err(|e| EnumerationError::unreadable(dir, e))?;
        let path = entry.path();
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            tracing::warn!(path = %path.display(), "skipping entry with non UTF-8 name");
            continue;
        };
        // Follow symlinks so linked series directories count as directories.
        let is_dir = std::fs::metadata(&path)
            .map(|m| m.is_dir())
            .unwrap_or(false);
        out.push(Entry { name, path, is_dir });
    }
    Ok(out)
}

fn existing_outputs(dir: &Path) -> Result<HashSet<String>, EnumerationError> {
    match std::fs::read_dir(dir) {
        Ok(rd) => {
            let mut names = HashSet::new();
            for entry in rd {
                let entry = entry.map_err(|e| EnumerationError::Unreadable {
                    path: dir.to_path_buf(),
                    source: e,
                })?;
                if let Some(name) = entry.file_name().to_str() {
                    if !is_staging_name(name) {
                        names.insert(name.to_string());
                    }
                }
            }
            Ok(names)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashSet::new()),
        Err(e) => Err(EnumerationError::Unreadable {
            path: dir.to_path_buf(),
            source: e,
        }),
    }
}

/// Read-only diff of a group's input against its output directory.
///
/// A missing output directory means nothing has been produced yet.
pub fn scan(
    group: &GroupSpec,
    filter: &EntryFilter,
    naming: &OutputNaming,
) -> Result<Residual, EnumerationError> {
    let done = existing_outputs(&group.output_dir)?;

    let mut by_output: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for entry in read_entries(&group.input_dir)? {
        if !filter.accepts(&entry.name, entry.is_dir) {
            continue;
        }
        by_output
            .entry(naming.output_name(&entry.name))
            .or_default()
            .push(entry.path);
    }

    let mut residual = Residual::default();
    for (output_name, mut inputs) in by_output {
        if inputs.len() > 1 && done.contains(&output_name) {
            // Settled by an earlier run (or by hand); nothing left to decide.
            tracing::warn!(
                group = %group.id,
                output = %output_name,
                inputs = inputs.len(),
                "colliding inputs share an existing output, counting them as done"
            );
            residual.already_done += inputs.len();
        } else if inputs.len() > 1 {
            inputs.sort();
            residual.collisions.push(Collision {
                output_name,
                inputs,
            });
        } else if done.contains(&output_name) {
            residual.already_done += 1;
        } else if let Some(input_path) = inputs.pop() {
            residual.pending.push(WorkItem {
                input_path,
                group_id: group.id.clone(),
                output_name,
                output_dir: group.output_dir.clone(),
            });
        }
    }
    residual
        .pending
        .sort_by(|a, b| a.input_path.cmp(&b.input_path));
    Ok(residual)
}

/// Prepare a group for scheduling: create its output directory if absent,
/// then compute the residual work list.
pub fn enumerate(
    group: &GroupSpec,
    filter: &EntryFilter,
    naming: &OutputNaming,
) -> Result<Residual, EnumerationError> {
    if !group.input_dir.is_dir() {
        return Err(EnumerationError::MissingInput(group.input_dir.clone()));
    }
    std::fs::create_dir_all(&group.output_dir).map_err(|e| EnumerationError::CreateOutput {
        path: group.output_dir.clone(),
        source: e,
    })?;
    scan(group, filter, naming)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EntryKind;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    fn pending_names(r: &Residual) -> Vec<String> {
        r.pending.iter().map(|w| w.input_name()).collect()
    }

    #[test]
    fn test_residual_is_input_minus_output() {
        let tmp = tempfile::tempdir().unwrap();
        let group = GroupSpec::new("g", tmp.path().join("in"), tmp.path().join("out"));
        for n in ["a", "b", "c"] {
            touch(&group.input_dir.join(n));
        }
        touch(&group.output_dir.join("b"));

        let r = scan(&group, &EntryFilter::default(), &OutputNaming::identity()).unwrap();
        assert_eq!(pending_names(&r), vec!["a", "c"]);
        assert_eq!(r.already_done, 1);
        assert_eq!(r.discovered(), 3);
        assert_eq!(r.pending[0].output_path(), group.output_dir.join("a"));
    }

    #[test]
    fn test_scan_without_output_dir_does_not_create_it() {
        let tmp = tempfile::tempdir().unwrap();
        let group = GroupSpec::new("g", tmp.path().join("in"), tmp.path().join("out"));
        touch(&group.input_dir.join("a"));

        let r = scan(&group, &EntryFilter::default(), &OutputNaming::identity()).unwrap();
        assert_eq!(r.pending.len(), 1);
        assert!(!group.output_dir.exists());
    }

    #[test]
    fn test_enumerate_creates_output_and_keeps_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let group = GroupSpec::new("g", tmp.path().join("in"), tmp.path().join("out"));
        touch(&group.input_dir.join("img2"));
        touch(&group.output_dir.join("img2_out"));

        let naming = OutputNaming::with_suffix("_out");
        let r = enumerate(&group, &EntryFilter::default(), &naming).unwrap();
        assert!(r.pending.is_empty());
        assert_eq!(r.already_done, 1);
        assert_eq!(fs::read(group.output_dir.join("img2_out")).unwrap(), b"x");

        // second call is a no-op on the filesystem
        enumerate(&group, &EntryFilter::default(), &naming).unwrap();
    }

    #[test]
    fn test_missing_input_is_enumeration_error() {
        let tmp = tempfile::tempdir().unwrap();
        let group = GroupSpec::new("g", tmp.path().join("nope"), tmp.path().join("out"));
        let err = enumerate(&group, &EntryFilter::default(), &OutputNaming::identity()).unwrap_err();
        assert!(matches!(err, EnumerationError::MissingInput(_)));
        assert!(!group.output_dir.exists());
    }

    #[test]
    fn test_staging_files_do_not_count_as_done() {
        let tmp = tempfile::tempdir().unwrap();
        let group = GroupSpec::new("g", tmp.path().join("in"), tmp.path().join("out"));
        touch(&group.input_dir.join("a"));
        touch(&group.output_dir.join(staging_name("a")));

        let r = scan(&group, &EntryFilter::default(), &OutputNaming::identity()).unwrap();
        assert_eq!(pending_names(&r), vec!["a"]);
    }

    #[test]
    fn test_collisions_are_not_scheduled() {
        let tmp = tempfile::tempdir().unwrap();
        let group = GroupSpec::new("g", tmp.path().join("in"), tmp.path().join("out"));
        for n in ["t1.nii", "t1.nii.gz", "t2.nii"] {
            touch(&group.input_dir.join(n));
        }
        let naming = OutputNaming::with_suffix(".nii.gz").stripping_extension();
        let r = scan(&group, &EntryFilter::default(), &naming).unwrap();

        assert_eq!(pending_names(&r), vec!["t2.nii"]);
        assert_eq!(r.collisions.len(), 1);
        assert_eq!(r.collisions[0].output_name, "t1.nii.gz");
        assert_eq!(r.collisions[0].inputs.len(), 2);
        assert_eq!(r.discovered(), 3);
    }

    #[test]
    fn test_collision_with_existing_output_counts_as_done() {
        let tmp = tempfile::tempdir().unwrap();
        let group = GroupSpec::new("g", tmp.path().join("in"), tmp.path().join("out"));
        for n in ["t1.nii", "t1.nii.gz", "t2.nii"] {
            touch(&group.input_dir.join(n));
        }
        touch(&group.output_dir.join("t1.nii.gz"));
        let naming = OutputNaming::with_suffix(".nii.gz").stripping_extension();
        let r = scan(&group, &EntryFilter::default(), &naming).unwrap();

        assert!(r.collisions.is_empty());
        assert_eq!(r.already_done, 2);
        assert_eq!(pending_names(&r), vec!["t2.nii"]);
        assert_eq!(r.discovered(), 3);
    }

    #[test]
    fn test_entry_kind_dirs_only() {
        let tmp = tempfile::tempdir().unwrap();
        let group = GroupSpec::new("g", tmp.path().join("in"), tmp.path().join("out"));
        fs::create_dir_all(group.input_dir.join("I001")).unwrap();
        touch(&group.input_dir.join("readme.txt"));

        let r = scan(&group, &EntryFilter::new(EntryKind::Dirs), &OutputNaming::with_suffix(".nii.gz"))
            .unwrap();
        assert_eq!(pending_names(&r), vec!["I001"]);
        assert_eq!(r.pending[0].output_name, "I001.nii.gz");
    }

    #[test]
    fn test_discover_depth_one_and_two() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("DICOM");
        let out = tmp.path().join("NIFTI");
        fs::create_dir_all(root.join("sub-02/MPRAGE")).unwrap();
        fs::create_dir_all(root.join("sub-01/MPRAGE")).unwrap();
        fs::create_dir_all(root.join("sub-01/FLAIR")).unwrap();
        touch(&root.join("manifest.csv"));

        let d1 = discover_groups(&root, &out, 1).unwrap();
        let ids: Vec<_> = d1.groups.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["sub-01", "sub-02"]);

        let d2 = discover_groups(&root, &out, 2).unwrap();
        let ids: Vec<_> = d2.groups.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["sub-01/FLAIR", "sub-01/MPRAGE", "sub-02/MPRAGE"]);
        assert_eq!(d2.groups[0].output_dir, out.join("sub-01").join("FLAIR"));
        assert!(d2.failures.is_empty());
    }

    #[test]
    fn test_discover_missing_root_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = discover_groups(&tmp.path().join("missing"), tmp.path(), 1).unwrap_err();
        assert!(matches!(err, EnumerationError::MissingInput(_)));
    }
}
