//! Read-only resources shared by every stage invocation of a pipeline
//! (for registration: the template image and the brain mask).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::error::BatchError;

enum ResourceData {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

/// One named resource, loaded once and never mutated afterwards.
pub struct ReferenceResource {
    name: String,
    path: PathBuf,
    data: ResourceData,
}

impl ReferenceResource {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Location on disk, for stages that hand the file to an external tool.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.data {
            ResourceData::Mapped(m) => &m[..],
            ResourceData::Owned(v) => v,
        }
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.data, ResourceData::Mapped(_))
    }
}

impl std::fmt::Debug for ReferenceResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceResource")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("len", &self.bytes().len())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct SharedReference {
    resources: BTreeMap<String, ReferenceResource>,
}

impl SharedReference {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load every `name -> path` entry. Files of at least `mmap_threshold_mb`
    /// are memory-mapped, smaller ones are read into memory.
    pub fn load(
        entries: &BTreeMap<String, String>,
        mmap_threshold_mb: u64,
    ) -> Result<Self, BatchError> {
        let mut resources = BTreeMap::new();
        for (name, raw_path) in entries {
            let path = PathBuf::from(raw_path);
            let resource = load_resource(name, &path, mmap_threshold_mb).map_err(|source| {
                BatchError::Reference {
                    name: name.clone(),
                    path: path.clone(),
                    source,
                }
            })?;
            tracing::info!(
                name = %name,
                path = %path.display(),
                bytes = resource.bytes().len(),
                mapped = resource.is_mapped(),
                "reference loaded"
            );
            resources.insert(name.clone(), resource);
        }
        Ok(Self { resources })
    }

    pub fn get(&self, name: &str) -> Option<&ReferenceResource> {
        self.resources.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

fn load_resource(
    name: &str,
    path: &Path,
    mmap_threshold_mb: u64,
) -> std::io::Result<ReferenceResource> {
    let file = std::fs::File::open(path)?;
    let size = file.metadata()?.len();
    let data = if size > 0 && size / (1024 * 1024) >= mmap_threshold_mb {
        // SAFETY: reference files are treated as immutable for the lifetime of
        // the run; nothing in this process writes to them.
        ResourceData::Mapped(unsafe { Mmap::map(&file) }?)
    } else {
        ResourceData::Owned(std::fs::read(path)?)
    };
    Ok(ReferenceResource {
        name: name.to_string(),
        path: path.to_path_buf(),
        data,
    })
}
