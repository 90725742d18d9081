//! Index creation by type name.
//!
//! The registry is built once per process and never changes afterwards.
//! Each entry pairs the versions a backend can run under with its
//! constructor.

use annex_core::{
    FileManager, FlatIndex, IndexError, IndexNode, Result, Version, VersionRange,
};
use annex_hnsw::HnswIndex;
use annex_ivf::{IvfIndex, IvfKind};
use annex_vamana::VamanaIndex;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

/// Resources handed to index constructors.
#[derive(Debug, Clone, Default)]
pub struct IndexPack {
    /// Storage for disk-resident index files. Required by `DISKANN`.
    pub file_manager: Option<Arc<dyn FileManager>>,
}

impl IndexPack {
    pub fn with_file_manager(file_manager: Arc<dyn FileManager>) -> Self {
        Self {
            file_manager: Some(file_manager),
        }
    }
}

type Constructor = fn(Version, &IndexPack) -> Result<Box<dyn IndexNode>>;

struct Registration {
    versions: VersionRange,
    create: Constructor,
}

fn registry() -> &'static BTreeMap<&'static str, Registration> {
    static REGISTRY: OnceLock<BTreeMap<&'static str, Registration>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut table = BTreeMap::new();
        table.insert(
            FlatIndex::TYPE,
            Registration {
                versions: FlatIndex::VERSIONS,
                create: |version, _| Ok(Box::new(FlatIndex::new(version))),
            },
        );
        table.insert(
            IvfKind::Flat.type_name(),
            Registration {
                versions: IvfIndex::VERSIONS,
                create: |version, _| Ok(Box::new(IvfIndex::new(IvfKind::Flat, version))),
            },
        );
        table.insert(
            IvfKind::Sq8.type_name(),
            Registration {
                versions: IvfIndex::VERSIONS,
                create: |version, _| Ok(Box::new(IvfIndex::new(IvfKind::Sq8, version))),
            },
        );
        table.insert(
            HnswIndex::TYPE,
            Registration {
                versions: HnswIndex::VERSIONS,
                create: |version, _| Ok(Box::new(HnswIndex::new(version))),
            },
        );
        table.insert(
            VamanaIndex::TYPE,
            Registration {
                versions: VamanaIndex::VERSIONS,
                create: |version, pack| {
                    let file_manager = pack.file_manager.clone().ok_or_else(|| {
                        IndexError::InvalidParameter(format!(
                            "{} needs a file manager in the index pack",
                            VamanaIndex::TYPE
                        ))
                    })?;
                    Ok(Box::new(VamanaIndex::new(version, file_manager)))
                },
            },
        );
        table
    })
}

/// Creates indexes by type name.
pub struct IndexFactory;

impl IndexFactory {
    /// A fresh, `Uninitialized` index of type `name` (case-insensitive)
    /// running under `version`.
    ///
    /// # Errors
    ///
    /// `UnknownType` for an unregistered name, `UnsupportedVersion` when
    /// the type cannot run under `version`, `InvalidParameter` when `pack`
    /// lacks a resource the type needs.
    pub fn create(name: &str, version: Version, pack: &IndexPack) -> Result<Box<dyn IndexNode>> {
        let key = name.to_ascii_uppercase();
        let registration = registry()
            .get(key.as_str())
            .ok_or_else(|| IndexError::UnknownType(name.to_string()))?;

        if !version.is_valid() || !registration.versions.contains(version) {
            return Err(IndexError::UnsupportedVersion {
                index_type: key,
                version: version.number(),
                min: registration.versions.min.number(),
                max: registration.versions.max.number(),
            });
        }

        tracing::debug!(index_type = %key, %version, "creating index");
        (registration.create)(version, pack)
    }

    /// Registered type names, sorted.
    pub fn names() -> Vec<&'static str> {
        registry().keys().copied().collect()
    }

    /// Versions the type `name` can run under.
    pub fn versions(name: &str) -> Option<VersionRange> {
        registry()
            .get(name.to_ascii_uppercase().as_str())
            .map(|r| r.versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annex_core::{IndexState, LocalFileManager};

    #[test]
    fn test_names_sorted() {
        assert_eq!(
            IndexFactory::names(),
            vec!["DISKANN", "FLAT", "HNSW", "IVF_FLAT", "IVF_SQ8"]
        );
    }

    #[test]
    fn test_create_each_type() {
        let pack = IndexPack::with_file_manager(Arc::new(LocalFileManager::new()));
        for name in IndexFactory::names() {
            let index = IndexFactory::create(name, Version::current(), &pack).unwrap();
            assert_eq!(index.index_type(), name);
            assert_eq!(index.version(), Version::current());
            assert_eq!(index.state(), IndexState::Uninitialized);
            assert_eq!(index.count(), 0);
        }
        let lower = IndexFactory::create("hnsw", Version::current(), &pack).unwrap();
        assert_eq!(lower.index_type(), "HNSW");
    }

    #[test]
    fn test_create_errors() {
        let pack = IndexPack::default();
        assert!(matches!(
            IndexFactory::create("LSH", Version::current(), &pack),
            Err(IndexError::UnknownType(_))
        ));
        assert!(matches!(
            IndexFactory::create("DISKANN", Version::minimal(), &pack),
            Err(IndexError::UnsupportedVersion { min: 2, max: 3, version: 1, .. })
        ));
        assert!(matches!(
            IndexFactory::create("FLAT", Version::new(99), &pack),
            Err(IndexError::UnsupportedVersion { version: 99, .. })
        ));
        assert!(matches!(
            IndexFactory::create("DISKANN", Version::current(), &pack),
            Err(IndexError::InvalidParameter(_))
        ));
        assert_eq!(
            IndexFactory::versions("diskann"),
            Some(VersionRange::new(Version::new(2), Version::current()))
        );
        assert_eq!(IndexFactory::versions("nope"), None);
    }
}
