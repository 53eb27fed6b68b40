use crate::HarnessError;
use crate::client::RodsClient;
use rods_types::RodsPath;
use std::path::Path;

/// Create the collection at `path`, returning the path on success.
///
/// With `make_parents`, every missing ancestor collection is created
/// first; the fixtures always pass it, since a mapped path's ancestry
/// is never guaranteed to exist. Fails with a creation error when an
/// intermediate element exists but is a data object.
pub fn ensure_collection(
    client: &dyn RodsClient,
    path: &RodsPath,
    make_parents: bool,
) -> Result<RodsPath, HarnessError> {
    log::debug!("ensuring collection {path}");
    client.mkdir(path, make_parents)?;

    Ok(path.clone())
}

/// Copy local sample content into the remote namespace.
///
/// A single file becomes a data object with byte-identical content; a
/// directory, with `recursive`, becomes a collection tree preserving
/// relative structure. A transfer failure anywhere in the tree is an
/// error; nothing is rolled back here, teardown takes care of that.
pub fn seed(
    client: &dyn RodsClient,
    local: &Path,
    remote: &RodsPath,
    recursive: bool,
) -> Result<(), HarnessError> {
    log::debug!("seeding {remote} from {}", local.display());
    client.put(local, remote, recursive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryRods;
    use assert_fs::TempDir;
    use assert_fs::prelude::*;

    #[test]
    fn ensure_collection_creates_missing_parents() -> anyhow::Result<()> {
        let rods = InMemoryRods::new();
        let path = RodsPath::parse("/testZone/home/irods/test/a/b/c")?;

        let created = ensure_collection(&rods, &path, true)?;

        assert_eq!(path, created);
        assert!(rods.is_collection(&path));
        assert!(rods.is_collection(&RodsPath::parse("/testZone/home/irods/test/a")?));

        Ok(())
    }

    #[test]
    fn ensure_collection_without_parents_needs_ancestry() -> anyhow::Result<()> {
        let rods = InMemoryRods::new();
        let path = RodsPath::parse("/testZone/missing/coll")?;

        assert!(matches!(
            ensure_collection(&rods, &path, false),
            Err(HarnessError::Creation { .. })
        ));

        Ok(())
    }

    #[test]
    fn ensure_collection_rejects_data_object_in_the_way() -> anyhow::Result<()> {
        let rods = InMemoryRods::new();
        let tmp = TempDir::new()?;
        let obj_file = tmp.child("obj.txt");
        obj_file.write_str("data")?;

        let coll = RodsPath::parse("/testZone/test")?;
        ensure_collection(&rods, &coll, true)?;
        seed(&rods, obj_file.path(), &coll.join("obj.txt")?, false)?;

        assert!(matches!(
            ensure_collection(&rods, &coll.join("obj.txt/under")?, true),
            Err(HarnessError::Creation { .. })
        ));

        Ok(())
    }

    #[test]
    fn seed_single_file_byte_identical() -> anyhow::Result<()> {
        let rods = InMemoryRods::new();
        let tmp = TempDir::new()?;
        let lorem = tmp.child("lorem.txt");
        lorem.write_str("Lorem ipsum dolor sit amet\n")?;

        let coll = RodsPath::parse("/testZone/home/irods/test/test_foo0")?;
        ensure_collection(&rods, &coll, true)?;
        let obj = coll.join("lorem.txt")?;
        seed(&rods, lorem.path(), &obj, false)?;

        assert_eq!(
            Some(b"Lorem ipsum dolor sit amet\n".to_vec()),
            rods.object_bytes(&obj)
        );

        Ok(())
    }

    #[test]
    fn seed_tree_preserves_relative_structure() -> anyhow::Result<()> {
        let rods = InMemoryRods::new();
        let tmp = TempDir::new()?;
        tmp.child("gridion/exp1/run1/report.md").write_str("ok")?;
        tmp.child("gridion/exp1/run1/reads/read1.fast5").write_str("f5")?;

        let coll = RodsPath::parse("/testZone/home/irods/test/test_tree0")?;
        ensure_collection(&rods, &coll, true)?;
        let gridion = tmp.child("gridion");
        seed(&rods, gridion.path(), &coll, true)?;

        assert!(rods.is_collection(&coll.join("gridion/exp1/run1")?));
        assert_eq!(
            Some(b"f5".to_vec()),
            rods.object_bytes(&coll.join("gridion/exp1/run1/reads/read1.fast5")?)
        );

        Ok(())
    }

    #[test]
    fn seed_missing_source_is_a_transfer_error() -> anyhow::Result<()> {
        let rods = InMemoryRods::new();
        let coll = RodsPath::parse("/testZone/test")?;
        ensure_collection(&rods, &coll, true)?;

        assert!(matches!(
            seed(
                &rods,
                Path::new("/nonexistent/lorem.txt"),
                &coll.join("lorem.txt")?,
                false
            ),
            Err(HarnessError::Transfer { .. })
        ));

        Ok(())
    }
}
