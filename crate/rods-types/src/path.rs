use std::path::{self, Component};

/// An absolute path within an iRODS zone.
///
/// Rods paths are nonempty absolute paths, with collections separated
/// by / and without '.' or '..' or empty parts. Collection and data
/// object names must be valid unicode.
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize, serde::Serialize,
)]
pub struct RodsPath(String);

impl RodsPath {
    /// Build a path from a string.
    ///
    /// If parsing works, the path is guaranteed to be acceptable.
    pub fn parse(str: impl Into<String>) -> Result<RodsPath, PathError> {
        let str = str.into();
        check_path(&str)?;

        Ok(RodsPath(str))
    }

    /// Append a relative path to this one and return the result.
    pub fn join(&self, str: &str) -> Result<RodsPath, PathError> {
        check_relative(str)?;

        let mut fullpath = self.0.clone();
        if !fullpath.ends_with('/') {
            fullpath.push('/');
        }
        fullpath.push_str(str);
        Ok(RodsPath(fullpath))
    }

    /// Map a local ephemeral path into the zone, under `root`.
    ///
    /// The first element of `local`, the filesystem root placeholder
    /// put there by the test framework, is discarded; the remaining
    /// elements are appended to `root` unchanged. Because the
    /// remaining elements are unique per test invocation, distinct
    /// local paths always map to distinct rods paths.
    ///
    /// Pure; never touches the remote service.
    pub fn mapped<T: AsRef<path::Path>>(root: &RodsPath, local: T) -> Result<RodsPath, PathError> {
        let mut mapped = root.clone();
        for component in local.as_ref().components().skip(1) {
            match component {
                Component::Normal(part) => {
                    mapped = mapped.join(part.to_str().ok_or(PathError::InvalidPath)?)?;
                }
                _ => {
                    return Err(PathError::InvalidPath);
                }
            }
        }

        Ok(mapped)
    }

    /// The name part of the path, without any parent element.
    ///
    /// Empty for the zone root "/".
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    /// The parent collection of the path.
    ///
    /// Return None for the zone root.
    pub fn parent(&self) -> Option<RodsPath> {
        match self.0.rfind('/') {
            Some(0) if self.0.len() > 1 => Some(RodsPath("/".to_string())),
            Some(slash) if slash > 0 => Some(RodsPath(self.0[0..slash].to_string())),
            _ => None,
        }
    }

    /// Split the path into its components, root excluded.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Return true if the other path is the current path or a parent
    /// of the current path.
    ///
    /// Note that it works at the level of paths, not names, so
    /// "/zone/foobar" does not start with "/zone/foo" even though the
    /// string does.
    pub fn starts_with<T: AsRef<RodsPath>>(&self, other: T) -> bool {
        let other = other.as_ref().as_str();
        if let Some(rest) = self.0.strip_prefix(other) {
            return rest.is_empty() || rest.starts_with('/') || other == "/";
        }

        false
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn check_path(str: &str) -> Result<(), PathError> {
    let rest = str.strip_prefix('/').ok_or(PathError::RelativePath)?;
    if rest.is_empty() {
        // The zone root itself.
        return Ok(());
    }
    check_relative(rest)
}

fn check_relative(str: &str) -> Result<(), PathError> {
    if str.is_empty()
        || str
            .split('/')
            .any(|s| s.is_empty() || s == "." || s == "..")
    {
        return Err(PathError::InvalidPath);
    }
    Ok(())
}

impl AsRef<RodsPath> for RodsPath {
    fn as_ref(&self) -> &RodsPath {
        self
    }
}

impl std::fmt::Display for RodsPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors returned by RodsPath functions
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("Invalid path. Paths must be valid unicode and not contain ., .. or empty parts")]
    InvalidPath,
    #[error("Rods paths must be absolute")]
    RelativePath,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_paths() -> anyhow::Result<()> {
        RodsPath::parse("/")?;
        RodsPath::parse("/testZone")?;
        RodsPath::parse("/testZone/home/irods/test")?;
        RodsPath::parse("/testZone/.hidden/file.txt")?;

        Ok(())
    }

    #[test]
    fn parse_invalid_paths() -> anyhow::Result<()> {
        assert!(matches!(RodsPath::parse(""), Err(PathError::RelativePath)));
        assert!(matches!(
            RodsPath::parse("testZone/home"),
            Err(PathError::RelativePath)
        ));
        assert!(matches!(
            RodsPath::parse("/testZone//home"),
            Err(PathError::InvalidPath)
        ));
        assert!(matches!(
            RodsPath::parse("/testZone/home/"),
            Err(PathError::InvalidPath)
        ));
        assert!(matches!(
            RodsPath::parse("/testZone/../etc"),
            Err(PathError::InvalidPath)
        ));
        assert!(matches!(
            RodsPath::parse("/testZone/./home"),
            Err(PathError::InvalidPath)
        ));

        Ok(())
    }

    #[test]
    fn join() -> anyhow::Result<()> {
        assert_eq!(
            RodsPath::parse("/zone/home/foo")?,
            RodsPath::parse("/zone/home")?.join("foo")?
        );
        assert_eq!(
            RodsPath::parse("/zone/home/foo/bar")?,
            RodsPath::parse("/zone/home")?.join("foo/bar")?
        );
        assert_eq!(RodsPath::parse("/foo")?, RodsPath::parse("/")?.join("foo")?);
        assert!(matches!(
            RodsPath::parse("/zone")?.join("/foo"),
            Err(PathError::InvalidPath)
        ));
        assert!(matches!(
            RodsPath::parse("/zone")?.join("foo/../bar"),
            Err(PathError::InvalidPath)
        ));

        Ok(())
    }

    #[test]
    fn mapped_discards_the_root_element() -> anyhow::Result<()> {
        let root = RodsPath::parse("/testZone/home/irods/test")?;
        assert_eq!(
            RodsPath::parse("/testZone/home/irods/test/tmp/pytest-abc/test_foo0")?,
            RodsPath::mapped(&root, "/tmp/pytest-abc/test_foo0")?
        );

        Ok(())
    }

    #[test]
    fn mapped_is_pure() -> anyhow::Result<()> {
        let root = RodsPath::parse("/testZone/home/irods/test")?;
        assert_eq!(
            RodsPath::mapped(&root, "/tmp/pytest-0/test_a0")?,
            RodsPath::mapped(&root, "/tmp/pytest-0/test_a0")?
        );

        Ok(())
    }

    #[test]
    fn mapped_keeps_distinct_paths_distinct() -> anyhow::Result<()> {
        let root = RodsPath::parse("/testZone/home/irods/test")?;
        let a = RodsPath::mapped(&root, "/tmp/pytest-0/test_a0")?;
        let b = RodsPath::mapped(&root, "/tmp/pytest-0/test_a1")?;
        let c = RodsPath::mapped(&root, "/tmp/pytest-1/test_a0")?;
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);

        Ok(())
    }

    #[test]
    fn mapped_rejects_dot_elements() -> anyhow::Result<()> {
        let root = RodsPath::parse("/testZone/home/irods/test")?;
        assert!(matches!(
            RodsPath::mapped(&root, "/tmp/../etc"),
            Err(PathError::InvalidPath)
        ));

        Ok(())
    }

    #[test]
    fn name() -> anyhow::Result<()> {
        assert_eq!("test", RodsPath::parse("/zone/home/test")?.name());
        assert_eq!("zone", RodsPath::parse("/zone")?.name());

        Ok(())
    }

    #[test]
    fn parent() -> anyhow::Result<()> {
        assert_eq!(
            Some(RodsPath::parse("/zone/home")?),
            RodsPath::parse("/zone/home/test")?.parent()
        );
        assert_eq!(
            Some(RodsPath::parse("/")?),
            RodsPath::parse("/zone")?.parent()
        );
        assert_eq!(None, RodsPath::parse("/")?.parent());

        Ok(())
    }

    #[test]
    fn components() -> anyhow::Result<()> {
        assert_eq!(
            vec!["zone", "home", "test"],
            RodsPath::parse("/zone/home/test")?.components().collect::<Vec<_>>()
        );
        assert_eq!(
            Vec::<&str>::new(),
            RodsPath::parse("/")?.components().collect::<Vec<_>>()
        );

        Ok(())
    }

    #[test]
    fn starts_with_path_elements() -> anyhow::Result<()> {
        assert!(RodsPath::parse("/zone/test/foo")?.starts_with(RodsPath::parse("/zone/test")?));
        assert!(RodsPath::parse("/zone/test")?.starts_with(RodsPath::parse("/zone/test")?));
        assert!(RodsPath::parse("/zone/test")?.starts_with(RodsPath::parse("/")?));
        assert!(!RodsPath::parse("/zone/testing")?.starts_with(RodsPath::parse("/zone/test")?));
        assert!(!RodsPath::parse("/zone/test")?.starts_with(RodsPath::parse("/zone/test/foo")?));

        Ok(())
    }
}
