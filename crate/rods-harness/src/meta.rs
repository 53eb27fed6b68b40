use crate::HarnessError;
use rods_types::{Avu, RodsPath};

/// A remote resource that metadata can be attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetaTarget<'a> {
    Collection(&'a RodsPath),
    DataObject(&'a RodsPath),
}

impl<'a> MetaTarget<'a> {
    pub fn path(&self) -> &'a RodsPath {
        match self {
            MetaTarget::Collection(path) => path,
            MetaTarget::DataObject(path) => path,
        }
    }
}

impl std::fmt::Display for MetaTarget<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.path().fmt(f)
    }
}

/// Something that can store AVUs on remote resources, typically a
/// running [Session](crate::Session).
pub trait MetadataSink {
    /// Attach each AVU to `target`.
    ///
    /// Attachment is additive: the same attribute may end up with
    /// several values, but attaching an exact (attribute, value,
    /// units) duplicate changes nothing. Fails with a metadata error
    /// when `target` does not exist.
    fn meta_add(&mut self, target: MetaTarget<'_>, avus: &[Avu]) -> Result<(), HarnessError>;
}

/// Attach an ordered sequence of AVUs to `target`.
///
/// Namespace qualification is the caller's business, done with
/// [Avu::with_namespace] before calling; already-qualified attributes
/// pass through verbatim.
pub fn attach(
    sink: &mut dyn MetadataSink,
    target: MetaTarget<'_>,
    avus: &[Avu],
) -> Result<(), HarnessError> {
    log::debug!("attaching {} AVUs to {target}", avus.len());
    sink.meta_add(target, avus)
}
