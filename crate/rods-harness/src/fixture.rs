use crate::HarnessError;
use crate::client::RodsClient;
use crate::groups::{ensure_groups, remove_groups};
use crate::meta::{MetaTarget, MetadataSink, attach};
use crate::provision::{ensure_collection, seed};
use crate::session::{Connect, Session};
use rods_types::{Avu, RodsPath};
use std::ops::{Deref, DerefMut};
use std::path::Path;

/// Root of the zone subtree that all fixtures build under.
///
/// Never a production path; everything under it is fair game for
/// forced recursive removal.
pub const TEST_ROOT: &str = "/testZone/home/irods/test";

/// AVUs to attach to a collection inside a seeded tree, addressed
/// relative to the tree root.
pub struct Annotation {
    collection: String,
    avus: Vec<Avu>,
}

impl Annotation {
    pub fn new(collection: impl Into<String>, avus: Vec<Avu>) -> Annotation {
        Annotation {
            collection: collection.into(),
            avus,
        }
    }
}

/// A remote subtree scoped to one test.
///
/// Acquiring a fixture maps the test's local ephemeral path under a
/// root collection, provisions it, and runs the variant's seeding and
/// metadata steps. Dropping the fixture removes the root path with a
/// forced recursive removal and then removes any groups the variant
/// provisioned, whatever state the test left things in. Teardown is
/// best effort: a failed removal is logged and the rest still runs.
pub struct Fixture<'a> {
    client: &'a dyn RodsClient,
    root: RodsPath,
    path: RodsPath,
    groups: Vec<String>,
}

impl<'a> Fixture<'a> {
    /// A fixture providing an empty collection.
    pub fn collection(
        client: &'a dyn RodsClient,
        root: &RodsPath,
        local: &Path,
    ) -> Result<Fixture<'a>, HarnessError> {
        Fixture::provisioned(client, root, local)
    }

    /// A fixture providing a collection containing a single data
    /// object seeded from the local file `source`.
    ///
    /// The fixture path is the data object's path.
    pub fn data_object(
        client: &'a dyn RodsClient,
        root: &RodsPath,
        local: &Path,
        source: &Path,
    ) -> Result<Fixture<'a>, HarnessError> {
        let mut fixture = Fixture::provisioned(client, root, local)?;
        let object = fixture.path.join(&source_name(source, &fixture.path)?)?;
        seed(client, source, &object, false)?;
        fixture.path = object;

        Ok(fixture)
    }

    /// A fixture providing a seeded copy of the local directory tree
    /// `source`, with the shared `groups` ensured.
    ///
    /// The fixture path is the root of the copied tree.
    pub fn experiment_tree(
        client: &'a dyn RodsClient,
        root: &RodsPath,
        local: &Path,
        source: &Path,
        groups: &[&str],
    ) -> Result<Fixture<'a>, HarnessError> {
        let mut fixture = Fixture::provisioned(client, root, local)?;
        // Recorded before provisioning anything, so that a failure
        // below still removes whatever groups were created.
        fixture.groups = groups.iter().map(|g| g.to_string()).collect();

        let name = source_name(source, &fixture.path)?;
        seed(client, source, &fixture.path, true)?;
        ensure_groups(client, &fixture.groups)?;
        fixture.path = fixture.path.join(&name)?;

        Ok(fixture)
    }

    /// [experiment_tree](Fixture::experiment_tree), with AVUs
    /// attached to collections inside the seeded tree through `sink`.
    pub fn annotated_experiment_tree(
        client: &'a dyn RodsClient,
        root: &RodsPath,
        local: &Path,
        source: &Path,
        groups: &[&str],
        sink: &mut dyn MetadataSink,
        annotations: &[Annotation],
    ) -> Result<Fixture<'a>, HarnessError> {
        let fixture = Fixture::experiment_tree(client, root, local, source, groups)?;
        for annotation in annotations {
            let collection = fixture.path.join(&annotation.collection)?;
            attach(sink, MetaTarget::Collection(&collection), &annotation.avus)?;
        }

        Ok(fixture)
    }

    /// The remote path this fixture provides to the test.
    pub fn path(&self) -> &RodsPath {
        &self.path
    }

    /// The root path removed on teardown.
    pub fn root(&self) -> &RodsPath {
        &self.root
    }

    fn provisioned(
        client: &'a dyn RodsClient,
        root: &RodsPath,
        local: &Path,
    ) -> Result<Fixture<'a>, HarnessError> {
        let mapped = RodsPath::mapped(root, local)?;
        ensure_collection(client, &mapped, true)?;

        // From here on the guard owns the subtree: a failure in any
        // later acquire step drops it and tears everything down.
        Ok(Fixture {
            client,
            root: root.clone(),
            path: mapped,
            groups: Vec::new(),
        })
    }
}

impl Drop for Fixture<'_> {
    fn drop(&mut self) {
        // The removal targets the root test path, not the leaf:
        // mapping created collections at intermediate levels that
        // must not outlive the test either.
        if let Err(err) = self.client.rm(&self.root, true, true) {
            log::warn!("leaving {} behind: {err}", self.root);
        }
        if !self.groups.is_empty()
            && let Err(err) = remove_groups(self.client, &self.groups)
        {
            log::warn!("leaving groups behind: {err}");
        }
    }
}

fn source_name(source: &Path, remote: &RodsPath) -> Result<String, HarnessError> {
    source
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .ok_or_else(|| HarnessError::transfer(remote, "source has no usable name"))
}

/// A session scoped to one test: started on acquire, stopped on drop.
pub struct ScopedSession<C: Connect> {
    session: Session<C>,
}

impl<C: Connect> ScopedSession<C> {
    pub fn start(connector: C) -> Result<ScopedSession<C>, HarnessError> {
        let mut session = Session::new(connector);
        session.start()?;

        Ok(ScopedSession { session })
    }
}

impl<C: Connect> Deref for ScopedSession<C> {
    type Target = Session<C>;

    fn deref(&self) -> &Session<C> {
        &self.session
    }
}

impl<C: Connect> DerefMut for ScopedSession<C> {
    fn deref_mut(&mut self) -> &mut Session<C> {
        &mut self.session
    }
}

impl<C: Connect> Drop for ScopedSession<C> {
    fn drop(&mut self) {
        self.session.stop();
    }
}
