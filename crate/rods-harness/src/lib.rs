//! Scoped provisioning and teardown of ephemeral iRODS test resources.
//!
//! Each test gets a fresh subtree of the zone, mapped from its local
//! ephemeral path, seeded with sample content and metadata as needed,
//! and removed again on every exit path, together with any
//! access-control groups the test asked for.

mod client;
mod error;
mod fixture;
mod groups;
mod meta;
mod provision;
mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{Icommands, RodsClient};
pub use error::HarnessError;
pub use fixture::{Annotation, Fixture, ScopedSession, TEST_ROOT};
pub use groups::{GroupOutcome, TEST_GROUPS, ensure_groups, remove_groups};
pub use meta::{MetaTarget, MetadataSink, attach};
pub use provision::{ensure_collection, seed};
pub use session::{
    BatonConnection, BatonConnector, Connect, Connection, DEFAULT_READY_TIMEOUT, Session,
};
