use crate::HarnessError;
use crate::client::RodsClient;

/// Groups shared by every test in a run.
///
/// This registry is deliberately process-wide: whichever fixture
/// provisions it first creates the groups, and each fixture that
/// requested them removes them on teardown. Concurrent tests that
/// both use it must tolerate one removing the groups while the other
/// still runs; the idempotent operations absorb the races themselves.
pub const TEST_GROUPS: &[&str] = &["ss_study_01", "ss_study_02", "ss_study_03"];

/// What a privilege-gated group operation did.
///
/// Skipping for lack of admin capability is an outcome, not an
/// error; tests that need the groups mark themselves accordingly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupOutcome {
    Applied,
    SkippedNoAdmin,
}

/// Create each named group, if admin capability is available.
///
/// Without admin capability nothing is created and nothing fails.
/// Creating a group that already exists is a no-op.
pub fn ensure_groups<S: AsRef<str>>(
    client: &dyn RodsClient,
    names: &[S],
) -> Result<GroupOutcome, HarnessError> {
    if !client.have_admin() {
        log::debug!("no admin capability; not creating groups");
        return Ok(GroupOutcome::SkippedNoAdmin);
    }
    for name in names {
        client.mkgroup(name.as_ref())?;
    }

    Ok(GroupOutcome::Applied)
}

/// Remove each named group, if admin capability is available.
///
/// Symmetric to [ensure_groups]: a no-op without admin capability,
/// and removing an absent group is tolerated.
pub fn remove_groups<S: AsRef<str>>(
    client: &dyn RodsClient,
    names: &[S],
) -> Result<GroupOutcome, HarnessError> {
    if !client.have_admin() {
        log::debug!("no admin capability; not removing groups");
        return Ok(GroupOutcome::SkippedNoAdmin);
    }
    for name in names {
        client.rmgroup(name.as_ref())?;
    }

    Ok(GroupOutcome::Applied)
}
