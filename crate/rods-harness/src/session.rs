use crate::HarnessError;
use crate::meta::{MetaTarget, MetadataSink};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use rods_types::{Avu, RodsPath};
use std::io::{BufRead, BufReader, Write};
use std::os::fd::AsFd;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// How long [BatonConnector] waits for the client process to answer
/// its first request before giving up on it.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(5);

const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// A live connection to the remote service's metadata interface.
pub trait Connection {
    /// Attach AVUs to `target`. See [MetadataSink::meta_add] for the
    /// attachment semantics.
    fn meta_add(&mut self, target: MetaTarget<'_>, avus: &[Avu]) -> Result<(), HarnessError>;

    /// Terminate the connection, best effort. Safe to call more than
    /// once.
    fn shutdown(&mut self);
}

/// Launches [Connection]s on demand.
pub trait Connect {
    type Conn: Connection;

    /// Launch a connection and block until it is ready to accept
    /// operations.
    fn connect(&self) -> Result<Self::Conn, HarnessError>;
}

enum State<T> {
    NotStarted,
    Running(T),
    Stopped,
}

/// The lifecycle of a connection to the metadata interface.
///
/// A session starts not-started, moves to running with [start] and to
/// stopped with [stop], and may be started again after stopping. No
/// operation other than start and stop is accepted while the session
/// is not running.
///
/// [start]: Session::start
/// [stop]: Session::stop
pub struct Session<C: Connect> {
    connector: C,
    state: State<C::Conn>,
}

impl<C: Connect> Session<C> {
    pub fn new(connector: C) -> Session<C> {
        Session {
            connector,
            state: State::NotStarted,
        }
    }

    /// Launch the connection process and block until it is ready.
    ///
    /// Starting an already-running session changes nothing.
    pub fn start(&mut self) -> Result<(), HarnessError> {
        if let State::Running(_) = self.state {
            log::warn!("session already started");
            return Ok(());
        }
        self.state = State::Running(self.connector.connect()?);

        Ok(())
    }

    /// Terminate the connection process.
    ///
    /// Safe to call on a session that was never started, and on one
    /// that was already stopped.
    pub fn stop(&mut self) {
        if let State::Running(conn) = &mut self.state {
            conn.shutdown();
        }
        self.state = State::Stopped;
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running(_))
    }

    fn conn(&mut self) -> Result<&mut C::Conn, HarnessError> {
        match &mut self.state {
            State::Running(conn) => Ok(conn),
            _ => Err(HarnessError::SessionNotRunning),
        }
    }
}

impl<C: Connect> MetadataSink for Session<C> {
    fn meta_add(&mut self, target: MetaTarget<'_>, avus: &[Avu]) -> Result<(), HarnessError> {
        self.conn()?.meta_add(target, avus)
    }
}

/// [Connect] implementation spawning the baton client program.
///
/// One JSON envelope is exchanged per operation over the child's
/// stdin/stdout. Readiness is established by a harmless list request
/// on the zone root; a client that does not answer it within the
/// ready timeout is killed and reported as failed to start.
#[derive(Clone, Debug)]
pub struct BatonConnector {
    program: String,
    ready_timeout: Duration,
}

impl BatonConnector {
    pub fn new() -> BatonConnector {
        BatonConnector {
            program: "baton-do".to_string(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }

    /// Use another client program instead of baton-do.
    pub fn with_program(mut self, program: impl Into<String>) -> BatonConnector {
        self.program = program.into();
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> BatonConnector {
        self.ready_timeout = timeout;
        self
    }
}

impl Default for BatonConnector {
    fn default() -> Self {
        BatonConnector::new()
    }
}

impl Connect for BatonConnector {
    type Conn = BatonConnection;

    fn connect(&self) -> Result<BatonConnection, HarnessError> {
        log::debug!("starting {}", self.program);
        let mut child = Command::new(&self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| {
                HarnessError::SessionStart(format!("cannot launch {}: {err}", self.program))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HarnessError::SessionStart("stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HarnessError::SessionStart("stdout not captured".to_string()))?;

        let mut conn = BatonConnection {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
        };
        if let Err(err) = conn.wait_ready(self.ready_timeout) {
            conn.shutdown();
            return Err(err);
        }

        Ok(conn)
    }
}

/// A running baton client process.
pub struct BatonConnection {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

#[derive(serde::Serialize)]
struct Envelope<'a> {
    operation: &'static str,
    arguments: Arguments,
    target: Target<'a>,
}

#[derive(serde::Serialize)]
struct Arguments {
    #[serde(skip_serializing_if = "Option::is_none")]
    operation: Option<&'static str>,
}

#[derive(serde::Serialize)]
struct Target<'a> {
    collection: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_object: Option<&'a str>,
    #[serde(skip_serializing_if = "<[Avu]>::is_empty")]
    avus: &'a [Avu],
}

impl BatonConnection {
    /// Block until the child answers a first request, or fail.
    fn wait_ready(&mut self, timeout: Duration) -> Result<(), HarnessError> {
        let probe = Envelope {
            operation: "list",
            arguments: Arguments { operation: None },
            target: Target {
                collection: "/",
                data_object: None,
                avus: &[],
            },
        };
        let deadline = Instant::now() + timeout;

        self.send(&probe)
            .map_err(|err| HarnessError::SessionStart(err.to_string()))?;
        loop {
            let exited = self
                .child
                .try_wait()
                .map_err(|err| HarnessError::SessionStart(err.to_string()))?;
            if let Some(status) = exited {
                return Err(HarnessError::SessionStart(format!(
                    "client exited during startup: {status}"
                )));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(HarnessError::SessionStart(format!(
                    "client not ready within {timeout:?}"
                )));
            }
            let millis = u16::try_from(remaining.as_millis()).unwrap_or(u16::MAX);
            let mut fds = [PollFd::new(self.stdout.get_ref().as_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, PollTimeout::from(millis)) {
                Ok(0) => continue,
                Ok(_) => break,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(err) => {
                    return Err(HarnessError::SessionStart(format!("poll failed: {err}")));
                }
            }
        }

        let mut response = String::new();
        self.stdout
            .read_line(&mut response)
            .map_err(|err| HarnessError::SessionStart(err.to_string()))?;
        if response.trim().is_empty() {
            return Err(HarnessError::SessionStart(
                "client closed its output during startup".to_string(),
            ));
        }
        log::debug!("client ready");

        Ok(())
    }

    fn send(&mut self, envelope: &Envelope<'_>) -> Result<(), std::io::Error> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| std::io::Error::other("connection is shut down"))?;
        let line = serde_json::to_string(envelope)?;
        writeln!(stdin, "{line}")?;
        stdin.flush()
    }

    fn roundtrip(&mut self, envelope: &Envelope<'_>) -> Result<serde_json::Value, std::io::Error> {
        self.send(envelope)?;

        let mut response = String::new();
        self.stdout.read_line(&mut response)?;
        if response.trim().is_empty() {
            return Err(std::io::Error::other("client closed the connection"));
        }

        Ok(serde_json::from_str(&response)?)
    }
}

impl Connection for BatonConnection {
    fn meta_add(&mut self, target: MetaTarget<'_>, avus: &[Avu]) -> Result<(), HarnessError> {
        let parent: RodsPath;
        let baton_target = match target {
            MetaTarget::Collection(path) => Target {
                collection: path.as_str(),
                data_object: None,
                avus,
            },
            MetaTarget::DataObject(path) => {
                parent = path.parent().ok_or_else(|| {
                    HarnessError::metadata(path, "data object has no parent collection")
                })?;
                Target {
                    collection: parent.as_str(),
                    data_object: Some(path.name()),
                    avus,
                }
            }
        };
        let envelope = Envelope {
            operation: "metamod",
            arguments: Arguments {
                operation: Some("add"),
            },
            target: baton_target,
        };

        let response = self
            .roundtrip(&envelope)
            .map_err(|err| HarnessError::metadata(target.path(), err.to_string()))?;
        if let Some(error) = response.get("error") {
            // Attachment is additive: the server rejecting an exact
            // duplicate triple means it is already there.
            if avu_already_present(error) {
                return Ok(());
            }
            let message = error
                .get("message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown server error");
            return Err(HarnessError::metadata(target.path(), message));
        }

        Ok(())
    }

    fn shutdown(&mut self) {
        // EOF on stdin asks the client to exit on its own.
        if self.stdin.take().is_some() {
            log::debug!("stopping baton client");
        }
        for _ in 0..10 {
            match self.child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) => thread::sleep(SHUTDOWN_POLL),
                Err(_) => break,
            }
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for BatonConnection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Classify server error envelopes that mean the exact AVU is
/// already attached to the target.
fn avu_already_present(error: &serde_json::Value) -> bool {
    const CATALOG_ALREADY_HAS_ITEM: i64 = -809000;

    error.get("code").and_then(serde_json::Value::as_i64) == Some(CATALOG_ALREADY_HAS_ITEM)
        || error
            .get("message")
            .and_then(serde_json::Value::as_str)
            .is_some_and(|m| m.contains("CATALOG_ALREADY_HAS_ITEM_BY_THAT_NAME"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryConnector, InMemoryRods};
    use std::sync::Arc;

    #[test]
    fn stop_before_start_is_a_noop() {
        let rods = Arc::new(InMemoryRods::new());
        let mut session = Session::new(InMemoryConnector::new(Arc::clone(&rods)));

        session.stop();
        session.stop();

        assert!(!session.is_running());
    }

    #[test]
    fn start_stop_restart() -> anyhow::Result<()> {
        let rods = Arc::new(InMemoryRods::new());
        let mut session = Session::new(InMemoryConnector::new(Arc::clone(&rods)));

        assert!(!session.is_running());
        session.start()?;
        assert!(session.is_running());
        session.stop();
        assert!(!session.is_running());
        session.start()?;
        assert!(session.is_running());
        session.stop();

        Ok(())
    }

    #[test]
    fn start_twice_changes_nothing() -> anyhow::Result<()> {
        let rods = Arc::new(InMemoryRods::new());
        let mut session = Session::new(InMemoryConnector::new(Arc::clone(&rods)));

        session.start()?;
        session.start()?;
        assert!(session.is_running());

        Ok(())
    }

    #[test]
    fn operations_rejected_unless_running() -> anyhow::Result<()> {
        let rods = Arc::new(InMemoryRods::new());
        let mut session = Session::new(InMemoryConnector::new(Arc::clone(&rods)));
        let coll = RodsPath::parse("/testZone/test")?;
        let avus = vec![Avu::new("a", "1")];

        assert!(matches!(
            session.meta_add(MetaTarget::Collection(&coll), &avus),
            Err(HarnessError::SessionNotRunning)
        ));

        session.start()?;
        session.stop();
        assert!(matches!(
            session.meta_add(MetaTarget::Collection(&coll), &avus),
            Err(HarnessError::SessionNotRunning)
        ));

        Ok(())
    }

    #[test]
    fn failed_launch_reports_session_start() {
        let rods = Arc::new(InMemoryRods::new());
        let mut session = Session::new(InMemoryConnector::failing(Arc::clone(&rods)));

        assert!(matches!(
            session.start(),
            Err(HarnessError::SessionStart(_))
        ));
        assert!(!session.is_running());
    }

    #[test]
    fn classify_duplicate_avu_errors() {
        assert!(avu_already_present(&serde_json::json!({
            "message": "Putting metadata failed: -809000 CATALOG_ALREADY_HAS_ITEM_BY_THAT_NAME",
            "code": -809000
        })));
        assert!(avu_already_present(&serde_json::json!({"code": -809000})));
        assert!(!avu_already_present(&serde_json::json!({
            "message": "Invalid argument: -816000 CAT_INVALID_ARGUMENT",
            "code": -816000
        })));
    }

    #[test]
    fn baton_connector_reports_missing_program() {
        let connector = BatonConnector::new()
            .with_program("definitely-not-a-real-program")
            .with_ready_timeout(Duration::from_millis(100));

        assert!(matches!(
            connector.connect(),
            Err(HarnessError::SessionStart(_))
        ));
    }
}
