//! Helpers for testing the loader warehouse.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - Tests that depend on eviction timing should run on a paused clock, e.g. with
//!    `#[tokio::test(start_paused = true)]`, and let time pass with [`sleep`]. Tokio then
//!    advances the clock instantly and deterministically.

use std::io::Write;
use std::time::Duration;

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

pub use tempfile::{NamedTempFile, TempDir};

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `loader_warehouse` crate and mutes
///    all other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("loader_warehouse=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Creates a temporary directory.
///
/// The directory is deleted when the [`TempDir`] instance is dropped.
pub fn tempdir() -> TempDir {
    TempDir::new().unwrap()
}

/// Writes the given YAML to a temporary config file.
///
/// The file is deleted when the returned [`NamedTempFile`] is dropped, so hold on to it for as
/// long as the path is used.
pub fn config_file(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

/// Lets `duration` pass.
///
/// On a paused clock, this returns as soon as all timers up to `duration` from now have fired.
pub async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await
}

/// A stand-in for the per-request loaders a server would register.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TestLoader {
    /// Which operation created this loader.
    pub origin: String,
    /// Some cached data.
    pub users: Vec<String>,
    /// Credentials of the viewer, which must not leak into other operations.
    pub auth_token: Option<String>,
    /// How often [`strip_auth`](Self::strip_auth) ran.
    pub sanitized: usize,
}

impl TestLoader {
    /// Creates a loader for the given operation with some users and an auth token.
    pub fn new(origin: &str, users: &[&str]) -> Self {
        TestLoader {
            origin: origin.to_owned(),
            users: users.iter().map(|user| (*user).to_owned()).collect(),
            auth_token: Some(format!("token-{origin}")),
            sanitized: 0,
        }
    }

    /// Removes the auth token, to be used as the on-share hook.
    pub fn strip_auth(&mut self) {
        self.auth_token = None;
        self.sanitized += 1;
    }
}
