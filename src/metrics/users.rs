//! Logged-in user sessions from the utmp login database.

use super::system::c_field;
use super::{MetricSource, Sample, SEPARATOR};
use crate::error::{MonitorError, Result};
use std::fs;
use std::mem;
use std::path::PathBuf;

const SOURCE: &str = "users";

pub const UTMP_PATH: &str = "/var/run/utmp";

pub const USERS_HEADER: &str = "### Sessions/users ### ";

/// utmp record type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Empty,
    RunLevel,
    BootTime,
    NewTime,
    OldTime,
    InitProcess,
    LoginProcess,
    UserProcess,
    DeadProcess,
    Unknown(i16),
}

impl From<i16> for RecordKind {
    fn from(raw: i16) -> Self {
        match raw {
            libc::EMPTY => RecordKind::Empty,
            libc::RUN_LVL => RecordKind::RunLevel,
            libc::BOOT_TIME => RecordKind::BootTime,
            libc::NEW_TIME => RecordKind::NewTime,
            libc::OLD_TIME => RecordKind::OldTime,
            libc::INIT_PROCESS => RecordKind::InitProcess,
            libc::LOGIN_PROCESS => RecordKind::LoginProcess,
            libc::USER_PROCESS => RecordKind::UserProcess,
            libc::DEAD_PROCESS => RecordKind::DeadProcess,
            other => RecordKind::Unknown(other),
        }
    }
}

/// One entry of the login database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRecord {
    pub kind: RecordKind,
    pub username: String,
    pub terminal: String,
    pub remote_host: String,
}

/// Anything that can enumerate login records on demand, in database order
pub trait SessionSource: Send + 'static {
    fn read_sessions(&mut self) -> Result<Vec<LoginRecord>>;
}

/// Decodes the binary utmp file, reopened on every read
#[derive(Debug, Clone)]
pub struct UtmpFile {
    path: PathBuf,
}

impl UtmpFile {
    pub fn new() -> Self {
        Self::at(UTMP_PATH)
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for UtmpFile {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionSource for UtmpFile {
    fn read_sessions(&mut self) -> Result<Vec<LoginRecord>> {
        let bytes = fs::read(&self.path).map_err(|e| {
            MonitorError::unavailable(SOURCE, format!("{}: {}", self.path.display(), e))
        })?;
        Ok(decode_utmp(&bytes))
    }
}

/// Decode consecutive `utmpx` records. A trailing partial record (the file
/// being rewritten under us) is ignored.
pub fn decode_utmp(bytes: &[u8]) -> Vec<LoginRecord> {
    bytes
        .chunks_exact(mem::size_of::<libc::utmpx>())
        .map(|chunk| {
            // SAFETY: the chunk is exactly one utmpx long, and utmpx consists of
            // integers and byte arrays, so every bit pattern is a valid value.
            let entry: libc::utmpx = unsafe { std::ptr::read_unaligned(chunk.as_ptr().cast()) };
            LoginRecord {
                kind: RecordKind::from(entry.ut_type),
                username: c_field(&entry.ut_user),
                terminal: c_field(&entry.ut_line),
                remote_host: c_field(&entry.ut_host),
            }
        })
        .collect()
}

/// A logged-in user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub username: String,
    pub terminal: String,
    pub remote_host: String,
}

/// One users observation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserSample {
    pub sessions: Vec<Session>,
}

impl UserSample {
    /// Keep only real user logins, preserving database order.
    pub fn from_records(records: Vec<LoginRecord>) -> Self {
        let sessions = records
            .into_iter()
            .filter(|r| r.kind == RecordKind::UserProcess)
            .map(|r| Session {
                username: r.username,
                terminal: r.terminal,
                remote_host: r.remote_host,
            })
            .collect();
        Self { sessions }
    }
}

impl From<UserSample> for Sample {
    fn from(sample: UserSample) -> Self {
        Sample::Users(sample)
    }
}

pub struct UsersSource<S: SessionSource = UtmpFile> {
    database: S,
}

impl<S: SessionSource> UsersSource<S> {
    pub fn new(database: S) -> Self {
        Self { database }
    }
}

impl<S: SessionSource> MetricSource for UsersSource<S> {
    type Output = UserSample;

    fn name(&self) -> &'static str {
        SOURCE
    }

    fn collect(&mut self) -> Result<UserSample> {
        Ok(UserSample::from_records(self.database.read_sessions()?))
    }

    fn render(&mut self, sample: &UserSample) -> Vec<String> {
        render_users(sample)
    }
}

pub fn render_users(sample: &UserSample) -> Vec<String> {
    let mut lines = Vec::with_capacity(sample.sessions.len() + 2);
    lines.push(SEPARATOR.to_string());
    lines.push(USERS_HEADER.to_string());
    for session in &sample.sessions {
        lines.push(format!(
            "{} {} {}",
            session.username, session.terminal, session.remote_host
        ));
    }
    lines
}
