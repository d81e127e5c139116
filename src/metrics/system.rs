//! Host facts that are not sampled per round: core count, uname, and the
//! monitor's own peak memory.

use num_format::{Locale, ToFormattedString};
use std::ffi::c_char;
use std::io;
use std::mem::MaybeUninit;

use super::SEPARATOR;

/// Number of online cores, at least 1.
pub fn online_cores() -> usize {
    // SAFETY: sysconf has no memory-safety preconditions.
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if n < 1 {
        1
    } else {
        n as usize
    }
}

/// Peak resident set size of this process in kilobytes.
pub fn self_max_rss_kb() -> io::Result<i64> {
    let mut usage = MaybeUninit::<libc::rusage>::uninit();
    // SAFETY: getrusage fills the struct on success; we only read it then.
    let result = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: initialized by the successful call above.
    let usage = unsafe { usage.assume_init() };
    Ok(usage.ru_maxrss as i64)
}

/// `Memory usage: 12,345 kilobytes`
pub fn self_usage_line() -> io::Result<String> {
    Ok(format_self_usage(self_max_rss_kb()?))
}

pub fn format_self_usage(kb: i64) -> String {
    format!("Memory usage: {} kilobytes", kb.to_formatted_string(&Locale::en))
}

/// Kernel and machine identification from uname(2)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    pub system_name: String,
    pub machine_name: String,
    pub version: String,
    pub release: String,
    pub architecture: String,
}

impl SystemInfo {
    pub fn query() -> io::Result<Self> {
        let mut uts = MaybeUninit::<libc::utsname>::uninit();
        // SAFETY: uname fills the struct on success; we only read it then.
        let result = unsafe { libc::uname(uts.as_mut_ptr()) };
        if result != 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: initialized by the successful call above.
        let uts = unsafe { uts.assume_init() };

        Ok(Self {
            system_name: c_field(&uts.sysname),
            machine_name: c_field(&uts.nodename),
            version: c_field(&uts.version),
            release: c_field(&uts.release),
            architecture: c_field(&uts.machine),
        })
    }

    pub fn render(&self) -> Vec<String> {
        vec![
            SEPARATOR.to_string(),
            "### System Information ### ".to_string(),
            format!("System Name:  {}", self.system_name),
            format!("Machine Name:  {}", self.machine_name),
            format!("Version:  {}", self.version),
            format!("Release:  {}", self.release),
            format!("Architecture: {}", self.architecture),
            SEPARATOR.to_string(),
        ]
    }
}

/// Fixed-size, possibly unterminated C string field.
pub(crate) fn c_field(field: &[c_char]) -> String {
    let bytes: Vec<u8> = field
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_online_cores() {
        assert!(online_cores() >= 1);
    }

    #[test]
    fn test_self_usage() {
        assert!(self_max_rss_kb().unwrap() > 0);
        assert!(self_usage_line().unwrap().starts_with("Memory usage: "));
        assert_eq!(format_self_usage(1234567), "Memory usage: 1,234,567 kilobytes");
    }

    #[test]
    fn test_system_info() {
        let info = SystemInfo::query().unwrap();
        assert_eq!(info.system_name, "Linux");
        let lines = info.render();
        assert_eq!(lines.len(), 8);
        assert_eq!(lines[2], "System Name:  Linux");
    }
}
