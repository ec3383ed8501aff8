// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed signals for kill/timeout dispatch.

use serde::{Deserialize, Serialize};

/// A deliverable termination signal.
///
/// The set is intentionally small: these are the signals the kill and
/// timeout capabilities dispatch. The settled result's `signal` field is the
/// OS-reported name and may name signals outside this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    /// Hangup.
    #[serde(rename = "SIGHUP")]
    Hup,
    /// Interrupt.
    #[serde(rename = "SIGINT")]
    Int,
    /// Quit.
    #[serde(rename = "SIGQUIT")]
    Quit,
    /// Kill, uncatchable.
    #[serde(rename = "SIGKILL")]
    Kill,
    /// Termination request. The default for kill and timeout.
    #[serde(rename = "SIGTERM")]
    Term,
    /// User-defined 1.
    #[serde(rename = "SIGUSR1")]
    Usr1,
    /// User-defined 2.
    #[serde(rename = "SIGUSR2")]
    Usr2,
}

impl Signal {
    /// Conventional name, e.g. `"SIGTERM"`.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Hup => "SIGHUP",
            Self::Int => "SIGINT",
            Self::Quit => "SIGQUIT",
            Self::Kill => "SIGKILL",
            Self::Term => "SIGTERM",
            Self::Usr1 => "SIGUSR1",
            Self::Usr2 => "SIGUSR2",
        }
    }

    /// The raw signal number for dispatch.
    #[cfg(unix)]
    #[must_use]
    pub fn number(self) -> libc::c_int {
        match self {
            Self::Hup => libc::SIGHUP,
            Self::Int => libc::SIGINT,
            Self::Quit => libc::SIGQUIT,
            Self::Kill => libc::SIGKILL,
            Self::Term => libc::SIGTERM,
            Self::Usr1 => libc::SIGUSR1,
            Self::Usr2 => libc::SIGUSR2,
        }
    }

    /// The conventional `SIG*` name for an OS-reported signal number.
    ///
    /// Unknown numbers render as `SIG<n>`.
    #[cfg(unix)]
    #[must_use]
    pub fn name_of(raw: i32) -> String {
        let name = match raw {
            x if x == libc::SIGHUP => "SIGHUP",
            x if x == libc::SIGINT => "SIGINT",
            x if x == libc::SIGQUIT => "SIGQUIT",
            x if x == libc::SIGILL => "SIGILL",
            x if x == libc::SIGABRT => "SIGABRT",
            x if x == libc::SIGFPE => "SIGFPE",
            x if x == libc::SIGKILL => "SIGKILL",
            x if x == libc::SIGSEGV => "SIGSEGV",
            x if x == libc::SIGPIPE => "SIGPIPE",
            x if x == libc::SIGALRM => "SIGALRM",
            x if x == libc::SIGTERM => "SIGTERM",
            x if x == libc::SIGUSR1 => "SIGUSR1",
            x if x == libc::SIGUSR2 => "SIGUSR2",
            _ => return format!("SIG{raw}"),
        };
        name.to_string()
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::Term
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "SIGHUP" => Self::Hup,
            "SIGINT" => Self::Int,
            "SIGQUIT" => Self::Quit,
            "SIGKILL" => Self::Kill,
            "SIGTERM" => Self::Term,
            "SIGUSR1" => Self::Usr1,
            "SIGUSR2" => Self::Usr2,
            other => return Err(format!("unknown signal name: {other}")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_sigterm() {
        assert_eq!(Signal::default(), Signal::Term);
        assert_eq!(Signal::default().name(), "SIGTERM");
    }

    #[test]
    fn names_roundtrip_through_from_str() {
        for sig in [
            Signal::Hup,
            Signal::Int,
            Signal::Quit,
            Signal::Kill,
            Signal::Term,
            Signal::Usr1,
            Signal::Usr2,
        ] {
            assert_eq!(sig.name().parse::<Signal>(), Ok(sig));
        }
        assert!("SIGWHAT".parse::<Signal>().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn os_numbers_map_back_to_names() {
        assert_eq!(Signal::name_of(Signal::Term.number()), "SIGTERM");
        assert_eq!(Signal::name_of(Signal::Kill.number()), "SIGKILL");
        assert_eq!(Signal::name_of(250), "SIG250");
    }

    #[test]
    fn serde_uses_conventional_names() {
        assert_eq!(serde_json::to_string(&Signal::Term).unwrap(), "\"SIGTERM\"");
    }
}
