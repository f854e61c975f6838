use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// The scan flavors the orchestrator knows how to run.
///
/// Each variant maps to one fixed nmap flag template (see `nmap::flag_template`);
/// there is no way to pass free-form flags through the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    Quick,
    Tcp,
    Udp,
    Version,
    Ping,
}

impl ScanType {
    /// Parse a wire name. Returns `None` for unrecognized values; the API
    /// boundary maps those to `Quick` (logged) rather than rejecting.
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "quick" => Some(Self::Quick),
            "tcp" => Some(Self::Tcp),
            "udp" => Some(Self::Udp),
            "version" => Some(Self::Version),
            "ping" => Some(Self::Ping),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Version => "version",
            Self::Ping => "ping",
        }
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One accepted scan request. Immutable once submitted.
#[derive(Debug, Clone, Serialize)]
pub struct ScanRequest {
    pub target: String,
    pub scan_type: ScanType,
    pub ports: Option<String>,
}

/// A syntactically validated scan target. No name resolution is performed;
/// hostnames are only guaranteed to be free of shell/argument metacharacters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedTarget {
    Ip(IpAddr),
    Hostname(String),
}

impl fmt::Display for NormalizedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip(ip) => write!(f, "{ip}"),
            Self::Hostname(name) => f.write_str(name),
        }
    }
}

/// Lifecycle of a scan job.
///
/// Transitions are monotonic: `Queued -> Running -> terminal`, with the single
/// shortcut `Queued -> Cancelled` for jobs cancelled before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
}

impl JobState {
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            "timed_out" => Some(Self::TimedOut),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Queued | Self::Running)
    }

    /// The legal-transition table. Anything not listed here is rejected.
    pub fn can_transition_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Queued, Self::Cancelled)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelled)
                | (Self::Running, Self::TimedOut)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured result of one completed scan, distilled from nmap's XML output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    pub hosts: Vec<HostReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ScanSummary>,
}

/// One scanned host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostReport {
    pub address: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hostnames: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortReport>,
}

/// One probed port on a host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortReport {
    pub port: u16,
    pub protocol: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Run-level counters reported by nmap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSummary {
    pub hosts_up: u32,
    pub hosts_down: u32,
    pub hosts_total: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_secs: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_type_names_round_trip() {
        for st in [
            ScanType::Quick,
            ScanType::Tcp,
            ScanType::Udp,
            ScanType::Version,
            ScanType::Ping,
        ] {
            assert_eq!(ScanType::from_name(st.as_str()), Some(st));
        }
        assert_eq!(ScanType::from_name("stealth"), None);
    }

    #[test]
    fn queued_can_only_run_or_cancel() {
        assert!(JobState::Queued.can_transition_to(JobState::Running));
        assert!(JobState::Queued.can_transition_to(JobState::Cancelled));
        assert!(!JobState::Queued.can_transition_to(JobState::Succeeded));
        assert!(!JobState::Queued.can_transition_to(JobState::TimedOut));
    }

    #[test]
    fn terminal_states_are_final() {
        for from in [
            JobState::Succeeded,
            JobState::Failed,
            JobState::Cancelled,
            JobState::TimedOut,
        ] {
            assert!(from.is_terminal());
            for to in [
                JobState::Queued,
                JobState::Running,
                JobState::Succeeded,
                JobState::Failed,
                JobState::Cancelled,
                JobState::TimedOut,
            ] {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be illegal");
            }
        }
    }

    #[test]
    fn no_transition_back_to_queued() {
        assert!(!JobState::Running.can_transition_to(JobState::Queued));
    }
}
