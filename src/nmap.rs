//! The nmap-facing surface: the closed argument builder and the parser for
//! nmap's XML output (`-oX -`).

use crate::errors::{ExecutionError, ValidateError};
use crate::types::{HostReport, NormalizedTarget, PortReport, ScanReport, ScanSummary, ScanType};
use crate::validate;
use serde::Deserialize;

/// Fixed flag template per scan type. This table is the whole universe of
/// flags a caller can reach; the only variable part is the validated `-p`
/// clause appended by `ScanArguments::build`.
fn flag_template(scan_type: ScanType) -> &'static [&'static str] {
    match scan_type {
        ScanType::Quick => &["-T4", "-Pn"],
        ScanType::Tcp => &["-sT", "-T4", "-Pn"],
        ScanType::Udp => &["-sU", "-T4", "-Pn"],
        ScanType::Version => &["-sV", "-sC", "-O", "-Pn"],
        ScanType::Ping => &["-sn"],
    }
}

/// Immutable, fully validated argument set for one nmap invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanArguments {
    flags: &'static [&'static str],
    port_clause: Option<String>,
}

impl ScanArguments {
    /// Map a scan type and optional port spec to an argument set.
    ///
    /// The port spec must pass `validate::validate_ports`; there is no path
    /// for caller-supplied flags beyond that single clause.
    pub fn build(scan_type: ScanType, ports: Option<&str>) -> Result<Self, ValidateError> {
        let port_clause = match ports {
            Some(spec) => Some(validate::validate_ports(spec)?),
            None => None,
        };
        Ok(Self {
            flags: flag_template(scan_type),
            port_clause,
        })
    }

    /// Render the argv for one invocation. Each flag is its own argv element;
    /// nothing is ever joined into a shell string.
    pub fn to_argv(&self, target: &NormalizedTarget) -> Vec<String> {
        let mut argv: Vec<String> = self.flags.iter().map(|f| f.to_string()).collect();
        if let Some(spec) = &self.port_clause {
            argv.push("-p".into());
            argv.push(spec.clone());
        }
        argv.push("-oX".into());
        argv.push("-".into());
        argv.push(target.to_string());
        argv
    }

    /// Human-readable flag string, echoed on job views.
    pub fn display(&self) -> String {
        let mut s = self.flags.join(" ");
        if let Some(spec) = &self.port_clause {
            s.push_str(" -p ");
            s.push_str(spec);
        }
        s
    }
}

// Minimal nmap XML schema for host + port extraction. Intentionally partial:
// only the elements and attributes used to build a ScanReport are modeled,
// everything else is ignored by serde.

#[derive(Debug, Deserialize)]
struct XmlRun {
    #[serde(rename = "host", default)]
    hosts: Vec<XmlHost>,
    #[serde(rename = "runstats")]
    run_stats: Option<XmlRunStats>,
}

#[derive(Debug, Deserialize)]
struct XmlHost {
    #[serde(rename = "address", default)]
    addresses: Vec<XmlAddress>,
    status: XmlStatus,
    hostnames: Option<XmlHostnames>,
    ports: Option<XmlPorts>,
}

#[derive(Debug, Deserialize)]
struct XmlAddress {
    #[serde(rename = "@addr")]
    addr: String,
    #[serde(rename = "@addrtype")]
    addr_type: String,
}

#[derive(Debug, Deserialize)]
struct XmlStatus {
    #[serde(rename = "@state")]
    state: String,
}

#[derive(Debug, Deserialize)]
struct XmlHostnames {
    #[serde(rename = "hostname", default)]
    hostnames: Vec<XmlHostname>,
}

#[derive(Debug, Deserialize)]
struct XmlHostname {
    #[serde(rename = "@name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct XmlPorts {
    #[serde(rename = "port", default)]
    ports: Vec<XmlPort>,
}

#[derive(Debug, Deserialize)]
struct XmlPort {
    #[serde(rename = "@portid")]
    portid: u16,
    #[serde(rename = "@protocol")]
    protocol: String,
    state: XmlPortState,
    service: Option<XmlService>,
}

#[derive(Debug, Deserialize)]
struct XmlPortState {
    #[serde(rename = "@state")]
    state: String,
}

#[derive(Debug, Deserialize)]
struct XmlService {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@product")]
    product: Option<String>,
    #[serde(rename = "@version")]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlRunStats {
    hosts: Option<XmlHostStats>,
    finished: Option<XmlFinished>,
}

#[derive(Debug, Deserialize)]
struct XmlHostStats {
    #[serde(rename = "@up")]
    up: u32,
    #[serde(rename = "@down")]
    down: u32,
    #[serde(rename = "@total")]
    total: u32,
}

#[derive(Debug, Deserialize)]
struct XmlFinished {
    #[serde(rename = "@elapsed")]
    elapsed: Option<f64>,
}

/// Parse nmap's XML output into a `ScanReport`.
///
/// A document that is not an nmaprun (or is truncated, e.g. the process was
/// killed mid-write) yields `ExecutionError::UnparseableOutput`.
pub fn parse_output(xml: &str) -> Result<ScanReport, ExecutionError> {
    let run: XmlRun = quick_xml::de::from_str(xml)
        .map_err(|e| ExecutionError::UnparseableOutput(e.to_string()))?;

    let hosts = run
        .hosts
        .into_iter()
        .map(|h| {
            // Prefer the IP address entry; hosts can also carry a MAC entry.
            let address = h
                .addresses
                .iter()
                .find(|a| a.addr_type == "ipv4" || a.addr_type == "ipv6")
                .or_else(|| h.addresses.first())
                .map(|a| a.addr.clone())
                .unwrap_or_default();
            let hostnames = h
                .hostnames
                .map(|hn| hn.hostnames.into_iter().map(|n| n.name).collect())
                .unwrap_or_default();
            let ports = h
                .ports
                .map(|ps| {
                    ps.ports
                        .into_iter()
                        .map(|p| PortReport {
                            port: p.portid,
                            protocol: p.protocol,
                            state: p.state.state,
                            service: p.service.as_ref().map(|s| s.name.clone()),
                            product: p.service.as_ref().and_then(|s| s.product.clone()),
                            version: p.service.and_then(|s| s.version),
                        })
                        .collect()
                })
                .unwrap_or_default();
            HostReport {
                address,
                state: h.status.state,
                hostnames,
                ports,
            }
        })
        .collect();

    let summary = run.run_stats.and_then(|rs| {
        let elapsed_secs = rs.finished.and_then(|f| f.elapsed);
        rs.hosts.map(|h| ScanSummary {
            hosts_up: h.up,
            hosts_down: h.down,
            hosts_total: h.total,
            elapsed_secs,
        })
    });

    Ok(ScanReport { hosts, summary })
}
