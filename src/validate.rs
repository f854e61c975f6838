use crate::errors::ValidateError;
use crate::types::NormalizedTarget;
use std::net::IpAddr;

/// Longest target string we accept. Hostnames are capped at 255 octets by DNS
/// anyway; anything longer is garbage or an attack.
const MAX_TARGET_LEN: usize = 255;

/// Validate and normalize a scan target: an IPv4/IPv6 literal, or a hostname
/// restricted to the charset `[A-Za-z0-9.-]`.
///
/// Purely syntactic; no resolution is attempted. The charset restriction is
/// what keeps shell and argument metacharacters out of the child process argv.
pub fn validate_target(target: &str) -> Result<NormalizedTarget, ValidateError> {
    let t = target.trim();
    if t.is_empty() {
        return Err(ValidateError::InvalidTarget("target is empty".into()));
    }
    if t.len() > MAX_TARGET_LEN {
        return Err(ValidateError::InvalidTarget(format!(
            "target exceeds {MAX_TARGET_LEN} characters"
        )));
    }
    // IPv6 literals contain ':' and must be recognized before the charset check.
    if let Ok(ip) = t.parse::<IpAddr>() {
        return Ok(NormalizedTarget::Ip(ip));
    }
    if t.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        Ok(NormalizedTarget::Hostname(t.to_string()))
    } else {
        Err(ValidateError::InvalidTarget(
            "use an IP literal or a hostname (letters, digits, '.', '-')".into(),
        ))
    }
}

/// Validate a port specification in nmap's `-p` syntax subset: comma-separated
/// single ports and inclusive `lo-hi` ranges, e.g. `22,80,8000-8010`.
///
/// Returns the trimmed spec, ready to pass through as one `-p` argument.
/// Every clause is parsed structurally; a charset match alone is not enough.
pub fn validate_ports(spec: &str) -> Result<String, ValidateError> {
    let s = spec.trim();
    if s.is_empty() {
        return Err(ValidateError::InvalidPorts("port specification is empty".into()));
    }
    if !s.chars().all(|c| c.is_ascii_digit() || c == ',' || c == '-') {
        return Err(ValidateError::InvalidPorts(
            "only digits, ',' and '-' are allowed".into(),
        ));
    }

    for clause in s.split(',') {
        if clause.is_empty() {
            return Err(ValidateError::InvalidPorts("empty clause".into()));
        }
        if let Some((a, b)) = clause.split_once('-') {
            let start = parse_port(a)?;
            let end = parse_port(b)?;
            if start > end {
                return Err(ValidateError::InvalidPorts(format!(
                    "invalid range {start}-{end} (start > end)"
                )));
            }
        } else {
            parse_port(clause)?;
        }
    }

    Ok(s.to_string())
}

fn parse_port(s: &str) -> Result<u16, ValidateError> {
    let val: u32 = s
        .parse()
        .map_err(|_| ValidateError::InvalidPorts(format!("invalid port value: {s:?}")))?;
    if val == 0 || val > 65535 {
        return Err(ValidateError::InvalidPorts(format!("port out of range: {val}")));
    }
    Ok(val as u16)
}
