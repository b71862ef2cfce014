//! Ping probe implementation with native ICMP and command fallback.
//!
//! Native echo requests use blocking sockets inside spawn_blocking so a slow
//! reply never stalls the runtime.

use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr};
use std::process::Stdio;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::process::Command;

use super::ProbeError;

const ICMP_ECHO_REQUEST: u8 = 8;
const ICMP_ECHO_REPLY: u8 = 0;
const ICMPV6_ECHO_REQUEST: u8 = 128;
const ICMPV6_ECHO_REPLY: u8 = 129;

/// ICMP capability of this process.
#[derive(Debug, Clone, Copy, PartialEq)]
enum IcmpCapability {
    Native,
    CommandOnly,
}

static ICMP_CAPABILITY: OnceLock<IcmpCapability> = OnceLock::new();

static PING_SEQUENCE: AtomicU16 = AtomicU16::new(0);

fn detect_icmp_capability() -> IcmpCapability {
    if Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).is_ok() {
        tracing::info!("Ping probe: using native ICMP (RAW socket, privileged)");
        return IcmpCapability::Native;
    }

    // Unprivileged on Linux when ping_group_range allows it, and on macOS
    if Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4)).is_ok() {
        tracing::info!("Ping probe: using native ICMP (DGRAM socket, unprivileged)");
        return IcmpCapability::Native;
    }

    tracing::info!("Ping probe: native ICMP unavailable, using ping command");
    IcmpCapability::CommandOnly
}

/// Send one ICMP echo request to `host` and wait for the reply.
pub async fn run_ping_probe(host: &str, timeout: Duration) -> Result<Duration, ProbeError> {
    let capability = *ICMP_CAPABILITY.get_or_init(detect_icmp_capability);

    if capability == IcmpCapability::CommandOnly {
        return run_ping_command(host, timeout).await;
    }

    let ip = resolve_address(host).await?;
    let result = tokio::task::spawn_blocking(move || ping_blocking(ip, timeout))
        .await
        .map_err(|e| ProbeError::Task(format!("spawn_blocking failed: {}", e)))?;

    match result {
        Err(ProbeError::Network(msg)) if msg.contains("Permission denied") => {
            tracing::warn!("Native ping to {} not permitted, falling back to command: {}", host, msg);
            run_ping_command(host, timeout).await
        }
        other => other,
    }
}

async fn resolve_address(host: &str) -> Result<IpAddr, ProbeError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    tokio::net::lookup_host(format!("{}:0", host))
        .await
        .map_err(|e| ProbeError::Network(format!("DNS resolution failed: {}", e)))?
        .next()
        .map(|sa| sa.ip())
        .ok_or_else(|| ProbeError::Network(format!("No addresses found for {}", host)))
}

fn ping_blocking(ip: IpAddr, timeout: Duration) -> Result<Duration, ProbeError> {
    let (domain, protocol) = match ip {
        IpAddr::V4(_) => (Domain::IPV4, Protocol::ICMPV4),
        IpAddr::V6(_) => (Domain::IPV6, Protocol::ICMPV6),
    };

    // RAW needs CAP_NET_RAW; DGRAM works unprivileged on most systems
    let (socket, raw) = match Socket::new(domain, Type::RAW, Some(protocol)) {
        Ok(s) => (s, true),
        Err(_) => {
            let s = Socket::new(domain, Type::DGRAM, Some(protocol))
                .map_err(|e| io_error("Failed to create ICMP socket", e))?;
            (s, false)
        }
    };

    socket
        .set_write_timeout(Some(timeout))
        .map_err(|e| io_error("Failed to set timeout", e))?;
    socket
        .connect(&SocketAddr::new(ip, 0).into())
        .map_err(|e| io_error("Failed to connect", e))?;

    let identifier: u16 = rand::random();
    let sequence = PING_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let (packet, reply_type) = match ip {
        IpAddr::V4(_) => (build_echo_request(ICMP_ECHO_REQUEST, identifier, sequence, true), ICMP_ECHO_REPLY),
        // The kernel fills in the ICMPv6 checksum
        IpAddr::V6(_) => (build_echo_request(ICMPV6_ECHO_REQUEST, identifier, sequence, false), ICMPV6_ECHO_REPLY),
    };

    let start = Instant::now();
    socket.send(&packet).map_err(|e| io_error("Failed to send", e))?;

    let mut buf = [MaybeUninit::<u8>::uninit(); 1500];
    loop {
        let remaining = timeout.checked_sub(start.elapsed()).filter(|d| !d.is_zero());
        let Some(remaining) = remaining else {
            return Err(ProbeError::Timeout(timeout));
        };
        socket
            .set_read_timeout(Some(remaining))
            .map_err(|e| io_error("Failed to set timeout", e))?;

        let len = socket.recv(&mut buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => ProbeError::Timeout(timeout),
            _ => io_error("Failed to receive", e),
        })?;
        let elapsed = start.elapsed();

        // SAFETY: recv initialized the first `len` bytes
        let data: &[u8] = unsafe { std::slice::from_raw_parts(buf.as_ptr() as *const u8, len) };

        // DGRAM sockets get their identifier rewritten by the kernel, so only
        // RAW replies can be matched on it.
        let check_id = if raw { Some(identifier) } else { None };
        if is_echo_reply(data, reply_type, check_id, sequence) {
            return Ok(elapsed);
        }
    }
}

fn io_error(context: &str, e: std::io::Error) -> ProbeError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        ProbeError::Network(format!("Permission denied: {}: {}", context, e))
    } else {
        ProbeError::Network(format!("{}: {}", context, e))
    }
}

/// Check whether `data` is the echo reply we are waiting for.
fn is_echo_reply(data: &[u8], reply_type: u8, identifier: Option<u16>, sequence: u16) -> bool {
    // IPv4 RAW sockets deliver the IP header as well
    let offset = match data.first() {
        Some(b) if b >> 4 == 4 => usize::from(b & 0x0F) * 4,
        _ => 0,
    };
    let Some(icmp) = data.get(offset..offset + 8) else {
        return false;
    };

    let id = u16::from_be_bytes([icmp[4], icmp[5]]);
    let seq = u16::from_be_bytes([icmp[6], icmp[7]]);
    icmp[0] == reply_type && seq == sequence && identifier.map_or(true, |want| want == id)
}

/// Build an ICMP echo request with a 56 byte payload.
fn build_echo_request(icmp_type: u8, identifier: u16, sequence: u16, with_checksum: bool) -> Vec<u8> {
    let mut packet = vec![0u8; 64];
    packet[0] = icmp_type;
    packet[4..6].copy_from_slice(&identifier.to_be_bytes());
    packet[6..8].copy_from_slice(&sequence.to_be_bytes());

    let stamp = chrono::Utc::now().timestamp_micros().to_be_bytes();
    packet[8..16].copy_from_slice(&stamp);

    if with_checksum {
        let checksum = icmp_checksum(&packet);
        packet[2..4].copy_from_slice(&checksum.to_be_bytes());
    }
    packet
}

/// RFC 1071 internet checksum.
fn icmp_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = data
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u32::from(u16::from_be_bytes([*hi, *lo])),
            [hi] => u32::from(*hi) << 8,
            _ => 0,
        })
        .sum();

    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Run the system `ping` binary for one echo request.
async fn run_ping_command(host: &str, timeout: Duration) -> Result<Duration, ProbeError> {
    let timeout_secs = timeout.as_secs().max(1);
    let start = Instant::now();

    let output = Command::new("ping")
        .args(["-c", "1", "-W", &timeout_secs.to_string(), host])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ProbeError::Command(format!("failed to execute ping: {}", e)))?;
    let elapsed = start.elapsed();

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        if stdout.contains("100% packet loss") || stdout.contains("100.0% packet loss") {
            return Err(ProbeError::Timeout(timeout));
        }
        return Err(ProbeError::Command(format!("ping failed: {}", stdout.trim())));
    }

    Ok(parse_ping_time(&stdout).unwrap_or(elapsed))
}

/// Extract the round-trip time from a `time=X ms` line.
fn parse_ping_time(output: &str) -> Option<Duration> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"time[=<](?P<val>[0-9.]+)\s*ms").expect("valid regex"));

    let ms: f64 = re.captures(output)?.name("val")?.as_str().parse().ok()?;
    Some(Duration::from_micros((ms * 1000.0).round() as u64))
}
