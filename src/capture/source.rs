//! Packet sources
//!
//! A live capture on a network interface with the echo-request filter
//! installed in the kernel, or a savefile replayed through the same
//! filter.

use std::net::IpAddr;
use std::path::Path;

use pcap::{Active, Capture, Device, Offline};
use tracing::{info, warn};

use crate::capture::classify::LinkType;
use crate::constants::{ECHO_REQUEST_FILTER, READ_TIMEOUT_MS, SNAPSHOT_LEN};
use crate::error::CaptureError;

/// Result of one read from a packet source
#[derive(Debug, PartialEq, Eq)]
pub enum Poll<'a> {
    Packet(&'a [u8]),
    /// Read timeout expired with nothing captured
    Timeout,
    /// Source has no more packets
    Exhausted,
}

/// Anything the dispatcher can pull packets from
pub trait PacketSource {
    fn link_type(&self) -> LinkType;

    fn next_packet(&mut self) -> Result<Poll<'_>, CaptureError>;
}

/// Live capture parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Bytes captured per packet
    pub snaplen: i32,
    pub promiscuous: bool,
    /// Upper bound on a single blocking read
    pub timeout_ms: i32,
    /// Filter expression in capture-library syntax
    pub filter: String,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            snaplen: SNAPSHOT_LEN,
            promiscuous: true,
            timeout_ms: READ_TIMEOUT_MS,
            filter: ECHO_REQUEST_FILTER.to_string(),
        }
    }
}

/// Network and mask of a resolved interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub net: IpAddr,
    pub mask: IpAddr,
}

/// Resolve the named interface, or the library default when `name` is `None`
pub fn resolve_interface(name: Option<&str>) -> Result<(Device, InterfaceInfo), CaptureError> {
    let device = match name {
        Some(name) => Device::list()
            .map_err(|e| CaptureError::Lookup {
                device: name.to_string(),
                reason: e.to_string(),
            })?
            .into_iter()
            .find(|d| d.name == name)
            .ok_or_else(|| CaptureError::InterfaceNotFound(name.to_string()))?,
        None => Device::lookup()
            .map_err(|e| CaptureError::InterfaceNotFound(e.to_string()))?
            .ok_or_else(|| CaptureError::InterfaceNotFound("no default device".to_string()))?,
    };

    let info = interface_info(&device.name, &device.addresses)?;
    Ok((device, info))
}

/// Network and mask from the interface's first IPv4 address that has a mask
pub fn interface_info(
    name: &str,
    addresses: &[pcap::Address],
) -> Result<InterfaceInfo, CaptureError> {
    let (addr, mask) = addresses
        .iter()
        .find_map(|a| match (a.addr, a.netmask) {
            (addr @ IpAddr::V4(_), Some(mask @ IpAddr::V4(_))) => Some((addr, mask)),
            _ => None,
        })
        .ok_or_else(|| CaptureError::Lookup {
            device: name.to_string(),
            reason: "no IPv4 netmask".to_string(),
        })?;

    Ok(InterfaceInfo {
        name: name.to_string(),
        net: network_of(addr, mask),
        mask,
    })
}

fn network_of(addr: IpAddr, mask: IpAddr) -> IpAddr {
    match (addr, mask) {
        (IpAddr::V4(addr), IpAddr::V4(mask)) => {
            IpAddr::V4((u32::from(addr) & u32::from(mask)).into())
        }
        (addr, _) => addr,
    }
}

/// Live capture on a network interface
pub struct LiveCapture {
    capture: Capture<Active>,
    link: LinkType,
}

impl LiveCapture {
    /// Open `interface` (or the default device) with the filter installed
    pub fn open(interface: Option<&str>, settings: &CaptureSettings) -> Result<Self, CaptureError> {
        let (device, info) = resolve_interface(interface)?;
        info!(
            device = %info.name,
            net = %info.net,
            mask = %info.mask,
            "Using device"
        );

        let open_err = |e: pcap::Error| CaptureError::Open {
            device: info.name.clone(),
            reason: e.to_string(),
        };

        let mut capture = Capture::from_device(device)
            .map_err(open_err)?
            .snaplen(settings.snaplen)
            .promisc(settings.promiscuous)
            .timeout(settings.timeout_ms)
            .open()
            .map_err(open_err)?;

        install_filter(&mut capture, &settings.filter)?;

        let link = LinkType::from(capture.get_datalink());
        if let LinkType::Unsupported(dlt) = link {
            warn!(device = %info.name, dlt, "Unrecognised link type, relying on kernel filter only");
        }

        Ok(Self { capture, link })
    }
}

impl PacketSource for LiveCapture {
    fn link_type(&self) -> LinkType {
        self.link
    }

    fn next_packet(&mut self) -> Result<Poll<'_>, CaptureError> {
        map_read(self.capture.next_packet())
    }
}

/// Replay of a pcap savefile
pub struct OfflineCapture {
    capture: Capture<Offline>,
    link: LinkType,
}

impl OfflineCapture {
    pub fn open<P: AsRef<Path>>(path: P, settings: &CaptureSettings) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let mut capture = Capture::from_file(path).map_err(|e| CaptureError::Open {
            device: path.display().to_string(),
            reason: e.to_string(),
        })?;

        install_filter(&mut capture, &settings.filter)?;
        let link = LinkType::from(capture.get_datalink());
        info!(path = %path.display(), link = ?link, "Replaying savefile");

        Ok(Self { capture, link })
    }
}

impl PacketSource for OfflineCapture {
    fn link_type(&self) -> LinkType {
        self.link
    }

    fn next_packet(&mut self) -> Result<Poll<'_>, CaptureError> {
        map_read(self.capture.next_packet())
    }
}

fn install_filter<T: pcap::Activated + ?Sized>(
    capture: &mut Capture<T>,
    filter: &str,
) -> Result<(), CaptureError> {
    // Compile first so parse errors are told apart from install errors
    capture
        .compile(filter, true)
        .map_err(|e| CaptureError::FilterCompile {
            filter: filter.to_string(),
            reason: e.to_string(),
        })?;

    capture
        .filter(filter, true)
        .map_err(|e| CaptureError::FilterInstall {
            filter: filter.to_string(),
            reason: e.to_string(),
        })
}

fn map_read(result: Result<pcap::Packet<'_>, pcap::Error>) -> Result<Poll<'_>, CaptureError> {
    match result {
        Ok(packet) => Ok(Poll::Packet(packet.data)),
        Err(pcap::Error::TimeoutExpired) => Ok(Poll::Timeout),
        Err(pcap::Error::NoMorePackets) => Ok(Poll::Exhausted),
        Err(e) => Err(CaptureError::Read(e.to_string())),
    }
}

/// Compile `filter` for a link type without opening a device
pub fn compile_filter(
    linktype: pcap::Linktype,
    filter: &str,
) -> Result<pcap::BpfProgram, CaptureError> {
    let capture = Capture::dead(linktype).map_err(|e| CaptureError::Open {
        device: "dead".to_string(),
        reason: e.to_string(),
    })?;
    capture
        .compile(filter, true)
        .map_err(|e| CaptureError::FilterCompile {
            filter: filter.to_string(),
            reason: e.to_string(),
        })
}
