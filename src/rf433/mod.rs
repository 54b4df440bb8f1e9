//! # RF433 Addressing and Transmission Seam
//!
//! Maps logical channel indexes to unit calls on the 433 MHz bus. The
//! transmitter address is derived exactly once at boot from the low three
//! bytes of the device's hardware MAC, which keeps two bridges from colliding
//! on the RF unit address space with extremely high probability (not a
//! guarantee).
//!
//! The electrical driver (pulse timing, GPIO) is an external collaborator
//! behind the [`RfTransmitter`] trait. Transmission is fire-and-forget: there
//! is no acknowledgement path on this bus, so nothing here reports delivery
//! and nothing downstream may infer it. [`LogTransmitter`] is the shipped
//! stand-in; it logs every unit call and is also what dry runs use.

use anyhow::{anyhow, Result};
use log::info;

/// Device-unique RF transmitter address derived from the hardware MAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceAddress(u32);

impl DeviceAddress {
    /// Derive the address from the low three MAC bytes. Called exactly once
    /// at boot, before any transmission.
    pub fn from_mac(mac: [u8; 6]) -> Self {
        DeviceAddress(((mac[3] as u32) << 16) | ((mac[4] as u32) << 8) | (mac[5] as u32))
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Lowercase hex rendering used as the provisioning device id.
    pub fn device_id(&self) -> String {
        format!("{:06x}", self.0)
    }
}

/// Parse a colon-separated MAC address string into its six bytes.
pub fn parse_mac(s: &str) -> Result<[u8; 6]> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 6 {
        return Err(anyhow!("expected 6 colon-separated octets, got {}", parts.len()));
    }
    let mut mac = [0u8; 6];
    for (i, part) in parts.iter().enumerate() {
        mac[i] = u8::from_str_radix(part, 16)
            .map_err(|_| anyhow!("octet '{}' is not hex", part))?;
    }
    Ok(mac)
}

/// Radio driver seam. One call per on/off command for a unit; fire-and-forget.
pub trait RfTransmitter {
    fn send_unit(&mut self, unit: u8, on: bool);
}

/// Logging stand-in for the electrical driver. Useful on hosts without a
/// radio attached and for dry runs.
pub struct LogTransmitter {
    address: DeviceAddress,
}

impl LogTransmitter {
    pub fn new(address: DeviceAddress) -> Self {
        Self { address }
    }
}

impl RfTransmitter for LogTransmitter {
    fn send_unit(&mut self, unit: u8, on: bool) {
        info!(
            "rf433: address={} unit={} {}",
            self.address.device_id(),
            unit,
            if on { "ON" } else { "OFF" }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_uses_low_three_bytes_only() {
        let a = DeviceAddress::from_mac([0xaa, 0xbb, 0xcc, 0x12, 0x34, 0x56]);
        let b = DeviceAddress::from_mac([0x00, 0x11, 0x22, 0x12, 0x34, 0x56]);
        assert_eq!(a, b);
        assert_eq!(a.as_u32(), 0x123456);
    }

    #[test]
    fn device_id_is_lowercase_six_digit_hex() {
        let addr = DeviceAddress::from_mac([0, 0, 0, 0x0a, 0x0b, 0x0c]);
        assert_eq!(addr.device_id(), "0a0b0c");
        let small = DeviceAddress::from_mac([0, 0, 0, 0, 0, 0x01]);
        assert_eq!(small.device_id(), "000001");
    }

    #[test]
    fn parse_mac_accepts_colon_form() {
        let mac = parse_mac("5c:cf:7f:12:34:56").unwrap();
        assert_eq!(mac, [0x5c, 0xcf, 0x7f, 0x12, 0x34, 0x56]);
    }

    #[test]
    fn parse_mac_rejects_garbage() {
        assert!(parse_mac("").is_err());
        assert!(parse_mac("5c:cf:7f:12:34").is_err());
        assert!(parse_mac("zz:cf:7f:12:34:56").is_err());
    }
}
