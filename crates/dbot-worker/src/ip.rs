// SPDX-FileCopyrightText: 2026 DBot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Address classification done before any oracle is asked about an IP.

use std::net::Ipv4Addr;

/// How an address should be enriched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpClass {
    /// Routable on the internet; ask the oracles.
    Public,
    /// RFC 1918 range.
    Private,
    /// Not a global unicast address (loopback, link-local, multicast,
    /// unspecified, broadcast) or not a valid IPv4 address at all.
    NonGlobal,
}

pub fn classify(ip: &str) -> IpClass {
    let Ok(addr) = ip.parse::<Ipv4Addr>() else {
        return IpClass::NonGlobal;
    };
    if addr.is_loopback()
        || addr.is_link_local()
        || addr.is_multicast()
        || addr.is_unspecified()
        || addr.is_broadcast()
    {
        return IpClass::NonGlobal;
    }
    if addr.is_private() {
        return IpClass::Private;
    }
    IpClass::Public
}
