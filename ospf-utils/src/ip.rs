//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;

// Extension methods for Ipv4Addr.
pub trait Ipv4AddrExt {
    // Applies the given network mask to this address.
    #[must_use]
    fn mask(&self, mask: Ipv4Addr) -> Ipv4Addr;

    // Interprets this address as a network mask and returns its prefix
    // length. Non-contiguous masks count only their leading ones.
    fn mask_prefixlen(&self) -> u8;

    // Returns the network mask for the given prefix length.
    fn from_prefixlen(prefixlen: u8) -> Ipv4Addr;
}

// Extension methods for Ipv4Network.
pub trait Ipv4NetworkExt {
    const MAX_PREFIXLEN: u8;

    // Builds a prefix out of an address and a network mask.
    fn from_addr_mask(addr: Ipv4Addr, mask: Ipv4Addr) -> Ipv4Network;
}

// ===== impl Ipv4Addr =====

impl Ipv4AddrExt for Ipv4Addr {
    fn mask(&self, mask: Ipv4Addr) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(*self) & u32::from(mask))
    }

    fn mask_prefixlen(&self) -> u8 {
        u32::from(*self).leading_ones() as u8
    }

    fn from_prefixlen(prefixlen: u8) -> Ipv4Addr {
        match prefixlen {
            0 => Ipv4Addr::UNSPECIFIED,
            len if len >= Ipv4Network::MAX_PREFIXLEN => Ipv4Addr::BROADCAST,
            len => Ipv4Addr::from(u32::MAX << (32 - len)),
        }
    }
}

// ===== impl Ipv4Network =====

impl Ipv4NetworkExt for Ipv4Network {
    const MAX_PREFIXLEN: u8 = 32;

    fn from_addr_mask(addr: Ipv4Addr, mask: Ipv4Addr) -> Ipv4Network {
        let prefixlen = mask.mask_prefixlen();
        let mask = Ipv4Addr::from_prefixlen(prefixlen);
        // Prefix lengths never exceed 32 here.
        Ipv4Network::new(addr.mask(mask), prefixlen)
            .unwrap_or_else(|_| Ipv4Network::from(addr))
    }
}

// ===== unit tests =====
