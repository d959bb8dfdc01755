//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::area::Area;
use crate::collections::Areas;
use crate::debug::Debug;
use crate::packet::lsa::{Lsa, LsaScope};

// ===== global functions =====

// Floods the LSA according to its flooding scope.
//
// AS-scope LSAs are flooded into every area that supports external routing,
// while area-scope LSAs are flooded only into the given area. The optional
// interface and neighbor identify where the LSA was received from.
//
// Returns whether the LSA was flooded back out of the receiving interface.
pub(crate) fn flood<A>(
    areas: &mut Areas<A>,
    lsa: &Arc<Lsa>,
    area_id: Option<Ipv4Addr>,
    iface: Option<u32>,
    nbr: Option<Ipv4Addr>,
) -> bool
where
    A: Area,
{
    match lsa.hdr.lsa_type.scope() {
        LsaScope::Area => {
            let Some(area_id) = area_id else {
                return false;
            };
            let Some(area) = areas.get_mut_by_area_id(area_id) else {
                Debug::AreaNotFound(area_id).log();
                return false;
            };
            area.flood_lsa(lsa, iface, nbr)
        }
        LsaScope::As => flood_as(areas, lsa, iface, nbr),
    }
}

// ===== helper functions =====

fn flood_as<A>(
    areas: &mut Areas<A>,
    lsa: &Arc<Lsa>,
    iface: Option<u32>,
    nbr: Option<Ipv4Addr>,
) -> bool
where
    A: Area,
{
    let mut flooded_back = false;
    for area in areas
        .iter_mut()
        // Stub areas don't accept AS-external LSAs.
        .filter(|area| area.external_routing_capability())
    {
        flooded_back |= area.flood_lsa(lsa, iface, nbr);
    }

    flooded_back
}
