//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::sync::Arc;

use bitflags::bitflags;
use derive_new::new;
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};

use crate::debug::{Debug, LsaFlushReason};
use crate::flood::flood;
use crate::lsdb::next_seq_no;
use crate::packet::lsa::{Lsa, LsaKey};
use crate::route::{DestinationType, PathType, RoutingTable, RoutingTableEntry};
use crate::router::Router;
use crate::southbound::Southbound;

// OSPF area, as seen by the router-level database.
//
// Areas own their Router, Network and Summary LSAs, their interfaces and
// neighbors, and run the intra-area and inter-area parts of the route
// calculation.
pub trait Area {
    // Returns the area ID.
    fn area_id(&self) -> Ipv4Addr;

    // Returns whether this is the backbone area.
    fn is_backbone(&self) -> bool {
        self.area_id() == Ipv4Addr::UNSPECIFIED
    }

    // Returns whether AS-external LSAs are flooded into this area.
    fn external_routing_capability(&self) -> bool;

    // Returns whether the area can carry transit traffic.
    fn transit_capability(&self) -> bool;

    // Returns the configured address ranges.
    fn address_ranges(&self) -> &[AddressRange];

    // Installs the given LSA into the area database. Returns whether the
    // routing table needs to be recomputed.
    fn install_router_lsa(&mut self, lsa: Arc<Lsa>) -> bool;
    fn install_network_lsa(&mut self, lsa: Arc<Lsa>) -> bool;
    fn install_summary_lsa(&mut self, lsa: Arc<Lsa>) -> bool;

    // Area database lookups.
    fn find_router_lsa(&self, key: &LsaKey) -> Option<&Arc<Lsa>>;
    fn find_network_lsa(&self, key: &LsaKey) -> Option<&Arc<Lsa>>;
    fn find_summary_lsa(&self, key: &LsaKey) -> Option<&Arc<Lsa>>;

    // Runs the intra-area SPF, adding the resulting routes to `table`.
    fn calculate_shortest_path_tree(&mut self, table: &mut RoutingTable);

    // Examines the area's summary LSAs, adding inter-area routes to `table`.
    fn calculate_inter_area_routes(&mut self, table: &mut RoutingTable);

    // Re-examines the summary LSAs of a transit area (RFC 2328 section 16.3).
    fn recheck_summary_lsas(&mut self, table: &mut RoutingTable);

    // Originates a summary LSA describing `entry` into this area, if one is
    // needed. Keys present in `originated` were already originated during
    // the current notification pass.
    fn originate_summary_lsa(
        &mut self,
        entry: &RoutingTableEntry,
        originated: &BTreeSet<LsaKey>,
        table: &RoutingTable,
    ) -> Option<SummaryOrigination>;

    // Ages the area database by one second. Returns whether the routing table
    // needs to be recomputed.
    fn age_database(&mut self, table: &RoutingTable) -> bool;

    // Floods the LSA out of the area's interfaces, except the one it was
    // received on. Returns whether it was flooded back out of the receiving
    // interface.
    fn flood_lsa(
        &mut self,
        lsa: &Arc<Lsa>,
        iface: Option<u32>,
        nbr: Option<Ipv4Addr>,
    ) -> bool;

    // Returns whether any neighbor is in one of the given states.
    fn has_any_neighbor_in_states(&self, states: NeighborStates) -> bool;

    // Neighbor retransmission lists.
    fn is_on_any_retransmission_list(&self, key: &LsaKey) -> bool;
    fn remove_from_all_retransmission_lists(&mut self, key: &LsaKey);

    // Returns whether `addr` belongs to one of the area's interfaces.
    fn contains_address(&self, addr: Ipv4Addr) -> bool;

    // Returns whether `addr` is an address of one of the area's interfaces,
    // including virtual links.
    fn is_local_address(&self, addr: Ipv4Addr) -> bool {
        self.contains_address(addr)
    }

    // Returns the interface address of the router described by `lsa` that
    // points back towards the calculating router on the shortest-path tree.
    fn router_lsa_address(&self, lsa: &Lsa) -> Option<Ipv4Addr>;

    // Returns the configured address range containing `prefix`.
    fn containing_address_range(
        &self,
        prefix: &Ipv4Network,
    ) -> Option<AddressRange> {
        self.address_ranges()
            .iter()
            .find(|range| range.contains(prefix))
            .copied()
    }
}

// Area address range (RFC 2328 section 3.5).
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, new)]
#[derive(Deserialize, Serialize)]
pub struct AddressRange {
    pub prefix: Ipv4Network,
    pub advertise: bool,
}

// Result of a summary LSA origination request.
#[derive(Clone, Debug, new)]
pub struct SummaryOrigination {
    // The new summary LSA.
    pub lsa: Lsa,
    // Previously originated LSA that must be re-issued with a different Link
    // State ID to make room for the new one.
    pub supersede: Option<Lsa>,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct NeighborStates: u16 {
        const DOWN = 0x01;
        const ATTEMPT = 0x02;
        const INIT = 0x04;
        const TWO_WAY = 0x08;
        const EX_START = 0x10;
        const EXCHANGE = 0x20;
        const LOADING = 0x40;
        const FULL = 0x80;
    }
}

// ===== impl AddressRange =====

impl AddressRange {
    // Returns whether `prefix` falls within this range.
    pub fn contains(&self, prefix: &Ipv4Network) -> bool {
        self.prefix.is_supernet_of(*prefix)
    }
}

// ===== global functions =====

// Informs every area about the differences between the previous routing table
// and the current one, so that summary LSAs can be originated, updated or
// flushed accordingly.
//
// Within each area, additions and modifications are processed before
// removals.
pub(crate) fn notify_routing_table_changes<A, S>(
    router: &mut Router<A, S>,
    old_table: &RoutingTable,
) where
    A: Area,
    S: Southbound,
{
    if router.areas.len() <= 1 {
        return;
    }

    let new_table = router.state.rib.clone();
    let old_map: BTreeMap<_, _> = old_table
        .iter()
        .map(|entry| (entry.dest_key(), entry))
        .collect();
    let new_map: BTreeMap<_, _> = new_table
        .iter()
        .map(|entry| (entry.dest_key(), entry))
        .collect();

    for area_id in router.areas.area_ids() {
        let mut originated = BTreeSet::new();
        let mut deleted = BTreeSet::new();

        // New and modified destinations.
        for entry in new_table.iter() {
            let old_entry = old_map.get(&entry.dest_key());
            if old_entry.is_some_and(|old_entry| *old_entry == entry) {
                continue;
            }

            let Some(area) = router.areas.get_mut_by_area_id(area_id) else {
                continue;
            };
            match area.originate_summary_lsa(entry, &originated, &new_table) {
                Some(orig) => {
                    if let Some(lsa) = orig.supersede {
                        summary_install(router, area_id, lsa, &mut originated);
                    }
                    summary_install(router, area_id, orig.lsa, &mut originated);
                }
                None if old_entry.is_some() => {
                    summary_range_sync(
                        router,
                        area_id,
                        entry,
                        &new_table,
                        &mut originated,
                        &mut deleted,
                    );
                }
                None => (),
            }
        }

        // Removed destinations.
        for entry in old_table.iter() {
            if new_map.contains_key(&entry.dest_key()) {
                continue;
            }
            summary_range_sync(
                router,
                area_id,
                entry,
                &new_table,
                &mut originated,
                &mut deleted,
            );
        }
    }
}

// ===== helper functions =====

fn summary_install<A, S>(
    router: &mut Router<A, S>,
    area_id: Ipv4Addr,
    lsa: Lsa,
    originated: &mut BTreeSet<LsaKey>,
) where
    A: Area,
    S: Southbound,
{
    let Some(area) = router.areas.get_mut_by_area_id(area_id) else {
        return;
    };

    Debug::LsaOriginate(&lsa.hdr).log();
    let lsa = Arc::new(lsa);
    area.install_summary_lsa(lsa.clone());
    flood(&mut router.areas, &lsa, Some(area_id), None, None);
    router.state.orig_lsa_count += 1;
    originated.insert(LsaKey::new(lsa.hdr.lsa_id, router.router_id));
}

// Brings the self-originated summary LSA describing the address range that
// covers `entry` in line with the current routing table.
fn summary_range_sync<A, S>(
    router: &mut Router<A, S>,
    area_id: Ipv4Addr,
    entry: &RoutingTableEntry,
    table: &RoutingTable,
    originated: &mut BTreeSet<LsaKey>,
    deleted: &mut BTreeSet<LsaKey>,
) where
    A: Area,
    S: Southbound,
{
    // Find the range this destination is aggregated into.
    let mut range = entry.prefix();
    if entry.dest_type.contains(DestinationType::NETWORK)
        && matches!(entry.path_type, PathType::IntraArea | PathType::InterArea)
        && let Some(containing) = router.containing_address_range(&range)
    {
        range = containing.prefix;
    }

    // The range cost is the largest cost among its intra-area constituents.
    let cost = table
        .iter()
        .filter(|entry| entry.dest_type.contains(DestinationType::NETWORK))
        .filter(|entry| entry.path_type == PathType::IntraArea)
        .filter(|entry| range.is_supernet_of(entry.prefix()))
        .map(|entry| entry.cost)
        .max()
        .unwrap_or(0);

    let key = LsaKey::new(range.network(), router.router_id);
    let Some(area) = router.areas.get_mut_by_area_id(area_id) else {
        return;
    };
    let Some(lsa) = area.find_summary_lsa(&key) else {
        return;
    };
    let mut lsa = Lsa::clone(lsa);

    if cost == 0 {
        // No more constituents, so withdraw the summary.
        if !deleted.insert(key) {
            return;
        }
        Debug::LsaFlush(&lsa.hdr, LsaFlushReason::PrematureAging).log();
        lsa.set_maxage();
    } else {
        let Some(summary) = lsa.body.as_summary_network_mut() else {
            return;
        };
        if summary.metric == cost {
            return;
        }
        summary.metric = cost;
        lsa.set_age(0);
        lsa.set_seq_no(next_seq_no(lsa.hdr.seq_no));
        originated.insert(key);
        router.state.orig_lsa_count += 1;
        Debug::SummaryRangeUpdate(area_id, range.network(), cost).log();
    }

    let lsa = Arc::new(lsa);
    area.install_summary_lsa(lsa.clone());
    flood(&mut router.areas, &lsa, Some(area_id), None, None);
}
