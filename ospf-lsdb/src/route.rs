//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use bitflags::bitflags;
use derive_new::new;
use ipnetwork::Ipv4Network;
use itertools::Itertools;
use ospf_utils::ip::{Ipv4AddrExt, Ipv4NetworkExt};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::area::{self, Area};
use crate::collections::{Areas, Lsdb};
use crate::config::RouterCfg;
use crate::debug::Debug;
use crate::lsdb::{LSA_INFINITY, LSA_MAX_AGE};
use crate::packet::Options;
use crate::packet::lsa::{ExternalMetricType, Lsa, LsaKey, LsaType};
use crate::router::Router;
use crate::southbound::{self, Southbound};

// OSPF routing table.
//
// The table is rebuilt from scratch on every route calculation and replaced
// as a whole, so readers never observe a partially computed table.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct RoutingTable {
    entries: Vec<RoutingTableEntry>,
}

// OSPF routing table entry.
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct RoutingTableEntry {
    pub dest_type: DestinationType,
    pub destination: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub options: Options,
    pub area_id: Ipv4Addr,
    pub path_type: PathType,
    pub cost: u32,
    #[new(default)]
    pub type2_cost: Option<u32>,
    #[new(default)]
    pub origin: Option<LsaOrigin>,
    #[new(default)]
    #[serde(
        serialize_with = "serialize_nexthops",
        deserialize_with = "deserialize_nexthops"
    )]
    pub nexthops: Nexthops,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct DestinationType: u8 {
        const NETWORK = 0x01;
        const AREA_BORDER_ROUTER = 0x02;
        const AS_BOUNDARY_ROUTER = 0x04;
    }
}

// OSPF path types in decreasing order of preference.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum PathType {
    IntraArea,
    InterArea,
    Type1External,
    Type2External,
}

// LSA that originated a routing table entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct LsaOrigin {
    pub lsa_type: LsaType,
    pub key: LsaKey,
}

// Route nexthop key.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, new)]
#[derive(Deserialize, Serialize)]
pub struct NexthopKey {
    // Nexthop interface.
    pub ifindex: u32,
    // Nexthop address (`None` for connected routes).
    pub addr: Option<Ipv4Addr>,
}

// Route nexthop.
#[derive(Clone, Copy, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct Nexthop {
    // Nexthop interface.
    pub ifindex: u32,
    // Nexthop address (`None` for connected routes).
    pub addr: Option<Ipv4Addr>,
    // Router that advertised the destination.
    pub adv_rtr: Ipv4Addr,
}

// Ordered list of nexthops.
pub type Nexthops = BTreeMap<NexthopKey, Nexthop>;

// ===== impl RoutingTable =====

impl RoutingTable {
    pub fn push(&mut self, entry: RoutingTableEntry) {
        self.entries.push(entry);
    }

    pub fn get(&self, idx: usize) -> Option<&RoutingTableEntry> {
        self.entries.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut RoutingTableEntry> {
        self.entries.get_mut(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoutingTableEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Returns the index of the network entry for exactly the given
    // destination.
    pub fn find_network(
        &self,
        destination: Ipv4Addr,
        mask: Ipv4Addr,
    ) -> Option<usize> {
        self.entries.iter().position(|entry| {
            entry.dest_type.contains(DestinationType::NETWORK)
                && entry.mask == mask
                && entry.destination.mask(mask) == destination.mask(mask)
        })
    }

    // Returns the indexes of all routes to the given AS boundary router.
    pub fn routes_to_asbr(&self, router_id: Ipv4Addr) -> Vec<usize> {
        self.entries
            .iter()
            .positions(|entry| {
                entry.dest_type.contains(DestinationType::AS_BOUNDARY_ROUTER)
                    && entry.destination == router_id
            })
            .collect()
    }

    // Returns whether the given router is reachable as either an area border
    // router or an AS boundary router.
    pub fn has_route_to_border_router(&self, router_id: Ipv4Addr) -> bool {
        self.entries.iter().any(|entry| {
            entry.dest_type.intersects(
                DestinationType::AREA_BORDER_ROUTER
                    | DestinationType::AS_BOUNDARY_ROUTER,
            ) && entry.destination == router_id
        })
    }

    // Longest-match lookup.
    //
    // Addresses covered by an active area range (a range with at least one
    // reachable intra-area constituent) that is more specific than the best
    // match are treated as unreachable, since the range is advertised as a
    // single aggregate.
    pub fn lookup<A>(&self, areas: &Areas<A>, addr: Ipv4Addr) -> Option<usize>
    where
        A: Area,
    {
        let (best_idx, best) = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| {
                entry.dest_type.contains(DestinationType::NETWORK)
            })
            .filter(|(_, entry)| entry.prefix().contains(addr))
            .fold(None, |best: Option<(usize, &RoutingTableEntry)>, item| {
                match best {
                    Some(best)
                        if best.1.prefix().prefix()
                            >= item.1.prefix().prefix() =>
                    {
                        Some(best)
                    }
                    _ => Some(item),
                }
            })?;

        let best_len = best.prefix().prefix();
        let discarded = self
            .active_ranges(areas)
            .into_iter()
            .any(|range| range.contains(addr) && range.prefix() > best_len);
        if discarded {
            return None;
        }

        Some(best_idx)
    }

    // Returns all area ranges containing at least one intra-area network
    // route.
    fn active_ranges<A>(&self, areas: &Areas<A>) -> Vec<Ipv4Network>
    where
        A: Area,
    {
        areas
            .iter()
            .flat_map(|area| area.address_ranges().iter())
            .filter(|range| {
                self.entries.iter().any(|entry| {
                    entry.dest_type.contains(DestinationType::NETWORK)
                        && entry.path_type == PathType::IntraArea
                        && range.contains(&entry.prefix())
                })
            })
            .map(|range| range.prefix)
            .collect()
    }
}

// ===== impl RoutingTableEntry =====

impl RoutingTableEntry {
    // Returns the destination as a network prefix.
    pub fn prefix(&self) -> Ipv4Network {
        Ipv4Network::from_addr_mask(self.destination, self.mask)
    }

    // Returns the key used to match entries across routing tables.
    pub(crate) fn dest_key(&self) -> (Ipv4Addr, Ipv4Addr) {
        (self.destination.mask(self.mask), self.mask)
    }

    // Returns whether the entry describes a non-backbone intra-area path.
    fn is_non_backbone_intra_area(&self) -> bool {
        self.path_type == PathType::IntraArea
            && self.area_id != Ipv4Addr::UNSPECIFIED
    }
}

// ===== global functions =====

// Rebuilds the routing table from scratch, installs the result into the
// host routing table and informs the areas about the changes.
pub(crate) fn rebuild_routing_table<A, S>(router: &mut Router<A, S>)
where
    A: Area,
    S: Southbound,
{
    let mut table = RoutingTable::default();

    // Intra-area routes.
    let mut has_transit_areas = false;
    for area in router.areas.iter_mut() {
        area.calculate_shortest_path_tree(&mut table);
        has_transit_areas |= area.transit_capability();
    }

    // Inter-area routes.
    if router.areas.len() > 1 {
        if let Some(backbone) = router.areas.backbone_mut() {
            backbone.calculate_inter_area_routes(&mut table);
        }
    } else if let Some(area) = router.areas.iter_mut().next() {
        area.calculate_inter_area_routes(&mut table);
    }

    // Transit areas.
    if has_transit_areas {
        for area in router
            .areas
            .iter_mut()
            .filter(|area| area.transit_capability())
        {
            area.recheck_summary_lsas(&mut table);
        }
    }

    // AS-external routes.
    calculate_as_external_routes(
        &mut table,
        &router.state.lsdb,
        &router.areas,
        router.router_id,
        &router.config,
    );

    // Publish the new table.
    let old_table = std::mem::replace(&mut router.state.rib, table);
    router.state.rebuild_count += 1;
    Debug::RoutingTableRebuild(router.state.rib.len()).log();

    // Update the host routing table.
    southbound::route_sync(&mut router.sb, &router.state.rib);

    // Keep summary LSAs in sync with the new table.
    area::notify_routing_table_changes(router, &old_table);
}

// Computes the AS-external routes (RFC 2328 section 16.4).
pub(crate) fn calculate_as_external_routes<A>(
    table: &mut RoutingTable,
    lsdb: &Lsdb,
    areas: &Areas<A>,
    router_id: Ipv4Addr,
    config: &RouterCfg,
) where
    A: Area,
{
    for lse in lsdb.iter() {
        let lsa = &lse.data;
        let Some(ext) = lsa.body.as_as_external() else {
            continue;
        };

        // Find the preferred path to the advertising router or to the
        // forwarding address.
        let Some(pref_idx) =
            preferred_entry(table, areas, lsa, true, router_id, config)
        else {
            continue;
        };
        let pref = table.entries[pref_idx].clone();
        let adv_rtr = lsa.hdr.adv_rtr;
        let metric_type = ext.metric_type();
        let (cost, type2_cost) = match metric_type {
            ExternalMetricType::Type1 => {
                (pref.cost.saturating_add(ext.metric), None)
            }
            ExternalMetricType::Type2 => (pref.cost, Some(ext.metric)),
        };
        let path_type = match metric_type {
            ExternalMetricType::Type1 => PathType::Type1External,
            ExternalMetricType::Type2 => PathType::Type2External,
        };
        let nexthops = pref
            .nexthops
            .values()
            .map(|nexthop| {
                let nexthop = Nexthop::new(nexthop.ifindex, nexthop.addr, adv_rtr);
                (NexthopKey::new(nexthop.ifindex, nexthop.addr), nexthop)
            })
            .collect::<Nexthops>();
        let origin = LsaOrigin::new(LsaType::AsExternal, lsa.key());

        let destination = ext.network(lsa.hdr.lsa_id);
        let Some(dest_idx) = table.find_network(destination, ext.mask) else {
            // Add a new entry.
            let mut entry = RoutingTableEntry::new(
                DestinationType::NETWORK,
                destination,
                ext.mask,
                lsa.hdr.options,
                pref.area_id,
                path_type,
                cost,
            );
            entry.type2_cost = type2_cost;
            entry.origin = Some(origin);
            entry.nexthops = nexthops;
            table.push(entry);
            continue;
        };

        let dest = &table.entries[dest_idx];
        match (dest.path_type, metric_type) {
            // Intra-area and inter-area paths are always preferred.
            (PathType::IntraArea | PathType::InterArea, _) => continue,
            // Type 1 external paths are preferred over type 2 ones.
            (PathType::Type1External, ExternalMetricType::Type2) => continue,
            (PathType::Type2External, ExternalMetricType::Type2)
                if dest.type2_cost < type2_cost =>
            {
                continue;
            }
            _ => (),
        }

        let mut better = match (dest.path_type, metric_type) {
            (PathType::Type2External, ExternalMetricType::Type1) => true,
            (PathType::Type2External, ExternalMetricType::Type2) => {
                dest.type2_cost > type2_cost
            }
            _ => false,
        };

        // When RFC1583Compatibility is disabled, paths through non-backbone
        // intra-area routes are preferred.
        if !better && !config.rfc1583_compatibility {
            let dest_pref_nbi = dest
                .origin
                .and_then(|origin| lsdb.get(&origin.key))
                .and_then(|dest_lse| {
                    preferred_entry(
                        table,
                        areas,
                        &dest_lse.data,
                        false,
                        router_id,
                        config,
                    )
                })
                .is_some_and(|idx| {
                    table.entries[idx].is_non_backbone_intra_area()
                });
            let pref_nbi = pref.is_non_backbone_intra_area();
            if dest_pref_nbi && !pref_nbi {
                continue;
            }
            better = pref_nbi && !dest_pref_nbi;
        }

        let dest = &mut table.entries[dest_idx];
        if !better {
            if dest.cost < cost {
                continue;
            }

            // Equal-cost paths are merged.
            if dest.cost == cost {
                for (key, nexthop) in nexthops {
                    dest.nexthops.entry(key).or_insert(nexthop);
                }
                while dest.nexthops.len() > config.max_paths as usize {
                    dest.nexthops.pop_last();
                }
                continue;
            }
        }

        // The new path is better.
        dest.area_id = pref.area_id;
        dest.path_type = path_type;
        dest.cost = cost;
        dest.type2_cost = type2_cost;
        dest.dest_type = DestinationType::NETWORK;
        dest.options = lsa.hdr.options;
        dest.origin = Some(origin);
        dest.nexthops = nexthops;
    }
}

// Returns the routing table entry used to reach the destination advertised by
// an AS-external LSA: either the best route to the advertising AS boundary
// router, or the route to the forwarding address (RFC 2328 section 16.4).
pub(crate) fn preferred_entry<A>(
    table: &RoutingTable,
    areas: &Areas<A>,
    lsa: &Lsa,
    skip_self_originated: bool,
    router_id: Ipv4Addr,
    config: &RouterCfg,
) -> Option<usize>
where
    A: Area,
{
    let ext = lsa.body.as_as_external()?;
    let adv_rtr = lsa.hdr.adv_rtr;

    // (1) and (2).
    if ext.metric >= LSA_INFINITY
        || lsa.hdr.age == LSA_MAX_AGE
        || (skip_self_originated && adv_rtr == router_id)
    {
        return None;
    }

    // (3).
    let mut asbr_routes = table.routes_to_asbr(adv_rtr);
    if asbr_routes.is_empty() {
        Debug::ExternalUnreachableAsbr(lsa.hdr.lsa_id, adv_rtr).log();
        return None;
    }

    match ext.fwd_addr {
        None => {
            if !config.rfc1583_compatibility {
                prune_asbr_routes(table, &mut asbr_routes);
            }
            asbr_routes.into_iter().reduce(|best, idx| {
                let best_entry = &table.entries[best];
                let entry = &table.entries[idx];
                if entry.cost < best_entry.cost
                    || (entry.cost == best_entry.cost
                        && entry.area_id > best_entry.area_id)
                {
                    idx
                } else {
                    best
                }
            })
        }
        Some(fwd_addr) => {
            let idx = table.lookup(areas, fwd_addr)?;
            match table.entries[idx].path_type {
                PathType::IntraArea | PathType::InterArea => Some(idx),
                _ => None,
            }
        }
    }
}

// ===== helper functions =====

// Keeps only the non-backbone intra-area paths, if any exists (RFC 2328
// section 16.4.1).
fn prune_asbr_routes(table: &RoutingTable, routes: &mut Vec<usize>) {
    let has_nbi = routes
        .iter()
        .any(|idx| table.entries[*idx].is_non_backbone_intra_area());
    if has_nbi {
        routes.retain(|idx| table.entries[*idx].is_non_backbone_intra_area());
    }
}

// Nexthops are serialized as a list, since their keys aren't strings.
fn serialize_nexthops<S>(
    nexthops: &Nexthops,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(nexthops.values())
}

fn deserialize_nexthops<'de, D>(deserializer: D) -> Result<Nexthops, D::Error>
where
    D: Deserializer<'de>,
{
    let nexthops = Vec::<Nexthop>::deserialize(deserializer)?;
    Ok(nexthops
        .into_iter()
        .map(|nexthop| (NexthopKey::new(nexthop.ifindex, nexthop.addr), nexthop))
        .collect())
}

// ===== unit tests =====
