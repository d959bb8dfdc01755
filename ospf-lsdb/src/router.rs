//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, VecDeque};
use std::net::Ipv4Addr;
use std::sync::Arc;

use ipnetwork::Ipv4Network;
use ospf_utils::ip::Ipv4NetworkExt;

use crate::area::{AddressRange, Area, NeighborStates};
use crate::collections::{Areas, Lsdb};
use crate::config::RouterCfg;
use crate::debug::{Debug, LsaFlushReason};
use crate::error::Error;
use crate::flood::flood;
use crate::lsdb::{self, LSDB_AGE_INTERVAL, LsaEntryFlags, LsaLogEntry};
use crate::packet::lsa::{Lsa, LsaAsExternal, LsaKey, LsaType};
use crate::route::{self, RoutingTable, RoutingTableEntry};
use crate::southbound::{self, Southbound};

// OSPFv2 router: the AS-external database, the areas, and the routing table
// computed from them.
#[derive(Debug)]
pub struct Router<A: Area, S: Southbound> {
    // Router ID.
    pub router_id: Ipv4Addr,
    // Router configuration.
    pub config: RouterCfg,
    // Router areas.
    pub areas: Areas<A>,
    // Router state data.
    pub state: RouterState,
    // Host routing table, interface table and timers.
    pub sb: S,
}

#[derive(Debug, Default)]
pub struct RouterState {
    // AS-scope LSDB.
    pub lsdb: Lsdb,
    // Current routing table.
    pub rib: RoutingTable,
    // Redistributed routes, by network address.
    pub external_routes: BTreeMap<Ipv4Addr, LsaAsExternal>,
    // LSA log.
    pub lsa_log: VecDeque<LsaLogEntry>,
    pub lsa_log_next_id: u32,
    // Statistics.
    pub orig_lsa_count: u32,
    pub rebuild_count: u32,
}

// ===== impl Router =====

impl<A, S> Router<A, S>
where
    A: Area,
    S: Southbound,
{
    pub fn new(router_id: Ipv4Addr, config: RouterCfg, sb: S) -> Router<A, S> {
        Router {
            router_id,
            config,
            areas: Default::default(),
            state: Default::default(),
            sb,
        }
    }

    // Starts the periodic database aging.
    pub fn start(&mut self) {
        self.sb.start_age_timer(LSDB_AGE_INTERVAL);
    }

    pub fn add_area(&mut self, area: A) -> Result<&mut A, Error> {
        let area_id = area.area_id();
        let area = self.areas.insert(area)?;
        Debug::AreaCreate(area_id).log();
        Ok(area)
    }

    pub fn area(&self, area_id: Ipv4Addr) -> Option<&A> {
        self.areas.get_by_area_id(area_id)
    }

    pub fn area_mut(&mut self, area_id: Ipv4Addr) -> Option<&mut A> {
        self.areas.get_mut_by_area_id(area_id)
    }

    // Installs the LSA into the database it belongs to: the AS-external
    // database, or the database of the given area.
    //
    // Returns whether the routing table needs to be recomputed.
    pub fn install_lsa(&mut self, lsa: Arc<Lsa>, area_id: Ipv4Addr) -> bool {
        if lsa.hdr.lsa_type == LsaType::AsExternal {
            return self.install_as_external_lsa(lsa);
        }

        let Some(area) = self.areas.get_mut_by_area_id(area_id) else {
            Error::AreaIdNotFound(area_id).log();
            return false;
        };
        match lsa.hdr.lsa_type {
            LsaType::Router => area.install_router_lsa(lsa),
            LsaType::Network => area.install_network_lsa(lsa),
            LsaType::SummaryNetwork | LsaType::SummaryRouter => {
                area.install_summary_lsa(lsa)
            }
            LsaType::AsExternal => false,
        }
    }

    // Installs an AS-external LSA, resolving conflicts with self-originated
    // LSAs describing the same route.
    //
    // Returns whether the routing table needs to be recomputed.
    pub fn install_as_external_lsa(&mut self, lsa: Arc<Lsa>) -> bool {
        lsdb::install_as_external(self, lsa)
    }

    pub fn find_lsa(
        &self,
        lsa_type: LsaType,
        key: &LsaKey,
        area_id: Ipv4Addr,
    ) -> Option<&Arc<Lsa>> {
        if lsa_type == LsaType::AsExternal {
            return self.find_as_external_lsa(key);
        }

        let area = self.areas.get_by_area_id(area_id)?;
        match lsa_type {
            LsaType::Router => area.find_router_lsa(key),
            LsaType::Network => area.find_network_lsa(key),
            LsaType::SummaryNetwork | LsaType::SummaryRouter => {
                area.find_summary_lsa(key)
            }
            LsaType::AsExternal => None,
        }
    }

    pub fn find_as_external_lsa(&self, key: &LsaKey) -> Option<&Arc<Lsa>> {
        self.state.lsdb.get(key).map(|lse| &lse.data)
    }

    // Runs one database aging pass. Expected to be called when the aging
    // timer fires.
    pub fn age_database(&mut self) {
        lsdb::age_database(self);
    }

    // Floods the LSA according to its flooding scope. Returns whether it was
    // flooded back out of the interface it was received on.
    pub fn flood_lsa(
        &mut self,
        lsa: &Arc<Lsa>,
        area_id: Ipv4Addr,
        iface: Option<u32>,
        nbr: Option<Ipv4Addr>,
    ) -> bool {
        flood(&mut self.areas, lsa, Some(area_id), iface, nbr)
    }

    pub fn rebuild_routing_table(&mut self) {
        route::rebuild_routing_table(self);
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.state.rib
    }

    // Returns the routing table entry used to forward packets to `addr`.
    pub fn lookup(&self, addr: Ipv4Addr) -> Option<&RoutingTableEntry> {
        self.state
            .rib
            .lookup(&self.areas, addr)
            .and_then(|idx| self.state.rib.get(idx))
    }

    pub fn is_destination_unreachable(
        &self,
        lsa: &Lsa,
        area_id: Option<Ipv4Addr>,
    ) -> bool {
        lsdb::is_destination_unreachable(self, lsa, area_id)
    }

    // Redistributes an external route into OSPF.
    pub fn update_external_route(
        &mut self,
        network: Ipv4Addr,
        contents: LsaAsExternal,
        ifindex: u32,
    ) {
        Debug::ExternalRouteUpdate(network).log();

        // Add the route to the host routing table, unless another source
        // already did.
        let prefix = Ipv4Network::from_addr_mask(network, contents.mask);
        if !southbound::has_route(&self.sb, &prefix) {
            match self.sb.interface(ifindex) {
                Some(iface) => southbound::external_route_install(
                    &mut self.sb,
                    prefix,
                    &iface,
                    contents.metric,
                ),
                None => Error::InterfaceNotFound(ifindex).log(),
            }
        }

        self.state.external_routes.insert(network, contents.clone());
        if lsdb::originate_as_external(self, network, contents) {
            self.rebuild_routing_table();
        }
    }

    // Withdraws a previously redistributed external route.
    pub fn remove_external_route(&mut self, network: Ipv4Addr) {
        Debug::ExternalRouteRemove(network).log();

        let key = LsaKey::new(network, self.router_id);
        if let Some(lse) = self.state.lsdb.get_mut(&key) {
            lse.flags.insert(LsaEntryFlags::PURGEABLE);
            lsdb::flush_as_external(self, &key, LsaFlushReason::Withdrawal);
        }
        self.state.external_routes.remove(&network);
    }

    pub fn has_any_neighbor_in_states(&self, states: NeighborStates) -> bool {
        lsdb::nbrs_in_states(&self.areas, states)
    }

    pub fn is_on_any_retransmission_list(&self, key: &LsaKey) -> bool {
        lsdb::rxmt_lists_contain(&self.areas, key)
    }

    pub fn remove_from_all_retransmission_lists(&mut self, key: &LsaKey) {
        lsdb::rxmt_lists_remove(&mut self.areas, key);
    }

    // Returns the first configured address range, in any area, that contains
    // `prefix`.
    pub fn containing_address_range(
        &self,
        prefix: &Ipv4Network,
    ) -> Option<AddressRange> {
        self.areas
            .iter()
            .find_map(|area| area.containing_address_range(prefix))
    }

    // Returns whether an address range for exactly `prefix` is configured in
    // any area.
    pub fn has_address_range(&self, prefix: &Ipv4Network) -> bool {
        self.areas.iter().any(|area| {
            area.address_ranges()
                .iter()
                .any(|range| range.prefix == *prefix)
        })
    }

    // Returns the area one of whose interfaces has address `addr`.
    pub fn area_by_addr(&self, addr: Ipv4Addr) -> Option<&A> {
        self.areas.iter().find(|area| area.contains_address(addr))
    }

    pub fn is_local_address(&self, addr: Ipv4Addr) -> bool {
        self.areas.iter().any(|area| area.is_local_address(addr))
    }

    pub fn lsa_log(&self) -> &VecDeque<LsaLogEntry> {
        &self.state.lsa_log
    }
}
