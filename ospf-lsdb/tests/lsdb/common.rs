//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use ipnetwork::Ipv4Network;
use ospf_lsdb::Router;
use ospf_lsdb::area::{AddressRange, Area, NeighborStates, SummaryOrigination};
use ospf_lsdb::config::RouterCfg;
use ospf_lsdb::lsdb::LSA_INIT_SEQ_NO;
use ospf_lsdb::packet::Options;
use ospf_lsdb::packet::lsa::{
    ExternalMetricType, Lsa, LsaAsExternal, LsaBody, LsaKey, LsaSummary,
};
use ospf_lsdb::route::{
    DestinationType, Nexthop, NexthopKey, PathType, RoutingTable,
    RoutingTableEntry,
};
use ospf_lsdb::southbound::{
    InterfaceInfo, InterfaceTable, IpRoute, IpRoutingTable, TimerScheduler,
};

pub type TestRouter = Router<TestArea, TestSouthbound>;

// Area double. Its SPF and inter-area computations simply contribute the
// configured routes.
#[derive(Debug)]
pub struct TestArea {
    pub area_id: Ipv4Addr,
    pub router_id: Ipv4Addr,
    pub external_routing: bool,
    pub transit: bool,
    pub ranges: Vec<AddressRange>,
    pub addrs: Vec<Ipv4Addr>,
    pub router_lsas: BTreeMap<LsaKey, Arc<Lsa>>,
    pub network_lsas: BTreeMap<LsaKey, Arc<Lsa>>,
    pub summary_lsas: BTreeMap<LsaKey, Arc<Lsa>>,
    pub intra_routes: Vec<RoutingTableEntry>,
    pub inter_routes: Vec<RoutingTableEntry>,
    pub router_addrs: BTreeMap<Ipv4Addr, Ipv4Addr>,
    pub nbr_states: NeighborStates,
    pub rxmt_list: BTreeSet<LsaKey>,
    pub flooded: Vec<Arc<Lsa>>,
    pub flood_back_iface: Option<u32>,
    // Originate one summary LSA per intra-area network of other areas.
    pub summarize: bool,
    pub spf_runs: usize,
    pub inter_area_runs: usize,
    pub recheck_runs: usize,
    pub age_runs: usize,
}

// Host double.
#[derive(Debug, Default)]
pub struct TestSouthbound {
    pub routes: Vec<IpRoute>,
    pub interfaces: Vec<InterfaceInfo>,
    pub age_timer: Option<Duration>,
    pub age_timer_starts: usize,
}

// ===== impl TestArea =====

impl TestArea {
    pub fn new(area_id: Ipv4Addr) -> TestArea {
        TestArea {
            area_id,
            router_id: Ipv4Addr::UNSPECIFIED,
            external_routing: true,
            transit: false,
            ranges: Default::default(),
            addrs: Default::default(),
            router_lsas: Default::default(),
            network_lsas: Default::default(),
            summary_lsas: Default::default(),
            intra_routes: Default::default(),
            inter_routes: Default::default(),
            router_addrs: Default::default(),
            nbr_states: NeighborStates::empty(),
            rxmt_list: Default::default(),
            flooded: Default::default(),
            flood_back_iface: None,
            summarize: false,
            spf_runs: 0,
            inter_area_runs: 0,
            recheck_runs: 0,
            age_runs: 0,
        }
    }

    pub fn stub(area_id: Ipv4Addr) -> TestArea {
        TestArea {
            external_routing: false,
            ..TestArea::new(area_id)
        }
    }
}

impl Area for TestArea {
    fn area_id(&self) -> Ipv4Addr {
        self.area_id
    }

    fn external_routing_capability(&self) -> bool {
        self.external_routing
    }

    fn transit_capability(&self) -> bool {
        self.transit
    }

    fn address_ranges(&self) -> &[AddressRange] {
        &self.ranges
    }

    fn install_router_lsa(&mut self, lsa: Arc<Lsa>) -> bool {
        self.router_lsas.insert(lsa.key(), lsa);
        true
    }

    fn install_network_lsa(&mut self, lsa: Arc<Lsa>) -> bool {
        self.network_lsas.insert(lsa.key(), lsa);
        true
    }

    fn install_summary_lsa(&mut self, lsa: Arc<Lsa>) -> bool {
        self.summary_lsas.insert(lsa.key(), lsa);
        true
    }

    fn find_router_lsa(&self, key: &LsaKey) -> Option<&Arc<Lsa>> {
        self.router_lsas.get(key)
    }

    fn find_network_lsa(&self, key: &LsaKey) -> Option<&Arc<Lsa>> {
        self.network_lsas.get(key)
    }

    fn find_summary_lsa(&self, key: &LsaKey) -> Option<&Arc<Lsa>> {
        self.summary_lsas.get(key)
    }

    fn calculate_shortest_path_tree(&mut self, table: &mut RoutingTable) {
        self.spf_runs += 1;
        for entry in &self.intra_routes {
            table.push(entry.clone());
        }
    }

    fn calculate_inter_area_routes(&mut self, table: &mut RoutingTable) {
        self.inter_area_runs += 1;
        for entry in &self.inter_routes {
            table.push(entry.clone());
        }
    }

    fn recheck_summary_lsas(&mut self, _table: &mut RoutingTable) {
        self.recheck_runs += 1;
    }

    fn originate_summary_lsa(
        &mut self,
        entry: &RoutingTableEntry,
        originated: &BTreeSet<LsaKey>,
        _table: &RoutingTable,
    ) -> Option<SummaryOrigination> {
        if !self.summarize
            || entry.area_id == self.area_id
            || entry.path_type != PathType::IntraArea
            || !entry.dest_type.contains(DestinationType::NETWORK)
        {
            return None;
        }

        let key = LsaKey::new(entry.destination, self.router_id);
        if originated.contains(&key) {
            return None;
        }
        let seq_no = self
            .summary_lsas
            .get(&key)
            .map(|lsa| lsa.hdr.seq_no + 1)
            .unwrap_or(LSA_INIT_SEQ_NO);
        let lsa = Lsa::new(
            0,
            Options::E,
            entry.destination,
            self.router_id,
            seq_no,
            LsaBody::SummaryNetwork(LsaSummary::new(entry.mask, entry.cost)),
        );
        Some(SummaryOrigination::new(lsa, None))
    }

    fn age_database(&mut self, _table: &RoutingTable) -> bool {
        self.age_runs += 1;
        false
    }

    fn flood_lsa(
        &mut self,
        lsa: &Arc<Lsa>,
        iface: Option<u32>,
        _nbr: Option<Ipv4Addr>,
    ) -> bool {
        self.flooded.push(lsa.clone());
        iface.is_some() && iface == self.flood_back_iface
    }

    fn has_any_neighbor_in_states(&self, states: NeighborStates) -> bool {
        self.nbr_states.intersects(states)
    }

    fn is_on_any_retransmission_list(&self, key: &LsaKey) -> bool {
        self.rxmt_list.contains(key)
    }

    fn remove_from_all_retransmission_lists(&mut self, key: &LsaKey) {
        self.rxmt_list.remove(key);
    }

    fn contains_address(&self, addr: Ipv4Addr) -> bool {
        self.addrs.contains(&addr)
    }

    fn router_lsa_address(&self, lsa: &Lsa) -> Option<Ipv4Addr> {
        self.router_addrs.get(&lsa.hdr.lsa_id).copied()
    }
}

// ===== impl TestSouthbound =====

impl IpRoutingTable for TestSouthbound {
    fn route_count(&self) -> usize {
        self.routes.len()
    }

    fn route(&self, idx: usize) -> Option<&IpRoute> {
        self.routes.get(idx)
    }

    fn add_route(&mut self, route: IpRoute) {
        self.routes.push(route);
    }

    fn delete_route(&mut self, route: &IpRoute) -> bool {
        match self.routes.iter().position(|r| r == route) {
            Some(idx) => {
                self.routes.remove(idx);
                true
            }
            None => false,
        }
    }
}

impl InterfaceTable for TestSouthbound {
    fn interface(&self, ifindex: u32) -> Option<InterfaceInfo> {
        self.interfaces
            .iter()
            .find(|iface| iface.ifindex == ifindex)
            .cloned()
    }
}

impl TimerScheduler for TestSouthbound {
    fn start_age_timer(&mut self, delay: Duration) {
        self.age_timer = Some(delay);
        self.age_timer_starts += 1;
    }
}

//
// Helper functions.
//

pub fn prefix(prefix: &str) -> Ipv4Network {
    Ipv4Network::from_str(prefix).unwrap()
}

pub fn router(router_id: Ipv4Addr, areas: Vec<TestArea>) -> TestRouter {
    router_with_config(router_id, RouterCfg::default(), areas)
}

pub fn router_with_config(
    router_id: Ipv4Addr,
    config: RouterCfg,
    areas: Vec<TestArea>,
) -> TestRouter {
    let mut router = Router::new(router_id, config, TestSouthbound::default());
    for mut area in areas {
        area.router_id = router_id;
        router.add_area(area).unwrap();
    }
    router
}

pub fn ext_contents(
    prefix: Ipv4Network,
    metric_type: ExternalMetricType,
    metric: u32,
    fwd_addr: Option<Ipv4Addr>,
) -> LsaAsExternal {
    LsaAsExternal::new(prefix.mask(), metric_type.flags(), metric, fwd_addr, 0)
}

pub fn external_lsa(
    age: u16,
    adv_rtr: Ipv4Addr,
    seq_no: i32,
    prefix: Ipv4Network,
    contents: LsaAsExternal,
) -> Arc<Lsa> {
    Arc::new(Lsa::new(
        age,
        Options::E,
        prefix.network(),
        adv_rtr,
        seq_no,
        LsaBody::AsExternal(contents),
    ))
}

// Fresh type-1 AS-external LSA without forwarding address.
pub fn type1_lsa(adv_rtr: Ipv4Addr, prefix: Ipv4Network, metric: u32) -> Arc<Lsa> {
    let contents = ext_contents(prefix, ExternalMetricType::Type1, metric, None);
    external_lsa(0, adv_rtr, LSA_INIT_SEQ_NO, prefix, contents)
}

pub fn network_route(
    prefix: Ipv4Network,
    area_id: Ipv4Addr,
    path_type: PathType,
    cost: u32,
    ifindex: u32,
) -> RoutingTableEntry {
    let mut entry = RoutingTableEntry::new(
        DestinationType::NETWORK,
        prefix.network(),
        prefix.mask(),
        Options::E,
        area_id,
        path_type,
        cost,
    );
    entry.nexthops.insert(
        NexthopKey::new(ifindex, None),
        Nexthop::new(ifindex, None, Ipv4Addr::UNSPECIFIED),
    );
    entry
}

pub fn asbr_route(
    router_id: Ipv4Addr,
    area_id: Ipv4Addr,
    path_type: PathType,
    cost: u32,
    ifindex: u32,
) -> RoutingTableEntry {
    let mut entry = RoutingTableEntry::new(
        DestinationType::AS_BOUNDARY_ROUTER,
        router_id,
        Ipv4Addr::BROADCAST,
        Options::E,
        area_id,
        path_type,
        cost,
    );
    entry.nexthops.insert(
        NexthopKey::new(ifindex, Some(router_id)),
        Nexthop::new(ifindex, Some(router_id), router_id),
    );
    entry
}
