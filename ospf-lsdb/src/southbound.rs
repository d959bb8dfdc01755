//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::time::Duration;

use derive_new::new;
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};

use crate::route::{DestinationType, RoutingTable};

// Source of a route in the host routing table.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum RouteSource {
    Connected,
    Manual,
    Static,
    Ospf,
    Other,
}

// Host routing table route.
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct IpRoute {
    pub prefix: Ipv4Network,
    pub gateway: Option<Ipv4Addr>,
    pub ifindex: Option<u32>,
    pub metric: u32,
    pub source: RouteSource,
}

// Host interface.
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct InterfaceInfo {
    pub ifindex: u32,
    pub name: String,
    pub addr: Option<Ipv4Network>,
}

// Host IP routing table.
pub trait IpRoutingTable {
    fn route_count(&self) -> usize;

    fn route(&self, idx: usize) -> Option<&IpRoute>;

    fn add_route(&mut self, route: IpRoute);

    // Removes the given route. Returns whether it was found.
    fn delete_route(&mut self, route: &IpRoute) -> bool;
}

// Host interface table.
pub trait InterfaceTable {
    fn interface(&self, ifindex: u32) -> Option<InterfaceInfo>;
}

// Timer facility provided by the event scheduler driving the router.
pub trait TimerScheduler {
    // (Re)starts the database aging timer. When it fires, the scheduler is
    // expected to call `Router::age_database`.
    fn start_age_timer(&mut self, delay: Duration);
}

// Everything the router needs from its host.
pub trait Southbound: IpRoutingTable + InterfaceTable + TimerScheduler {}

impl<T> Southbound for T where T: IpRoutingTable + InterfaceTable + TimerScheduler
{}

// ===== global functions =====

// Replaces all OSPF routes in the host routing table with the network routes
// of the given table. Routes from other sources are left untouched.
pub(crate) fn route_sync<S>(sb: &mut S, table: &RoutingTable)
where
    S: Southbound,
{
    let stale = (0..sb.route_count())
        .filter_map(|idx| sb.route(idx))
        .filter(|route| route.source == RouteSource::Ospf)
        .cloned()
        .collect::<Vec<_>>();
    for route in &stale {
        sb.delete_route(route);
    }

    for entry in table
        .iter()
        .filter(|entry| entry.dest_type.contains(DestinationType::NETWORK))
    {
        let nexthop = entry.nexthops.values().next();
        let route = IpRoute::new(
            entry.prefix(),
            nexthop.and_then(|nexthop| nexthop.addr),
            nexthop.map(|nexthop| nexthop.ifindex),
            entry.cost,
            RouteSource::Ospf,
        );
        sb.add_route(route);
    }
}

// Returns whether the host routing table has a route for exactly the given
// prefix, from any source other than OSPF.
pub(crate) fn has_non_ospf_route<S>(sb: &S, prefix: &Ipv4Network) -> bool
where
    S: Southbound,
{
    (0..sb.route_count())
        .filter_map(|idx| sb.route(idx))
        .any(|route| route.prefix == *prefix && route.source != RouteSource::Ospf)
}

// Returns whether the host routing table has a route for exactly the given
// prefix.
pub(crate) fn has_route<S>(sb: &S, prefix: &Ipv4Network) -> bool
where
    S: Southbound,
{
    (0..sb.route_count())
        .filter_map(|idx| sb.route(idx))
        .any(|route| route.prefix == *prefix)
}

// Installs the host route for a redistributed external destination.
pub(crate) fn external_route_install<S>(
    sb: &mut S,
    prefix: Ipv4Network,
    iface: &InterfaceInfo,
    metric: u32,
) where
    S: Southbound,
{
    let route = IpRoute::new(
        prefix,
        None,
        Some(iface.ifindex),
        metric,
        RouteSource::Manual,
    );
    sb.add_route(route);
}
