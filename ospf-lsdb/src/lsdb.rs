//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use bitflags::bitflags;
use derive_new::new;
use ipnetwork::Ipv4Network;
use ospf_utils::ip::{Ipv4AddrExt, Ipv4NetworkExt};
use serde::{Deserialize, Serialize};

use crate::area::{Area, NeighborStates};
use crate::collections::Areas;
use crate::debug::{Debug, LsaFlushReason};
use crate::error::Error;
use crate::flood::flood;
use crate::packet::Options;
use crate::packet::lsa::{
    Lsa, LsaAsExternal, LsaBody, LsaHdr, LsaKey, LsaType,
};
use crate::route;
use crate::router::{Router, RouterState};
use crate::southbound::{self, Southbound};

// Architectural Constants.
pub const LSA_REFRESH_TIME: u16 = 1800;
pub const LSA_MAX_AGE: u16 = 3600;
pub const LSA_CHECK_AGE: u16 = 300;
pub const LSA_INFINITY: u32 = 0x00ffffff;
pub const LSA_INIT_SEQ_NO: i32 = i32::MIN + 1;
pub const LSA_MAX_SEQ_NO: i32 = i32::MAX;

// Interval between two database aging passes.
pub const LSDB_AGE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
pub struct LsaEntry {
    // LSA data.
    pub data: Arc<Lsa>,
    // Seconds elapsed since this instance was installed.
    pub install_time: u32,
    // LSA entry flags.
    pub flags: LsaEntryFlags,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct LsaEntryFlags: u8 {
        const RECEIVED = 0x01;
        const SELF_ORIGINATED = 0x02;
        // Once flushed, the LSA is removed instead of being re-originated.
        const PURGEABLE = 0x04;
    }
}

// Position of an LSA in its aging lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LsaAgeState {
    Fresh,
    RefreshDue,
    MaxAgeImminent,
    MaxAge,
}

#[derive(Clone, Debug, new)]
pub struct LsaLogEntry {
    pub id: u32,
    pub lsa: LsaLogId,
    pub reason: LsaLogReason,
}

#[derive(Clone, Debug, new)]
pub struct LsaLogId {
    pub lsa_type: LsaType,
    pub lsa_id: Ipv4Addr,
    pub adv_rtr: Ipv4Addr,
    pub seq_no: i32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaLogReason {
    Refresh,
    ContentChange,
    Purge,
}

// ===== impl LsaEntry =====

impl LsaEntry {
    pub(crate) fn new(data: Arc<Lsa>, flags: LsaEntryFlags) -> LsaEntry {
        LsaEntry {
            data,
            install_time: 0,
            flags,
        }
    }
}

// ===== impl LsaAgeState =====

impl LsaAgeState {
    // Classifies an LSA by the age it had at the start of the aging pass.
    //
    // Self-originated LSAs are refreshed once they reach LSRefreshTime, so
    // they never reach the MaxAgeImminent state.
    pub fn new(age: u16, self_originated: bool) -> LsaAgeState {
        if age >= LSA_MAX_AGE {
            LsaAgeState::MaxAge
        } else if self_originated && age >= LSA_REFRESH_TIME - 1 {
            LsaAgeState::RefreshDue
        } else if !self_originated && age == LSA_MAX_AGE - 1 {
            LsaAgeState::MaxAgeImminent
        } else {
            LsaAgeState::Fresh
        }
    }
}

// ===== impl LsaLogId =====

impl LsaLogId {
    fn from_hdr(hdr: &LsaHdr) -> LsaLogId {
        LsaLogId::new(hdr.lsa_type, hdr.lsa_id, hdr.adv_rtr, hdr.seq_no)
    }
}

// ===== global functions =====

// Checks if the contents of the two LSA instances are the same
// (RFC 2328 section 13.2).
pub(crate) fn lsa_same_contents(a: &Lsa, b: &Lsa) -> bool {
    if a.hdr.options != b.hdr.options {
        return false;
    }

    if a.is_maxage() ^ b.is_maxage() {
        return false;
    }

    if a.hdr.length != b.hdr.length {
        return false;
    }

    let hdr_length = Lsa::HDR_LENGTH as usize;
    a.raw.get(hdr_length..) == b.raw.get(hdr_length..)
}

// Returns the sequence number of the next instance of an LSA. The sequence
// space wraps back to InitialSequenceNumber after MaxSequenceNumber.
pub(crate) fn next_seq_no(seq_no: i32) -> i32 {
    if seq_no >= LSA_MAX_SEQ_NO {
        LSA_INIT_SEQ_NO
    } else {
        seq_no + 1
    }
}

// Installs an AS-external LSA into the router database.
//
// Returns whether the routing table needs to be recomputed.
pub(crate) fn install_as_external<A, S>(
    router: &mut Router<A, S>,
    lsa: Arc<Lsa>,
) -> bool
where
    A: Area,
    S: Southbound,
{
    let Some(ext) = lsa.body.as_as_external() else {
        return false;
    };
    let key = lsa.key();
    let router_id = router.router_id;
    let mut own_flushed = false;

    // When two routers originate functionally equivalent AS-external LSAs,
    // only the one with the higher Router ID keeps its advertisement
    // (RFC 2328 section 12.4.4.1).
    if key.adv_rtr != router_id {
        let own_key = LsaKey::new(key.lsa_id, router_id);
        let conflict = router
            .state
            .lsdb
            .get(&own_key)
            .is_some_and(|own| same_external_origin(&own.data, ext))
            && router.state.rib.has_route_to_border_router(key.adv_rtr);
        if conflict {
            if router_id > key.adv_rtr {
                Debug::LsaConflictReject(&lsa.hdr).log();
                return false;
            }
            // The withdrawn LSA must be deleted rather than re-originated
            // once it reaches MaxAge.
            if let Some(own) = router.state.lsdb.get_mut(&own_key) {
                own.flags.insert(LsaEntryFlags::PURGEABLE);
            }
            flush_as_external(
                router,
                &own_key,
                LsaFlushReason::OriginConflict,
            );
            own_flushed = true;
        }
    }

    Debug::LsaInstall(&lsa.hdr).log();

    // Remove old instance (if any) from all neighbors' Link state
    // retransmission lists.
    let content_change = match router.state.lsdb.get(&key) {
        Some(old) => {
            let content_change = !lsa_same_contents(&old.data, &lsa);
            rxmt_lists_remove(&mut router.areas, &key);
            content_change
        }
        None => true,
    };

    // Log LSA.
    let reason = if lsa.is_maxage() {
        LsaLogReason::Purge
    } else if content_change {
        LsaLogReason::ContentChange
    } else {
        LsaLogReason::Refresh
    };
    log_lsa(
        &mut router.state,
        &lsa.hdr,
        reason,
        router.config.lsa_log_max_size,
    );

    // Add LSA entry to LSDB.
    let flags = if key.adv_rtr == router_id {
        LsaEntryFlags::SELF_ORIGINATED
    } else {
        LsaEntryFlags::RECEIVED
    };
    router.state.lsdb.insert(lsa, flags);

    content_change || own_flushed
}

// Originates a self-originated AS-external LSA for the given network, or a
// new instance of it.
//
// Returns whether the routing table needs to be recomputed.
pub(crate) fn originate_as_external<A, S>(
    router: &mut Router<A, S>,
    network: Ipv4Addr,
    contents: LsaAsExternal,
) -> bool
where
    A: Area,
    S: Southbound,
{
    let router_id = router.router_id;
    let key = LsaKey::new(network, router_id);
    let seq_no = match router.state.lsdb.get(&key) {
        Some(lse) if lse.data.hdr.seq_no == LSA_MAX_SEQ_NO => {
            // The current instance needs to be flushed before the sequence
            // number can wrap. The new contents are advertised once the aging
            // process re-issues the LSA.
            Debug::LsaSeqNoWrapping(&lse.data.hdr).log();
            flush_as_external(router, &key, LsaFlushReason::SeqNoWrapping);
            return false;
        }
        Some(lse) => lse.data.hdr.seq_no + 1,
        None => LSA_INIT_SEQ_NO,
    };

    let lsa = Lsa::new(
        0,
        Options::E,
        network,
        router_id,
        seq_no,
        LsaBody::AsExternal(contents),
    );
    Debug::LsaOriginate(&lsa.hdr).log();
    router.state.orig_lsa_count += 1;

    let lsa = Arc::new(lsa);
    let route_recalc = install_as_external(router, lsa.clone());
    flood(&mut router.areas, &lsa, None, None, None);
    route_recalc
}

// Prematurely ages an AS-external LSA and floods it.
pub(crate) fn flush_as_external<A, S>(
    router: &mut Router<A, S>,
    key: &LsaKey,
    reason: LsaFlushReason,
) where
    A: Area,
    S: Southbound,
{
    let Some(lse) = router.state.lsdb.get_mut(key) else {
        return;
    };
    Debug::LsaFlush(&lse.data.hdr, reason).log();

    Arc::make_mut(&mut lse.data).set_maxage();
    lse.install_time = 0;
    let lsa = lse.data.clone();

    log_lsa(
        &mut router.state,
        &lsa.hdr,
        LsaLogReason::Purge,
        router.config.lsa_log_max_size,
    );
    flood(&mut router.areas, &lsa, None, None, None);
}

// Ages all AS-external LSAs by one second, then the areas' own databases.
//
// LSAs that need to be removed are collected during the scan and removed
// only after it completes. The routing table is recomputed at most once, after
// all LSAs were processed.
pub(crate) fn age_database<A, S>(router: &mut Router<A, S>)
where
    A: Area,
    S: Southbound,
{
    let mut route_recalc = false;
    let mut deleted = vec![];

    for key in router.state.lsdb.keys() {
        let Some(lse) = router.state.lsdb.get(&key) else {
            continue;
        };
        let lsa = lse.data.clone();
        let age = lsa.hdr.age;
        let self_originated = lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED);
        let purgeable = lse.flags.contains(LsaEntryFlags::PURGEABLE);

        match LsaAgeState::new(age, self_originated) {
            LsaAgeState::Fresh => {
                let Some(lse) = router.state.lsdb.get_mut(&key) else {
                    continue;
                };
                Arc::make_mut(&mut lse.data).set_age(age + 1);
                lse.install_time += 1;

                // Periodically verify the LSA checksum.
                if (age + 1) % LSA_CHECK_AGE == 0
                    && !lse.data.is_checksum_valid()
                {
                    Error::LsaChecksumMismatch(lsa.hdr.lsa_type, key).log();
                }
            }
            LsaAgeState::RefreshDue => {
                if is_destination_unreachable(router, &lsa, None) {
                    flush_as_external(
                        router,
                        &key,
                        LsaFlushReason::Unreachable,
                    );
                } else if lsa.hdr.seq_no == LSA_MAX_SEQ_NO {
                    Debug::LsaSeqNoWrapping(&lsa.hdr).log();
                    flush_as_external(
                        router,
                        &key,
                        LsaFlushReason::SeqNoWrapping,
                    );
                } else {
                    route_recalc |=
                        reoriginate_as_external(router, &key, lsa.hdr.seq_no + 1);
                }
            }
            LsaAgeState::MaxAgeImminent => {
                flush_as_external(router, &key, LsaFlushReason::Expiry);
            }
            LsaAgeState::MaxAge => {
                // Wait until the flushed LSA is acknowledged by all neighbors
                // and no database exchange is in progress.
                if rxmt_lists_contain(&router.areas, &key)
                    || nbrs_in_states(
                        &router.areas,
                        NeighborStates::EXCHANGE | NeighborStates::LOADING,
                    )
                {
                    continue;
                }

                if !self_originated
                    || purgeable
                    || is_destination_unreachable(router, &lsa, None)
                {
                    Debug::LsaDelete(&lsa.hdr).log();
                    deleted.push(key);
                    route_recalc = true;
                } else {
                    let seq_no = next_seq_no(lsa.hdr.seq_no);
                    route_recalc |=
                        reoriginate_as_external(router, &key, seq_no);
                }
            }
        }
    }

    // Remove the LSAs marked for deletion.
    for key in &deleted {
        router.state.lsdb.delete(key);
    }

    // Age the area databases.
    for area in router.areas.iter_mut() {
        route_recalc |= area.age_database(&router.state.rib);
    }

    // Schedule the next aging pass.
    router.sb.start_age_timer(LSDB_AGE_INTERVAL);

    if route_recalc {
        route::rebuild_routing_table(router);
    }
}

// Checks whether the destination advertised by an LSA can't be reached using
// the current routing table.
pub(crate) fn is_destination_unreachable<A, S>(
    router: &Router<A, S>,
    lsa: &Lsa,
    area_id: Option<Ipv4Addr>,
) -> bool
where
    A: Area,
    S: Southbound,
{
    let rib = &router.state.rib;
    let destination = match &lsa.body {
        LsaBody::Router(_) => {
            // The calculating router is the root of the shortest-path tree.
            if lsa.hdr.lsa_id == router.router_id {
                return false;
            }
            let addr = area_id
                .and_then(|area_id| router.areas.get_by_area_id(area_id))
                .and_then(|area| area.router_lsa_address(lsa));
            match addr {
                Some(addr) => addr,
                None => return true,
            }
        }
        LsaBody::Network(network) => lsa.hdr.lsa_id.mask(network.mask),
        LsaBody::SummaryNetwork(summary) => lsa.hdr.lsa_id.mask(summary.mask),
        LsaBody::SummaryRouter(_) => {
            return rib.routes_to_asbr(lsa.hdr.lsa_id).is_empty();
        }
        LsaBody::AsExternal(ext) => {
            let destination = ext.network(lsa.hdr.lsa_id);

            // Redistributed routes are reachable through the host routing
            // table.
            let prefix = Ipv4Network::from_addr_mask(destination, ext.mask);
            if lsa.hdr.adv_rtr == router.router_id
                && southbound::has_non_ospf_route(&router.sb, &prefix)
            {
                return false;
            }
            destination
        }
    };

    rib.lookup(&router.areas, destination).is_none()
}

// Removes the LSA from all neighbors' Link state retransmission lists.
pub(crate) fn rxmt_lists_remove<A>(areas: &mut Areas<A>, key: &LsaKey)
where
    A: Area,
{
    for area in areas.iter_mut() {
        area.remove_from_all_retransmission_lists(key);
    }
}

// Checks whether the LSA is in any neighbor's Link state retransmission list.
pub(crate) fn rxmt_lists_contain<A>(areas: &Areas<A>, key: &LsaKey) -> bool
where
    A: Area,
{
    areas
        .iter()
        .any(|area| area.is_on_any_retransmission_list(key))
}

// Checks whether any neighbor, in any area, is in one of the given states.
pub(crate) fn nbrs_in_states<A>(
    areas: &Areas<A>,
    states: NeighborStates,
) -> bool
where
    A: Area,
{
    areas
        .iter()
        .any(|area| area.has_any_neighbor_in_states(states))
}

// ===== helper functions =====

// Checks whether a foreign AS-external LSA advertises the same route as a
// self-originated one: same metric, same metric type and same non-zero
// forwarding address.
fn same_external_origin(own: &Lsa, ext: &LsaAsExternal) -> bool {
    let Some(own_ext) = own.body.as_as_external() else {
        return false;
    };

    own_ext.metric_type() == ext.metric_type()
        && own_ext.metric == ext.metric
        && own_ext.fwd_addr.is_some()
        && own_ext.fwd_addr == ext.fwd_addr
}

// Issues a new instance of a self-originated AS-external LSA, using the most
// recent contents of the corresponding external route.
//
// Returns whether the routing table needs to be recomputed.
fn reoriginate_as_external<A, S>(
    router: &mut Router<A, S>,
    key: &LsaKey,
    seq_no: i32,
) -> bool
where
    A: Area,
    S: Southbound,
{
    let Some(lse) = router.state.lsdb.get(key) else {
        return false;
    };
    let old_lsa = lse.data.clone();
    let body = router
        .state
        .external_routes
        .get(&key.lsa_id)
        .cloned()
        .map(LsaBody::AsExternal)
        .unwrap_or_else(|| old_lsa.body.clone());

    let lsa = Lsa::new(
        0,
        old_lsa.hdr.options,
        key.lsa_id,
        key.adv_rtr,
        seq_no,
        body,
    );
    Debug::LsaRefresh(&lsa.hdr).log();
    router.state.orig_lsa_count += 1;

    let content_change = !lsa_same_contents(&old_lsa, &lsa);
    let reason = if content_change {
        LsaLogReason::ContentChange
    } else {
        LsaLogReason::Refresh
    };
    log_lsa(
        &mut router.state,
        &lsa.hdr,
        reason,
        router.config.lsa_log_max_size,
    );

    let lsa = Arc::new(lsa);
    rxmt_lists_remove(&mut router.areas, key);
    router
        .state
        .lsdb
        .insert(lsa.clone(), LsaEntryFlags::SELF_ORIGINATED);
    flood(&mut router.areas, &lsa, None, None, None);

    content_change
}

fn log_lsa(
    state: &mut RouterState,
    hdr: &LsaHdr,
    reason: LsaLogReason,
    max_size: usize,
) {
    // Get next log ID.
    let log_id = &mut state.lsa_log_next_id;
    *log_id += 1;

    // Add new log entry.
    let log_entry = LsaLogEntry::new(*log_id, LsaLogId::from_hdr(hdr), reason);
    state.lsa_log.push_front(log_entry);

    // Remove old entries if necessary.
    state.lsa_log.truncate(max_size);
}
