//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span};

use crate::packet::lsa::LsaHdr;

// OSPF LSDB debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    // Areas
    AreaCreate(Ipv4Addr),
    AreaNotFound(Ipv4Addr),
    // LSAs
    LsaInstall(&'a LsaHdr),
    LsaOriginate(&'a LsaHdr),
    LsaRefresh(&'a LsaHdr),
    LsaFlush(&'a LsaHdr, LsaFlushReason),
    LsaDelete(&'a LsaHdr),
    LsaConflictReject(&'a LsaHdr),
    LsaSeqNoWrapping(&'a LsaHdr),
    // Routing table
    RoutingTableRebuild(usize),
    ExternalUnreachableAsbr(Ipv4Addr, Ipv4Addr),
    SummaryRangeUpdate(Ipv4Addr, Ipv4Addr, u32),
    // Redistribution
    ExternalRouteUpdate(Ipv4Addr),
    ExternalRouteRemove(Ipv4Addr),
}

// Reason why a LSA is being flushed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaFlushReason {
    Expiry,
    PrematureAging,
    Unreachable,
    SeqNoWrapping,
    OriginConflict,
    Withdrawal,
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::AreaCreate(area_id) | Debug::AreaNotFound(area_id) => {
                debug_span!("area", %area_id).in_scope(|| {
                    debug!("{}", self);
                })
            }
            Debug::LsaInstall(lsa_hdr)
            | Debug::LsaOriginate(lsa_hdr)
            | Debug::LsaRefresh(lsa_hdr)
            | Debug::LsaDelete(lsa_hdr)
            | Debug::LsaConflictReject(lsa_hdr)
            | Debug::LsaSeqNoWrapping(lsa_hdr) => {
                debug!(?lsa_hdr, "{}", self);
            }
            Debug::LsaFlush(lsa_hdr, reason) => {
                debug!(?lsa_hdr, %reason, "{}", self);
            }
            Debug::RoutingTableRebuild(routes) => {
                debug!(%routes, "{}", self);
            }
            Debug::ExternalUnreachableAsbr(destination, asbr) => {
                debug!(%destination, %asbr, "{}", self);
            }
            Debug::SummaryRangeUpdate(area_id, range, cost) => {
                debug_span!("area", %area_id).in_scope(|| {
                    debug!(%range, %cost, "{}", self);
                })
            }
            Debug::ExternalRouteUpdate(network)
            | Debug::ExternalRouteRemove(network) => {
                debug!(%network, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::AreaCreate(..) => {
                write!(f, "area created")
            }
            Debug::AreaNotFound(..) => {
                write!(f, "ignoring request for unknown area")
            }
            Debug::LsaInstall(..) => {
                write!(f, "installing LSA")
            }
            Debug::LsaOriginate(..) => {
                write!(f, "originating LSA")
            }
            Debug::LsaRefresh(..) => {
                write!(f, "refreshing LSA")
            }
            Debug::LsaFlush(..) => {
                write!(f, "flushing LSA")
            }
            Debug::LsaDelete(..) => {
                write!(f, "removing LSA from the database")
            }
            Debug::LsaConflictReject(..) => {
                write!(f, "rejecting LSA that duplicates a self-originated one")
            }
            Debug::LsaSeqNoWrapping(..) => {
                write!(f, "LSA sequence number wrapping")
            }
            Debug::RoutingTableRebuild(..) => {
                write!(f, "routing table rebuilt")
            }
            Debug::ExternalUnreachableAsbr(..) => {
                write!(f, "no route found for originating ASBR")
            }
            Debug::SummaryRangeUpdate(..) => {
                write!(f, "updating address range summary")
            }
            Debug::ExternalRouteUpdate(..) => {
                write!(f, "updating external route")
            }
            Debug::ExternalRouteRemove(..) => {
                write!(f, "removing external route")
            }
        }
    }
}

// ===== impl LsaFlushReason =====

impl std::fmt::Display for LsaFlushReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LsaFlushReason::Expiry => {
                write!(f, "LSA reached MaxAge")
            }
            LsaFlushReason::PrematureAging => {
                write!(f, "premature aging")
            }
            LsaFlushReason::Unreachable => {
                write!(f, "destination unreachable")
            }
            LsaFlushReason::SeqNoWrapping => {
                write!(f, "sequence number wrapping")
            }
            LsaFlushReason::OriginConflict => {
                write!(f, "duplicate origination by a higher router ID")
            }
            LsaFlushReason::Withdrawal => {
                write!(f, "route withdrawn")
            }
        }
    }
}
