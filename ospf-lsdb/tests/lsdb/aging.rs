//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use const_addrs::ip4;
use ospf_lsdb::area::NeighborStates;
use ospf_lsdb::lsdb::{
    LSA_INIT_SEQ_NO, LSA_MAX_AGE, LSA_MAX_SEQ_NO, LsaAgeState, LsaEntryFlags,
};
use ospf_lsdb::packet::lsa::{ExternalMetricType, Lsa, LsaKey};
use ospf_lsdb::southbound::{IpRoute, RouteSource};

use crate::common::*;

// Router whose self-originated external destination is reachable through a
// redistributed host route.
fn router_with_redistributed_route() -> TestRouter {
    let mut router = router(ip4!("1.1.1.1"), vec![TestArea::new(ip4!("0.0.0.0"))]);
    router.sb.routes.push(IpRoute::new(
        prefix("172.16.0.0/16"),
        None,
        Some(2),
        10,
        RouteSource::Manual,
    ));
    router
}

#[test]
fn age_state_classification() {
    assert_eq!(LsaAgeState::new(0, false), LsaAgeState::Fresh);
    assert_eq!(LsaAgeState::new(1798, true), LsaAgeState::Fresh);
    assert_eq!(LsaAgeState::new(1799, true), LsaAgeState::RefreshDue);
    assert_eq!(LsaAgeState::new(1799, false), LsaAgeState::Fresh);
    assert_eq!(LsaAgeState::new(3599, false), LsaAgeState::MaxAgeImminent);
    assert_eq!(LsaAgeState::new(3599, true), LsaAgeState::RefreshDue);
    assert_eq!(LsaAgeState::new(3600, false), LsaAgeState::MaxAge);
    assert_eq!(LsaAgeState::new(3600, true), LsaAgeState::MaxAge);
}

#[test]
fn age_increments_by_one() {
    let mut router = router(ip4!("1.1.1.1"), vec![TestArea::new(ip4!("0.0.0.0"))]);
    let prefix = prefix("172.16.0.0/16");
    let contents = ext_contents(prefix, ExternalMetricType::Type1, 10, None);
    let lsa = external_lsa(10, ip4!("2.2.2.2"), LSA_INIT_SEQ_NO, prefix, contents);
    let key = lsa.key();
    router.install_as_external_lsa(lsa);

    router.age_database();
    let lse = router.state.lsdb.get(&key).unwrap();
    assert_eq!(lse.data.hdr.age, 11);
    assert_eq!(lse.install_time, 1);
    assert!(lse.data.is_checksum_valid());

    router.age_database();
    let lse = router.state.lsdb.get(&key).unwrap();
    assert_eq!(lse.data.hdr.age, 12);
    assert_eq!(lse.data.raw[0..2], 12u16.to_be_bytes());
}

#[test]
fn age_pass_reschedules_and_ages_areas() {
    let mut router = router(
        ip4!("1.1.1.1"),
        vec![TestArea::new(ip4!("0.0.0.0")), TestArea::new(ip4!("0.0.0.1"))],
    );
    router.start();
    assert_eq!(router.sb.age_timer_starts, 1);

    router.age_database();
    assert_eq!(router.sb.age_timer, Some(Duration::from_secs(1)));
    assert_eq!(router.sb.age_timer_starts, 2);
    assert!(router.areas.iter().all(|area| area.age_runs == 1));
}

#[test]
fn foreign_lsa_expires() {
    let mut router = router(ip4!("1.1.1.1"), vec![TestArea::new(ip4!("0.0.0.0"))]);
    let prefix = prefix("172.16.0.0/16");
    let contents = ext_contents(prefix, ExternalMetricType::Type1, 10, None);
    let lsa = external_lsa(3599, ip4!("2.2.2.2"), LSA_INIT_SEQ_NO, prefix, contents);
    let key = lsa.key();
    router.install_as_external_lsa(lsa);

    // MaxAge - 1: flushed.
    router.age_database();
    let lse = router.state.lsdb.get(&key).unwrap();
    assert!(lse.data.is_maxage());
    let area = router.area(ip4!("0.0.0.0")).unwrap();
    assert!(area.flooded.last().unwrap().is_maxage());

    // MaxAge: deleted, triggering a route recalculation.
    let rebuild_count = router.state.rebuild_count;
    router.age_database();
    assert!(router.find_as_external_lsa(&key).is_none());
    assert_eq!(router.state.rebuild_count, rebuild_count + 1);
}

#[test]
fn maxage_deletion_waits_for_retransmissions() {
    let mut router = router(ip4!("1.1.1.1"), vec![TestArea::new(ip4!("0.0.0.0"))]);

    // Ten MaxAge LSAs, three of which are still being retransmitted.
    let mut keys = vec![];
    for i in 0..10u8 {
        let prefix = prefix(&format!("172.16.{i}.0/24"));
        let contents = ext_contents(prefix, ExternalMetricType::Type2, 1, None);
        let lsa = external_lsa(
            LSA_MAX_AGE,
            ip4!("2.2.2.2"),
            LSA_INIT_SEQ_NO,
            prefix,
            contents,
        );
        keys.push(lsa.key());
        router.install_as_external_lsa(lsa);
    }
    let area = router.area_mut(ip4!("0.0.0.0")).unwrap();
    area.rxmt_list.extend([keys[0], keys[4], keys[9]]);

    router.age_database();
    assert_eq!(router.state.lsdb.len(), 3);
    let remaining = router
        .state
        .lsdb
        .iter()
        .map(|lse| lse.data.key())
        .collect::<Vec<_>>();
    assert_eq!(remaining, vec![keys[0], keys[4], keys[9]]);
}

#[test]
fn maxage_deletion_waits_for_database_exchange() {
    let mut router = router(ip4!("1.1.1.1"), vec![TestArea::new(ip4!("0.0.0.0"))]);
    let prefix = prefix("172.16.0.0/16");
    let contents = ext_contents(prefix, ExternalMetricType::Type1, 10, None);
    let lsa =
        external_lsa(LSA_MAX_AGE, ip4!("2.2.2.2"), LSA_INIT_SEQ_NO, prefix, contents);
    let key = lsa.key();
    router.install_as_external_lsa(lsa);

    let area = router.area_mut(ip4!("0.0.0.0")).unwrap();
    area.nbr_states = NeighborStates::FULL | NeighborStates::EXCHANGE;
    router.age_database();
    assert!(router.find_as_external_lsa(&key).is_some());

    let area = router.area_mut(ip4!("0.0.0.0")).unwrap();
    area.nbr_states = NeighborStates::FULL;
    router.age_database();
    assert!(router.find_as_external_lsa(&key).is_none());
}

#[test]
fn self_originated_lsa_refresh() {
    let mut router = router_with_redistributed_route();
    let prefix = prefix("172.16.0.0/16");
    let contents = ext_contents(prefix, ExternalMetricType::Type2, 10, None);
    let lsa = external_lsa(1799, ip4!("1.1.1.1"), LSA_INIT_SEQ_NO, prefix, contents);
    let key = lsa.key();
    router.install_as_external_lsa(lsa.clone());

    router.age_database();
    let lse = router.state.lsdb.get(&key).unwrap();
    assert!(lse.flags.contains(LsaEntryFlags::SELF_ORIGINATED));
    assert_eq!(lse.data.hdr.age, 0);
    assert_eq!(lse.data.hdr.seq_no, LSA_INIT_SEQ_NO + 1);
    assert_eq!(lse.data.body, lsa.body);
    assert!(lse.data.is_checksum_valid());
    assert_eq!(router.state.orig_lsa_count, 1);

    let area = router.area(ip4!("0.0.0.0")).unwrap();
    assert_eq!(area.flooded.last().unwrap().hdr.seq_no, LSA_INIT_SEQ_NO + 1);
}

#[test]
fn unreachable_self_originated_lsa_is_withdrawn() {
    // No route to the advertised destination.
    let mut router = router(ip4!("1.1.1.1"), vec![TestArea::new(ip4!("0.0.0.0"))]);
    let prefix = prefix("172.16.0.0/16");
    let contents = ext_contents(prefix, ExternalMetricType::Type2, 10, None);
    let lsa = external_lsa(1799, ip4!("1.1.1.1"), LSA_INIT_SEQ_NO, prefix, contents);
    let key = lsa.key();
    router.install_as_external_lsa(lsa);

    router.age_database();
    let lse = router.state.lsdb.get(&key).unwrap();
    assert!(lse.data.is_maxage());
    assert_eq!(lse.data.hdr.seq_no, LSA_INIT_SEQ_NO);
    assert_eq!(router.state.orig_lsa_count, 0);

    // Removed once it's no longer referenced.
    router.age_database();
    assert!(router.find_as_external_lsa(&key).is_none());
}

#[test]
fn sequence_number_wraps_through_flush() {
    let mut router = router_with_redistributed_route();
    let prefix = prefix("172.16.0.0/16");
    let contents = ext_contents(prefix, ExternalMetricType::Type2, 10, None);
    let lsa = external_lsa(1799, ip4!("1.1.1.1"), LSA_MAX_SEQ_NO, prefix, contents);
    let key = lsa.key();
    router.install_as_external_lsa(lsa);

    // Flushed at MaxSequenceNumber.
    router.age_database();
    let lse = router.state.lsdb.get(&key).unwrap();
    assert!(lse.data.is_maxage());
    assert_eq!(lse.data.hdr.seq_no, LSA_MAX_SEQ_NO);

    // Then re-issued at InitialSequenceNumber.
    router.age_database();
    let lse = router.state.lsdb.get(&key).unwrap();
    assert_eq!(lse.data.hdr.age, 0);
    assert_eq!(lse.data.hdr.seq_no, LSA_INIT_SEQ_NO);
}

#[test]
fn checksum_mismatch_is_not_fatal() {
    let mut router = router(ip4!("1.1.1.1"), vec![TestArea::new(ip4!("0.0.0.0"))]);
    let prefix = prefix("172.16.0.0/16");
    let contents = ext_contents(prefix, ExternalMetricType::Type1, 10, None);
    let lsa = external_lsa(299, ip4!("2.2.2.2"), LSA_INIT_SEQ_NO, prefix, contents);

    // Corrupt the metric.
    let mut lsa = Lsa::clone(&lsa);
    let mut raw = lsa.raw.to_vec();
    raw[27] ^= 0xff;
    lsa.raw = Bytes::from(raw);
    assert!(!lsa.is_checksum_valid());
    let key = lsa.key();
    router.install_as_external_lsa(Arc::new(lsa));

    router.age_database();
    let lse = router.state.lsdb.get(&key).unwrap();
    assert_eq!(lse.data.hdr.age, 300);
    assert_eq!(key, LsaKey::new(ip4!("172.16.0.0"), ip4!("2.2.2.2")));
}
