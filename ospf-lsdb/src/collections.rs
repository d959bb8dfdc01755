//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, btree_map};
use std::net::Ipv4Addr;
use std::sync::Arc;

use generational_arena::{Arena, Index};

use crate::area::Area;
use crate::error::Error;
use crate::lsdb::{LsaEntry, LsaEntryFlags};
use crate::packet::lsa::{Lsa, LsaKey};

#[derive(Debug)]
pub struct Areas<A: Area> {
    arena: Arena<A>,
    area_id_tree: BTreeMap<Ipv4Addr, Index>,
}

#[derive(Debug, Default)]
pub struct Lsdb {
    tree: BTreeMap<LsaKey, LsaEntry>,
}

// ===== impl Areas =====

impl<A> Areas<A>
where
    A: Area,
{
    pub(crate) fn insert(&mut self, area: A) -> Result<&mut A, Error> {
        let area_id = area.area_id();
        let btree_map::Entry::Vacant(e) = self.area_id_tree.entry(area_id)
        else {
            return Err(Error::AreaIdExists(area_id));
        };

        // Create and insert area into the arena.
        let area_idx = self.arena.insert(area);
        e.insert(area_idx);
        Ok(&mut self.arena[area_idx])
    }

    // Returns a reference to the area corresponding to the given area ID.
    pub fn get_by_area_id(&self, area_id: Ipv4Addr) -> Option<&A> {
        self.area_id_tree
            .get(&area_id)
            .map(|area_idx| &self.arena[*area_idx])
    }

    // Returns a mutable reference to the area corresponding to the given area
    // ID.
    pub fn get_mut_by_area_id(&mut self, area_id: Ipv4Addr) -> Option<&mut A> {
        self.area_id_tree
            .get(&area_id)
            .copied()
            .map(move |area_idx| &mut self.arena[area_idx])
    }

    // Returns a reference to the backbone area, if configured.
    pub fn backbone(&self) -> Option<&A> {
        self.get_by_area_id(Ipv4Addr::UNSPECIFIED)
    }

    // Returns a mutable reference to the backbone area, if configured.
    pub fn backbone_mut(&mut self) -> Option<&mut A> {
        self.get_mut_by_area_id(Ipv4Addr::UNSPECIFIED)
    }

    // Returns an iterator visiting all areas.
    //
    // Areas are visited in the order they were added.
    pub fn iter(&self) -> impl Iterator<Item = &A> {
        self.arena.iter().map(|(_, area)| area)
    }

    // Returns an iterator visiting all areas with mutable references.
    //
    // Areas are visited in the order they were added.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut A> {
        self.arena.iter_mut().map(|(_, area)| area)
    }

    // Returns the IDs of all areas, in the order they were added.
    pub fn area_ids(&self) -> Vec<Ipv4Addr> {
        self.iter().map(|area| area.area_id()).collect()
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }
}

impl<A> Default for Areas<A>
where
    A: Area,
{
    fn default() -> Areas<A> {
        Areas {
            arena: Default::default(),
            area_id_tree: Default::default(),
        }
    }
}

// ===== impl Lsdb =====

impl Lsdb {
    // Adds a new LSA entry, replacing the previous instance if one exists.
    pub(crate) fn insert(
        &mut self,
        lsa: Arc<Lsa>,
        flags: LsaEntryFlags,
    ) -> &mut LsaEntry {
        let key = lsa.key();
        let lse = LsaEntry::new(lsa, flags);
        match self.tree.entry(key) {
            btree_map::Entry::Occupied(mut e) => {
                e.insert(lse);
                e.into_mut()
            }
            btree_map::Entry::Vacant(e) => e.insert(lse),
        }
    }

    pub(crate) fn delete(&mut self, key: &LsaKey) -> Option<LsaEntry> {
        self.tree.remove(key)
    }

    // Returns a reference to the LSA entry corresponding to the given key.
    pub fn get(&self, key: &LsaKey) -> Option<&LsaEntry> {
        self.tree.get(key)
    }

    // Returns a mutable reference to the LSA entry corresponding to the given
    // key.
    pub(crate) fn get_mut(&mut self, key: &LsaKey) -> Option<&mut LsaEntry> {
        self.tree.get_mut(key)
    }

    // Returns an iterator visiting all LSA entries, ordered by LSA key.
    pub fn iter(&self) -> impl Iterator<Item = &LsaEntry> {
        self.tree.values()
    }

    // Returns a snapshot of all LSA keys.
    pub(crate) fn keys(&self) -> Vec<LsaKey> {
        self.tree.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    // Returns the sum of the checksums of all stored LSAs.
    pub fn cksum_sum(&self) -> u32 {
        self.tree
            .values()
            .map(|lse| lse.data.hdr.cksum as u32)
            .fold(0, u32::wrapping_add)
    }
}
