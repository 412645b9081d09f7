//! Orbit partitions of events under a symmetry group (spec §4.2).

use crate::event::{hash_event, Event, EventRange};
use crate::symmetry::Group;
use rustc_hash::{FxHashMap, FxHashSet};

/// The orbit partition of all events of length `len` over an alphabet of size `base` under a
/// [`Group`] action.
#[derive(Clone, Debug)]
pub struct OrbitPartition {
    /// Event hash -> orbit index.
    pub event_to_orbit: FxHashMap<u64, usize>,
    /// Orbit index -> canonical (lex-smallest) representative event.
    pub representatives: Vec<Event>,
    /// Orbit index -> every event hash in the orbit.
    pub members: Vec<Vec<u64>>,
}

impl OrbitPartition {
    /// Number of orbits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.representatives.len()
    }

    /// `true` iff there are no orbits (only possible when `len == 0`).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.representatives.is_empty()
    }

    /// The orbit index of `event`.
    #[must_use]
    pub fn orbit_of(&self, event: &[u8], base: u64) -> usize {
        self.event_to_orbit[&hash_event(event, base)]
    }
}

/// Computes the orbit partition of events of length `len` over `base` outcomes under `group`,
/// following spec §4.2: enumerate events lexicographically, and for each unseen event form its
/// orbit by applying every symmetry in `group`; the lex-smallest member (which, because of the
/// enumeration order, is always the first-encountered unseen event) becomes the representative.
///
/// For `len == 0` there are no orbits (the caller is expected to special-case scalars).
#[must_use]
pub fn compute_orbits(group: &Group, len: usize, base: u8) -> OrbitPartition {
    let mut partition = OrbitPartition {
        event_to_orbit: FxHashMap::default(),
        representatives: Vec::new(),
        members: Vec::new(),
    };

    if len == 0 {
        return partition;
    }

    let base_u64 = u64::from(base);
    let mut seen: FxHashSet<u64> = FxHashSet::default();

    for event in EventRange::new(len, base) {
        let hash = hash_event(&event, base_u64);
        if seen.contains(&hash) {
            continue;
        }

        let orbit_index = partition.representatives.len();
        let mut member_hashes: Vec<u64> = Vec::new();
        let mut member_set: FxHashSet<u64> = FxHashSet::default();

        for sigma in group {
            let image = sigma.apply_to_event(&event);
            let image_hash = hash_event(&image, base_u64);
            if member_set.insert(image_hash) {
                member_hashes.push(image_hash);
            }
        }

        for &h in &member_hashes {
            seen.insert(h);
            partition.event_to_orbit.insert(h, orbit_index);
        }

        partition.representatives.push(event);
        partition.members.push(member_hashes);
    }

    partition
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symmetry::{OutcomeSym, PartySym, Symmetry};

    #[test]
    fn no_orbits_for_scalar_events() {
        let group: Group = [Symmetry::identity(0, 2)].into_iter().collect();
        let partition = compute_orbits(&group, 0, 2);
        assert!(partition.is_empty());
    }

    #[test]
    fn trivial_group_gives_singleton_orbits() {
        let group: Group = [Symmetry::identity(2, 2)].into_iter().collect();
        let partition = compute_orbits(&group, 2, 2);
        assert_eq!(partition.len(), 4);
    }

    #[test]
    fn swap_symmetry_merges_events_pairwise() {
        let swap_party = PartySym::new(vec![1, 0], false);
        let id_outcome = OutcomeSym::identity(2);
        let group: Group = [Symmetry::identity(2, 2), Symmetry::new(swap_party, id_outcome)]
            .into_iter()
            .collect();
        let partition = compute_orbits(&group, 2, 2);
        // {00}, {01,10}, {11}: three orbits over four events
        assert_eq!(partition.len(), 3);
        assert_eq!(partition.orbit_of(&[0, 1], 2), partition.orbit_of(&[1, 0], 2));
    }

    #[test]
    fn orbit_partition_is_total() {
        let swap_party = PartySym::new(vec![1, 0], false);
        let group: Group = [Symmetry::identity(2, 2), Symmetry::new(swap_party, OutcomeSym::identity(2))]
            .into_iter()
            .collect();
        let partition = compute_orbits(&group, 2, 2);
        let total_members: usize = partition.members.iter().map(Vec::len).sum();
        assert_eq!(total_members, 4);
    }
}
