//! Inflations of the triangle network: party enumeration, symmetry groups, D-separation and
//! injectable-set predicates (spec §3, §4.3, §4.6).

use crate::event::Event;
use crate::network::{Network, TargetDistr};
use crate::symmetry::{Group, PartySym, Symmetry};
use itertools::Itertools;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

/// Number of copies of each source: `(n_alpha, n_beta, n_gamma)`.
pub type InflationSize = [usize; 3];

/// An explicit inflation party: `(network_party_type, left_copy, right_copy)`.
pub type Party = (usize, usize, usize);

/// A source: `(source_type, copy_index)`.
pub type Source = (usize, usize);

/// Whether the distribution's own symmetries are folded into the inflation symmetry group.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UseDistrSymmetries {
    /// Much faster when the target distribution has usable symmetries.
    Yes,
    /// Mostly useful for testing: the inflation group is the pure source group.
    No,
}

/// An inflation of the triangle network at a given size (spec §3 `Inflation`).
pub struct Inflation {
    network: Network,
    size: InflationSize,
    use_distr_symmetries: UseDistrSymmetries,
    distr_short_name: String,
    distr_symmetry_group: Group,
    parties: Vec<Party>,
    party_index: FxHashMap<Party, usize>,
    name_index: FxHashMap<String, usize>,
    party_names: Vec<String>,
    source_induced_syms: Vec<PartySym>,
    inflation_symmetries: Group,
}

impl Inflation {
    /// Builds the inflation of `distr`'s network at `size`, with the given symmetry-usage policy.
    ///
    /// # Panics
    ///
    /// Panics if any component of `size` is zero, or if the expected symmetry-group cardinality
    /// `|applicable| * nα! * nβ! * nγ!` is not reached (an invariant violation, not a user error).
    #[must_use]
    pub fn new(distr: &TargetDistr, size: InflationSize, use_distr_symmetries: UseDistrSymmetries) -> Self {
        assert!(size.iter().all(|&s| s >= 1), "inflation size components must all be >= 1");
        let network = *distr.network();

        let (parties, party_index, name_index, party_names) = init_parties(&network, size);
        let source_induced_syms = init_source_induced_syms(&party_index, size);

        let applicable = match use_distr_symmetries {
            UseDistrSymmetries::Yes => applicable_symmetries(distr.symmetry_group(), size),
            UseDistrSymmetries::No => network.trivial_symmetry_group(),
        };

        let mut inflation_symmetries = Group::new();
        for network_sym in &applicable {
            let inf_party_sym = network_party_to_inf_party_sym(network_sym.party(), &party_index, size);
            for source_sym in &source_induced_syms {
                let combined = source_sym.composition_after(&inf_party_sym);
                let inserted = inflation_symmetries.insert(Symmetry::new(combined, network_sym.outcome().clone()));
                debug_assert!(inserted, "duplicate inflation symmetry produced");
            }
        }

        let expected =
            applicable.len() * factorial(size[0]) * factorial(size[1]) * factorial(size[2]);
        assert_eq!(inflation_symmetries.len(), expected, "unexpected inflation symmetry group size");

        Self {
            network,
            size,
            use_distr_symmetries,
            distr_short_name: distr.short_name().to_string(),
            distr_symmetry_group: distr.symmetry_group().clone(),
            parties,
            party_index,
            name_index,
            party_names,
            source_induced_syms,
            inflation_symmetries,
        }
    }

    /// Number of inflation parties.
    #[must_use]
    pub fn n_parties(&self) -> usize {
        self.parties.len()
    }

    /// The inflation size `(nα, nβ, nγ)`.
    #[must_use]
    pub const fn size(&self) -> InflationSize {
        self.size
    }

    /// The network this inflation is built over.
    #[must_use]
    pub const fn network(&self) -> &Network {
        &self.network
    }

    /// The inflation symmetry group (spec §4.3).
    #[must_use]
    pub const fn inflation_symmetries(&self) -> &Group {
        &self.inflation_symmetries
    }

    /// The party symmetries induced purely by source-copy relabelings.
    #[must_use]
    pub fn source_induced_syms(&self) -> &[PartySym] {
        &self.source_induced_syms
    }

    /// The all-zero inflation event.
    #[must_use]
    pub fn all_zero_event(&self) -> Event {
        vec![0; self.n_parties()]
    }

    /// A pseudo-random inflation event, deterministic in `seed`.
    #[must_use]
    pub fn random_event(&self, seed: u64) -> Event {
        let n = u64::from(self.network.n_outcomes());
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        (0..self.n_parties())
            .map(|_| {
                state = splitmix64(state);
                u8::try_from(state % n).unwrap()
            })
            .collect()
    }

    /// Looks up a party's index by its explicit `(type, left, right)` triple.
    #[must_use]
    pub fn party_index(&self, party: Party) -> usize {
        self.party_index[&party]
    }

    /// Looks up a party's index by its name (e.g. `"A00"`).
    #[must_use]
    pub fn party_index_by_name(&self, name: &str) -> Option<usize> {
        self.name_index.get(name).copied()
    }

    /// The name of the party at `index` (e.g. `"A00"`).
    #[must_use]
    pub fn party_name(&self, index: usize) -> &str {
        &self.party_names[index]
    }

    /// `true` iff `name` names a valid party of this inflation.
    #[must_use]
    pub fn is_valid_party_name(&self, name: &str) -> bool {
        self.name_index.contains_key(name)
    }

    /// Renders an ordered party-index list as `q(name_0, name_1, ...)`.
    #[must_use]
    pub fn marginal_name(&self, marginal: &[usize]) -> String {
        format!("q({})", marginal.iter().map(|&p| self.party_name(p)).join(", "))
    }

    /// A summary string identifying this inflation, its size and the symmetries it uses; used to
    /// key cached symmetric-event-tree files.
    #[must_use]
    pub fn metadata(&self) -> String {
        let mut ret = format!(
            "Network name: {}; Outcomes per party: {}; Inflation size: {}x{}x{}; ",
            "Triangle network",
            self.network.n_outcomes(),
            self.size[0],
            self.size[1],
            self.size[2],
        );
        if self.use_distr_symmetries == UseDistrSymmetries::Yes {
            ret += &format!(
                "Using the {} symmetries of the distribution {}; ",
                self.distr_symmetry_group.len(),
                self.distr_short_name,
            );
        }
        ret += &format!("The inflation has {} symmetries", self.inflation_symmetries.len());
        ret
    }

    /// The filename the symmetric event tree for this inflation is cached under.
    #[must_use]
    pub fn symtree_filename(&self) -> String {
        format!(
            "data/symtree_{}_{}{}{}",
            self.distr_short_name, self.size[0], self.size[1], self.size[2],
        )
    }

    /// `true` iff `other` has the symmetry subgroup this inflation's group was built from (always
    /// true when the policy is [`UseDistrSymmetries::No`]).
    #[must_use]
    pub fn has_symmetries_compatible_with(&self, other: &TargetDistr) -> bool {
        self.use_distr_symmetries == UseDistrSymmetries::No || other.symmetry_group() == &self.distr_symmetry_group
    }

    /// The parent sources of the inflation parties in `marg` (spec §4.6).
    #[must_use]
    pub fn parents(&self, marg: &[usize]) -> BTreeSet<Source> {
        let mut parents = BTreeSet::new();
        for &party_index in marg {
            let (ty, left, right) = self.parties[party_index];
            parents.insert(((ty + 1) % 3, left));
            parents.insert(((ty + 2) % 3, right));
        }
        parents
    }

    /// `true` iff `marg_1` and `marg_2` share no parent source (spec §4.6 D-separation).
    #[must_use]
    pub fn are_d_separated(&self, marg_1: &[usize], marg_2: &[usize]) -> bool {
        self.parents(marg_1).is_disjoint(&self.parents(marg_2))
    }

    /// `true` iff some source-induced symmetry maps every party in `marg` to a network
    /// representative party `(type, 0, 0)` (spec §4.6 injectable set). The empty set is not
    /// injectable.
    #[must_use]
    pub fn is_injectable_set(&self, marg: &[usize]) -> bool {
        if marg.is_empty() {
            return false;
        }

        let network_parties: BTreeSet<usize> =
            (0..self.network.n_parties()).map(|ty| self.party_index((ty, 0, 0))).collect();

        self.source_induced_syms
            .iter()
            .any(|sigma| marg.iter().all(|&p| network_parties.contains(&sigma.act_entrywise(&[p])[0])))
    }
}

fn factorial(n: usize) -> usize {
    (1..=n).product()
}

/// `SplitMix64`, used to derive deterministic pseudo-random inflation events.
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[allow(clippy::type_complexity)]
fn init_parties(
    network: &Network,
    size: InflationSize,
) -> (Vec<Party>, FxHashMap<Party, usize>, FxHashMap<String, usize>, Vec<String>) {
    // the inflation-size steps (1,1,1) -> ... -> size, appending new parties at each step
    let mut steps = vec![[1usize, 1, 1]];
    while steps.last().copied().unwrap() != size {
        let current = *steps.last().unwrap();
        for source_i in 0..3 {
            if current[source_i] < size[source_i] {
                let mut next = current;
                next[source_i] += 1;
                steps.push(next);
            }
        }
    }

    let mut parties = Vec::new();
    let mut party_index = FxHashMap::default();
    let mut name_index = FxHashMap::default();
    let mut party_names = Vec::new();

    for step in steps {
        for sources in (0..step[0]).cartesian_product(0..step[1]).cartesian_product(0..step[2]) {
            let ((alpha, beta), gamma) = sources;
            let sources = [alpha, beta, gamma];
            for network_party_i in 0..network.n_parties() {
                let left = sources[(network_party_i + 1) % 3];
                let right = sources[(network_party_i + 2) % 3];
                let party = (network_party_i, left, right);

                if !party_index.contains_key(&party) {
                    let index = parties.len();
                    party_index.insert(party, index);
                    parties.push(party);
                    let name = format!("{}{left}{right}", crate::network::PARTY_NAMES[network_party_i]);
                    name_index.insert(name.clone(), index);
                    party_names.push(name);
                }
            }
        }
    }

    (parties, party_index, name_index, party_names)
}

fn init_source_induced_syms(party_index: &FxHashMap<Party, usize>, size: InflationSize) -> Vec<PartySym> {
    let perms_of = |n: usize| (0..n).permutations(n).collect::<Vec<_>>();
    let perms = [perms_of(size[0]), perms_of(size[1]), perms_of(size[2])];

    let mut syms = Vec::new();
    for perm_alpha in &perms[0] {
        for perm_beta in &perms[1] {
            for perm_gamma in &perms[2] {
                let perm_sources = [perm_alpha.clone(), perm_beta.clone(), perm_gamma.clone()];
                syms.push(source_sym_to_party_sym(party_index, &perm_sources));
            }
        }
    }
    syms
}

fn source_sym_to_party_sym(party_index: &FxHashMap<Party, usize>, perm_sources: &[Vec<usize>; 3]) -> PartySym {
    let n_parties = party_index.len();
    let mut sym = vec![0usize; n_parties];

    for network_party_i in 0..3 {
        let perm_left = &perm_sources[(network_party_i + 1) % 3];
        let perm_right = &perm_sources[(network_party_i + 2) % 3];
        for (s_left, &image_left) in perm_left.iter().enumerate() {
            for (s_right, &image_right) in perm_right.iter().enumerate() {
                let from = party_index[&(network_party_i, s_left, s_right)];
                let to = party_index[&(network_party_i, image_left, image_right)];
                sym[from] = to;
            }
        }
    }

    PartySym::new(sym, true)
}

fn network_party_to_inf_party_sym(
    network_party_sym: &PartySym,
    party_index: &FxHashMap<Party, usize>,
    size: InflationSize,
) -> PartySym {
    let n_parties = party_index.len();
    let mut sym = vec![0usize; n_parties];

    for net_index in 0..3 {
        for s_left in 0..size[(net_index + 1) % 3] {
            for s_right in 0..size[(net_index + 2) % 3] {
                let (image_left, image_right) = if network_party_sym.is_even() {
                    (s_left, s_right)
                } else {
                    (s_right, s_left)
                };
                let to_type = network_party_sym.image()[net_index];
                let from = party_index[&(net_index, s_left, s_right)];
                let to = party_index[&(to_type, image_left, image_right)];
                sym[from] = to;
            }
        }
    }

    PartySym::new(sym, network_party_sym.is_even())
}

/// The network symmetries whose action on `size` (viewed as a list indexed by source type) fixes
/// it, i.e. they only permute sources of equal cardinality (spec §3 "applicable distribution
/// symmetries"). Only valid for the triangle, where exchanging parties is equivalent to
/// exchanging sources.
fn applicable_symmetries(distr_sym_group: &Group, size: InflationSize) -> Group {
    distr_sym_group
        .iter()
        .filter(|sigma| {
            let party = sigma.party();
            let mut image_size = [0usize; 3];
            for i in 0..3 {
                image_size[party.image()[i]] = size[i];
            }
            image_size == size
        })
        .cloned()
        .collect()
}
