use std::collections::VecDeque;

use num_bigint::{BigUint, RandBigInt};
use rand::Rng;
use tracing::{debug, trace};

use crate::automaton::{BuildError, RegisterAutomaton};
use crate::guard::Guard;
use crate::math::Map;
use crate::symbol::{LabeledSymbol, Symbol};

/// The Champarnaud–Paranthoën counting table `C[t][p]` over arbitrary
/// precision integers, for a fixed alphabet size `m >= 2`. The recurrence is
///
/// - `C[1][j] = j * (j + 1) / 2`,
/// - `C[t][j] = 0` for `j < ceil(t / (m - 1))`,
/// - `C[t][j] = C[t][j - 1] + j * C[t - 1][j]` otherwise,
///
/// which counts the non-decreasing integer tuples the bijection maps to
/// minimal deterministic automata. Callers sampling many tuples for one
/// `(m, n)` pair should construct the table once and reuse it.
pub struct CountingTable {
    arity: usize,
    rows: Vec<Vec<BigUint>>,
}

impl CountingTable {
    /// Computes the table for alphabet size `m` with `t` ranging over
    /// `1..=t_max` and `p` over `0..=p_max`.
    ///
    /// # Panics
    ///
    /// Panics if `m < 2` or `t_max < 1`.
    pub fn new(m: usize, t_max: usize, p_max: usize) -> Self {
        assert!(m >= 2, "the alphabet must have at least two letters");
        assert!(t_max >= 1, "the table needs at least one row");

        let mut rows = Vec::with_capacity(t_max);
        let base: Vec<BigUint> =
            (0..=p_max).map(|j| BigUint::from(j * (j + 1) / 2)).collect();
        rows.push(base);

        for t in 2..=t_max {
            let threshold = t.div_ceil(m - 1);
            let mut row = vec![BigUint::from(0u32); p_max + 1];
            for j in 1..=p_max {
                if j < threshold {
                    continue;
                }
                let count = &row[j - 1] + BigUint::from(j) * &rows[t - 2][j];
                row[j] = count;
            }
            rows.push(row);
        }

        Self { arity: m, rows }
    }

    /// The table sized for sampling automata with `n` states over `m`
    /// letters, i.e. `t_max = n * (m - 1)` and `p_max = n`.
    pub fn for_automaton_size(m: usize, n: usize) -> Self {
        Self::new(m, n * (m - 1), n)
    }

    /// The entry `C[t][p]`.
    pub fn entry(&self, t: usize, p: usize) -> &BigUint {
        &self.rows[t - 1][p]
    }

    /// The largest tuple length the table covers.
    pub fn t_max(&self) -> usize {
        self.rows.len()
    }

    /// The largest element bound the table covers.
    pub fn p_max(&self) -> usize {
        self.rows[0].len() - 1
    }

    /// Samples a tuple uniformly from the set counted by `C[t_max][p_max]` by
    /// a decision walk over the table. The result is empty when the table
    /// counts nothing for these bounds, and otherwise a non-decreasing
    /// sequence of `t_max` integers in `[1, p_max]`.
    pub fn sample_tuple<R: Rng>(&self, rng: &mut R) -> Vec<usize> {
        let mut t = self.t_max();
        let mut p = self.p_max();

        if *self.entry(t, p) == BigUint::from(0u32) {
            return Vec::new();
        }

        // elements are discovered right-to-left
        let mut suffix = VecDeque::with_capacity(t);
        loop {
            if t == 1 {
                let d = draw(rng, self.entry(1, p));
                let mut x = 1usize;
                while BigUint::from(x * (x + 1) / 2) < d {
                    x += 1;
                }
                let mut tuple = Vec::with_capacity(suffix.len() + 1);
                tuple.push(x);
                tuple.extend(suffix);
                trace!("sampled tuple {tuple:?}");
                return tuple;
            }

            let d = draw(rng, self.entry(t, p));
            if p > 1 && d <= *self.entry(t, p - 1) {
                p -= 1;
            } else {
                suffix.push_front(p);
                t -= 1;
            }
        }
    }
}

/// A uniform draw from `[1, bound]`.
fn draw<R: Rng>(rng: &mut R, bound: &BigUint) -> BigUint {
    rng.gen_biguint_below(bound) + 1u32
}

/// The extended `m`-ary tree decoded from a sampled tuple. Internal nodes
/// have one child per alphabet letter, in alphabet order; every node carries
/// its access sequence of letter indices from the root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtendedTree {
    /// An internal node with exactly one child per letter.
    Node {
        /// Letter indices on the path from the root.
        access: Vec<usize>,
        /// Children in alphabet order.
        children: Vec<ExtendedTree>,
    },
    /// A leaf.
    Leaf {
        /// Letter indices on the path from the root.
        access: Vec<usize>,
    },
}

impl ExtendedTree {
    /// The access sequence of this node.
    pub fn access(&self) -> &[usize] {
        match self {
            ExtendedTree::Node { access, .. } | ExtendedTree::Leaf { access } => access,
        }
    }

    /// Decodes a sampled tuple into the extended tree it encodes. This is the
    /// inverse of the tuple bijection: the working list `[1] ++ tuple` is
    /// consumed left to right while the tree is built in depth-first order,
    /// one child per alphabet letter. Equal adjacent entries yield a leaf and
    /// consume one entry, unequal entries yield an internal node whose head
    /// entry tracks the number of internal nodes built so far.
    pub fn decode(tuple: &[usize], arity: usize) -> ExtendedTree {
        assert!(arity >= 2, "the alphabet must have at least two letters");
        let mut entries: VecDeque<usize> =
            std::iter::once(1).chain(tuple.iter().copied()).collect();
        Self::grow(&mut entries, Vec::new(), arity)
    }

    fn grow(entries: &mut VecDeque<usize>, access: Vec<usize>, arity: usize) -> ExtendedTree {
        let mut children = Vec::with_capacity(arity);
        for letter in 0..arity {
            let mut child_access = access.clone();
            child_access.push(letter);

            if entries.len() == 1 {
                // the saturated tail of the walk
                children.push(ExtendedTree::Leaf { access: child_access });
            } else if entries[0] == entries[1] {
                entries.pop_front();
                children.push(ExtendedTree::Leaf { access: child_access });
            } else {
                entries[0] += 1;
                children.push(Self::grow(entries, child_access, arity));
            }
        }
        ExtendedTree::Node { access, children }
    }
}

/// Samples a register automaton whose underlying structure is drawn uniformly
/// from the minimal deterministic automata with `n_states` states over the
/// given alphabet, following the Champarnaud–Paranthoën bijection.
///
/// Every internal tree node becomes a location; the root takes
/// `location_prefix` as its name and is initial. Acceptance of each location
/// is an independent Bernoulli draw with probability `accept_probability`.
/// Edges into leaves are closed back to a uniformly chosen location whose
/// access sequence precedes the leaf's, which is what turns the tree into a
/// minimal automaton. Every transition carries `default_guard` and an empty
/// assignment; alphabet letters become [`LabeledSymbol`]s of arity
/// `n_parameters` with parameters `p0`, `p1`, …. Registers mentioned by the
/// default guard are declared on the automaton.
///
/// All randomness is taken from `rng`; identical seeds produce identical
/// automata.
#[allow(clippy::too_many_arguments)]
pub fn champarnaud_paranthoen_ra<R: Rng>(
    n_states: usize,
    alphabet: &[String],
    n_parameters: usize,
    default_guard: &Guard,
    accept_probability: f64,
    location_prefix: &str,
    rng: &mut R,
) -> Result<RegisterAutomaton, BuildError> {
    assert!(n_states >= 1, "need at least one state");
    let m = alphabet.len();

    let table = CountingTable::for_automaton_size(m, n_states);
    let tuple = table.sample_tuple(rng);
    let tree = ExtendedTree::decode(&tuple, m);
    debug!("decoded tuple of length {} into tree", tuple.len());

    let symbols: Vec<LabeledSymbol> = alphabet
        .iter()
        .map(|letter| LabeledSymbol::with_arity(letter.clone(), n_parameters))
        .collect();

    // internal nodes in depth-first order, which coincides with the
    // lexicographic order of their access sequences
    let mut internals = Vec::new();
    collect_internals(&tree, &mut internals);

    let mut ra = RegisterAutomaton::new(location_prefix, rng.gen_bool(accept_probability));
    for symbol in default_guard.free_variables() {
        if let Symbol::Register(name) = symbol {
            ra.add_register(&name)?;
        }
    }

    let names: Vec<String> = internals
        .iter()
        .map(|node| location_name(location_prefix, node.access(), alphabet))
        .collect();
    for name in names.iter().skip(1) {
        ra.add_location(name, rng.gen_bool(accept_probability))?;
    }

    for (index, node) in internals.iter().enumerate() {
        let ExtendedTree::Node { children, .. } = node else { unreachable!() };
        for (letter, child) in children.iter().enumerate() {
            let target = match child {
                ExtendedTree::Node { access, .. } => {
                    location_name(location_prefix, access, alphabet)
                }
                ExtendedTree::Leaf { access } => {
                    // every node before the leaf in access order is a candidate
                    let bound = internals.partition_point(|n| n.access() < access.as_slice());
                    names[rng.gen_range(0..bound)].clone()
                }
            };
            ra.add_transition(
                &names[index],
                symbols[letter].clone(),
                default_guard.clone(),
                Map::default(),
                &target,
            )?;
        }
    }

    Ok(ra)
}

fn collect_internals<'t>(tree: &'t ExtendedTree, into: &mut Vec<&'t ExtendedTree>) {
    if let ExtendedTree::Node { children, .. } = tree {
        into.push(tree);
        for child in children {
            collect_internals(child, into);
        }
    }
}

fn location_name(prefix: &str, access: &[usize], alphabet: &[String]) -> String {
    if access.is_empty() {
        return prefix.to_string();
    }
    let path: String = access.iter().map(|&letter| alphabet[letter].as_str()).collect();
    format!("{prefix}_{path}")
}
