//! States and partitions.
//!
//! States live in one arena (`Vec<State>`) and are addressed by [`StateId`].
//! A [`Partition`] lists the ids of its states, so a state that survives
//! several aggregation steps is shared by every partition that contains it
//! rather than copied.

use ndarray::Array2;

use crate::explain::{DecisionTree, Histogram, StateLabel};
use crate::kernel::Centroid;

/// Index of a state in the model's arena.
pub type StateId = usize;

/// A cluster of rows at some scale.
#[derive(Debug, Clone)]
pub struct State {
    /// Member rows, ascending.
    pub members: Vec<usize>,
    /// Initial states this state is made of, ascending and unique.
    pub initial_states: Vec<usize>,
    /// Mean of the members, one component per column.
    pub centroid: Centroid,
    /// Layout position.
    pub x: f64,
    pub y: f64,
    /// Layout radius, `√(p / π)` for stationary probability `p`.
    pub radius: f64,
    /// Long-run share of time spent in this state.
    pub stationary_probability: f64,
    pub label: Option<StateLabel>,
    /// Per-column histograms over the members; empty until computed.
    pub histograms: Vec<Histogram>,
    pub decision_tree: Option<DecisionTree>,
}

impl State {
    /// A state with no layout or explanation yet.
    pub fn new(members: Vec<usize>, initial_states: Vec<usize>, centroid: Centroid) -> Self {
        Self {
            members,
            initial_states,
            centroid,
            x: 0.0,
            y: 0.0,
            radius: 0.0,
            stationary_probability: 0.0,
            label: None,
            histograms: Vec::new(),
            decision_tree: None,
        }
    }

    /// Number of member rows.
    pub fn n_members(&self) -> usize {
        self.members.len()
    }

    /// Merge two states: union of members and initial states, count-weighted centroid.
    pub fn merged(a: &State, b: &State) -> State {
        let members = merge_sorted(&a.members, &b.members);
        let initial_states = merge_sorted(&a.initial_states, &b.initial_states);
        let centroid = Centroid::weighted_mean(&a.centroid, a.n_members(), &b.centroid, b.n_members());
        State::new(members, initial_states, centroid)
    }
}

fn merge_sorted(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    out.extend_from_slice(a);
    out.extend_from_slice(b);
    out.sort_unstable();
    out.dedup();
    out
}

/// One scale: a covering of all rows by disjoint states.
#[derive(Debug, Clone)]
pub struct Partition {
    /// States of this scale, by arena id.
    pub states: Vec<StateId>,
    /// For each initial state, the position in `states` of the state containing it.
    pub initial_to_state: Vec<usize>,
    /// Row-stochastic transition matrix between the states of this scale.
    pub transitions: Array2<f64>,
    /// Stationary probability of each state.
    pub stationary: Vec<f64>,
    /// Dominant eigenvalues of `transitions`, zero-padded to the initial-state count.
    pub eigenvalues: Vec<f64>,
}

impl Partition {
    /// Partition whose states are given directly, before any statistics are computed.
    pub fn new(states: Vec<StateId>, initial_to_state: Vec<usize>) -> Self {
        let n = states.len();
        Self {
            states,
            initial_to_state,
            transitions: Array2::zeros((n, n)),
            stationary: vec![0.0; n],
            eigenvalues: Vec::new(),
        }
    }

    /// Number of states at this scale.
    pub fn n_states(&self) -> usize {
        self.states.len()
    }

    /// Position of the state with arena id `id`, if it belongs to this scale.
    pub fn position_of(&self, id: StateId) -> Option<usize> {
        self.states.iter().position(|&s| s == id)
    }
}
