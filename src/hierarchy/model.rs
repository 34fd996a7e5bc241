//! The multi-scale state model and its build pipeline.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::cluster::{Aggregation, DatasetSpace, Kmeans, StateAggregator};
use crate::config::ModelConfig;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::explain::{
    column_histograms, label_population, population_histograms, suggest_label, DecisionTree,
    Histogram,
};
use crate::layout::Layout;
use crate::spectral::ScaleSelector;

use super::{Dendrogram, Partition, State, StateId};

/// A dataset summarized as states at several scales.
///
/// Built by [`Model::build`]: the rows are clustered into initial states,
/// the initial states are merged pairwise down to two states, and a handful
/// of representative scales is kept and explained.
#[derive(Debug, Clone)]
pub struct Model {
    dataset: Dataset,
    config: ModelConfig,
    states: Vec<State>,
    chain: Vec<Partition>,
    row_to_initial: Vec<usize>,
    selected: Vec<usize>,
    history: Dendrogram,
    total_histograms: Vec<Histogram>,
}

impl Model {
    /// Run the whole pipeline on `dataset`.
    ///
    /// Fails only if the configuration is invalid or the dataset has fewer
    /// rows than the requested number of initial states.
    pub fn build(mut dataset: Dataset, config: &ModelConfig) -> Result<Self> {
        config.check(dataset.n_rows())?;
        dataset.resolve_default_weights(config.dist_weight_outliers);
        let k = config.num_initial_states;
        info!(
            n_rows = dataset.n_rows(),
            n_columns = dataset.n_columns(),
            n_initial_states = k,
            "building model"
        );

        let fit = Kmeans::new(k)
            .with_seed(config.seed)
            .fit(&DatasetSpace::new(&dataset));
        debug!(quality = fit.quality, phases = fit.phases, "initial states clustered");
        let row_to_initial = fit.assignments;
        let mut states: Vec<State> = fit
            .members
            .into_iter()
            .zip(fit.centroids)
            .enumerate()
            .map(|(i, (members, centroid))| State::new(members, vec![i], centroid))
            .collect();

        let initial = Partition::new((0..k).collect(), (0..k).collect());
        let aggregator = StateAggregator::new(&dataset, &states, &initial);
        let Aggregation { mut chain, history } = aggregator.build_chain(&mut states, initial);

        let selector = ScaleSelector::new()
            .with_max_scales(config.max_scales)
            .with_seed(config.seed);
        selector.compute_spectra(&mut chain, &row_to_initial);
        for partition in &chain {
            for (pos, &id) in partition.states.iter().enumerate() {
                states[id].stationary_probability = partition.stationary[pos];
            }
        }
        #[cfg(debug_assertions)]
        {
            let report = super::check_partition_chain(dataset.n_rows(), &states, &chain);
            debug_assert!(report.is_healthy(), "{report}");
            debug_assert!(chain
                .iter()
                .all(|p| history.cut_to_k(p.n_states()) == p.initial_to_state));
        }
        let selected = selector.select(&chain);
        info!(
            n_scales = chain.len(),
            kept = ?selected.iter().map(|&s| chain[s].n_states()).collect::<Vec<_>>(),
            "scales selected"
        );

        let mut model = Self {
            dataset,
            config: config.clone(),
            states,
            chain,
            row_to_initial,
            selected,
            history,
            total_histograms: Vec::new(),
        };
        if config.include_histograms {
            model.compute_histograms();
        }
        model.compute_labels();
        Layout::new().with_seed(config.seed).place(
            &model.dataset,
            &mut model.states,
            &model.chain,
            &model.selected,
        );
        if config.include_decision_trees {
            model.build_decision_trees();
        }
        Ok(model)
    }

    /// Arena ids of every state of a kept scale, each once, finest scale first.
    fn kept_state_ids(&self) -> Vec<(usize, StateId)> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for &scale in &self.selected {
            for (pos, &id) in self.chain[scale].states.iter().enumerate() {
                if seen.insert(id) {
                    out.push((pos, id));
                }
            }
        }
        out
    }

    fn compute_histograms(&mut self) {
        let n_buckets = self.config.num_histogram_buckets;
        self.total_histograms = population_histograms(&self.dataset, n_buckets);
        for (_, id) in self.kept_state_ids() {
            let hists = column_histograms(&self.dataset, &self.states[id].members, n_buckets);
            self.states[id].histograms = hists;
        }
    }

    /// Labels fall back to the state's position in the finest kept scale containing it.
    fn compute_labels(&mut self) {
        let population = label_population(&self.dataset);
        for (pos, id) in self.kept_state_ids() {
            let label = suggest_label(&self.dataset, &self.states[id].members, &population, pos.to_string());
            self.states[id].label = Some(label);
        }
    }

    fn build_decision_trees(&mut self) {
        let limits = self
            .config
            .decision_tree
            .limits(self.config.num_initial_states);
        let kept = self.kept_state_ids();
        for (i, &(_, id)) in kept.iter().enumerate() {
            let inside: HashSet<usize> = self.states[id].initial_states.iter().copied().collect();
            let (pos, neg): (Vec<usize>, Vec<usize>) = (0..self.dataset.n_rows())
                .partition(|&row| inside.contains(&self.row_to_initial[row]));
            debug_assert_eq!(pos.len(), self.states[id].n_members());
            info!(state = i, of = kept.len(), "building decision tree");
            let tree = DecisionTree::build(&self.dataset, &pos, &neg, limits);
            self.states[id].decision_tree = Some(tree);
        }
    }

    /// The dataset, with default distance weights filled in.
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Every state ever created, addressed by [`StateId`].
    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn state(&self, id: StateId) -> &State {
        &self.states[id]
    }

    /// The full aggregation chain, from the initial partition down to two states.
    pub fn chain(&self) -> &[Partition] {
        &self.chain
    }

    /// Indices into [`Model::chain`] of the kept scales, finest first.
    pub fn selected(&self) -> &[usize] {
        &self.selected
    }

    /// The kept scales, finest first.
    pub fn scales(&self) -> impl Iterator<Item = &Partition> + '_ {
        self.selected.iter().map(|&s| &self.chain[s])
    }

    /// Initial state of every row.
    pub fn row_to_initial(&self) -> &[usize] {
        &self.row_to_initial
    }

    pub fn n_initial_states(&self) -> usize {
        self.chain.first().map_or(0, Partition::n_states)
    }

    /// The merge steps that produced the chain.
    pub fn history(&self) -> &Dendrogram {
        &self.history
    }

    /// Histograms of the whole dataset; empty when histograms are disabled.
    pub fn total_histograms(&self) -> &[Histogram] {
        &self.total_histograms
    }

    /// Positions, in the next finer kept scale, of the states contained in
    /// state `pos` of kept scale `scale`. `None` for the finest kept scale.
    pub fn child_states(&self, scale: usize, pos: usize) -> Option<Vec<usize>> {
        let finer = self.chain.get(*self.selected.get(scale.checked_sub(1)?)?)?;
        let parent = &self.states[self.chain[self.selected[scale]].states[pos]];
        let parent_set: HashSet<usize> = parent.initial_states.iter().copied().collect();
        Some(
            finer
                .states
                .iter()
                .enumerate()
                .filter(|&(_, &id)| {
                    self.states[id]
                        .initial_states
                        .iter()
                        .all(|init| parent_set.contains(init))
                })
                .map(|(p, _)| p)
                .collect(),
        )
    }
}
