//! Search tree over network-action combinations.
//!
//! # Algorithm
//!
//! 1. Evaluate the root leaf (no network action) and optimize its range
//!    actions. A failed root, or one already meeting the stop criterion, is
//!    the result.
//! 2. At each depth, the [`Bloomer`] proposes candidates on top of the
//!    optimal leaf. They are evaluated `leaves_in_parallel` at a time, each
//!    on a network checked out of a [`NetworkPool`].
//! 3. Once every dispatched leaf of the depth is done, the best one replaces
//!    the optimal leaf if it improves it enough. Otherwise the search stops.
//!
//! The search also stops when the depth limit is reached, no candidate is
//! left, or the optimal leaf meets the stop criterion. Candidates sorted
//! after one meeting the stop criterion are skipped.

mod bloomer;
mod combination;
mod leaf;
mod pool;

pub use bloomer::{Bloomer, Candidate};
pub use combination::NetworkActionCombination;
pub use leaf::{Leaf, LeafStatus};
pub use pool::{NetworkPool, PooledNetwork};

use crate::applied::{AppliedRemedialActions, RangeActionSetpoints};
use crate::budget::RunBudget;
use crate::linear::{setpoints_from_network, LinearOptimizer};
use crate::objective::ObjectiveFunction;
use crate::parameters::{RaoParameters, StopCriterion, TreeParameters};
use crate::perimeter::{OptimizationPerimeter, PrePerimeterResult};
use crate::sensitivity::SensitivityProvider;
use anyhow::Context;
use rao_core::{Network, RaoResult};
use rayon::prelude::*;
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// Virtual costs under this value count as zero.
pub const VIRTUAL_COST_TOLERANCE: f64 = 1e-6;

/// Everything a search tree reads; nothing in it is modified.
pub struct SearchTreeInput<'a> {
    pub perimeter: &'a OptimizationPerimeter,
    /// Network at the start of the perimeter
    pub network: &'a Network,
    /// Post-contingency actions decided outside this perimeter
    pub applied: &'a AppliedRemedialActions,
    pub pre_perimeter: &'a PrePerimeterResult,
    pub objective: &'a ObjectiveFunction,
    pub provider: &'a dyn SensitivityProvider,
    pub optimizer: &'a dyn LinearOptimizer,
    pub params: &'a RaoParameters,
    pub tree_parameters: &'a TreeParameters,
    /// Combinations chosen by a previous optimization, tried first
    pub hints: &'a [NetworkActionCombination],
    /// Wall-clock budget of the run, checked between depths
    pub budget: Option<RunBudget>,
}

#[derive(Debug, Clone)]
pub struct SearchTreeResult {
    pub best_leaf: Leaf,
    /// Leaves evaluated, the root included
    pub evaluated_leaves: usize,
    /// Depths explored
    pub depth: usize,
}

/// Run the search tree of `input.perimeter`.
///
/// Leaf-level failures never escape: they mark the leaf as errored. Only
/// thread-pool creation and an exhausted run budget are errors.
pub fn run_search_tree(input: &SearchTreeInput<'_>) -> RaoResult<SearchTreeResult> {
    SearchTree::new(input).run()
}

struct SearchTree<'i, 'a> {
    input: &'i SearchTreeInput<'a>,
    tree_parameters: &'a TreeParameters,
}

impl<'i, 'a> SearchTree<'i, 'a> {
    fn new(input: &'i SearchTreeInput<'a>) -> Self {
        Self {
            input,
            tree_parameters: input.tree_parameters,
        }
    }

    fn run(&self) -> RaoResult<SearchTreeResult> {
        let input = self.input;
        let perimeter = input.perimeter;
        let leaves_in_parallel = self.tree_parameters.leaves_in_parallel.max(1);
        let network_pool = NetworkPool::new(input.network, leaves_in_parallel);
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(leaves_in_parallel)
            .build()
            .context("building Rayon thread pool for leaf evaluation")?;

        let pre_perimeter_setpoints = setpoints_from_network(perimeter, input.network)?;
        let mut root = Leaf::root(pre_perimeter_setpoints.clone());
        {
            let mut network = network_pool.acquire();
            root.evaluate(input, &mut network);
            if root.status() == LeafStatus::Error {
                info!(state = %perimeter.main_state(), "root leaf evaluation failed, perimeter not optimized");
                return Ok(SearchTreeResult {
                    best_leaf: root,
                    evaluated_leaves: 1,
                    depth: 0,
                });
            }
            if self.stop_criterion_reached(&root) {
                info!(state = %perimeter.main_state(), "stop criterion reached on root leaf");
                return Ok(SearchTreeResult {
                    best_leaf: root,
                    evaluated_leaves: 1,
                    depth: 0,
                });
            }
            root.optimize(input, &mut network);
        }
        info!(
            state = %perimeter.main_state(),
            cost = ?root.cost(),
            "root leaf optimized"
        );

        let bloomer = Bloomer::new(
            perimeter,
            input.network,
            input.params,
            self.tree_parameters,
            input.hints,
            input.pre_perimeter.setpoints(),
        );

        let mut optimal = root;
        let mut evaluated_leaves = 1;
        let mut depth = 0;
        while depth < self.tree_parameters.maximum_search_depth && !self.stop_criterion_reached(&optimal) {
            if let Some(budget) = &input.budget {
                budget.check()?;
            }
            let candidates = bloomer.bloom(&optimal);
            if candidates.is_empty() {
                info!(depth = depth + 1, "no more network action available");
                break;
            }
            debug!(depth = depth + 1, candidates = candidates.len(), "exploring depth");

            let leaves = self.explore_depth(
                &thread_pool,
                &network_pool,
                &optimal,
                &candidates,
                &pre_perimeter_setpoints,
            );
            evaluated_leaves += leaves.len();
            depth += 1;

            match self.select(&optimal, leaves) {
                Some(leaf) => {
                    info!(depth, leaf = %leaf, cost = ?leaf.cost(), "optimal leaf updated");
                    optimal = leaf;
                }
                None => {
                    info!(depth, "no improvement at this depth, search stops");
                    break;
                }
            }
        }

        info!(
            state = %perimeter.main_state(),
            leaf = %optimal,
            cost = ?optimal.cost(),
            evaluated_leaves,
            depth,
            "search tree finished"
        );
        Ok(SearchTreeResult {
            best_leaf: optimal,
            evaluated_leaves,
            depth,
        })
    }

    /// Evaluate `candidates` on top of `optimal`; returns the evaluated
    /// leaves with their candidate index.
    fn explore_depth(
        &self,
        thread_pool: &rayon::ThreadPool,
        network_pool: &NetworkPool,
        optimal: &Leaf,
        candidates: &[Candidate],
        pre_perimeter_setpoints: &RangeActionSetpoints,
    ) -> Vec<(usize, Leaf)> {
        let stop_index = AtomicUsize::new(usize::MAX);
        let mut leaves: Vec<(usize, Leaf)> = thread_pool.install(|| {
            candidates
                .par_iter()
                .enumerate()
                .filter_map(|(index, candidate)| {
                    if index > stop_index.load(Ordering::SeqCst) {
                        debug!(candidate = %candidate.combination.concatenated_id(), "skipped, stop criterion already reached");
                        return None;
                    }
                    let mut network = network_pool.acquire();
                    let mut leaf = Leaf::child(
                        optimal,
                        &candidate.combination,
                        candidate.remove_range_actions,
                        pre_perimeter_setpoints,
                    );
                    leaf.evaluate(self.input, &mut network);
                    if leaf.status() == LeafStatus::Evaluated && !self.stop_criterion_reached(&leaf) {
                        leaf.optimize(self.input, &mut network);
                    }
                    if self.stop_criterion_reached(&leaf) {
                        stop_index.fetch_min(index, Ordering::SeqCst);
                    }
                    Some((index, leaf))
                })
                .collect()
        });
        leaves.sort_by_key(|(index, _)| *index);
        leaves
    }

    /// Leaf replacing `optimal` after a depth, if any.
    fn select(&self, optimal: &Leaf, leaves: Vec<(usize, Leaf)>) -> Option<Leaf> {
        let optimal_cost = optimal.cost().unwrap_or(f64::INFINITY);
        let optimal_stops = self.stop_criterion_reached(optimal);
        let usable: Vec<Leaf> = leaves
            .into_iter()
            .map(|(_, leaf)| leaf)
            .filter(|leaf| leaf.cost().is_some() && leaf.status() != LeafStatus::Error)
            .collect();

        // leaves are in candidate order; the first one stopping the search wins
        if let Some(stopping) = usable.iter().find(|l| self.stop_criterion_reached(l)) {
            let cost = stopping.cost().unwrap_or(f64::INFINITY);
            if !optimal_stops || cost < optimal_cost {
                return Some(stopping.clone());
            }
        }

        let best = usable.into_iter().min_by(compare_leaves)?;
        let cost = best.cost().unwrap_or(f64::INFINITY);
        improved_enough(self.tree_parameters, optimal_cost, cost).then_some(best)
    }

    /// Whether `leaf` meets the stop criterion.
    fn stop_criterion_reached(&self, leaf: &Leaf) -> bool {
        let (Some(cost), Some(virtual_cost)) = (leaf.cost(), leaf.virtual_cost()) else {
            return false;
        };
        if virtual_cost > VIRTUAL_COST_TOLERANCE {
            return false;
        }
        if !self.input.objective.has_optimized_cnecs() {
            return true;
        }
        match self.tree_parameters.stop_criterion {
            StopCriterion::MinObjective => false,
            StopCriterion::AtTargetObjectiveValue(target) => cost <= target,
        }
    }
}

/// Whether a cost of `new` is a significant enough improvement on `previous`.
pub fn improved_enough(params: &TreeParameters, previous: f64, new: f64) -> bool {
    let absolute = params.absolute_improvement_threshold;
    let relative = params.relative_improvement_threshold;
    previous - absolute > new && (1.0 - previous.signum() * relative) * previous > new
}

/// Ranking of evaluated leaves: cost, then fewer network actions, then ids.
pub fn compare_leaves(a: &Leaf, b: &Leaf) -> CmpOrdering {
    let cost = |l: &Leaf| l.cost().unwrap_or(f64::INFINITY);
    cost(a)
        .total_cmp(&cost(b))
        .then_with(|| a.network_actions().len().cmp(&b.network_actions().len()))
        .then_with(|| a.concatenated_id().cmp(&b.concatenated_id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rao_core::{ActionType, ElementId, ElementaryAction, NetworkAction};
    use std::sync::Arc;

    #[test]
    fn test_improvement_thresholds() {
        let params = TreeParameters {
            absolute_improvement_threshold: 1.0,
            relative_improvement_threshold: 0.1,
            ..TreeParameters::preventive(&RaoParameters::default())
        };
        assert!(improved_enough(&params, 100.0, 80.0));
        assert!(!improved_enough(&params, 100.0, 95.0));
        assert!(!improved_enough(&params, 1.5, 1.0));
        assert!(improved_enough(&params, -10.0, -12.0));
        assert!(!improved_enough(&params, -10.0, -10.5));
    }

    #[test]
    fn test_leaf_ranking_breaks_ties_on_action_count_then_id() {
        let na = |id: &str| {
            Arc::new(NetworkAction::new(
                id,
                vec![ElementaryAction::Topological {
                    element: ElementId::new(id),
                    action_type: ActionType::Open,
                }],
            ))
        };
        let none = RangeActionSetpoints::new();
        let root = Leaf::root(none.clone());
        let a = Leaf::child(&root, &NetworkActionCombination::single(na("a")), false, &none);
        let b = Leaf::child(&root, &NetworkActionCombination::single(na("b")), false, &none);
        let ab = Leaf::child(&a, &NetworkActionCombination::single(na("b")), false, &none);
        // not evaluated: every cost is infinite
        assert_eq!(compare_leaves(&a, &b), CmpOrdering::Less);
        assert_eq!(compare_leaves(&b, &ab), CmpOrdering::Less);
        assert_eq!(compare_leaves(&ab, &ab.clone()), CmpOrdering::Equal);
    }
}
