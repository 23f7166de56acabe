//! # rao-algo: Search-Tree Remedial Action Optimization
//!
//! This crate finds the remedial actions that keep the Cnecs of a
//! [`rao_core::Crac`] within their limits, perimeter by perimeter.
//!
//! ## Architecture
//!
//! | Component | Role |
//! |-----------|------|
//! | [`compatibility`] | Whether two network actions contradict each other |
//! | [`perimeter`] | Admissible actions and monitored Cnecs of one state |
//! | [`search_tree`] | Best combination of network actions for one perimeter |
//! | [`linear`] | Range-action setpoints for a fixed set of network actions |
//! | [`orchestrator`] | Preventive, auto, curative and second preventive sequencing |
//!
//! The load-flow engine and the continuous optimizer are collaborators
//! behind the [`SensitivityProvider`] and [`LinearOptimizer`] traits:
//!
//! - [`LinearSensitivityProvider`]: superposition model of Cnec flows
//! - [`IteratingLinearOptimizer`]: max-min-margin LP (good_lp, Clarabel)
//!   solved around successive sensitivities
//!
//! ## Concurrency
//!
//! Leaves of one depth are evaluated on a Rayon pool of `leaves_in_parallel`
//! threads, each on a network checked out of a [`NetworkPool`]. Contingency
//! scenarios run on their own pool of `contingency_scenarios_in_parallel`
//! threads. Perimeters, leaves and parameters are never mutated once built.
//!
//! ## Example
//!
//! ```ignore
//! use rao_algo::{run_rao, IteratingLinearOptimizer, LinearSensitivityProvider, RaoParameters};
//!
//! let params = RaoParameters::default();
//! let provider = LinearSensitivityProvider::new(model, &network, &crac.contingencies)?;
//! let optimizer = IteratingLinearOptimizer::new(params.range_actions.clone());
//!
//! let outcome = run_rao(&crac, &network, &params, &provider, &optimizer)?;
//! println!("{:?}: cost {:?}", outcome.status, outcome.final_cost);
//! ```

pub mod applied;
pub mod budget;
pub mod compatibility;
pub mod error;
pub mod linear;
pub mod objective;
pub mod orchestrator;
pub mod parameters;
pub mod perimeter;
pub mod search_tree;
pub mod sensitivity;
pub mod state_tree;

pub use applied::{AppliedRemedialActions, RangeActionSetpoints};
pub use budget::RunBudget;
pub use compatibility::{
    are_elementary_actions_compatible, are_network_actions_compatible,
    is_combination_compatible,
};
pub use error::EvaluationError;
pub use linear::{
    IteratingLinearOptimizer, LinearOptimizationInput, LinearOptimizationResult,
    LinearOptimizer, LinearProblemStatus,
};
pub use objective::{ObjectiveFunction, ObjectiveValue};
pub use orchestrator::{run_rao, PerimeterOutcome, RaoOutcome, RunStatus, SecondPreventiveReport};
pub use parameters::{
    OptimizationGoal, RaUsageLimits, RaoParameters, SecondPreventiveCondition, StopCriterion,
    TreeParameters,
};
pub use perimeter::{
    build_perimeter, OptimizationPerimeter, PerimeterBuilder, PerimeterKind, PrePerimeterResult,
};
pub use search_tree::{
    run_search_tree, Leaf, LeafStatus, NetworkActionCombination, NetworkPool, SearchTreeInput,
    SearchTreeResult,
};
pub use sensitivity::{
    ComputationStatus, LinearSensitivityProvider, SensitivityModel, SensitivityProvider,
    SensitivityRequest, SensitivityResult,
};
pub use state_tree::StateTree;
