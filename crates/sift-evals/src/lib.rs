//! Evaluation dataset generation and the offline accuracy runner.
//!
//! Datasets are built from the human-labeled feedback channels: everything
//! in the true-positive channel becomes an `is_match: true` expectation,
//! everything in the false-positive channel `is_match: false`. The runner
//! replays a dataset through the prompt evaluator and gates on a fixed
//! accuracy bar.
mod dataset;
mod runner;

pub use dataset::{eval_dir, generate_datasets, EvalExpected, EvalRecord};
pub use runner::{run_accuracy, select_prompt, EvalOutcome, ACCEPTANCE_ACCURACY};
