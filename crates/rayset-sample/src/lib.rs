#![warn(missing_docs)]

//! Statistically faithful ray subsampling.
//!
//! Selecting the first N rays of a file biases the angular distribution,
//! because ray files are not pre-randomized; this crate plans uniform
//! random selections without replacement instead, with an optional
//! flux-weighted angular stratification for sources with strong angular
//! structure. Planning operates purely on cardinalities and (for the
//! stratified method) observed directions; it performs no I/O.
//!
//! Every selection carries a single flux rescale factor `total / target`
//! so that the expected total flux of the survivors equals the source
//! total (an unbiased estimator under uniform selection).

mod error;
mod selection;
mod stratified;

pub use error::{Result, SampleError};
pub use selection::{SelectionCursor, SelectionSet};
pub use stratified::StratifiedPlanner;
