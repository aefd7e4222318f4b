//! Optimizer pass trait.

use super::OptimizerContext;
use crate::model::ModelId;
use strata_core::Result;

/// An optimization pass that rewrites a query model tree.
pub trait OptimizerPass {
    /// Rewrites the tree rooted at `model` and returns its new root.
    fn optimize(&self, cx: &mut OptimizerContext<'_>, model: ModelId) -> Result<ModelId>;

    /// Returns the name of this pass.
    fn name(&self) -> &'static str {
        "unnamed"
    }
}
