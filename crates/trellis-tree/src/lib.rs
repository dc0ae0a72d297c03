//! Hierarchical row/column trees for streamed pivot results.
//!
//! The builder turns a pre-sorted row stream plus panel metadata into an
//! arena-backed header tree per axis, recognizing subtotal and
//! grand-total marker rows. The divergence module decides how many
//! un-mergeable boundaries a sibling list has, which the rendering layer
//! turns into header-cell merge spans.

pub mod arena;
pub mod builder;
pub mod divergence;
pub mod metadata;

pub use arena::{NodeId, NodeType, TreeArena, TreeNode};
pub use builder::TreeBuilder;
pub use divergence::{divergence, divergence_with, structural_eq, DivergenceComparator};
pub use metadata::{dimension_metadata, DimensionLevel};
