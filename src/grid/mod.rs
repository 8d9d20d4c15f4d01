//! Grid construction: price ladders and size allocation

pub mod allocation;
pub mod levels;

pub use allocation::{level_weights, order_size, split_budget};
pub use levels::{
    adaptive_spacing, generate_adaptive_ladder, generate_level_prices, AdaptiveLadder, GridLevel,
};
