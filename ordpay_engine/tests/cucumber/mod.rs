mod ordering_world;
pub mod setups;
pub mod steps;

pub use ordering_world::{OrderingWorld, RestaurantSystem};
