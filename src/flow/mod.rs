pub mod generator;
pub mod shift;
pub mod tracker;
