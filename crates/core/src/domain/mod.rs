pub mod artifacts;
pub mod order;
