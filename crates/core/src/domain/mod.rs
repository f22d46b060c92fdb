pub mod contract;
pub mod evaluation;
pub mod market;
