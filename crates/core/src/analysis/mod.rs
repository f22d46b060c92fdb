pub mod classifier;
pub mod currency;
pub mod error;
pub mod features;
pub mod opportunity;
pub mod reconcile;
