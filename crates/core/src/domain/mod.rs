pub mod context;
pub mod contract;
pub mod currency;
pub mod recommendation;
