pub mod domain;
pub mod pipeline;
pub mod state;
pub mod store;
pub mod traits;
pub mod verdict;
