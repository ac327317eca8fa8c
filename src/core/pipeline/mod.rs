pub mod judging;
pub mod workers;
