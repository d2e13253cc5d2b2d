pub mod catalog;
pub mod identity;
pub mod results;
pub mod vote;
