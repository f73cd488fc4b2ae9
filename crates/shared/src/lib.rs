pub mod domain;
pub mod error;
pub mod filters;
pub mod listing;
pub mod protocol;
