pub mod collection;
pub mod config;
pub mod errors;
pub mod inventory;
pub mod lazy;
pub mod reference;
pub mod types;
