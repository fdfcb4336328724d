pub mod inventory;
pub mod runner;
