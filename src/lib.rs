pub mod battle;
pub mod bot;
pub mod constants;
pub mod judge;
pub mod registry;
pub mod router;
pub mod selector;
pub mod store;
pub mod transport;
pub mod types;
