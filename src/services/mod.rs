pub mod links;
pub mod mail;
pub mod store;
pub mod templates;
pub mod trips;
