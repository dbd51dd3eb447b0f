pub mod entries;
pub mod fill;
pub mod formatters;
pub mod handlers;
pub mod manager;
pub mod models;
pub mod notifier;
pub mod parser;
pub mod recovery;
pub mod scheduler;
pub mod selector;
pub mod store;
