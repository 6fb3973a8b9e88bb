//! Address-book core: contact validation, XML bulk import, sorted and
//! searchable contact lists, and the event-driven contact service that ties
//! them to a SQLite store.

pub mod bridge;
pub mod config;
pub mod contact;
pub mod db;
pub mod import;
pub mod search;
pub mod service;
pub mod store;
