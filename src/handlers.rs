// src/handlers.rs

pub mod auth;
pub mod interactions;
pub mod products;
pub mod stores;
pub mod users;
