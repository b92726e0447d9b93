// src/services.rs

pub mod admin;
pub mod auth;
pub mod interactions;
pub mod live;
pub mod policy;
pub mod products;
pub mod visibility;
