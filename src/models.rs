pub mod auth;
pub mod interaction;
pub mod product;
pub mod store;

// Coleções do EntityStore e o feed de mudanças
pub mod change;
