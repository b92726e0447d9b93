// src/models/product.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// Produto do catálogo global (não pertence a nenhuma loja)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub product_code: String,
    pub description: String,
    pub cost_price: Decimal,
    pub sale_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Uma linha da planilha já convertida
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub product_code: String,
    pub description: String,
    pub cost_price: Decimal,
    pub sale_price: Decimal,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductSearchQuery {
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogUploadResponse {
    pub file_name: String,
    pub products: usize,
}
