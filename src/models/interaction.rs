// src/models/interaction.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

// --- ENUMS ---

// Mapeia o CREATE TYPE interaction_status do banco
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "interaction_status")]
pub enum InteractionStatus {
    Quoted,
    Closed,
    Lost,
}

// Mapeia o CREATE TYPE loss_reason do banco (só faz sentido com status Lost)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "loss_reason")]
pub enum LossReason {
    #[serde(rename = "Lack of product")]
    #[sqlx(rename = "Lack of product")]
    LackOfProduct,
    #[serde(rename = "Stock Error")]
    #[sqlx(rename = "Stock Error")]
    StockError,
    Delay,
    Price,
    Other,
}

// --- INTERAÇÃO (o registro persistido) ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub id: Uuid,
    pub client_name: String,
    pub description: String,
    pub status: InteractionStatus,
    pub reason: Option<LossReason>,
    pub monetary_value: Option<Decimal>,
    pub user_id: Uuid,
    pub store_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

// Produto vinculado, já com a descrição para exibição (catálogo ou texto livre).
// `description` fica vazio se o produto do catálogo foi removido depois.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedProduct {
    pub product_id: Option<Uuid>,
    pub is_custom: bool,
    pub description: Option<String>,
}

// O que a listagem devolve: interação + dados desnormalizados
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionView {
    #[serde(flatten)]
    pub interaction: Interaction,
    pub creator_name: String,
    pub creator_username: String,
    pub store_name: Option<String>,
    pub products: Vec<LinkedProduct>,
}

// --- ESCRITA ---

// Registro validado, pronto para o EntityStore
#[derive(Debug, Clone, PartialEq)]
pub struct NewInteraction {
    pub client_name: String,
    pub description: String,
    pub status: InteractionStatus,
    pub reason: Option<LossReason>,
    pub monetary_value: Option<Decimal>,
    pub user_id: Uuid,
    pub store_id: Option<Uuid>,
}

// Vínculo a gravar: ou produto do catálogo, ou descrição livre
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewInteractionLink {
    Catalog(Uuid),
    Custom(String),
}

impl NewInteractionLink {
    pub fn is_custom(&self) -> bool {
        matches!(self, NewInteractionLink::Custom(_))
    }
}

// Como o formulário referencia um produto
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ProductRef {
    #[serde(rename_all = "camelCase")]
    Catalog { product_id: Uuid },
    #[serde(rename_all = "camelCase")]
    Custom { custom_description: String },
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateInteractionPayload {
    #[validate(length(min = 1, message = "O nome do cliente é obrigatório."))]
    pub client_name: String,

    #[validate(length(min = 1, message = "A descrição é obrigatória."))]
    pub description: String,

    pub status: InteractionStatus,
    pub reason: Option<LossReason>,
    pub monetary_value: Option<Decimal>,

    #[serde(default)]
    pub products: Vec<ProductRef>,
}

// --- LEITURA ---

// Filtros opcionais (query string). Combinam com o escopo do cargo via AND.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionFilter {
    pub status: Option<InteractionStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub store_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub reason: Option<LossReason>,
}

// Estatísticas derivadas, sempre recalculadas a partir da listagem
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionStats {
    pub total_interactions: u64,
    pub closed_deals: u64,
    pub lost_deals: u64,
    pub closed_revenue: Decimal,
    pub quoted_pipeline: Decimal,
    pub closing_rate: Decimal,
    pub average_deal_value: Decimal,
}
