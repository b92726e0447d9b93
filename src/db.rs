// src/db.rs
//
// A fronteira com o armazenamento. O CRM emite consultas já com escopo,
// mas o EntityStore aplica a sua própria política de linha e é a palavra final.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    common::error::AppResult,
    models::{
        auth::{Actor, Credentials, NewAccount, Role},
        change::ChangeEvent,
        interaction::{Interaction, InteractionView, NewInteraction, NewInteractionLink},
        product::{NewProduct, Product},
        store::Store,
    },
    services::visibility::InteractionQuery,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgEntityStore;

/// Capacidade do canal de eventos; consumidores lentos recebem `Lagged`.
pub const CHANGE_FEED_CAPACITY: usize = 256;

/// Limite da busca no catálogo.
pub const PRODUCT_SEARCH_LIMIT: usize = 50;

#[async_trait]
pub trait EntityStore: Send + Sync {
    // =========================================================================
    //  IDENTIDADE E SESSÕES
    // =========================================================================

    /// Cria identidade + perfil (+ loja) atomicamente.
    /// Usuário ou e-mail duplicado -> ConflictError; loja inexistente -> NotFoundError.
    async fn create_account(&self, account: NewAccount) -> AppResult<Actor>;
    async fn find_credentials(&self, email: &str) -> AppResult<Option<Credentials>>;
    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> AppResult<()>;
    /// Remove perfil, sessões e identidade. Falha se ainda houver interações do usuário.
    async fn delete_identity(&self, user_id: Uuid) -> AppResult<()>;

    async fn create_session(&self, user_id: Uuid, expires_at: DateTime<Utc>) -> AppResult<Uuid>;
    async fn session_is_active(&self, session_id: Uuid, user_id: Uuid) -> AppResult<bool>;
    async fn revoke_session(&self, session_id: Uuid) -> AppResult<()>;

    // =========================================================================
    //  PERFIS E LOJAS
    // =========================================================================

    async fn find_actor(&self, user_id: Uuid) -> AppResult<Option<Actor>>;
    async fn find_actor_by_username(&self, username: &str) -> AppResult<Option<Actor>>;
    /// Ordenados por data de criação.
    async fn list_actors(&self) -> AppResult<Vec<Actor>>;
    async fn has_role(&self, role: Role) -> AppResult<bool>;
    /// Atualiza cargo e `updated_at` juntos.
    async fn update_role(&self, user_id: Uuid, role: Role) -> AppResult<Actor>;
    /// Substitui a loja do usuário (remove as antigas, insere a nova se houver).
    async fn assign_store(&self, user_id: Uuid, store_id: Option<Uuid>) -> AppResult<()>;

    async fn create_store(&self, name: &str, address: Option<&str>) -> AppResult<Store>;
    async fn find_store(&self, store_id: Uuid) -> AppResult<Option<Store>>;
    /// Ordenadas por nome.
    async fn list_stores(&self) -> AppResult<Vec<Store>>;

    // =========================================================================
    //  INTERAÇÕES
    // =========================================================================

    /// Interação e vínculos de produto na mesma transação.
    async fn create_interaction(
        &self,
        interaction: NewInteraction,
        links: Vec<NewInteractionLink>,
    ) -> AppResult<Interaction>;

    /// Lista com a política de linha do `viewer_id` aplicada pelo próprio store,
    /// mais recentes primeiro.
    async fn list_interactions(
        &self,
        viewer_id: Uuid,
        query: &InteractionQuery,
    ) -> AppResult<Vec<InteractionView>>;

    /// Fase 1 da exclusão: interações (com vínculos) e loja do usuário.
    /// Retorna quantas interações foram removidas.
    async fn delete_user_data(&self, acting_id: Uuid, user_id: Uuid) -> AppResult<u64>;

    // =========================================================================
    //  CATÁLOGO
    // =========================================================================

    /// Ordenados por descrição; `search` filtra código ou descrição.
    async fn list_products(&self, search: Option<&str>) -> AppResult<Vec<Product>>;
    /// Limpa o catálogo e insere o novo conjunto, tudo ou nada.
    async fn replace_products(&self, products: Vec<NewProduct>) -> AppResult<usize>;

    // =========================================================================
    //  FEED DE MUDANÇAS
    // =========================================================================

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
    fn backend_name(&self) -> &'static str;
}
