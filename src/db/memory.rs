// src/db/memory.rs
//
// EntityStore em memória, para desenvolvimento (sem DATABASE_URL) e testes.
// Nada é durável: o estado some quando o processo termina.
//
// Todas as tabelas ficam atrás de um único RwLock, então conta + perfil + loja,
// interação + vínculos e a troca do catálogo são gravados de uma vez ou não são.
// A política de linha das interações é reimplementada aqui (row_visible),
// espelhando a RLS do Postgres.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::{EntityStore, CHANGE_FEED_CAPACITY, PRODUCT_SEARCH_LIMIT};
use crate::{
    common::error::{AppError, AppResult},
    models::{
        auth::{Actor, Credentials, NewAccount, Role},
        change::{ChangeEvent, ChangeOp, Collection},
        interaction::{
            Interaction, InteractionView, LinkedProduct, NewInteraction, NewInteractionLink,
        },
        product::{NewProduct, Product},
        store::Store,
    },
    services::visibility::InteractionQuery,
};

/// Operações que podem receber uma falha injetada.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    CreateAccount,
    WriteInteractionLinks,
    ListInteractions,
    DeleteUserData,
    DeleteIdentity,
    ReplaceProducts,
    AssignStore,
    UpdateRole,
}

#[derive(Debug, Clone)]
struct IdentityRow {
    email: String,
    password_hash: String,
}

#[derive(Debug, Clone)]
struct SessionRow {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
    revoked: bool,
}

#[derive(Debug, Clone)]
struct ProfileRow {
    id: Uuid,
    username: String,
    full_name: String,
    email: String,
    role: Role,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct InteractionRow {
    // Desempate estável para a ordenação por data
    seq: u64,
    interaction: Interaction,
}

#[derive(Debug, Clone)]
struct LinkRow {
    interaction_id: Uuid,
    position: usize,
    product_id: Option<Uuid>,
    is_custom: bool,
    custom_description: Option<String>,
    // Cópia da descrição do catálogo no momento da venda
    product_description: Option<String>,
}

#[derive(Debug, Default)]
struct Tables {
    identities: HashMap<Uuid, IdentityRow>,
    sessions: HashMap<Uuid, SessionRow>,
    profiles: HashMap<Uuid, ProfileRow>,
    user_stores: HashMap<Uuid, Uuid>,
    stores: HashMap<Uuid, Store>,
    products: Vec<Product>,
    interactions: Vec<InteractionRow>,
    links: Vec<LinkRow>,
    next_seq: u64,
}

impl Tables {
    fn actor(&self, user_id: Uuid) -> Option<Actor> {
        self.profiles.get(&user_id).map(|p| Actor {
            id: p.id,
            username: p.username.clone(),
            full_name: p.full_name.clone(),
            email: p.email.clone(),
            role: p.role,
            store_id: self.user_stores.get(&p.id).copied(),
            created_at: p.created_at,
            updated_at: p.updated_at,
        })
    }

    fn linked_products(&self, interaction_id: Uuid) -> Vec<LinkedProduct> {
        let mut links: Vec<&LinkRow> = self
            .links
            .iter()
            .filter(|l| l.interaction_id == interaction_id)
            .collect();
        links.sort_by_key(|l| l.position);

        links
            .into_iter()
            .map(|l| LinkedProduct {
                product_id: l.product_id,
                is_custom: l.is_custom,
                description: l
                    .custom_description
                    .clone()
                    .or_else(|| l.product_description.clone())
                    .or_else(|| {
                        l.product_id.and_then(|id| {
                            self.products
                                .iter()
                                .find(|p| p.id == id)
                                .map(|p| p.description.clone())
                        })
                    }),
            })
            .collect()
    }
}

/// A política de linha do store: mesma regra da RLS `crm_can_view_interaction`.
fn row_visible(tables: &Tables, viewer_id: Uuid, row: &Interaction) -> bool {
    let Some(viewer) = tables.profiles.get(&viewer_id) else {
        return false;
    };
    match viewer.role {
        Role::Admin | Role::Board => true,
        Role::Manager => match tables.user_stores.get(&viewer_id) {
            Some(store_id) => row.store_id == Some(*store_id),
            None => false,
        },
        Role::Salesperson => row.user_id == viewer_id,
    }
}

pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    changes: broadcast::Sender<ChangeEvent>,
    faults: Mutex<HashSet<StoreOp>>,
    delays: Mutex<HashMap<StoreOp, Duration>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            changes,
            faults: Mutex::new(HashSet::new()),
            delays: Mutex::new(HashMap::new()),
        }
    }

    pub fn fail_on(&self, op: StoreOp) {
        self.faults
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(op);
    }

    pub fn clear_faults(&self) {
        self.faults
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// Atraso depois da leitura: o resultado já está fixado quando a espera começa.
    pub fn delay_on(&self, op: StoreOp, delay: Duration) {
        self.delays
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(op, delay);
    }

    pub fn clear_delays(&self) {
        self.delays
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    async fn pause(&self, op: StoreOp) {
        let delay = self
            .delays
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&op)
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check(&self, op: StoreOp) -> AppResult<()> {
        let faults = self.faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if faults.contains(&op) {
            return Err(AppError::DependencyError(format!("falha injetada em {op:?}")));
        }
        Ok(())
    }

    fn emit(&self, collection: Collection, operation: ChangeOp) {
        // Sem assinantes o envio falha, e tudo bem.
        let _ = self.changes.send(ChangeEvent::new(collection, operation));
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn create_account(&self, account: NewAccount) -> AppResult<Actor> {
        self.check(StoreOp::CreateAccount)?;
        let mut tables = self.tables.write().await;

        if tables.profiles.values().any(|p| p.username == account.username) {
            return Err(AppError::ConflictError(format!(
                "usuário '{}' já existe",
                account.username
            )));
        }
        if tables.identities.values().any(|i| i.email == account.email) {
            return Err(AppError::ConflictError(format!(
                "e-mail '{}' já existe",
                account.email
            )));
        }
        if let Some(store_id) = account.store_id {
            if !tables.stores.contains_key(&store_id) {
                return Err(AppError::not_found(format!("loja {store_id}")));
            }
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        tables.identities.insert(
            id,
            IdentityRow {
                email: account.email.clone(),
                password_hash: account.password_hash,
            },
        );
        tables.profiles.insert(
            id,
            ProfileRow {
                id,
                username: account.username,
                full_name: account.full_name,
                email: account.email,
                role: account.role,
                created_at: now,
                updated_at: now,
            },
        );
        if let Some(store_id) = account.store_id {
            tables.user_stores.insert(id, store_id);
        }

        let actor = tables
            .actor(id)
            .ok_or_else(|| AppError::DependencyError("perfil recém-criado sumiu".into()))?;
        drop(tables);

        self.emit(Collection::Profiles, ChangeOp::Insert);
        if actor.store_id.is_some() {
            self.emit(Collection::UserStores, ChangeOp::Insert);
        }
        Ok(actor)
    }

    async fn find_credentials(&self, email: &str) -> AppResult<Option<Credentials>> {
        let tables = self.tables.read().await;
        Ok(tables
            .identities
            .iter()
            .find(|(_, identity)| identity.email == email)
            .map(|(id, identity)| Credentials {
                user_id: *id,
                email: identity.email.clone(),
                password_hash: identity.password_hash.clone(),
            }))
    }

    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        let identity = tables
            .identities
            .get_mut(&user_id)
            .ok_or_else(|| AppError::not_found(format!("identidade {user_id}")))?;
        identity.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn delete_identity(&self, user_id: Uuid) -> AppResult<()> {
        self.check(StoreOp::DeleteIdentity)?;
        let mut tables = self.tables.write().await;

        if !tables.identities.contains_key(&user_id) {
            return Err(AppError::not_found(format!("identidade {user_id}")));
        }
        // Mesma restrição da FK interactions.user_id -> profiles.id
        if tables.interactions.iter().any(|r| r.interaction.user_id == user_id) {
            return Err(AppError::DependencyError(format!(
                "usuário {user_id} ainda possui interações"
            )));
        }

        tables.identities.remove(&user_id);
        tables.profiles.remove(&user_id);
        tables.user_stores.remove(&user_id);
        tables.sessions.retain(|_, s| s.user_id != user_id);
        drop(tables);

        self.emit(Collection::Profiles, ChangeOp::Delete);
        Ok(())
    }

    async fn create_session(&self, user_id: Uuid, expires_at: DateTime<Utc>) -> AppResult<Uuid> {
        let mut tables = self.tables.write().await;
        if !tables.identities.contains_key(&user_id) {
            return Err(AppError::not_found(format!("identidade {user_id}")));
        }
        let session_id = Uuid::new_v4();
        tables.sessions.insert(
            session_id,
            SessionRow {
                user_id,
                expires_at,
                revoked: false,
            },
        );
        Ok(session_id)
    }

    async fn session_is_active(&self, session_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables.sessions.get(&session_id).is_some_and(|s| {
            s.user_id == user_id && !s.revoked && s.expires_at > Utc::now()
        }))
    }

    async fn revoke_session(&self, session_id: Uuid) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(session) = tables.sessions.get_mut(&session_id) {
            session.revoked = true;
        }
        Ok(())
    }

    async fn find_actor(&self, user_id: Uuid) -> AppResult<Option<Actor>> {
        Ok(self.tables.read().await.actor(user_id))
    }

    async fn find_actor_by_username(&self, username: &str) -> AppResult<Option<Actor>> {
        let tables = self.tables.read().await;
        let id = tables
            .profiles
            .values()
            .find(|p| p.username == username)
            .map(|p| p.id);
        Ok(id.and_then(|id| tables.actor(id)))
    }

    async fn list_actors(&self) -> AppResult<Vec<Actor>> {
        let tables = self.tables.read().await;
        let mut actors: Vec<Actor> = tables
            .profiles
            .keys()
            .filter_map(|id| tables.actor(*id))
            .collect();
        actors.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.username.cmp(&b.username)));
        Ok(actors)
    }

    async fn has_role(&self, role: Role) -> AppResult<bool> {
        Ok(self.tables.read().await.profiles.values().any(|p| p.role == role))
    }

    async fn update_role(&self, user_id: Uuid, role: Role) -> AppResult<Actor> {
        self.check(StoreOp::UpdateRole)?;
        let mut tables = self.tables.write().await;
        let profile = tables
            .profiles
            .get_mut(&user_id)
            .ok_or_else(|| AppError::not_found(format!("perfil {user_id}")))?;
        profile.role = role;
        profile.updated_at = Utc::now();

        let actor = tables
            .actor(user_id)
            .ok_or_else(|| AppError::not_found(format!("perfil {user_id}")))?;
        drop(tables);

        self.emit(Collection::Profiles, ChangeOp::Update);
        Ok(actor)
    }

    async fn assign_store(&self, user_id: Uuid, store_id: Option<Uuid>) -> AppResult<()> {
        self.check(StoreOp::AssignStore)?;
        let mut tables = self.tables.write().await;
        if !tables.profiles.contains_key(&user_id) {
            return Err(AppError::not_found(format!("perfil {user_id}")));
        }
        if let Some(store_id) = store_id {
            if !tables.stores.contains_key(&store_id) {
                return Err(AppError::not_found(format!("loja {store_id}")));
            }
        }

        let removed = tables.user_stores.remove(&user_id).is_some();
        if let Some(store_id) = store_id {
            tables.user_stores.insert(user_id, store_id);
        }
        drop(tables);

        if removed {
            self.emit(Collection::UserStores, ChangeOp::Delete);
        }
        if store_id.is_some() {
            self.emit(Collection::UserStores, ChangeOp::Insert);
        }
        Ok(())
    }

    async fn create_store(&self, name: &str, address: Option<&str>) -> AppResult<Store> {
        let store = Store {
            id: Uuid::new_v4(),
            name: name.to_string(),
            address: address.map(str::to_string),
            created_at: Utc::now(),
        };
        self.tables.write().await.stores.insert(store.id, store.clone());
        self.emit(Collection::Stores, ChangeOp::Insert);
        Ok(store)
    }

    async fn find_store(&self, store_id: Uuid) -> AppResult<Option<Store>> {
        Ok(self.tables.read().await.stores.get(&store_id).cloned())
    }

    async fn list_stores(&self) -> AppResult<Vec<Store>> {
        let mut stores: Vec<Store> = self.tables.read().await.stores.values().cloned().collect();
        stores.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(stores)
    }

    async fn create_interaction(
        &self,
        interaction: NewInteraction,
        links: Vec<NewInteractionLink>,
    ) -> AppResult<Interaction> {
        let mut tables = self.tables.write().await;

        // Chaves estrangeiras
        if !tables.profiles.contains_key(&interaction.user_id) {
            return Err(AppError::not_found(format!("perfil {}", interaction.user_id)));
        }
        if let Some(store_id) = interaction.store_id {
            if !tables.stores.contains_key(&store_id) {
                return Err(AppError::not_found(format!("loja {store_id}")));
            }
        }

        let row = Interaction {
            id: Uuid::new_v4(),
            client_name: interaction.client_name,
            description: interaction.description,
            status: interaction.status,
            reason: interaction.reason,
            monetary_value: interaction.monetary_value,
            user_id: interaction.user_id,
            store_id: interaction.store_id,
            created_at: Utc::now(),
        };

        // Vínculos montados antes de gravar qualquer coisa: se algo falhar aqui,
        // a interação também não entra.
        let mut link_rows = Vec::with_capacity(links.len());
        for (position, link) in links.into_iter().enumerate() {
            let link_row = match link {
                NewInteractionLink::Catalog(product_id) => {
                    let Some(product) = tables.products.iter().find(|p| p.id == product_id) else {
                        return Err(AppError::not_found(format!("produto {product_id}")));
                    };
                    LinkRow {
                        interaction_id: row.id,
                        position,
                        product_id: Some(product_id),
                        is_custom: false,
                        custom_description: None,
                        product_description: Some(product.description.clone()),
                    }
                }
                NewInteractionLink::Custom(text) => LinkRow {
                    interaction_id: row.id,
                    position,
                    product_id: None,
                    is_custom: true,
                    custom_description: Some(text),
                    product_description: None,
                },
            };
            link_rows.push(link_row);
        }
        if !link_rows.is_empty() {
            self.check(StoreOp::WriteInteractionLinks)?;
        }

        let seq = tables.next_seq;
        tables.next_seq += 1;
        tables.interactions.push(InteractionRow {
            seq,
            interaction: row.clone(),
        });
        let wrote_links = !link_rows.is_empty();
        tables.links.extend(link_rows);
        drop(tables);

        self.emit(Collection::Interactions, ChangeOp::Insert);
        if wrote_links {
            self.emit(Collection::InteractionProducts, ChangeOp::Insert);
        }
        Ok(row)
    }

    async fn list_interactions(
        &self,
        viewer_id: Uuid,
        query: &InteractionQuery,
    ) -> AppResult<Vec<InteractionView>> {
        self.check(StoreOp::ListInteractions)?;
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let tables = self.tables.read().await;
        let mut rows: Vec<&InteractionRow> = tables
            .interactions
            .iter()
            .filter(|r| row_visible(&tables, viewer_id, &r.interaction))
            .filter(|r| query.matches(&r.interaction))
            .collect();
        rows.sort_by(|a, b| {
            b.interaction
                .created_at
                .cmp(&a.interaction.created_at)
                .then_with(|| b.seq.cmp(&a.seq))
        });

        let views: Vec<InteractionView> = rows
            .into_iter()
            .map(|r| {
                let creator = tables.profiles.get(&r.interaction.user_id);
                InteractionView {
                    interaction: r.interaction.clone(),
                    creator_name: creator.map(|p| p.full_name.clone()).unwrap_or_default(),
                    creator_username: creator.map(|p| p.username.clone()).unwrap_or_default(),
                    store_name: r
                        .interaction
                        .store_id
                        .and_then(|id| tables.stores.get(&id))
                        .map(|s| s.name.clone()),
                    products: tables.linked_products(r.interaction.id),
                }
            })
            .collect();
        drop(tables);

        self.pause(StoreOp::ListInteractions).await;
        Ok(views)
    }

    async fn delete_user_data(&self, acting_id: Uuid, user_id: Uuid) -> AppResult<u64> {
        self.check(StoreOp::DeleteUserData)?;
        let mut tables = self.tables.write().await;

        // Política de DELETE: só ADMIN remove interações
        let acting_is_admin = tables
            .profiles
            .get(&acting_id)
            .is_some_and(|p| p.role == Role::Admin);

        let mut removed_ids = HashSet::new();
        if acting_is_admin {
            tables.interactions.retain(|r| {
                if r.interaction.user_id == user_id {
                    removed_ids.insert(r.interaction.id);
                    false
                } else {
                    true
                }
            });
            tables.links.retain(|l| !removed_ids.contains(&l.interaction_id));
        }
        let removed_store = tables.user_stores.remove(&user_id).is_some();
        drop(tables);

        if !removed_ids.is_empty() {
            self.emit(Collection::Interactions, ChangeOp::Delete);
            self.emit(Collection::InteractionProducts, ChangeOp::Delete);
        }
        if removed_store {
            self.emit(Collection::UserStores, ChangeOp::Delete);
        }
        Ok(removed_ids.len() as u64)
    }

    async fn list_products(&self, search: Option<&str>) -> AppResult<Vec<Product>> {
        let tables = self.tables.read().await;
        let needle = search
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let mut products: Vec<Product> = tables
            .products
            .iter()
            .filter(|p| match &needle {
                Some(needle) => {
                    p.product_code.to_lowercase().contains(needle)
                        || p.description.to_lowercase().contains(needle)
                }
                None => true,
            })
            .cloned()
            .collect();
        products.sort_by(|a, b| a.description.cmp(&b.description));
        if needle.is_some() {
            products.truncate(PRODUCT_SEARCH_LIMIT);
        }
        Ok(products)
    }

    async fn replace_products(&self, products: Vec<NewProduct>) -> AppResult<usize> {
        self.check(StoreOp::ReplaceProducts)?;
        let now = Utc::now();
        let new_catalog: Vec<Product> = products
            .into_iter()
            .map(|p| Product {
                id: Uuid::new_v4(),
                product_code: p.product_code,
                description: p.description,
                cost_price: p.cost_price,
                sale_price: p.sale_price,
                created_at: now,
                updated_at: now,
            })
            .collect();
        let count = new_catalog.len();

        let mut tables = self.tables.write().await;
        // ON DELETE SET NULL dos vínculos
        let mut orphaned = false;
        for link in tables.links.iter_mut().filter(|l| l.product_id.is_some()) {
            link.product_id = None;
            orphaned = true;
        }
        tables.products = new_catalog;
        drop(tables);

        self.emit(Collection::Products, ChangeOp::Delete);
        self.emit(Collection::Products, ChangeOp::Insert);
        if orphaned {
            self.emit(Collection::InteractionProducts, ChangeOp::Update);
        }
        Ok(count)
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
