// src/services/admin.rs

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    common::error::{AppError, AppResult},
    db::EntityStore,
    models::{
        auth::{Actor, NewAccount, Role, Session},
        store::{CreateStorePayload, CreateUserPayload, DeletedUser, Store, UserSummary},
    },
    services::{auth::AuthService, policy},
};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn EntityStore>,
    auth_service: AuthService,
}

impl AdminService {
    pub fn new(store: Arc<dyn EntityStore>, auth_service: AuthService) -> Self {
        Self {
            store,
            auth_service,
        }
    }

    async fn target(&self, user_id: Uuid) -> AppResult<Actor> {
        self.store
            .find_actor(user_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("usuário {user_id}")))
    }

    async fn ensure_store_exists(&self, store_id: Uuid) -> AppResult<()> {
        match self.store.find_store(store_id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::not_found(format!("loja {store_id}"))),
        }
    }

    // =========================================================================
    //  LOJAS
    // =========================================================================

    pub async fn create_store(&self, session: &Session, payload: CreateStorePayload) -> AppResult<Store> {
        let actor = &session.actor;
        if !policy::can_manage_users(actor.role) {
            return Err(AppError::permission("criar lojas exige BOARD ou ADMIN"));
        }

        let name = payload.name.trim();
        if name.is_empty() {
            return Err(AppError::validation("o nome da loja é obrigatório"));
        }
        let address = payload
            .address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty());

        let store = self.store.create_store(name, address).await?;
        tracing::info!("🏬 Loja '{}' criada por '{}'", store.name, actor.username);
        Ok(store)
    }

    pub async fn list_stores(&self, _session: &Session) -> AppResult<Vec<Store>> {
        self.store.list_stores().await
    }

    // =========================================================================
    //  USUÁRIOS
    // =========================================================================

    pub async fn list_users(&self, session: &Session) -> AppResult<Vec<UserSummary>> {
        if !policy::can_manage_users(session.actor.role) {
            return Err(AppError::permission("listar usuários exige BOARD ou ADMIN"));
        }

        let store_names: HashMap<Uuid, String> = self
            .store
            .list_stores()
            .await?
            .into_iter()
            .map(|s| (s.id, s.name))
            .collect();

        let users = self
            .store
            .list_actors()
            .await?
            .into_iter()
            .map(|actor| UserSummary {
                store_name: actor.store_id.and_then(|id| store_names.get(&id).cloned()),
                actor,
            })
            .collect();
        Ok(users)
    }

    /// BOARD só cria SALESPERSON ou MANAGER; qualquer outro cargo pedido vira SALESPERSON.
    pub async fn create_user(&self, session: &Session, payload: CreateUserPayload) -> AppResult<Actor> {
        let actor = &session.actor;
        if !policy::can_manage_users(actor.role) {
            return Err(AppError::permission("criar usuários exige BOARD ou ADMIN"));
        }

        // 1. Campos obrigatórios
        let username = payload.username.trim();
        let full_name = payload.full_name.trim();
        let email = payload.email.trim().to_lowercase();
        if username.is_empty() || full_name.is_empty() || email.is_empty() {
            return Err(AppError::validation("usuário, nome completo e e-mail são obrigatórios"));
        }
        if payload.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::validation("a senha deve ter no mínimo 6 caracteres"));
        }

        // 2. Teto de cargo
        let role = if policy::creatable_roles(actor.role).contains(&payload.role) {
            payload.role
        } else {
            tracing::warn!(
                "'{}' ({}) pediu o cargo {} na criação; usando SALESPERSON",
                actor.username,
                actor.role,
                payload.role
            );
            Role::Salesperson
        };

        // 3. Referências e unicidade (o store também garante)
        if let Some(store_id) = payload.store_id {
            self.ensure_store_exists(store_id).await?;
        }
        if self.store.find_actor_by_username(username).await?.is_some() {
            return Err(AppError::ConflictError(format!("usuário '{username}' já existe")));
        }

        // 4. Identidade + perfil + loja, tudo junto
        let password_hash = self.auth_service.hash_password(&payload.password).await?;
        let created = self
            .store
            .create_account(NewAccount {
                username: username.to_string(),
                full_name: full_name.to_string(),
                email,
                password_hash,
                role,
                store_id: payload.store_id,
            })
            .await?;

        tracing::info!(
            "👤 Usuário '{}' ({}) criado por '{}'",
            created.username,
            created.role,
            actor.username
        );
        Ok(created)
    }

    pub async fn update_role(&self, session: &Session, target_id: Uuid, new_role: Role) -> AppResult<Actor> {
        let actor = &session.actor;
        if target_id == actor.id {
            return Err(AppError::permission("ninguém altera o próprio cargo"));
        }

        let target = self.target(target_id).await?;
        if !policy::can_update_role(actor.role, target.role, new_role) {
            tracing::warn!(
                "'{}' ({}) tentou {} -> {} em '{}'",
                actor.username,
                actor.role,
                target.role,
                new_role,
                target.username
            );
            return Err(AppError::permission(format!(
                "{} não pode mudar {} para {}",
                actor.role, target.role, new_role
            )));
        }

        let updated = self.store.update_role(target_id, new_role).await?;
        tracing::info!("Cargo de '{}' agora é {}", updated.username, updated.role);
        Ok(updated)
    }

    /// Cargos que o ator pode escolher para o alvo (vazio para si mesmo).
    pub async fn role_options(&self, session: &Session, target_id: Uuid) -> AppResult<Vec<Role>> {
        let actor = &session.actor;
        if !policy::can_manage_users(actor.role) {
            return Err(AppError::permission("gestão de usuários exige BOARD ou ADMIN"));
        }
        if target_id == actor.id {
            return Ok(Vec::new());
        }

        let target = self.target(target_id).await?;
        Ok(policy::assignable_roles(actor.role, target.role))
    }

    /// Substitui a loja do usuário; `None` deixa o usuário sem loja.
    pub async fn assign_store(
        &self,
        session: &Session,
        target_id: Uuid,
        store_id: Option<Uuid>,
    ) -> AppResult<Actor> {
        let actor = &session.actor;
        if !policy::can_manage_users(actor.role) {
            return Err(AppError::permission("atribuir lojas exige BOARD ou ADMIN"));
        }

        let target = self.target(target_id).await?;
        if let Some(store_id) = store_id {
            self.ensure_store_exists(store_id).await?;
        }

        self.store.assign_store(target.id, store_id).await?;
        tracing::info!("Loja de '{}' agora é {:?}", target.username, store_id);

        self.target(target_id).await
    }

    // =========================================================================
    //  OPERAÇÕES PRIVILEGIADAS
    // =========================================================================

    pub async fn force_set_password(
        &self,
        session: &Session,
        target_id: Uuid,
        new_password: &str,
    ) -> AppResult<()> {
        let actor = &session.actor;
        let target = self.target(target_id).await?;

        if !policy::can_change_password(actor.role, target.role) {
            return Err(AppError::permission(format!(
                "{} não pode trocar a senha de {}",
                actor.role, target.role
            )));
        }
        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::validation("a senha deve ter no mínimo 6 caracteres"));
        }

        let password_hash = self.auth_service.hash_password(new_password).await?;
        self.store.set_password_hash(target.id, &password_hash).await?;

        tracing::info!("🔒 Senha de '{}' redefinida por '{}'", target.username, actor.username);
        Ok(())
    }

    /// Exclusão em duas fases: (1) interações, vínculos e loja; (2) perfil,
    /// sessões e identidade. Falha na fase 2 vira `IncompleteDeletion`, e
    /// repetir a chamada termina o serviço.
    pub async fn delete_user(&self, session: &Session, target_id: Uuid) -> AppResult<DeletedUser> {
        let actor = &session.actor;
        if !policy::can_delete_users(actor.role) {
            return Err(AppError::permission("excluir usuários exige ADMIN"));
        }
        if target_id == actor.id {
            return Err(AppError::permission("um ADMIN não exclui a própria conta"));
        }

        let target = self.target(target_id).await?;

        // Fase 1
        let removed_interactions = self.store.delete_user_data(actor.id, target.id).await?;

        // Fase 2
        if let Err(e) = self.store.delete_identity(target.id).await {
            tracing::error!(
                "Exclusão de '{}' parou na fase 2 ({} interações já removidas): {}",
                target.username,
                removed_interactions,
                e
            );
            return Err(AppError::IncompleteDeletion {
                user_id: target.id,
                cause: e.to_string(),
            });
        }

        tracing::info!(
            "🗑️ Usuário '{}' excluído por '{}' ({} interações removidas)",
            target.username,
            actor.username,
            removed_interactions
        );
        Ok(DeletedUser {
            user_id: target.id,
            removed_interactions,
        })
    }
}
