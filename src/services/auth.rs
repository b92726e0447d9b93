// src/services/auth.rs

use std::sync::Arc;

use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

use crate::{
    common::error::{AppError, AppResult},
    config::BootstrapAdmin,
    db::EntityStore,
    models::auth::{Actor, Claims, NewAccount, Role, Session},
};

pub const BOOTSTRAP_ADMIN_NAME: &str = "System Administrator";

// Identidade + sessões: login por usuário, JWT amarrado a uma sessão persistida
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn EntityStore>,
    jwt_secret: String,
    session_ttl: Duration,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn EntityStore>,
        jwt_secret: String,
        session_ttl: Duration,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            store,
            jwt_secret,
            session_ttl,
            bcrypt_cost,
        }
    }

    pub async fn hash_password(&self, password: &str) -> AppResult<String> {
        let password_clone = password.to_owned();
        let cost = self.bcrypt_cost;

        // Hashing é CPU pesado: roda fora do runtime
        let hashed = tokio::task::spawn_blocking(move || hash(&password_clone, cost))
            .await
            .map_err(|e| anyhow::anyhow!("Falha na task de hashing: {}", e))??;

        Ok(hashed)
    }

    /// Login por nome de usuário. Usuário inexistente e senha errada dão o mesmo erro.
    pub async fn sign_in(&self, username: &str, password: &str) -> AppResult<(String, Session)> {
        // 1. Usuário -> perfil -> e-mail da identidade
        let actor = self
            .store
            .find_actor_by_username(username.trim())
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        let credentials = self
            .store
            .find_credentials(&actor.email)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        // 2. Verifica a senha em um thread separado
        let password_clone = password.to_owned();
        let hash_clone = credentials.password_hash.clone();
        let is_password_valid = tokio::task::spawn_blocking(move || verify(&password_clone, &hash_clone))
            .await
            .map_err(|e| anyhow::anyhow!("Falha na task de verificação de senha: {}", e))??;

        if !is_password_valid || credentials.user_id != actor.id {
            tracing::warn!("Login recusado para '{}'", actor.username);
            return Err(AppError::InvalidCredentials);
        }

        // 3. Sessão persistida + token
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.session_ttl)
            .ok_or_else(|| anyhow::anyhow!("Validade de sessão fora do intervalo: {}", self.session_ttl))?;
        let session_id = self.store.create_session(actor.id, expires_at).await?;

        let claims = Claims {
            sub: actor.id,
            sid: session_id,
            exp: expires_at.timestamp() as usize,
            iat: now.timestamp() as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_ref()),
        )?;

        tracing::info!("🔑 Sessão {} aberta para '{}'", session_id, actor.username);
        Ok((token, Session { session_id, actor }))
    }

    /// Token -> sessão ativa -> perfil atual (cargo e loja sempre frescos do store).
    pub async fn validate_token(&self, token: &str) -> AppResult<Session> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_ref()),
            &Validation::default(),
        )
        .map_err(|_| AppError::InvalidToken)?;
        let claims = token_data.claims;

        if !self.store.session_is_active(claims.sid, claims.sub).await? {
            return Err(AppError::InvalidToken);
        }

        let actor = self
            .store
            .find_actor(claims.sub)
            .await?
            .ok_or(AppError::InvalidToken)?;

        Ok(Session {
            session_id: claims.sid,
            actor,
        })
    }

    pub async fn sign_out(&self, session: &Session) -> AppResult<()> {
        self.store.revoke_session(session.session_id).await?;
        tracing::info!("Sessão {} encerrada ('{}')", session.session_id, session.actor.username);
        Ok(())
    }

    pub async fn session_is_active(&self, session: &Session) -> AppResult<bool> {
        self.store
            .session_is_active(session.session_id, session.actor.id)
            .await
    }

    /// Cria o ADMIN inicial se ainda não existir nenhum.
    pub async fn bootstrap_admin(&self, admin: &BootstrapAdmin) -> AppResult<Option<Actor>> {
        if self.store.has_role(Role::Admin).await? {
            return Ok(None);
        }

        let password_hash = self.hash_password(&admin.password).await?;
        let actor = self
            .store
            .create_account(NewAccount {
                username: admin.username.clone(),
                full_name: BOOTSTRAP_ADMIN_NAME.to_string(),
                email: admin.email.clone(),
                password_hash,
                role: Role::Admin,
                store_id: None,
            })
            .await?;

        tracing::info!("✅ Administrador padrão '{}' criado", actor.username);
        Ok(Some(actor))
    }
}
