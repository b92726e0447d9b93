// src/config.rs

use std::{env, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::{
    db::{EntityStore, InMemoryStore, PgEntityStore},
    services::{
        admin::AdminService, auth::AuthService, interactions::InteractionService,
        products::ProductService,
    },
};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_SESSION_TTL_HOURS: i64 = 168;
const DEFAULT_ADMIN_USERNAME: &str = "admin";
const DEFAULT_ADMIN_EMAIL: &str = "admin@crm.com";

// Dados do ADMIN inicial (só existe se a senha estiver configurada)
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub session_ttl: chrono::Duration,
    pub bcrypt_cost: u32,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty());
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET deve ser definido")?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());

        let session_ttl = match env::var("SESSION_TTL_HOURS") {
            Ok(value) => parse_session_ttl(&value)
                .with_context(|| format!("SESSION_TTL_HOURS inválido: {value}"))?,
            Err(_) => chrono::Duration::hours(DEFAULT_SESSION_TTL_HOURS),
        };
        let bcrypt_cost = match env::var("BCRYPT_COST") {
            Ok(value) => value
                .parse()
                .with_context(|| format!("BCRYPT_COST inválido: {value}"))?,
            Err(_) => bcrypt::DEFAULT_COST,
        };

        let bootstrap_admin = env::var("DEFAULT_ADMIN_PASSWORD")
            .ok()
            .filter(|p| !p.is_empty())
            .map(|password| BootstrapAdmin {
                username: env::var("DEFAULT_ADMIN_USERNAME")
                    .unwrap_or_else(|_| DEFAULT_ADMIN_USERNAME.to_string()),
                email: env::var("DEFAULT_ADMIN_EMAIL")
                    .unwrap_or_else(|_| DEFAULT_ADMIN_EMAIL.to_string()),
                password,
            });

        Ok(Self {
            database_url,
            jwt_secret,
            bind_addr,
            session_ttl,
            bcrypt_cost,
            bootstrap_admin,
        })
    }
}

// Horas > 0, e a expiração de uma sessão aberta agora precisa ser uma data válida
fn parse_session_ttl(value: &str) -> anyhow::Result<chrono::Duration> {
    let hours: i64 = value.trim().parse().context("não é um número inteiro")?;
    if hours <= 0 {
        anyhow::bail!("deve ser maior que zero");
    }
    let ttl = chrono::Duration::try_hours(hours).context("valor grande demais")?;
    chrono::Utc::now()
        .checked_add_signed(ttl)
        .context("valor grande demais")?;
    Ok(ttl)
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EntityStore>,
    pub auth_service: AuthService,
    pub interaction_service: InteractionService,
    pub admin_service: AdminService,
    pub product_service: ProductService,
}

impl AppState {
    pub async fn new(settings: &Settings) -> anyhow::Result<Self> {
        let store: Arc<dyn EntityStore> = match &settings.database_url {
            Some(database_url) => {
                let db_pool = PgPoolOptions::new()
                    .max_connections(5)
                    .acquire_timeout(Duration::from_secs(3))
                    .connect(database_url)
                    .await?;

                tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

                sqlx::migrate!().run(&db_pool).await?;
                tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

                Arc::new(PgEntityStore::connect(db_pool).await?)
            }
            None => {
                tracing::warn!("⚠️ DATABASE_URL ausente: usando armazenamento em memória (nada é persistido)");
                Arc::new(InMemoryStore::new())
            }
        };

        Ok(Self::from_store(store, settings))
    }

    // --- Monta o gráfico de dependências ---
    pub fn from_store(store: Arc<dyn EntityStore>, settings: &Settings) -> Self {
        let auth_service = AuthService::new(
            store.clone(),
            settings.jwt_secret.clone(),
            settings.session_ttl,
            settings.bcrypt_cost,
        );
        let interaction_service = InteractionService::new(store.clone());
        let admin_service = AdminService::new(store.clone(), auth_service.clone());
        let product_service = ProductService::new(store.clone());

        Self {
            store,
            auth_service,
            interaction_service,
            admin_service,
            product_service,
        }
    }
}
