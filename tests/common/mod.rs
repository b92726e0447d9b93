// tests/common/mod.rs
#![allow(dead_code)]

use std::sync::Arc;

use axum::{body::Body, http::Request, response::Response, Router};
use serde_json::Value;
use uuid::Uuid;

use retail_crm::{
    app::build_router,
    config::{AppState, Settings},
    db::{EntityStore, InMemoryStore},
    models::{
        auth::{Actor, NewAccount, Role, Session},
        store::Store,
    },
};

pub const PASSWORD: &str = "senha-forte";

pub fn settings() -> Settings {
    Settings {
        database_url: None,
        jwt_secret: "segredo-de-teste".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        session_ttl: chrono::Duration::hours(1),
        // Custo mínimo do bcrypt: testes rápidos
        bcrypt_cost: 4,
        bootstrap_admin: None,
    }
}

pub struct TestApp {
    pub store: Arc<InMemoryStore>,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let state = AppState::from_store(store.clone(), &settings());
        Self { store, state }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub async fn shop(&self, name: &str) -> Store {
        self.store.create_store(name, None).await.expect("loja")
    }

    /// Conta criada direto no store (sem passar pela política).
    pub async fn account(&self, username: &str, role: Role, store_id: Option<Uuid>) -> Actor {
        let password_hash = self
            .state
            .auth_service
            .hash_password(PASSWORD)
            .await
            .expect("hash");
        self.store
            .create_account(NewAccount {
                username: username.to_string(),
                full_name: format!("{username} da Silva"),
                email: format!("{username}@crm.com"),
                password_hash,
                role,
                store_id,
            })
            .await
            .expect("conta")
    }

    pub async fn sign_in(&self, username: &str) -> (String, Session) {
        self.state
            .auth_service
            .sign_in(username, PASSWORD)
            .await
            .expect("login")
    }

    /// Cria a conta e já devolve a sessão aberta.
    pub async fn session(&self, username: &str, role: Role, store_id: Option<Uuid>) -> Session {
        self.account(username, role, store_id).await;
        self.sign_in(username).await.1
    }

    /// Sessão com o perfil atual (cargo/loja podem ter mudado).
    pub async fn refresh(&self, session: &Session) -> Session {
        let mut fresh = session.clone();
        fresh.actor = self
            .store
            .find_actor(session.actor.id)
            .await
            .expect("perfil")
            .expect("perfil existe");
        fresh
    }
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("request")
}

pub async fn read_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("json")
}
