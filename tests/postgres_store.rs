#![cfg(feature = "pg-tests")]
// Rodar com: DATABASE_URL=postgres://... cargo test --features pg-tests --test postgres_store
//
// O #[sqlx::test] cria um banco por teste e aplica migrations/. As consultas do
// store rodam com um papel sem BYPASSRLS, para a RLS valer de verdade.

use rust_decimal::Decimal;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    Executor,
};
use uuid::Uuid;

use retail_crm::{
    common::error::AppError,
    db::{EntityStore, PgEntityStore},
    models::{
        auth::{Actor, NewAccount, Role},
        interaction::{InteractionFilter, InteractionStatus, NewInteraction, NewInteractionLink},
        product::NewProduct,
    },
    services::visibility::{InteractionQuery, InteractionScope},
};

const APP_ROLE: &str = "crm_app_test";

async fn store_without_rls_bypass(
    pool_opts: PgPoolOptions,
    connect_opts: PgConnectOptions,
) -> PgEntityStore {
    let owner = pool_opts
        .clone()
        .connect_with(connect_opts.clone())
        .await
        .unwrap();
    owner
        .execute(
            r#"
            DO $$ BEGIN
                CREATE ROLE crm_app_test NOLOGIN NOBYPASSRLS;
            EXCEPTION WHEN duplicate_object OR unique_violation THEN NULL;
            END $$
            "#,
        )
        .await
        .unwrap();
    owner
        .execute(
            "GRANT USAGE ON SCHEMA public TO crm_app_test; \
             GRANT SELECT, INSERT, UPDATE, DELETE ON ALL TABLES IN SCHEMA public TO crm_app_test;",
        )
        .await
        .unwrap();
    owner.close().await;

    let pool = pool_opts
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute(format!("SET ROLE {APP_ROLE}").as_str()).await?;
                Ok(())
            })
        })
        .connect_with(connect_opts)
        .await
        .unwrap();

    PgEntityStore::connect(pool).await.unwrap()
}

async fn account(store: &PgEntityStore, username: &str, role: Role, store_id: Option<Uuid>) -> Actor {
    store
        .create_account(NewAccount {
            username: username.to_string(),
            full_name: username.to_uppercase(),
            email: format!("{username}@crm.com"),
            password_hash: "hash-qualquer".to_string(),
            role,
            store_id,
        })
        .await
        .unwrap()
}

fn quote(owner: &Actor, client: &str) -> NewInteraction {
    NewInteraction {
        client_name: client.to_string(),
        description: "Orçamento".to_string(),
        status: InteractionStatus::Quoted,
        reason: None,
        monetary_value: Some(Decimal::from(100)),
        user_id: owner.id,
        store_id: owner.store_id,
    }
}

// Consulta sem filtro do lado da aplicação: só a RLS decide
fn unscoped() -> InteractionQuery {
    InteractionQuery {
        scope: InteractionScope::All,
        filter: InteractionFilter::default(),
    }
}

#[sqlx::test]
async fn row_policy_limits_what_each_role_reads(pool_opts: PgPoolOptions, connect_opts: PgConnectOptions) {
    let store = store_without_rls_bypass(pool_opts, connect_opts).await;
    let centro = store.create_store("Centro", None).await.unwrap();
    let norte = store.create_store("Norte", None).await.unwrap();

    let ana = account(&store, "ana", Role::Salesperson, Some(centro.id)).await;
    let bia = account(&store, "bia", Role::Salesperson, Some(norte.id)).await;
    let gerente_centro = account(&store, "gc", Role::Manager, Some(centro.id)).await;
    let gerente_sem_loja = account(&store, "gs", Role::Manager, None).await;
    let diretor = account(&store, "diretor", Role::Board, None).await;

    store.create_interaction(quote(&ana, "Acme"), Vec::new()).await.unwrap();
    store.create_interaction(quote(&bia, "Beta"), Vec::new()).await.unwrap();

    let seen = |viewer: Uuid| {
        let store = &store;
        async move { store.list_interactions(viewer, &unscoped()).await.unwrap() }
    };

    assert!(seen(gerente_sem_loja.id).await.is_empty());

    let centro_rows = seen(gerente_centro.id).await;
    assert_eq!(centro_rows.len(), 1);
    assert_eq!(centro_rows[0].interaction.client_name, "Acme");

    let own = seen(bia.id).await;
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].interaction.client_name, "Beta");

    assert_eq!(seen(diretor.id).await.len(), 2);
}

#[sqlx::test]
async fn only_admin_removes_interactions(pool_opts: PgPoolOptions, connect_opts: PgConnectOptions) {
    let store = store_without_rls_bypass(pool_opts, connect_opts).await;
    let admin = account(&store, "root", Role::Admin, None).await;
    let diretor = account(&store, "diretor", Role::Board, None).await;
    let ana = account(&store, "ana", Role::Salesperson, None).await;

    store.create_interaction(quote(&ana, "Acme"), Vec::new()).await.unwrap();

    // A política de DELETE filtra tudo para quem não é ADMIN
    assert_eq!(store.delete_user_data(diretor.id, ana.id).await.unwrap(), 0);
    assert!(matches!(
        store.delete_identity(ana.id).await,
        Err(AppError::DependencyError(_))
    ));
    assert!(store.find_actor(ana.id).await.unwrap().is_some());

    assert_eq!(store.delete_user_data(admin.id, ana.id).await.unwrap(), 1);
    store.delete_identity(ana.id).await.unwrap();
    assert!(store.find_actor(ana.id).await.unwrap().is_none());
}

#[sqlx::test]
async fn catalog_replace_keeps_sold_descriptions(pool_opts: PgPoolOptions, connect_opts: PgConnectOptions) {
    let store = store_without_rls_bypass(pool_opts, connect_opts).await;
    let admin = account(&store, "root", Role::Admin, None).await;

    store
        .replace_products(vec![NewProduct {
            product_code: "P-1".into(),
            description: "Gôndola".into(),
            cost_price: Decimal::from(100),
            sale_price: Decimal::from(150),
        }])
        .await
        .unwrap();
    let product_id = store.list_products(None).await.unwrap()[0].id;

    store
        .create_interaction(
            quote(&admin, "Acme"),
            vec![
                NewInteractionLink::Catalog(product_id),
                NewInteractionLink::Custom("Instalação".into()),
            ],
        )
        .await
        .unwrap();

    store.replace_products(Vec::new()).await.unwrap();

    let rows = store.list_interactions(admin.id, &unscoped()).await.unwrap();
    let links = &rows[0].products;
    assert_eq!(links.len(), 2);
    assert_eq!(links[0].product_id, None);
    assert_eq!(links[0].description.as_deref(), Some("Gôndola"));
    assert_eq!(links[1].description.as_deref(), Some("Instalação"));
}

#[sqlx::test]
async fn duplicate_username_is_a_conflict(pool_opts: PgPoolOptions, connect_opts: PgConnectOptions) {
    let store = store_without_rls_bypass(pool_opts, connect_opts).await;
    account(&store, "jdoe", Role::Salesperson, None).await;

    let again = store
        .create_account(NewAccount {
            username: "jdoe".into(),
            full_name: "Outro".into(),
            email: "outro@crm.com".into(),
            password_hash: "hash".into(),
            role: Role::Salesperson,
            store_id: None,
        })
        .await;
    assert!(matches!(again, Err(AppError::ConflictError(_))));
    assert_eq!(store.list_actors().await.unwrap().len(), 1);
}
