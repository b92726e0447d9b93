// src/db/postgres.rs
//
// EntityStore sobre Postgres. As interações são protegidas por RLS: toda
// transação que toca `interactions` começa com a "chave" app.user_id definida
// (ver `begin_as`), e o banco decide quais linhas existem para aquele usuário.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgListener, FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use tokio::{sync::broadcast, task::JoinHandle};
use uuid::Uuid;

use super::{EntityStore, CHANGE_FEED_CAPACITY, PRODUCT_SEARCH_LIMIT};
use crate::{
    common::error::{AppError, AppResult},
    models::{
        auth::{Actor, Credentials, NewAccount, Role},
        change::ChangeEvent,
        interaction::{
            Interaction, InteractionView, LinkedProduct, NewInteraction, NewInteractionLink,
        },
        product::{NewProduct, Product},
        store::Store,
    },
    services::visibility::{InteractionQuery, InteractionScope},
};

/// Canal do `pg_notify` publicado pelos triggers.
pub const CHANGE_CHANNEL: &str = "crm_changes";

// 4 binds por produto; fica bem abaixo do limite de 65535 parâmetros
const PRODUCT_INSERT_CHUNK: usize = 1000;

const ACTOR_SELECT: &str = r#"
    SELECT
        p.id, p.username, p.full_name, p.email, p.role,
        us.store_id,
        p.created_at, p.updated_at
    FROM profiles p
    LEFT JOIN user_stores us ON us.user_id = p.id
"#;

// Linha da listagem: interação + dados do criador e da loja
#[derive(Debug, FromRow)]
struct InteractionListRow {
    #[sqlx(flatten)]
    interaction: Interaction,
    creator_name: String,
    creator_username: String,
    store_name: Option<String>,
}

#[derive(Debug, FromRow)]
struct LinkListRow {
    interaction_id: Uuid,
    product_id: Option<Uuid>,
    is_custom: bool,
    description: Option<String>,
}

pub struct PgEntityStore {
    pool: PgPool,
    changes: broadcast::Sender<ChangeEvent>,
    listener_task: JoinHandle<()>,
}

impl PgEntityStore {
    /// Conecta o LISTEN do feed de mudanças e devolve o store pronto.
    pub async fn connect(pool: PgPool) -> AppResult<Self> {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);

        let mut listener = PgListener::connect_with(&pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;

        let sender = changes.clone();
        let listener_task = tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => {
                        match serde_json::from_str::<ChangeEvent>(notification.payload()) {
                            Ok(event) => {
                                let _ = sender.send(event);
                            }
                            Err(e) => {
                                tracing::warn!("Notificação ignorada ({}): {}", e, notification.payload());
                            }
                        }
                    }
                    Err(e) => {
                        // O PgListener reconecta sozinho na próxima chamada
                        tracing::warn!("Feed de mudanças perdeu a conexão: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Ok(Self {
            pool,
            changes,
            listener_task,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ---
    // A "chave" da RLS, válida só dentro desta transação
    // ---
    async fn begin_as(&self, user_id: Uuid) -> AppResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT set_config('app.user_id', $1, true)")
            .bind(user_id.to_string())
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}

impl Drop for PgEntityStore {
    fn drop(&mut self) {
        self.listener_task.abort();
    }
}

// Traduz erros de escrita para a taxonomia do CRM
fn write_error(e: sqlx::Error, what: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            let target = match db_err.constraint() {
                Some("profiles_username_key") => "usuário",
                Some("identities_email_key") => "e-mail",
                _ => what,
            };
            return AppError::ConflictError(format!("{target} já existe"));
        }
        if db_err.is_foreign_key_violation() {
            return AppError::not_found(format!("{what} referencia um registro inexistente"));
        }
        if db_err.is_check_violation() {
            return AppError::validation(format!(
                "{what} viola a restrição {}",
                db_err.constraint().unwrap_or("desconhecida")
            ));
        }
    }
    e.into()
}

// Escapa os curingas do ILIKE
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl EntityStore for PgEntityStore {
    // =========================================================================
    //  IDENTIDADE E SESSÕES
    // =========================================================================

    async fn create_account(&self, account: NewAccount) -> AppResult<Actor> {
        let mut tx = self.pool.begin().await?;

        // 1. Identidade
        let user_id: Uuid = sqlx::query_scalar(
            "INSERT INTO identities (email, password_hash) VALUES ($1, $2) RETURNING id",
        )
        .bind(&account.email)
        .bind(&account.password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| write_error(e, "identidade"))?;

        // 2. Perfil
        sqlx::query(
            r#"
            INSERT INTO profiles (id, username, full_name, email, role)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user_id)
        .bind(&account.username)
        .bind(&account.full_name)
        .bind(&account.email)
        .bind(account.role)
        .execute(&mut *tx)
        .await
        .map_err(|e| write_error(e, "perfil"))?;

        // 3. Loja (opcional)
        if let Some(store_id) = account.store_id {
            sqlx::query("INSERT INTO user_stores (user_id, store_id) VALUES ($1, $2)")
                .bind(user_id)
                .bind(store_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| write_error(e, "loja"))?;
        }

        tx.commit().await?;

        self.find_actor(user_id)
            .await?
            .ok_or_else(|| AppError::DependencyError("perfil recém-criado não encontrado".into()))
    }

    async fn find_credentials(&self, email: &str) -> AppResult<Option<Credentials>> {
        let credentials = sqlx::query_as::<_, Credentials>(
            "SELECT id AS user_id, email, password_hash FROM identities WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(credentials)
    }

    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE identities SET password_hash = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("identidade {user_id}")));
        }
        Ok(())
    }

    async fn delete_identity(&self, user_id: Uuid) -> AppResult<()> {
        // Perfil, sessões e loja caem junto (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM identities WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                    AppError::DependencyError(format!("usuário {user_id} ainda possui interações"))
                }
                _ => AppError::from(e),
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("identidade {user_id}")));
        }
        Ok(())
    }

    async fn create_session(&self, user_id: Uuid, expires_at: DateTime<Utc>) -> AppResult<Uuid> {
        let session_id: Uuid = sqlx::query_scalar(
            "INSERT INTO sessions (user_id, expires_at) VALUES ($1, $2) RETURNING id",
        )
        .bind(user_id)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, "sessão"))?;
        Ok(session_id)
    }

    async fn session_is_active(&self, session_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let active: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM sessions
                WHERE id = $1 AND user_id = $2
                  AND revoked_at IS NULL
                  AND expires_at > NOW()
            )
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(active)
    }

    async fn revoke_session(&self, session_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE sessions SET revoked_at = NOW() WHERE id = $1 AND revoked_at IS NULL")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // =========================================================================
    //  PERFIS E LOJAS
    // =========================================================================

    async fn find_actor(&self, user_id: Uuid) -> AppResult<Option<Actor>> {
        let sql = format!("{ACTOR_SELECT} WHERE p.id = $1");
        let actor = sqlx::query_as::<_, Actor>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(actor)
    }

    async fn find_actor_by_username(&self, username: &str) -> AppResult<Option<Actor>> {
        let sql = format!("{ACTOR_SELECT} WHERE p.username = $1");
        let actor = sqlx::query_as::<_, Actor>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(actor)
    }

    async fn list_actors(&self) -> AppResult<Vec<Actor>> {
        let sql = format!("{ACTOR_SELECT} ORDER BY p.created_at ASC, p.username ASC");
        let actors = sqlx::query_as::<_, Actor>(&sql).fetch_all(&self.pool).await?;
        Ok(actors)
    }

    async fn has_role(&self, role: Role) -> AppResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM profiles WHERE role = $1)")
                .bind(role)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn update_role(&self, user_id: Uuid, role: Role) -> AppResult<Actor> {
        let result =
            sqlx::query("UPDATE profiles SET role = $2, updated_at = NOW() WHERE id = $1")
                .bind(user_id)
                .bind(role)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("perfil {user_id}")));
        }
        self.find_actor(user_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("perfil {user_id}")))
    }

    async fn assign_store(&self, user_id: Uuid, store_id: Option<Uuid>) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM profiles WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(AppError::not_found(format!("perfil {user_id}")));
        }

        sqlx::query("DELETE FROM user_stores WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if let Some(store_id) = store_id {
            sqlx::query("INSERT INTO user_stores (user_id, store_id) VALUES ($1, $2)")
                .bind(user_id)
                .bind(store_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| write_error(e, "loja"))?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn create_store(&self, name: &str, address: Option<&str>) -> AppResult<Store> {
        let store = sqlx::query_as::<_, Store>(
            r#"
            INSERT INTO stores (name, address)
            VALUES ($1, $2)
            RETURNING id, name, address, created_at
            "#,
        )
        .bind(name)
        .bind(address)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, "loja"))?;
        Ok(store)
    }

    async fn find_store(&self, store_id: Uuid) -> AppResult<Option<Store>> {
        let store = sqlx::query_as::<_, Store>(
            "SELECT id, name, address, created_at FROM stores WHERE id = $1",
        )
        .bind(store_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(store)
    }

    async fn list_stores(&self) -> AppResult<Vec<Store>> {
        let stores = sqlx::query_as::<_, Store>(
            "SELECT id, name, address, created_at FROM stores ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(stores)
    }

    // =========================================================================
    //  INTERAÇÕES
    // =========================================================================

    async fn create_interaction(
        &self,
        interaction: NewInteraction,
        links: Vec<NewInteractionLink>,
    ) -> AppResult<Interaction> {
        // Sem RETURNING: a RLS de SELECT também se aplicaria ao retorno.
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

        let mut tx = self.begin_as(row.user_id).await?;

        // 1. A interação
        sqlx::query(
            r#"
            INSERT INTO interactions (
                id, client_name, description, status, reason,
                monetary_value, user_id, store_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(row.id)
        .bind(&row.client_name)
        .bind(&row.description)
        .bind(row.status)
        .bind(row.reason)
        .bind(row.monetary_value)
        .bind(row.user_id)
        .bind(row.store_id)
        .bind(row.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| write_error(e, "interação"))?;

        // 2. Os vínculos, na ordem do formulário
        if !links.is_empty() {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO interaction_products (interaction_id, position, product_id, is_custom, custom_description) ",
            );
            builder.push_values(links.into_iter().enumerate(), |mut b, (position, link)| {
                b.push_bind(row.id).push_bind(position as i32);
                match link {
                    NewInteractionLink::Catalog(product_id) => {
                        b.push_bind(Some(product_id))
                            .push_bind(false)
                            .push_bind(None::<String>);
                    }
                    NewInteractionLink::Custom(text) => {
                        b.push_bind(None::<Uuid>).push_bind(true).push_bind(Some(text));
                    }
                }
            });
            builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| write_error(e, "produto"))?;
        }

        // 3. Tudo ou nada
        tx.commit().await?;
        Ok(row)
    }

    async fn list_interactions(
        &self,
        viewer_id: Uuid,
        query: &InteractionQuery,
    ) -> AppResult<Vec<InteractionView>> {
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            SELECT
                i.id, i.client_name, i.description, i.status, i.reason,
                i.monetary_value, i.user_id, i.store_id, i.created_at,
                p.full_name AS creator_name,
                p.username AS creator_username,
                s.name AS store_name
            FROM interactions i
            JOIN profiles p ON p.id = i.user_id
            LEFT JOIN stores s ON s.id = i.store_id
            WHERE TRUE
            "#,
        );

        // Escopo do cargo (a RLS repete isso do lado do banco)
        match query.scope {
            InteractionScope::OwnedBy(user_id) => {
                builder.push(" AND i.user_id = ").push_bind(user_id);
            }
            InteractionScope::Store(store_id) => {
                builder.push(" AND i.store_id = ").push_bind(store_id);
            }
            InteractionScope::All | InteractionScope::Nothing => {}
        }

        let f = &query.filter;
        if let Some(status) = f.status {
            builder.push(" AND i.status = ").push_bind(status);
        }
        if let Some(store_id) = f.store_id {
            builder.push(" AND i.store_id = ").push_bind(store_id);
        }
        if let Some(user_id) = f.user_id {
            builder.push(" AND i.user_id = ").push_bind(user_id);
        }
        if let Some(reason) = f.reason {
            builder.push(" AND i.reason = ").push_bind(reason);
        }
        if let Some(from) = query.created_from() {
            builder.push(" AND i.created_at >= ").push_bind(from);
        }
        if let Some(before) = query.created_before() {
            builder.push(" AND i.created_at < ").push_bind(before);
        }
        builder.push(" ORDER BY i.created_at DESC, i.id DESC");

        let mut tx = self.begin_as(viewer_id).await?;

        let rows: Vec<InteractionListRow> = builder.build_query_as().fetch_all(&mut *tx).await?;
        if rows.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.interaction.id).collect();
        let links = sqlx::query_as::<_, LinkListRow>(
            r#"
            SELECT
                ip.interaction_id, ip.product_id, ip.is_custom,
                COALESCE(ip.custom_description, ip.product_description, pr.description) AS description
            FROM interaction_products ip
            LEFT JOIN products pr ON pr.id = ip.product_id
            WHERE ip.interaction_id = ANY($1)
            ORDER BY ip.interaction_id, ip.position
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut by_interaction: HashMap<Uuid, Vec<LinkedProduct>> = HashMap::new();
        for link in links {
            by_interaction
                .entry(link.interaction_id)
                .or_default()
                .push(LinkedProduct {
                    product_id: link.product_id,
                    is_custom: link.is_custom,
                    description: link.description,
                });
        }

        Ok(rows
            .into_iter()
            .map(|r| {
                let products = by_interaction.remove(&r.interaction.id).unwrap_or_default();
                InteractionView {
                    interaction: r.interaction,
                    creator_name: r.creator_name,
                    creator_username: r.creator_username,
                    store_name: r.store_name,
                    products,
                }
            })
            .collect())
    }

    async fn delete_user_data(&self, acting_id: Uuid, user_id: Uuid) -> AppResult<u64> {
        // A política de DELETE só libera para ADMIN; os vínculos caem em cascata
        let mut tx = self.begin_as(acting_id).await?;

        let removed = sqlx::query("DELETE FROM interactions WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM user_stores WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(removed)
    }

    // =========================================================================
    //  CATÁLOGO
    // =========================================================================

    async fn list_products(&self, search: Option<&str>) -> AppResult<Vec<Product>> {
        let search = search.map(str::trim).filter(|s| !s.is_empty());

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            SELECT id, product_code, description, cost_price, sale_price, created_at, updated_at
            FROM products
            "#,
        );
        if let Some(search) = search {
            let pattern = like_pattern(search);
            builder
                .push(" WHERE product_code ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR description ILIKE ")
                .push_bind(pattern);
        }
        builder.push(" ORDER BY description ASC");
        if search.is_some() {
            builder.push(" LIMIT ").push_bind(PRODUCT_SEARCH_LIMIT as i64);
        }

        let products = builder.build_query_as::<Product>().fetch_all(&self.pool).await?;
        Ok(products)
    }

    async fn replace_products(&self, products: Vec<NewProduct>) -> AppResult<usize> {
        let count = products.len();
        let mut tx = self.pool.begin().await?;

        // Vínculos antigos ficam com product_id NULL (ON DELETE SET NULL)
        sqlx::query("DELETE FROM products").execute(&mut *tx).await?;

        for chunk in products.chunks(PRODUCT_INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO products (product_code, description, cost_price, sale_price) ",
            );
            builder.push_values(chunk, |mut b, product| {
                b.push_bind(&product.product_code)
                    .push_bind(&product.description)
                    .push_bind(product.cost_price)
                    .push_bind(product.sale_price);
            });
            builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| write_error(e, "produto"))?;
        }

        tx.commit().await?;
        Ok(count)
    }

    // =========================================================================
    //  FEED DE MUDANÇAS
    // =========================================================================

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("abc"), "%abc%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
