// src/services/interactions.rs

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::{Decimal, RoundingStrategy};
use tokio::sync::broadcast;

use crate::{
    common::error::{AppError, AppResult},
    db::EntityStore,
    models::{
        auth::{Actor, Session},
        change::ChangeEvent,
        interaction::{
            CreateInteractionPayload, Interaction, InteractionFilter, InteractionStats,
            InteractionStatus, InteractionView, NewInteraction, NewInteractionLink, ProductRef,
        },
    },
    services::visibility::InteractionQuery,
};

#[derive(Clone)]
pub struct InteractionService {
    store: Arc<dyn EntityStore>,
}

impl InteractionService {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    pub async fn create(
        &self,
        session: &Session,
        payload: CreateInteractionPayload,
    ) -> AppResult<Interaction> {
        let (interaction, links) = build_interaction(&session.actor, payload)?;
        let link_count = links.len();

        // Interação + vínculos numa transação só; qualquer falha aborta tudo
        let created = self.store.create_interaction(interaction, links).await?;

        tracing::info!(
            "Interação {} ({:?}) registrada por '{}' com {} produto(s)",
            created.id,
            created.status,
            session.actor.username,
            link_count
        );
        Ok(created)
    }

    /// Lista com o escopo do cargo. Falha de dependência na leitura vira lista vazia.
    pub async fn list(
        &self,
        session: &Session,
        filter: InteractionFilter,
    ) -> AppResult<Vec<InteractionView>> {
        let query = InteractionQuery::for_actor(&session.actor, filter);
        if query.is_empty() {
            tracing::debug!("'{}' não tem escopo de interações", session.actor.username);
            return Ok(Vec::new());
        }

        match self.store.list_interactions(session.actor.id, &query).await {
            Ok(views) => Ok(views),
            Err(e) if e.is_dependency() => {
                tracing::warn!("Listagem de interações degradada para vazio: {}", e);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn stats(
        &self,
        session: &Session,
        filter: InteractionFilter,
    ) -> AppResult<InteractionStats> {
        let views = self.list(session, filter).await?;
        Ok(summarize(views.iter().map(|v| &v.interaction)))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.store.subscribe()
    }

    pub async fn session_is_active(&self, session: &Session) -> AppResult<bool> {
        self.store
            .session_is_active(session.session_id, session.actor.id)
            .await
    }
}

// ---
// Contrato de criação
// ---

/// Valida o formulário e monta o registro pronto para gravar.
///
/// - nome do cliente e descrição são obrigatórios (após trim);
/// - motivo só sobrevive com status Lost; valor nunca sobrevive com Lost;
/// - valor negativo é rejeitado, o resto é arredondado para centavos;
/// - ids de catálogo repetidos entram uma vez só, textos livres entram sempre
///   (linhas de texto livre em branco são descartadas);
/// - a loja é a do criador no momento da criação.
pub fn build_interaction(
    actor: &Actor,
    payload: CreateInteractionPayload,
) -> AppResult<(NewInteraction, Vec<NewInteractionLink>)> {
    let client_name = payload.client_name.trim();
    if client_name.is_empty() {
        return Err(AppError::validation("o nome do cliente é obrigatório"));
    }
    let description = payload.description.trim();
    if description.is_empty() {
        return Err(AppError::validation("a descrição é obrigatória"));
    }

    let reason = match payload.status {
        InteractionStatus::Lost => payload.reason,
        _ => None,
    };

    let monetary_value = match payload.status {
        InteractionStatus::Lost => None,
        _ => match payload.monetary_value {
            Some(value) if value < Decimal::ZERO => {
                return Err(AppError::validation("o valor não pode ser negativo"));
            }
            Some(value) => Some(value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)),
            None => None,
        },
    };

    let mut seen = HashSet::new();
    let mut links = Vec::with_capacity(payload.products.len());
    for product in payload.products {
        match product {
            ProductRef::Catalog { product_id } => {
                if seen.insert(product_id) {
                    links.push(NewInteractionLink::Catalog(product_id));
                }
            }
            ProductRef::Custom { custom_description } => {
                let text = custom_description.trim();
                if !text.is_empty() {
                    links.push(NewInteractionLink::Custom(text.to_string()));
                }
            }
        }
    }

    let interaction = NewInteraction {
        client_name: client_name.to_string(),
        description: description.to_string(),
        status: payload.status,
        reason,
        monetary_value,
        user_id: actor.id,
        store_id: actor.store_id,
    };

    Ok((interaction, links))
}

// ---
// Estatísticas: sempre derivadas da listagem atual
// ---

pub fn summarize<'a>(rows: impl IntoIterator<Item = &'a Interaction>) -> InteractionStats {
    let mut stats = InteractionStats::default();

    for row in rows {
        stats.total_interactions += 1;
        let value = row.monetary_value.unwrap_or_default();
        match row.status {
            InteractionStatus::Closed => {
                stats.closed_deals += 1;
                stats.closed_revenue += value;
            }
            InteractionStatus::Quoted => stats.quoted_pipeline += value,
            InteractionStatus::Lost => stats.lost_deals += 1,
        }
    }

    if stats.total_interactions > 0 {
        stats.closing_rate = (Decimal::from(stats.closed_deals) * Decimal::ONE_HUNDRED
            / Decimal::from(stats.total_interactions))
        .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero);
    }
    // Média sem arredondamento
    if stats.closed_deals > 0 {
        stats.average_deal_value = stats.closed_revenue / Decimal::from(stats.closed_deals);
    }

    stats
}
