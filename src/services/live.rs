// src/services/live.rs
//
// Lista de interações "ao vivo": uma carga inicial e uma nova carga a cada
// mudança em interactions / interaction_products.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::{
    sync::{broadcast::error::RecvError, mpsc},
    task::{JoinHandle, JoinSet},
    time::{interval, MissedTickBehavior},
};

use crate::{
    models::{
        auth::Session,
        interaction::{InteractionFilter, InteractionView},
    },
    services::interactions::InteractionService,
};

const FEED_BUFFER: usize = 8;
const SESSION_CHECK_PERIOD: Duration = Duration::from_secs(15);

/// Última requisição vence: cada recarga pega um número, e só o resultado
/// do número mais recente é entregue.
#[derive(Debug, Default)]
pub struct RequestGeneration(AtomicU64);

impl RequestGeneration {
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.0.load(Ordering::SeqCst) == generation
    }
}

pub struct InteractionFeed {
    updates: mpsc::Receiver<Vec<InteractionView>>,
    task: JoinHandle<()>,
}

impl InteractionFeed {
    /// Só é criado com a sessão já resolvida; a assinatura vem antes da carga
    /// inicial para não perder mudanças entre as duas.
    pub fn start(service: InteractionService, session: Session, filter: InteractionFilter) -> Self {
        let (tx, updates) = mpsc::channel(FEED_BUFFER);
        let task = tokio::spawn(run_feed(service, session, filter, tx));
        Self { updates, task }
    }

    /// Próxima versão da lista; `None` quando o feed terminou.
    pub async fn next(&mut self) -> Option<Vec<InteractionView>> {
        self.updates.recv().await
    }
}

impl Drop for InteractionFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Reloader {
    service: InteractionService,
    session: Session,
    filter: InteractionFilter,
    tx: mpsc::Sender<Vec<InteractionView>>,
    generation: Arc<RequestGeneration>,
}

impl Reloader {
    fn spawn(&self, reloads: &mut JoinSet<()>) {
        let generation = self.generation.advance();
        let current = self.generation.clone();
        let service = self.service.clone();
        let session = self.session.clone();
        let filter = self.filter.clone();
        let tx = self.tx.clone();

        reloads.spawn(async move {
            let result = service.list(&session, filter).await;
            if !current.is_current(generation) {
                tracing::debug!("Recarga {} descartada (superada)", generation);
                return;
            }
            match result {
                Ok(views) => {
                    let _ = tx.send(views).await;
                }
                Err(e) => tracing::warn!("Recarga do feed falhou: {}", e),
            }
        });
    }
}

async fn run_feed(
    service: InteractionService,
    session: Session,
    filter: InteractionFilter,
    tx: mpsc::Sender<Vec<InteractionView>>,
) {
    let mut changes = service.subscribe();
    let reloader = Reloader {
        service: service.clone(),
        session: session.clone(),
        filter,
        tx: tx.clone(),
        generation: Arc::new(RequestGeneration::default()),
    };
    let mut reloads = JoinSet::new();
    let mut session_check = interval(SESSION_CHECK_PERIOD);
    session_check.set_missed_tick_behavior(MissedTickBehavior::Delay);
    session_check.tick().await;

    reloader.spawn(&mut reloads);

    loop {
        tokio::select! {
            _ = tx.closed() => break,

            event = changes.recv() => {
                let reload = match event {
                    Ok(event) => event.touches_interactions(),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Feed atrasado ({} eventos perdidos), recarregando", skipped);
                        true
                    }
                    Err(RecvError::Closed) => break,
                };
                if reload {
                    if !session_still_active(&service, &session).await {
                        break;
                    }
                    reloader.spawn(&mut reloads);
                }
            }

            _ = session_check.tick() => {
                if !session_still_active(&service, &session).await {
                    break;
                }
            }

            Some(joined) = reloads.join_next(), if !reloads.is_empty() => {
                if let Err(e) = joined {
                    tracing::warn!("Task de recarga abortada: {}", e);
                }
            }
        }
    }

    reloads.abort_all();
}

// Erro na checagem não derruba o feed; só sessão revogada/expirada encerra
async fn session_still_active(service: &InteractionService, session: &Session) -> bool {
    match service.session_is_active(session).await {
        Ok(true) => true,
        Ok(false) => {
            tracing::info!("Sessão {} encerrada, fechando o feed", session.session_id);
            false
        }
        Err(e) => {
            tracing::warn!("Não foi possível checar a sessão do feed: {}", e);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_latest_generation_is_current() {
        let generation = RequestGeneration::default();
        let first = generation.advance();
        let second = generation.advance();

        assert!(!generation.is_current(first));
        assert!(generation.is_current(second));
    }
}
