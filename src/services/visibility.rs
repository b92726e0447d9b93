// src/services/visibility.rs

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use crate::models::{
    auth::{Actor, Role},
    interaction::{Interaction, InteractionFilter},
};

/// Quais interações um ator pode enxergar.
///
/// Isto é só uma otimização de consulta: quem decide de verdade é a política
/// de linha do `EntityStore` (RLS no Postgres).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionScope {
    /// SALESPERSON: apenas as próprias.
    OwnedBy(Uuid),
    /// MANAGER com loja: as da loja.
    Store(Uuid),
    /// BOARD e ADMIN: todas.
    All,
    /// MANAGER sem loja: nenhuma (falha fechada).
    Nothing,
}

pub fn scope_for(actor: &Actor) -> InteractionScope {
    match actor.role {
        Role::Salesperson => InteractionScope::OwnedBy(actor.id),
        Role::Manager => match actor.store_id {
            Some(store_id) => InteractionScope::Store(store_id),
            None => InteractionScope::Nothing,
        },
        Role::Board | Role::Admin => InteractionScope::All,
    }
}

// Escopo do cargo AND filtros opcionais
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionQuery {
    pub scope: InteractionScope,
    pub filter: InteractionFilter,
}

impl InteractionQuery {
    pub fn for_actor(actor: &Actor, filter: InteractionFilter) -> Self {
        Self {
            scope: scope_for(actor),
            filter,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scope == InteractionScope::Nothing
    }

    /// Início do dia de `startDate` (inclusivo).
    pub fn created_from(&self) -> Option<DateTime<Utc>> {
        self.filter.start_date.map(start_of_day)
    }

    /// Início do dia seguinte a `endDate` (exclusivo), ou seja, o dia final inteiro entra.
    pub fn created_before(&self) -> Option<DateTime<Utc>> {
        self.filter
            .end_date
            .and_then(|date| date.succ_opt())
            .map(start_of_day)
    }

    pub fn matches(&self, row: &Interaction) -> bool {
        let in_scope = match self.scope {
            InteractionScope::OwnedBy(user_id) => row.user_id == user_id,
            InteractionScope::Store(store_id) => row.store_id == Some(store_id),
            InteractionScope::All => true,
            InteractionScope::Nothing => false,
        };
        if !in_scope {
            return false;
        }

        let f = &self.filter;
        f.status.is_none_or(|status| row.status == status)
            && f.store_id.is_none_or(|store_id| row.store_id == Some(store_id))
            && f.user_id.is_none_or(|user_id| row.user_id == user_id)
            && f.reason.is_none_or(|reason| row.reason == Some(reason))
            && self.created_from().is_none_or(|from| row.created_at >= from)
            && self.created_before().is_none_or(|before| row.created_at < before)
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::interaction::{InteractionStatus, LossReason};
    use chrono::TimeZone;

    fn actor(role: Role, store_id: Option<Uuid>) -> Actor {
        Actor {
            id: Uuid::new_v4(),
            username: "ator".into(),
            full_name: "Ator".into(),
            email: "ator@crm.com".into(),
            role,
            store_id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn row(user_id: Uuid, store_id: Option<Uuid>, status: InteractionStatus) -> Interaction {
        Interaction {
            id: Uuid::new_v4(),
            client_name: "Acme".into(),
            description: "Visita".into(),
            status,
            reason: None,
            monetary_value: None,
            user_id,
            store_id,
            created_at: Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn scope_per_role() {
        let store = Uuid::new_v4();
        let sales = actor(Role::Salesperson, Some(store));
        assert_eq!(scope_for(&sales), InteractionScope::OwnedBy(sales.id));
        assert_eq!(scope_for(&actor(Role::Manager, Some(store))), InteractionScope::Store(store));
        assert_eq!(scope_for(&actor(Role::Board, None)), InteractionScope::All);
        assert_eq!(scope_for(&actor(Role::Admin, Some(store))), InteractionScope::All);
    }

    #[test]
    fn manager_without_store_sees_nothing() {
        let manager = actor(Role::Manager, None);
        let query = InteractionQuery::for_actor(&manager, InteractionFilter::default());
        assert!(query.is_empty());
        assert!(!query.matches(&row(manager.id, None, InteractionStatus::Closed)));
        assert!(!query.matches(&row(Uuid::new_v4(), Some(Uuid::new_v4()), InteractionStatus::Closed)));
    }

    #[test]
    fn salesperson_filter_for_someone_else_matches_nothing() {
        let sales = actor(Role::Salesperson, None);
        let other = Uuid::new_v4();
        let query = InteractionQuery::for_actor(
            &sales,
            InteractionFilter {
                user_id: Some(other),
                ..Default::default()
            },
        );
        assert!(!query.matches(&row(other, None, InteractionStatus::Quoted)));
        assert!(!query.matches(&row(sales.id, None, InteractionStatus::Quoted)));
    }

    #[test]
    fn date_range_is_inclusive_on_both_days() {
        let admin = actor(Role::Admin, None);
        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let query = InteractionQuery::for_actor(
            &admin,
            InteractionFilter {
                start_date: Some(day),
                end_date: Some(day),
                ..Default::default()
            },
        );

        let mut early = row(admin.id, None, InteractionStatus::Closed);
        early.created_at = Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap();
        let mut late = row(admin.id, None, InteractionStatus::Closed);
        late.created_at = Utc.with_ymd_and_hms(2025, 3, 10, 23, 59, 59).unwrap();
        let mut next_day = row(admin.id, None, InteractionStatus::Closed);
        next_day.created_at = Utc.with_ymd_and_hms(2025, 3, 11, 0, 0, 0).unwrap();

        assert!(query.matches(&early));
        assert!(query.matches(&late));
        assert!(!query.matches(&next_day));
    }

    #[test]
    fn filters_compose_with_and() {
        let store = Uuid::new_v4();
        let manager = actor(Role::Manager, Some(store));
        let query = InteractionQuery::for_actor(
            &manager,
            InteractionFilter {
                status: Some(InteractionStatus::Lost),
                reason: Some(LossReason::Price),
                ..Default::default()
            },
        );

        let mut lost_price = row(Uuid::new_v4(), Some(store), InteractionStatus::Lost);
        lost_price.reason = Some(LossReason::Price);
        let mut lost_delay = lost_price.clone();
        lost_delay.reason = Some(LossReason::Delay);
        let mut other_store = lost_price.clone();
        other_store.store_id = Some(Uuid::new_v4());

        assert!(query.matches(&lost_price));
        assert!(!query.matches(&lost_delay));
        assert!(!query.matches(&other_store));
    }
}
