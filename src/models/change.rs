// src/models/change.rs

use serde::{Deserialize, Serialize};

// As coleções que o EntityStore expõe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Profiles,
    Stores,
    UserStores,
    Products,
    Interactions,
    InteractionProducts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

// Um evento do feed: "alguma coisa mudou nesta coleção".
// O payload JSON é o mesmo que o trigger do Postgres publica via pg_notify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub collection: Collection,
    pub operation: ChangeOp,
}

impl ChangeEvent {
    pub fn new(collection: Collection, operation: ChangeOp) -> Self {
        Self { collection, operation }
    }

    // A listagem de interações precisa recarregar?
    pub fn touches_interactions(&self) -> bool {
        matches!(
            self.collection,
            Collection::Interactions | Collection::InteractionProducts
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_trigger_payload() {
        let event: ChangeEvent =
            serde_json::from_str(r#"{"collection":"interaction_products","operation":"INSERT"}"#)
                .unwrap();
        assert_eq!(event, ChangeEvent::new(Collection::InteractionProducts, ChangeOp::Insert));
        assert!(event.touches_interactions());

        let event: ChangeEvent =
            serde_json::from_str(r#"{"collection":"user_stores","operation":"DELETE"}"#).unwrap();
        assert!(!event.touches_interactions());
    }
}
