// src/models/auth.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// --- ENUMS ---

// Mapeia o CREATE TYPE user_role do banco.
// A ordem de declaração segue a hierarquia (SALESPERSON < MANAGER < BOARD < ADMIN),
// mas a hierarquia serve só para comparação: quem concede permissão é a política.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Salesperson,
    Manager,
    Board,
    Admin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Salesperson, Role::Manager, Role::Board, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Salesperson => "SALESPERSON",
            Role::Manager => "MANAGER",
            Role::Board => "BOARD",
            Role::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cargo desconhecido: {0}")]
pub struct UnknownRole(pub String);

// Conversão estrita na fronteira: nada de string solta virando cargo.
impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "SALESPERSON" => Ok(Role::Salesperson),
            "MANAGER" => Ok(Role::Manager),
            "BOARD" => Ok(Role::Board),
            "ADMIN" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

// --- ATOR (perfil + loja) ---

// Representa um perfil vindo do banco, já com a loja atribuída (se houver)
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub store_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// O contexto da sessão: criado no login, invalidado no logout.
// Todo serviço que precisa saber "quem está agindo" recebe isto.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: Uuid,
    pub actor: Actor,
}

// Credenciais da identidade (nunca serializadas)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Credentials {
    pub user_id: Uuid,
    pub email: String,
    pub password_hash: String,
}

// Dados completos para criar identidade + perfil (+ loja) numa só operação
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub store_id: Option<Uuid>,
}

// Dados para login
#[derive(Debug, Deserialize, Validate)]
pub struct LoginPayload {
    #[validate(length(min = 1, message = "O usuário é obrigatório."))]
    pub username: String,
    #[validate(length(min = 1, message = "A senha é obrigatória."))]
    pub password: String,
}

// Resposta de autenticação com o token
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub profile: Actor,
}

// Estrutura de dados ("claims") dentro do JWT
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,  // ID do usuário
    pub sid: Uuid,  // ID da sessão (permite logout)
    pub exp: usize,
    pub iat: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_only_known_roles() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert!("admin".parse::<Role>().is_err());
        assert!("SUPERUSER".parse::<Role>().is_err());
        assert!("".parse::<Role>().is_err());
    }

    #[test]
    fn hierarchy_order_matches_levels() {
        assert!(Role::Salesperson < Role::Manager);
        assert!(Role::Manager < Role::Board);
        assert!(Role::Board < Role::Admin);
    }

    #[test]
    fn role_serializes_uppercase() {
        let json = serde_json::to_string(&Role::Salesperson).unwrap();
        assert_eq!(json, "\"SALESPERSON\"");
        let parsed: Role = serde_json::from_str("\"BOARD\"").unwrap();
        assert_eq!(parsed, Role::Board);
        assert!(serde_json::from_str::<Role>("\"OWNER\"").is_err());
    }
}
