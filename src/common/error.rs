// src/common/error.rs

use std::collections::HashMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::middleware::i18n::Locale;

pub type AppResult<T> = Result<T, AppError>;

// A taxonomia de erros do CRM.
// Validação e permissão nascem perto da ação do usuário; DependencyError vem do banco/identidade.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação: {0}")]
    ValidationError(String),

    #[error("Erro de validação")]
    PayloadValidationError(#[from] validator::ValidationErrors),

    #[error("Permissão negada: {0}")]
    PermissionError(String),

    #[error("Valor já existe: {0}")]
    ConflictError(String),

    #[error("Registro não encontrado: {0}")]
    NotFoundError(String),

    #[error("Falha de dependência: {0}")]
    DependencyError(String),

    // Fase 1 (dados) concluída, fase 2 (identidade) falhou: estado recuperável, tentar de novo
    #[error("Dados do usuário {user_id} removidos, mas a identidade não foi excluída: {cause}")]
    IncompleteDeletion { user_id: Uuid, cause: String },

    #[error("Credenciais inválidas")]
    InvalidCredentials,

    #[error("Token inválido")]
    InvalidToken,

    #[error("Erro de banco de dados: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Erro interno do servidor: {0}")]
    InternalServerError(#[from] anyhow::Error),

    #[error("Erro de Bcrypt: {0}")]
    BcryptError(#[from] bcrypt::BcryptError),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::ValidationError(message.into())
    }

    pub fn permission(message: impl Into<String>) -> Self {
        AppError::PermissionError(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFoundError(message.into())
    }

    /// Falhas de infraestrutura (banco, identidade, hashing, rede).
    pub fn is_dependency(&self) -> bool {
        matches!(
            self,
            AppError::DependencyError(_)
                | AppError::DatabaseError(_)
                | AppError::InternalServerError(_)
                | AppError::BcryptError(_)
                | AppError::JwtError(_)
        )
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::PayloadValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials | AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::PermissionError(_) => StatusCode::FORBIDDEN,
            AppError::NotFoundError(_) => StatusCode::NOT_FOUND,
            AppError::ConflictError(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    // Converte para a resposta da API, com a mensagem no idioma do cliente
    pub fn to_api_error(&self, locale: &Locale) -> ApiError {
        let pt = locale.is_portuguese();
        let status = self.status();

        let (message, details) = match self {
            AppError::PayloadValidationError(errors) => {
                let mut details: HashMap<String, Vec<String>> = HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages = field_errors
                        .iter()
                        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                (invalid_fields(pt), Some(json!(details)))
            }
            AppError::ValidationError(reason) => (invalid_fields(pt), Some(json!({ "reason": reason }))),
            AppError::PermissionError(_) => (
                if pt { "Você não tem permissão para realizar esta ação." } else { "You don't have permission to do that." },
                None,
            ),
            AppError::ConflictError(_) => (
                if pt { "Esse valor já está em uso." } else { "That value is already taken." },
                None,
            ),
            AppError::NotFoundError(_) => (
                if pt { "Esse registro não existe mais." } else { "That record no longer exists." },
                None,
            ),
            AppError::InvalidCredentials => (
                if pt { "Usuário ou senha inválidos." } else { "Invalid username or password." },
                None,
            ),
            AppError::InvalidToken => (
                if pt { "Token de autenticação inválido ou ausente." } else { "Missing or invalid authentication token." },
                None,
            ),
            AppError::IncompleteDeletion { user_id, .. } => {
                tracing::error!("Exclusão incompleta: {}", self);
                (
                    if pt {
                        "Os dados do usuário foram removidos, mas a conta não foi excluída. Tente novamente."
                    } else {
                        "The user's data was removed but the account could not be deleted. Try again."
                    },
                    Some(json!({ "userId": user_id })),
                )
            }
            // Todo o resto (banco, bcrypt, jwt, interno) vira 500.
            e => {
                tracing::error!("Erro Interno do Servidor: {}", e);
                (
                    if pt { "Algo deu errado, tente novamente." } else { "Something went wrong, try again." },
                    None,
                )
            }
        };

        ApiError {
            status,
            error: message.to_string(),
            details,
        }
    }
}

fn invalid_fields(pt: bool) -> &'static str {
    if pt {
        "Um ou mais campos são inválidos."
    } else {
        "One or more fields are invalid."
    }
}

// O erro já pronto para virar resposta HTTP
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub details: Option<Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.details {
            Some(details) => json!({ "error": self.error, "details": details }),
            None => json!({ "error": self.error }),
        };
        (self.status, Json(body)).into_response()
    }
}
