// src/services/policy.rs
//
// Política de cargos: funções puras, sem estado e sem I/O.
// Toda checagem de permissão do CRM passa por aqui, tanto na hora de
// montar as opções da tela quanto na hora de gravar.

use crate::models::auth::Role;

pub fn can_manage_users(role: Role) -> bool {
    matches!(role, Role::Board | Role::Admin)
}

pub fn can_upload_products(role: Role) -> bool {
    matches!(role, Role::Board | Role::Admin)
}

pub fn can_delete_users(role: Role) -> bool {
    role == Role::Admin
}

pub fn can_change_password(actor_role: Role, target_role: Role) -> bool {
    match actor_role {
        Role::Admin => true,
        Role::Board => matches!(target_role, Role::Manager | Role::Salesperson),
        _ => false,
    }
}

/// BOARD só pode promover SALESPERSON -> MANAGER; ADMIN pode tudo.
/// Não trata auto-edição: quem chama precisa bloquear isso.
pub fn can_update_role(actor_role: Role, current_target_role: Role, new_target_role: Role) -> bool {
    match actor_role {
        Role::Admin => true,
        Role::Board => current_target_role == Role::Salesperson && new_target_role == Role::Manager,
        _ => false,
    }
}

/// Cargos que aparecem como opção para o alvo (mesma regra do commit).
pub fn assignable_roles(actor_role: Role, current_target_role: Role) -> Vec<Role> {
    Role::ALL
        .into_iter()
        .filter(|&new_role| can_update_role(actor_role, current_target_role, new_role))
        .collect()
}

/// Teto de cargo na criação de usuários: o mesmo teto da promoção.
pub fn creatable_roles(actor_role: Role) -> &'static [Role] {
    match actor_role {
        Role::Admin => &Role::ALL,
        Role::Board => &[Role::Salesperson, Role::Manager],
        _ => &[],
    }
}
