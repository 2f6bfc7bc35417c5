//! Admin management of organizer accounts.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::{CascadePolicy, DomainError};
use crate::auth::AuthContext;
use crate::models::{Role, User};
use crate::store::{CascadeReport, Store};
use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrganizer {
    pub name: String,
    pub email: String,
}

pub struct OrganizerService {
    store: Arc<dyn Store>,
}

impl OrganizerService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn list(&self, ctx: &AuthContext) -> AppResult<Vec<User>> {
        ctx.require_role(&[Role::Admin])?;
        Ok(self.store.list_users(Some(Role::Organizer)).await?)
    }

    pub async fn create(&self, ctx: &AuthContext, input: NewOrganizer) -> AppResult<User> {
        ctx.require_role(&[Role::Admin])?;

        let name = input.name.trim().to_string();
        let email = input.email.trim().to_lowercase();
        if name.is_empty() {
            return Err(AppError::ValidationError("name must not be empty".into()));
        }
        if !email.contains('@') {
            return Err(AppError::ValidationError("email is not valid".into()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name,
            email,
            role: Role::Organizer,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_user(&user).await?;

        tracing::info!(user_id = %user.id, "Organizer created");
        Ok(user)
    }

    /// Removes the organizer together with every event they own.
    pub async fn delete(&self, ctx: &AuthContext, user_id: Uuid) -> AppResult<CascadeReport> {
        ctx.require_role(&[Role::Admin])?;
        self.store
            .find_user(user_id)
            .await?
            .filter(|u| u.role == Role::Organizer)
            .ok_or(DomainError::UserNotFound(user_id))?;

        Ok(CascadePolicy::Organizer(user_id)
            .execute(self.store.as_ref())
            .await?)
    }
}
