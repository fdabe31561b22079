use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::db::is_unique_violation;
use crate::entities::department_request;
use crate::entities::user::{self, Department, Role};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewUser {
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub full_name: String,
    pub role: Role,
    pub department: Option<Department>,
    #[validate(custom = "validate_blockchain_address")]
    pub blockchain_address: Option<String>,
}

/// Partial edit of a user. Absent fields are kept.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UserUpdate {
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 1))]
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub department: Option<Department>,
    #[validate(custom = "validate_blockchain_address")]
    pub blockchain_address: Option<String>,
    pub is_active: Option<bool>,
}

fn validate_blockchain_address(address: &str) -> Result<(), ValidationError> {
    if crate::ledger::is_address(address) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_blockchain_address"))
    }
}

/// User records. Authentication lives in front of this service.
#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
}

impl UserService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input), fields(username = %input.username))]
    pub async fn create_user(&self, input: NewUser) -> Result<user::Model, ServiceError> {
        input.validate()?;

        let created = user::ActiveModel {
            username: Set(input.username.clone()),
            email: Set(input.email),
            full_name: Set(input.full_name),
            role: Set(input.role.to_string()),
            department: Set(input.department.map(|d| d.to_string())),
            blockchain_address: Set(input.blockchain_address),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::Conflict(format!("Username {} is taken", input.username))
            } else {
                ServiceError::DatabaseError(e)
            }
        })?;

        info!(user_id = %created.id, role = %created.role, "user created");
        Ok(created)
    }

    /// Every user, newest first.
    pub async fn list_users(&self) -> Result<Vec<user::Model>, ServiceError> {
        Ok(user::Entity::find()
            .order_by_desc(user::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?)
    }

    #[instrument(skip(self, input))]
    pub async fn update_user(&self, id: Uuid, input: UserUpdate) -> Result<user::Model, ServiceError> {
        input.validate()?;

        let existing = self.require_user(id).await?;
        let mut active: user::ActiveModel = existing.into();
        if let Some(email) = input.email {
            active.email = Set(email);
        }
        if let Some(full_name) = input.full_name {
            active.full_name = Set(full_name);
        }
        if let Some(role) = input.role {
            active.role = Set(role.to_string());
        }
        if let Some(department) = input.department {
            active.department = Set(Some(department.to_string()));
        }
        if let Some(address) = input.blockchain_address {
            active.blockchain_address = Set(Some(address));
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }

        let updated = active.update(self.db.as_ref()).await?;
        info!(user_id = %updated.id, role = %updated.role, "user updated");
        Ok(updated)
    }

    /// Deletes a user. Users who still own requests are kept; deactivate them instead.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, id: Uuid) -> Result<(), ServiceError> {
        let existing = self.require_user(id).await?;
        let owned = department_request::Entity::find()
            .filter(department_request::Column::RequesterId.eq(id))
            .count(self.db.as_ref())
            .await?;
        if owned > 0 {
            return Err(ServiceError::Conflict(format!(
                "User {} still owns {} request(s)",
                existing.username, owned
            )));
        }

        user::Entity::delete_by_id(id).exec(self.db.as_ref()).await?;
        info!(user_id = %id, username = %existing.username, "user deleted");
        Ok(())
    }

    async fn require_user(&self, id: Uuid) -> Result<user::Model, ServiceError> {
        self.get_user(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", id)))
    }

    pub async fn get_user(&self, id: Uuid) -> Result<Option<user::Model>, ServiceError> {
        Ok(user::Entity::find_by_id(id).one(self.db.as_ref()).await?)
    }

    /// Resolves an active user, as the request layer does for the caller.
    pub async fn get_active_user(&self, id: Uuid) -> Result<user::Model, ServiceError> {
        self.get_user(id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| ServiceError::Unauthenticated(format!("Unknown user {}", id)))
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<user::Model>, ServiceError> {
        Ok(user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(self.db.as_ref())
            .await?)
    }

    pub async fn users_with_role(&self, role: Role) -> Result<Vec<user::Model>, ServiceError> {
        Ok(user::Entity::find()
            .filter(user::Column::Role.eq(role.to_string()))
            .filter(user::Column::IsActive.eq(true))
            .order_by_asc(user::Column::Username)
            .all(self.db.as_ref())
            .await?)
    }
}
