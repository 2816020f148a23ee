use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
};

use crate::entity::{login_device, user};

use super::document::DocumentService;

/// Preference flags to change; `None` leaves a flag untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct PreferenceChanges {
    pub notifications_enabled: Option<bool>,
    pub security_email_new_device_enabled: Option<bool>,
}

pub struct UserService<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> UserService<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Insert a new account. Both preference flags start enabled.
    ///
    /// A duplicate email surfaces as `SqlErr::UniqueConstraintViolation`.
    pub async fn create(&self, email: &str, password_hash: String) -> Result<user::Model, DbErr> {
        user::ActiveModel {
            email: Set(email.to_string()),
            password_hash: Set(password_hash),
            notifications_enabled: Set(true),
            security_email_new_device_enabled: Set(true),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.conn)
        .await
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>, DbErr> {
        user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(self.conn)
            .await
    }

    pub async fn update_preferences(
        &self,
        user: user::Model,
        changes: PreferenceChanges,
    ) -> Result<user::Model, DbErr> {
        if changes.notifications_enabled.is_none()
            && changes.security_email_new_device_enabled.is_none()
        {
            return Ok(user);
        }

        let mut active: user::ActiveModel = user.into();
        if let Some(enabled) = changes.notifications_enabled {
            active.notifications_enabled = Set(enabled);
        }
        if let Some(enabled) = changes.security_email_new_device_enabled {
            active.security_email_new_device_enabled = Set(enabled);
        }
        active.update(self.conn).await
    }

    /// Delete an account and everything it owns.
    ///
    /// Run inside a transaction. Returns the content hashes the account's
    /// documents referenced, for blob cleanup after commit.
    pub async fn delete_cascade(&self, user_id: i32) -> Result<Vec<String>, DbErr> {
        let hashes = DocumentService::new(self.conn)
            .delete_all_for_owner(user_id)
            .await?;

        login_device::Entity::delete_many()
            .filter(login_device::Column::UserId.eq(user_id))
            .exec(self.conn)
            .await?;
        user::Entity::delete_by_id(user_id).exec(self.conn).await?;

        Ok(hashes)
    }
}
