use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use tracing::debug;

use crate::entity::login_device;
use crate::extractors::client::ClientInfo;

/// Whether a login came from a fingerprint the user has used before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSeen {
    New,
    Known,
}

pub struct DeviceService<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> DeviceService<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Record a successful login from `client`.
    ///
    /// Known fingerprints are updated in place. If a concurrent login inserts
    /// the same fingerprint first, this call updates that row and reports `Known`.
    pub async fn record_login(
        &self,
        user_id: i32,
        client: &ClientInfo,
    ) -> Result<DeviceSeen, DbErr> {
        let fingerprint = client.fingerprint();

        if self.touch(user_id, &fingerprint, client).await? {
            return Ok(DeviceSeen::Known);
        }

        let now = Utc::now();
        let device = login_device::ActiveModel {
            user_id: Set(user_id),
            fingerprint_hash: Set(fingerprint.clone()),
            first_seen_at: Set(now),
            last_seen_at: Set(now),
            last_ip: Set(Some(client.ip.clone())),
            last_user_agent: Set(Some(client.user_agent.clone())),
            ..Default::default()
        };

        let inserted = login_device::Entity::insert(device)
            .on_conflict(
                OnConflict::columns([
                    login_device::Column::UserId,
                    login_device::Column::FingerprintHash,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(self.conn)
            .await?;

        if inserted > 0 {
            return Ok(DeviceSeen::New);
        }

        debug!(user_id, "Login device inserted concurrently, updating instead");
        self.touch(user_id, &fingerprint, client).await?;
        Ok(DeviceSeen::Known)
    }

    /// Update last-seen data of an existing device. Returns `false` if there is none.
    async fn touch(
        &self,
        user_id: i32,
        fingerprint: &str,
        client: &ClientInfo,
    ) -> Result<bool, DbErr> {
        let existing = login_device::Entity::find()
            .filter(login_device::Column::UserId.eq(user_id))
            .filter(login_device::Column::FingerprintHash.eq(fingerprint))
            .one(self.conn)
            .await?;

        let Some(existing) = existing else {
            return Ok(false);
        };

        let mut active: login_device::ActiveModel = existing.into();
        active.last_seen_at = Set(Utc::now());
        active.last_ip = Set(Some(client.ip.clone()));
        active.last_user_agent = Set(Some(client.user_agent.clone()));
        active.update(self.conn).await?;
        Ok(true)
    }

    /// Devices of a user, most recently seen first.
    pub async fn list(&self, user_id: i32) -> Result<Vec<login_device::Model>, DbErr> {
        login_device::Entity::find()
            .filter(login_device::Column::UserId.eq(user_id))
            .order_by_desc(login_device::Column::LastSeenAt)
            .order_by_desc(login_device::Column::Id)
            .all(self.conn)
            .await
    }
}
