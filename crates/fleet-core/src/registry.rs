//! Durable tenant store backed by redb.
//!
//! # Table design
//!
//! ```text
//! TENANTS: token (&str) -> JSON-encoded TenantConfig
//! META:    "next_id"    -> u64
//! ```
//!
//! Tokens are the primary key, which makes duplicate detection a single
//! lookup inside the insert transaction. Lookups by serial id scan the table;
//! fleets are small enough that this never matters.

use std::path::Path;

use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};

use crate::channel::normalize_channel;
use crate::error::{FleetError, Result};
use crate::types::{MediaKey, NewTenant, TenantConfig, TenantRef, TenantRole};

const TENANTS: TableDefinition<&str, &[u8]> = TableDefinition::new("tenants");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");
const NEXT_ID: &str = "next_id";

fn db_err(e: impl std::fmt::Display) -> FleetError {
    FleetError::Registry(e.to_string())
}

// ---------------------------------------------------------------------------
// TenantRegistry
// ---------------------------------------------------------------------------

/// Persistent store for [`TenantConfig`] records.
pub struct TenantRegistry {
    db: Database,
}

impl TenantRegistry {
    /// Open or create the registry at `path`, creating both tables.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(db_err)?;
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(TENANTS).map_err(db_err)?;
        wt.open_table(META).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(Self { db })
    }

    /// Register a new tenant. Fails with [`FleetError::TenantExists`] when
    /// the token is already present.
    pub fn create_tenant(&self, new: NewTenant) -> Result<TenantConfig> {
        let token = new.token.trim().to_string();
        if token.is_empty() {
            return Err(FleetError::MissingField {
                token,
                field: "token".into(),
            });
        }

        let wt = self.db.begin_write().map_err(db_err)?;
        let tenant = {
            let mut tenants = wt.open_table(TENANTS).map_err(db_err)?;
            if tenants.get(token.as_str()).map_err(db_err)?.is_some() {
                return Err(FleetError::TenantExists(token));
            }
            let mut meta = wt.open_table(META).map_err(db_err)?;
            let id = meta
                .get(NEXT_ID)
                .map_err(db_err)?
                .map(|v| v.value())
                .unwrap_or(1);
            meta.insert(NEXT_ID, id + 1).map_err(db_err)?;

            let now = Utc::now();
            let tenant = TenantConfig {
                id,
                token: token.clone(),
                display_name: new.display_name,
                role: new.role,
                registration_link: new.registration_link,
                target_channel: normalize_channel(new.channel_link.as_deref()),
                play_url: new.play_url.filter(|u| !u.trim().is_empty()),
                is_active: true,
                cached_media: Default::default(),
                created_by: new.created_by,
                created_at: now,
                updated_at: now,
            };
            let value = serde_json::to_vec(&tenant)?;
            tenants
                .insert(token.as_str(), value.as_slice())
                .map_err(db_err)?;
            tenant
        };
        wt.commit().map_err(db_err)?;
        Ok(tenant)
    }

    pub fn get_tenant_by_token(&self, token: &str) -> Result<Option<TenantConfig>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(TENANTS).map_err(db_err)?;
        match table.get(token).map_err(db_err)? {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    pub fn get_tenant_by_id(&self, id: u64) -> Result<Option<TenantConfig>> {
        Ok(self.list_tenants()?.into_iter().find(|t| t.id == id))
    }

    pub fn get(&self, tenant: &TenantRef) -> Result<Option<TenantConfig>> {
        match tenant {
            TenantRef::Token(token) => self.get_tenant_by_token(token),
            TenantRef::Id(id) => self.get_tenant_by_id(*id),
        }
    }

    /// All tenants, ordered by serial id.
    pub fn list_tenants(&self) -> Result<Vec<TenantConfig>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(TENANTS).map_err(db_err)?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (_, v) = entry.map_err(db_err)?;
            let tenant: TenantConfig = serde_json::from_slice(v.value())?;
            result.push(tenant);
        }
        result.sort_by_key(|t| t.id);
        Ok(result)
    }

    /// Active tenants, optionally restricted to one role.
    pub fn get_active_tenants(&self, role: Option<TenantRole>) -> Result<Vec<TenantConfig>> {
        Ok(self
            .list_tenants()?
            .into_iter()
            .filter(|t| t.is_active && role.map_or(true, |r| t.role == r))
            .collect())
    }

    /// Record a platform media handle. Returns `false` when the tenant does
    /// not exist.
    pub fn update_media_handle(&self, token: &str, key: &MediaKey, handle: &str) -> Result<bool> {
        self.modify(token, |t| {
            t.cached_media.insert(key.storage_key(), handle.to_string());
        })
    }

    pub fn update_play_url(&self, token: &str, play_url: &str) -> Result<bool> {
        let play_url = play_url.trim().to_string();
        self.modify(token, |t| {
            t.play_url = (!play_url.is_empty()).then_some(play_url);
        })
    }

    pub fn set_active(&self, token: &str, active: bool) -> Result<bool> {
        self.modify(token, |t| t.is_active = active)
    }

    /// Flip `is_active`. Returns the new state, or `None` if not found.
    pub fn toggle_active(&self, token: &str) -> Result<Option<bool>> {
        let mut new_state = None;
        self.modify(token, |t| {
            t.is_active = !t.is_active;
            new_state = Some(t.is_active);
        })?;
        Ok(new_state)
    }

    /// Remove a tenant by token or id. Returns `false` when nothing matched.
    pub fn delete_tenant(&self, tenant: &TenantRef) -> Result<bool> {
        let token = match tenant {
            TenantRef::Token(token) => token.clone(),
            TenantRef::Id(id) => match self.get_tenant_by_id(*id)? {
                Some(t) => t.token,
                None => return Ok(false),
            },
        };
        let wt = self.db.begin_write().map_err(db_err)?;
        let removed = {
            let mut table = wt.open_table(TENANTS).map_err(db_err)?;
            let removed = table.remove(token.as_str()).map_err(db_err)?.is_some();
            removed
        };
        wt.commit().map_err(db_err)?;
        Ok(removed)
    }

    /// Read-modify-write one record inside a single write transaction.
    fn modify(&self, token: &str, f: impl FnOnce(&mut TenantConfig)) -> Result<bool> {
        let wt = self.db.begin_write().map_err(db_err)?;
        let found = {
            let mut table = wt.open_table(TENANTS).map_err(db_err)?;
            let current: Option<TenantConfig> = match table.get(token).map_err(db_err)? {
                Some(v) => Some(serde_json::from_slice(v.value())?),
                None => None,
            };
            match current {
                Some(mut tenant) => {
                    f(&mut tenant);
                    tenant.updated_at = Utc::now();
                    let value = serde_json::to_vec(&tenant)?;
                    table.insert(token, value.as_slice()).map_err(db_err)?;
                    true
                }
                None => false,
            }
        };
        wt.commit().map_err(db_err)?;
        Ok(found)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
