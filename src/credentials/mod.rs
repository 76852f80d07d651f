//! Credential store -- tokens, session cookie and user id for the upstream hosts.
//!
//! The record is a flat set of named secrets. Unset fields are empty strings,
//! never absent. Reads are fail-soft: a missing or corrupt backing file
//! yields an empty record so callers see "not configured" instead of an error.

pub mod mask;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::StoreError;

pub use self::mask::mask;

/// Named fields of the credential record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKey {
    /// Bearer token for the reward site.
    RewardToken,
    /// Long-lived identity token used to obtain the reward token.
    IdentityToken,
    /// Connect-flow token that accompanies the identity token.
    ConnectToken,
    /// `session` cookie on the redemption host.
    RedeemSession,
    /// Numeric user id on the redemption host.
    RedeemUserId,
}

impl CredentialKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKey::RewardToken => "bohe_sign_token",
            CredentialKey::IdentityToken => "linux_do_token",
            CredentialKey::ConnectToken => "linux_do_connect_token",
            CredentialKey::RedeemSession => "newapi_session",
            CredentialKey::RedeemUserId => "newapi_user_id",
        }
    }
}

/// The persisted credential record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    #[serde(default)]
    pub bohe_sign_token: String,
    #[serde(default)]
    pub linux_do_connect_token: String,
    #[serde(default)]
    pub linux_do_token: String,
    #[serde(default)]
    pub newapi_session: String,
    #[serde(default)]
    pub newapi_user_id: String,
    /// Keys written by other tools are kept as-is.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl CredentialRecord {
    pub fn get(&self, key: CredentialKey) -> &str {
        match key {
            CredentialKey::RewardToken => &self.bohe_sign_token,
            CredentialKey::IdentityToken => &self.linux_do_token,
            CredentialKey::ConnectToken => &self.linux_do_connect_token,
            CredentialKey::RedeemSession => &self.newapi_session,
            CredentialKey::RedeemUserId => &self.newapi_user_id,
        }
    }

    /// Overwrite only the fields present in `patch`.
    pub fn apply(&mut self, patch: &CredentialPatch) {
        if let Some(v) = &patch.reward_token {
            self.bohe_sign_token = v.clone();
        }
        if let Some(v) = &patch.connect_token {
            self.linux_do_connect_token = v.clone();
        }
        if let Some(v) = &patch.identity_token {
            self.linux_do_token = v.clone();
        }
        if let Some(v) = &patch.redeem_session {
            self.newapi_session = v.clone();
        }
        if let Some(v) = &patch.redeem_user_id {
            self.newapi_user_id = v.clone();
        }
    }
}

/// Partial update. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CredentialPatch {
    pub reward_token: Option<String>,
    pub connect_token: Option<String>,
    pub identity_token: Option<String>,
    pub redeem_session: Option<String>,
    pub redeem_user_id: Option<String>,
}

/// Session cookie and user id for the redemption host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedemptionConfig {
    pub session: String,
    pub user_id: String,
}

impl RedemptionConfig {
    pub fn is_configured(&self) -> bool {
        !self.session.is_empty() && !self.user_id.is_empty()
    }
}

/// Storage contract for the credential record.
///
/// No locking: concurrent writers race and the last write wins.
pub trait CredentialStore: Send + Sync {
    /// Current record. Never fails; unreadable storage yields an empty record.
    fn load(&self) -> CredentialRecord;

    /// Merge `patch` into the stored record and persist it.
    fn try_save(&self, patch: &CredentialPatch) -> Result<(), StoreError>;

    /// Like [`try_save`](Self::try_save) but failures are logged, not raised.
    fn save(&self, patch: &CredentialPatch) {
        if let Err(e) = self.try_save(patch) {
            error!(error = %e, "failed to save credentials");
        }
    }

    fn get(&self, key: CredentialKey) -> String {
        self.load().get(key).to_string()
    }

    fn redemption_config(&self) -> RedemptionConfig {
        let record = self.load();
        RedemptionConfig {
            session: record.newapi_session,
            user_id: record.newapi_user_id,
        }
    }

    /// Persist the redemption session and user id; `false` if the write failed.
    fn save_redemption_config(&self, session: &str, user_id: &str) -> bool {
        let patch = CredentialPatch {
            redeem_session: Some(session.to_string()),
            redeem_user_id: Some(user_id.to_string()),
            ..Default::default()
        };
        match self.try_save(&patch) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "failed to save redemption config");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

/// JSON file store, pretty-printed with four-space indentation.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<CredentialRecord, StoreError> {
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        record.serialize(&mut ser)?;
        fs::write(&self.path, buf)?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> CredentialRecord {
        if self.path.exists() {
            match self.read() {
                Ok(record) => return record,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "credential file unreadable");
                    return CredentialRecord::default();
                }
            }
        }

        debug!(path = %self.path.display(), "initializing empty credential file");
        let record = CredentialRecord::default();
        if let Err(e) = self.write(&record) {
            warn!(path = %self.path.display(), error = %e, "could not create credential file");
        }
        record
    }

    fn try_save(&self, patch: &CredentialPatch) -> Result<(), StoreError> {
        let mut record = self.load();
        record.apply(patch);
        self.write(&record)
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Process-local store, used by tests and dry runs.
#[derive(Default)]
pub struct MemoryCredentialStore {
    record: Mutex<CredentialRecord>,
}

impl MemoryCredentialStore {
    pub fn new(record: CredentialRecord) -> Self {
        Self {
            record: Mutex::new(record),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> CredentialRecord {
        match self.record.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn try_save(&self, patch: &CredentialPatch) -> Result<(), StoreError> {
        let mut guard = self
            .record
            .lock()
            .map_err(|_| StoreError::Invalid("credential lock poisoned".into()))?;
        guard.apply(patch);
        Ok(())
    }
}
