use std::collections::HashMap;
use std::path::PathBuf;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Serialize, Deserialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::api::AppState;
use crate::error::GatewayError;

const KEY_PREFIX: &str = "cgw_";

/// Stored metadata for one API key; the key itself is kept only as a hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyInfo {
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,

    #[serde(default)]
    pub usage_count: u64,

    #[serde(default = "default_active")]
    pub active: bool,

    #[serde(default)]
    pub revoked_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

/// File-backed API key storage. Keys are hashed at rest; the plaintext is
/// returned exactly once, at generation time.
pub struct ApiKeyStore {
    path: PathBuf,
    keys: Mutex<HashMap<String, ApiKeyInfo>>,
}

fn hash_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

fn generate_key() -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(43)
        .map(char::from)
        .collect();
    format!("{KEY_PREFIX}{token}")
}

impl ApiKeyStore {
    /// Open the store, loading any existing key file
    pub async fn open(path: PathBuf) -> anyhow::Result<Self> {
        let keys = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!("Ignoring unreadable key file {}: {}", path.display(), e);
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };

        Ok(Self {
            path,
            keys: Mutex::new(keys),
        })
    }

    async fn persist(&self, keys: &HashMap<String, ApiKeyInfo>) -> Result<(), GatewayError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| GatewayError::Internal(format!("failed to create key dir: {e}")))?;
        }

        let contents = serde_json::to_string_pretty(keys)
            .map_err(|e| GatewayError::Internal(format!("failed to serialize keys: {e}")))?;

        tokio::fs::write(&self.path, contents)
            .await
            .map_err(|e| GatewayError::Internal(format!("failed to write key file: {e}")))?;

        Ok(())
    }

    /// Create a new key. Returns the plaintext key and its metadata.
    pub async fn generate(
        &self,
        name: String,
        description: String,
        expires_in_days: Option<i64>,
    ) -> Result<(String, ApiKeyInfo), GatewayError> {
        let api_key = generate_key();
        let key_hash = hash_key(&api_key);

        let info = ApiKeyInfo {
            name,
            description,
            created_at: Utc::now(),
            expires_at: expires_in_days.map(|days| Utc::now() + Duration::days(days)),
            last_used: None,
            usage_count: 0,
            active: true,
            revoked_at: None,
        };

        let mut keys = self.keys.lock().await;
        keys.insert(key_hash, info.clone());
        self.persist(&keys).await?;

        Ok((api_key, info))
    }

    /// All stored keys with their hashes, newest first
    pub async fn list(&self) -> Vec<(String, ApiKeyInfo)> {
        let keys = self.keys.lock().await;
        let mut entries: Vec<(String, ApiKeyInfo)> = keys
            .iter()
            .map(|(hash, info)| (hash.clone(), info.clone()))
            .collect();
        entries.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at));
        entries
    }

    /// Mark a key inactive; the entry is kept for auditing
    pub async fn revoke(&self, key_hash: &str) -> Result<(), GatewayError> {
        let mut keys = self.keys.lock().await;

        let info = keys
            .get_mut(key_hash)
            .ok_or_else(|| GatewayError::NotFound("API key".to_string()))?;

        info.active = false;
        info.revoked_at = Some(Utc::now());
        self.persist(&keys).await?;

        Ok(())
    }

    /// Verify a plaintext key, updating its usage bookkeeping
    pub async fn verify(&self, api_key: &str) -> Result<ApiKeyInfo, GatewayError> {
        let key_hash = hash_key(api_key);
        let mut keys = self.keys.lock().await;

        let info = match keys.get_mut(&key_hash) {
            Some(info) => info,
            None => return Err(GatewayError::Unauthorized),
        };

        if !info.active {
            return Err(GatewayError::Unauthorized);
        }

        if let Some(expires_at) = info.expires_at {
            if Utc::now() > expires_at {
                return Err(GatewayError::Unauthorized);
            }
        }

        info.last_used = Some(Utc::now());
        info.usage_count += 1;
        let snapshot = info.clone();

        self.persist(&keys).await?;

        Ok(snapshot)
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateKeyRequest {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub expires_in_days: Option<i64>,
}

/// POST /api/v1/auth/generate-key
pub async fn generate_key_handler(
    State(state): State<AppState>,
    Json(request): Json<GenerateKeyRequest>,
) -> Result<Json<Value>, GatewayError> {
    let (api_key, info) = state
        .keys
        .generate(request.name, request.description, request.expires_in_days)
        .await?;

    info!("Generated API key '{}'", info.name);

    Ok(Json(json!({
        "api_key": api_key,
        "name": info.name,
        "description": info.description,
        "created_at": info.created_at,
        "expires_at": info.expires_at,
        "message": "API key generated successfully. Store it securely - it won't be shown again.",
    })))
}

/// GET /api/v1/auth/keys
pub async fn list_keys_handler(State(state): State<AppState>) -> Json<Value> {
    let entries = state.keys.list().await;

    let keys: Vec<Value> = entries
        .iter()
        .map(|(hash, info)| {
            json!({
                "key_hash": format!("{}...", &hash[..16.min(hash.len())]),
                "name": info.name,
                "description": info.description,
                "created_at": info.created_at,
                "expires_at": info.expires_at,
                "last_used": info.last_used,
                "usage_count": info.usage_count,
                "active": info.active,
            })
        })
        .collect();

    Json(json!({ "total": keys.len(), "keys": keys }))
}

/// DELETE /api/v1/auth/keys/{key_hash}
pub async fn revoke_key_handler(
    State(state): State<AppState>,
    Path(key_hash): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    state.keys.revoke(&key_hash).await?;
    Ok(Json(json!({ "message": "API key revoked successfully" })))
}

/// GET /api/v1/auth/verify
pub async fn verify_key_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, GatewayError> {
    let api_key = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok());

    let Some(api_key) = api_key else {
        return Ok(Json(json!({
            "message": "No API key provided",
            "authenticated": false,
        })));
    };

    let info = state.keys.verify(api_key).await?;

    Ok(Json(json!({
        "message": "API key is valid",
        "authenticated": true,
        "key_info": {
            "name": info.name,
            "description": info.description,
            "created_at": info.created_at,
            "expires_at": info.expires_at,
            "usage_count": info.usage_count,
        },
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store() -> (TempDir, ApiKeyStore) {
        let dir = TempDir::new().unwrap();
        let store = ApiKeyStore::open(dir.path().join("api_keys.json"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_generate_and_verify() {
        let (_dir, store) = store().await;

        let (api_key, info) = store
            .generate("ci".to_string(), "pipeline key".to_string(), None)
            .await
            .unwrap();

        assert!(api_key.starts_with(KEY_PREFIX));
        assert_eq!(info.usage_count, 0);

        let verified = store.verify(&api_key).await.unwrap();
        assert_eq!(verified.name, "ci");
        assert_eq!(verified.usage_count, 1);
        assert!(verified.last_used.is_some());
    }

    #[tokio::test]
    async fn test_unknown_key_is_unauthorized() {
        let (_dir, store) = store().await;
        let err = store.verify("cgw_not-a-real-key").await.unwrap_err();
        assert!(matches!(err, GatewayError::Unauthorized));
    }

    #[tokio::test]
    async fn test_revoked_key_is_unauthorized() {
        let (_dir, store) = store().await;

        let (api_key, _) = store
            .generate("temp".to_string(), String::new(), None)
            .await
            .unwrap();
        let key_hash = hash_key(&api_key);

        store.revoke(&key_hash).await.unwrap();
        let err = store.verify(&api_key).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unauthorized));

        // The entry survives for auditing
        let entries = store.list().await;
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].1.active);
    }

    #[tokio::test]
    async fn test_expired_key_is_unauthorized() {
        let (_dir, store) = store().await;

        let (api_key, _) = store
            .generate("old".to_string(), String::new(), Some(-1))
            .await
            .unwrap();

        let err = store.verify(&api_key).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unauthorized));
    }

    #[tokio::test]
    async fn test_revoke_unknown_key() {
        let (_dir, store) = store().await;
        let err = store.revoke("deadbeef").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_keys_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("api_keys.json");

        let store = ApiKeyStore::open(path.clone()).await.unwrap();
        let (api_key, _) = store
            .generate("durable".to_string(), String::new(), None)
            .await
            .unwrap();
        drop(store);

        let reopened = ApiKeyStore::open(path).await.unwrap();
        assert!(reopened.verify(&api_key).await.is_ok());
    }
}
