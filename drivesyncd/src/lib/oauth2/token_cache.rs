use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use oauth2::{AccessToken, RefreshToken, Scope, TokenResponse, TokenType};
use serde::{Deserialize, Serialize};

use crate::PersistCache;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenEntry {
    scopes: Vec<Scope>,
    access_token: AccessToken,
    refresh_token: Option<RefreshToken>,
    expiration: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub enum CacheResult {
    None,
    Expired(RefreshToken, Vec<Scope>),
    Ok(AccessToken),
}

#[derive(Debug, Default)]
pub struct TokenStore {
    entries: Vec<TokenEntry>,
}

impl TokenStore {
    /// Attempts to read the store from disk.
    /// Returns `Ok(None)` if the file doesn't exist,
    /// and `Err` if it exists but can't be deserialized.
    async fn try_read_from_disk(path: &Utf8Path) -> anyhow::Result<Option<Self>> {
        let json = match tokio::fs::read_to_string(path).await {
            Ok(json) => json,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        log::info!("read cached tokens from {path}");
        let entries = serde_json::from_str(&json)?;
        Ok(Some(TokenStore { entries }))
    }

    async fn write_to_disk(&self, path: &Utf8Path) -> anyhow::Result<()> {
        log::debug!("caching tokens to {path}");
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Inserts the token of a response.
    /// `scopes` are used if the response doesn't list them,
    /// `refresh_token` if the response doesn't carry a new one.
    pub fn insert<T, TT>(&mut self, tok: &T, scopes: &[Scope], refresh_token: Option<RefreshToken>)
    where
        T: TokenResponse<TT>,
        TT: TokenType,
    {
        let mut scopes = tok.scopes().cloned().unwrap_or_else(|| scopes.to_vec());
        scopes.sort_unstable_by(|a, b| a.as_str().cmp(b.as_str()));
        scopes.dedup();
        log::trace!("inserting token for scopes {scopes:?}");

        let expiration = tok
            .expires_in()
            .and_then(|exp| chrono::Duration::from_std(exp).ok())
            .map(|exp| Utc::now() + exp);
        let entry = TokenEntry {
            scopes,
            access_token: tok.access_token().clone(),
            refresh_token: tok.refresh_token().cloned().or(refresh_token),
            expiration,
        };
        self.emplace_entry(entry);
    }

    fn emplace_entry(&mut self, token: TokenEntry) {
        match self.entries.iter_mut().find(|ent| ent.scopes == token.scopes) {
            Some(ent) => *ent = token,
            None => self.entries.push(token),
        }
    }

    pub fn get(&self, scopes: &[Scope]) -> CacheResult {
        // Only a handful of scope combinations are ever used,
        // the first entry covering all required scopes is taken.
        let Some(ent) = self
            .entries
            .iter()
            .find(|ent| scopes.iter().all(|s| ent.scopes.contains(s)))
        else {
            return CacheResult::None;
        };
        match (ent.expiration, &ent.refresh_token) {
            (Some(expiration), Some(refresh_token)) if expiration < Utc::now() => {
                CacheResult::Expired(refresh_token.clone(), ent.scopes.clone())
            }
            (Some(expiration), None) if expiration < Utc::now() => CacheResult::None,
            _ => CacheResult::Ok(ent.access_token.clone()),
        }
    }
}

/// Specifies how the cache should persist tokens
#[derive(Debug, Clone)]
pub enum TokenPersist {
    /// Persist in memory, but start from scratch
    /// each time the program starts
    Memory,
    /// Load from disk when the program starts,
    /// write back each time a token is received.
    MemoryAndDisk(Utf8PathBuf),
}

impl TokenPersist {
    fn try_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::MemoryAndDisk(path) => Some(path),
            Self::Memory => None,
        }
    }
}

#[derive(Debug)]
pub struct TokenCache {
    persist: TokenPersist,
    store: TokenStore,
}

impl TokenCache {
    pub async fn new(persist: TokenPersist) -> anyhow::Result<Self> {
        let store = if let Some(path) = persist.try_path() {
            TokenStore::try_read_from_disk(path).await?
        } else {
            None
        };
        let store = store.unwrap_or_default();
        Ok(TokenCache { persist, store })
    }

    pub fn put<T, TT>(&mut self, tok: &T, scopes: &[Scope], refresh_token: Option<RefreshToken>)
    where
        T: TokenResponse<TT>,
        TT: TokenType,
    {
        log::trace!(
            "Put token for scopes {:?}, expires in {:?}",
            tok.scopes(),
            tok.expires_in()
        );
        self.store.insert(tok, scopes, refresh_token);
    }

    pub fn check(&self, scopes: &[Scope]) -> CacheResult {
        let res = self.store.get(scopes);
        log::trace!(
            "check token for scopes {scopes:?}: {}",
            match &res {
                CacheResult::None => "None",
                CacheResult::Expired(..) => "Expired",
                CacheResult::Ok(..) => "Ok",
            }
        );
        res
    }
}

impl PersistCache for TokenCache {
    async fn persist_cache(&self) -> anyhow::Result<()> {
        if let Some(path) = self.persist.try_path() {
            self.store.write_to_disk(path).await?;
        }
        Ok(())
    }
}
