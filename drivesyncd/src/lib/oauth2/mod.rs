use std::sync::Arc;

use drivesync::error;
use futures::prelude::*;
use oauth2::{basic::BasicClient, HttpRequest, HttpResponse, TokenResponse};
pub use oauth2::{AccessToken, RefreshToken, Scope};
use tokio::sync::{Mutex, RwLock};

mod pkce;
mod server;
mod token_cache;

pub use self::token_cache::{CacheResult, TokenCache, TokenPersist, TokenStore};
use crate::PersistCache;

pub trait GetToken: Send + Sync + 'static {
    fn get_token(
        &self,
        scopes: Vec<Scope>,
    ) -> impl Future<Output = drivesync::Result<AccessToken>> + Send;
}

#[derive(Debug)]
struct Inner {
    cache: RwLock<TokenCache>,
    lock: Mutex<()>,
    http: reqwest::Client,
    oauth2: BasicClient,
}

/// OAuth2 client for installed applications.
/// Tokens are cached by scopes and refreshed when expired.
/// Without a usable token, the authorization code flow is run in the browser.
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    pub async fn new(
        secret: drivesync::oauth2::Secret,
        persist: TokenPersist,
        http: Option<reqwest::Client>,
    ) -> anyhow::Result<Self> {
        let cache = TokenCache::new(persist).await?;
        let cache = RwLock::new(cache);
        let oauth2 = BasicClient::new(
            secret.client_id,
            Some(secret.client_secret),
            secret.auth_url,
            Some(secret.token_url),
        );
        let http = http.unwrap_or_default();
        let lock = Mutex::new(());

        Ok(Self {
            inner: Arc::new(Inner {
                cache,
                lock,
                http,
                oauth2,
            }),
        })
    }

    async fn refresh_token(
        &self,
        refresh_token: RefreshToken,
        scopes: Vec<Scope>,
    ) -> drivesync::Result<AccessToken> {
        log::info!("Refreshing token for scopes {scopes:?}");

        let token_response = self
            .inner
            .oauth2
            .exchange_refresh_token(&refresh_token)
            .add_scopes(scopes.clone())
            .request_async(|req| async { self.http(req).await })
            .await
            .map_err(error::auth)?;

        let access = token_response.access_token().to_owned();
        self.cache_token(&token_response, &scopes, Some(refresh_token))
            .await?;
        Ok(access)
    }

    async fn auth_code_and_cache(&self, scopes: Vec<Scope>) -> drivesync::Result<AccessToken> {
        let resp = self.fetch_token_pkce(scopes.clone()).await?;
        self.cache_token(&resp, &scopes, None).await?;
        Ok(resp.access_token().clone())
    }

    async fn cache_token<T, TT>(
        &self,
        tok: &T,
        scopes: &[Scope],
        refresh_token: Option<RefreshToken>,
    ) -> drivesync::Result<()>
    where
        T: TokenResponse<TT>,
        TT: oauth2::TokenType,
    {
        let mut cache = self.inner.cache.write().await;
        cache.put(tok, scopes, refresh_token);
        cache.persist_cache().await?;
        Ok(())
    }

    async fn http(&self, req: HttpRequest) -> reqwest::Result<HttpResponse> {
        let method = req.method.clone();
        let url = req.url.clone();

        log::trace!("OAUTH2 HTTP request: {method} {url}");

        let resp = self
            .inner
            .http
            .request(req.method, req.url)
            .headers(req.headers)
            .body(req.body)
            .send()
            .await?;

        let status_code = resp.status();
        let headers = resp.headers().to_owned();
        let body = resp.bytes().await?.to_vec();

        if !status_code.is_success() {
            log::warn!(
                "{method} {url} received error {status_code}: {}",
                String::from_utf8_lossy(&body)
            );
        }

        Ok(HttpResponse {
            status_code,
            headers,
            body,
        })
    }
}

impl GetToken for Client {
    async fn get_token(&self, scopes: Vec<Scope>) -> drivesync::Result<AccessToken> {
        log::trace!("getting token for scopes {scopes:?}");
        let _lock = self.inner.lock.lock().await;
        let cache = self.inner.cache.read().await.check(&scopes);
        match cache {
            CacheResult::Ok(access_token) => Ok(access_token),
            CacheResult::Expired(refresh_token, scopes) => {
                self.refresh_token(refresh_token, scopes.clone())
                    .or_else(|err| {
                        log::warn!("Could not refresh token: {err}");
                        self.auth_code_and_cache(scopes)
                    })
                    .await
            }
            CacheResult::None => self.auth_code_and_cache(scopes).await,
        }
    }
}

impl PersistCache for Client {
    async fn persist_cache(&self) -> anyhow::Result<()> {
        self.inner.cache.read().await.persist_cache().await?;
        Ok(())
    }
}
