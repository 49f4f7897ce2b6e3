use std::net::SocketAddr;

use drivesync::error;
use http::StatusCode;
use oauth2::{
    basic::BasicTokenResponse, AuthorizationCode, CsrfToken, PkceCodeChallenge, RedirectUrl, Scope,
};
use tokio::{io, net};

use super::{server, Client};

impl Client {
    /// Runs the authorization code flow with PKCE.
    /// The redirect is received by a one-shot server on the loopback interface.
    pub(super) async fn fetch_token_pkce(
        &self,
        scopes: Vec<Scope>,
    ) -> drivesync::Result<BasicTokenResponse> {
        log::info!("Starting PKCE flow for scopes {scopes:?}");

        let addr: SocketAddr = ([127, 0, 0, 1], 0).into();
        let listener = net::TcpListener::bind(&addr).await?;
        let redirect_addr = listener.local_addr()?;

        let redirect_url =
            RedirectUrl::new(format!("http://{redirect_addr}")).map_err(error::auth)?;
        let redirect_url = std::borrow::Cow::Borrowed(&redirect_url);

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (auth_url, csrf_state) = self
            .inner
            .oauth2
            .authorize_url(CsrfToken::new_random)
            .set_redirect_uri(redirect_url.clone())
            .add_scopes(scopes)
            .add_extra_param("access_type", "offline")
            .set_pkce_challenge(pkce_challenge)
            .url();

        log::info!("Opening browser to {auth_url}");
        println!("Authorize drivesync by visiting the following link:\n{auth_url}\n");
        tokio::task::spawn_blocking(move || webbrowser::open(auth_url.as_str()));

        log::trace!("waiting for redirect on {redirect_addr}");
        let (socket, addr) = listener.accept().await?;

        log::trace!("incoming request from {addr}");
        let (reader, writer) = io::split(socket);
        let reader = io::BufReader::new(reader);
        let uri = server::read_request(reader).await?;

        let auth_url = self.inner.oauth2.auth_url().as_str();
        if let Some(err) = server::query_value(&uri, "error") {
            server::write_response(writer, StatusCode::FORBIDDEN, "Authorization was denied")
                .await?;
            drivesync::auth_bail!("{auth_url} returned an error: {err}");
        }
        let code = server::query_value(&uri, "code")
            .map(AuthorizationCode::new)
            .ok_or_else(|| drivesync::auth_error!("'code' was not returned by {auth_url}"))?;
        let state = server::query_value(&uri, "state")
            .ok_or_else(|| drivesync::auth_error!("'state' was not returned by {auth_url}"))?;

        if state != *csrf_state.secret() {
            log::error!("Failed PKCE challenge");
            server::write_response(
                writer,
                StatusCode::UNAUTHORIZED,
                "Could not verify the CSRF token :-(",
            )
            .await?;
            drivesync::auth_bail!("Could not verify the CSRF token");
        }

        log::trace!("exchanging code for token");

        let token_response = self
            .inner
            .oauth2
            .exchange_code(code)
            .set_pkce_verifier(pkce_verifier)
            .set_redirect_uri(redirect_url)
            .request_async(|req| async { self.http(req).await })
            .await
            .map_err(error::auth)?;

        server::write_response(
            writer,
            StatusCode::OK,
            "All good, you can close this window ;-)",
        )
        .await?;

        Ok(token_response)
    }
}
