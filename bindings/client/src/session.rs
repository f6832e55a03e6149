use std::sync::Arc;

use reqwest::{redirect, Method, RequestBuilder};
use serde::Serialize;
use truapi_core::prelude::{LaunchError, LaunchResult};
use url::Url;

use crate::error::handle_http_err;

/// The remote service rejects bad credentials with a redirect loop, so a small limit turns that
/// into a fast failure instead of a hang.
const MAX_REDIRECTS: usize = 5;

/// Where and as whom to connect.
#[derive(Clone)]
pub struct ConnectionOptions {
    /// Base URL of the service. Normalised to end with `/` so that API paths join beneath it.
    pub base_url: Url,
    pub tenant_id: String,
    pub username: String,
    pub password: String,
    pub proxy: Option<String>,
}

impl ConnectionOptions {
    pub fn new(
        base_url: &str,
        tenant_id: &str,
        username: &str,
        password: &str,
        proxy: Option<String>,
    ) -> LaunchResult<Self> {
        let normalised = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalised).map_err(|e| {
            LaunchError::config("--url", format!("invalid base url `{base_url}`: {e}"))
        })?;

        Ok(Self {
            base_url,
            tenant_id: tenant_id.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            proxy,
        })
    }
}

impl std::fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("base_url", &self.base_url.as_str())
            .field("tenant_id", &self.tenant_id)
            .field("username", &self.username)
            .field("proxy", &self.proxy)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct Credentials<'a> {
    user: &'a str,
    password: &'a str,
}

/// An authenticated connection to the service.
///
/// The cookie jar populated at login is shared by every clone, so the session can be handed to
/// concurrent calls and to the run reporter without synchronisation.
#[derive(Debug, Clone)]
pub struct Session {
    http: reqwest::Client,
    options: Arc<ConnectionOptions>,
}

impl Session {
    /// Authenticate against the service and keep the resulting cookies for later calls.
    pub async fn login(options: ConnectionOptions) -> LaunchResult<Self> {
        let session = Self::unauthenticated(options)?;

        log::info!(
            "logging in to {} as {}",
            session.options.base_url,
            session.options.username
        );

        let response = session
            .request(Method::POST, "auth")?
            .json(&Credentials {
                user: &session.options.username,
                password: &session.options.password,
            })
            .send()
            .await
            .map_err(|e| handle_http_err("login", e))?;

        if !response.status().is_success() {
            return Err(LaunchError::Auth {
                hint: format!(
                    "login was rejected with status {}. Please verify you have specified a correct username, password and tenant id.",
                    response.status()
                ),
            });
        }

        log::debug!("logged in to tenant {}", session.options.tenant_id);

        Ok(session)
    }

    /// Build the HTTP stack for a session without authenticating it.
    pub fn unauthenticated(options: ConnectionOptions) -> LaunchResult<Self> {
        let mut builder = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS));

        if let Some(proxy) = &options.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| LaunchError::config("--proxy", format!("invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let http = builder
            .build()
            .map_err(|e| LaunchError::remote("login", None, format!("failed to build client: {e}")))?;

        Ok(Self {
            http,
            options: Arc::new(options),
        })
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    pub fn base_url(&self) -> &Url {
        &self.options.base_url
    }

    pub fn tenant_id(&self) -> &str {
        &self.options.tenant_id
    }

    pub fn proxy(&self) -> Option<&str> {
        self.options.proxy.as_deref()
    }

    /// The full URL of an API path, carrying the tenant identifier.
    pub fn url(&self, path: &str) -> LaunchResult<Url> {
        let mut url = self
            .options
            .base_url
            .join(&format!("api/{path}"))
            .map_err(|e| LaunchError::config("--url", format!("cannot build url for {path}: {e}")))?;
        url.query_pairs_mut()
            .append_pair("TENANTID", &self.options.tenant_id);

        Ok(url)
    }

    pub fn request(&self, method: Method, path: &str) -> LaunchResult<RequestBuilder> {
        let url = self.url(path)?;
        log::debug!("{method} {url}");

        Ok(self.http.request(method, url))
    }
}
