//! Netz NÖ smart-meter portal client.
//!
//! A run goes through four steps, each depending on the previous one:
//! establish a session ([`auth`]), resolve the account and its metering point
//! ([`account`]), then fetch readings ([`consumption`]). The session is an
//! explicit value threaded through every call; persistence between runs is a
//! [`SessionStore`] supplied by the caller.

pub mod account;
pub mod auth;
pub mod consumption;
pub mod error;
pub mod session;

pub use account::{resolve_account, Account, Capabilities};
pub use auth::{authenticate, establish_session, Credentials};
pub use consumption::ConsumptionReader;
pub use error::{Capability, ConsumptionFetchError, SmartMeterError};
pub use session::{FileSessionStore, MemorySessionStore, Session, SessionStore, SessionStoreError};

use reqwest::{header::COOKIE, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

use crate::http::HttpSettings;
use account::{AccountEntry, MeteringPointEntry};

pub const DEFAULT_BASE_URL: &str = "https://smartmeter.netz-noe.at/orchestration";

const LOGIN: &str = "/Authentication/Login";
const BASIC_INFO: &str = "/User/GetBasicInfo";
const ACCOUNTS: &str = "/User/GetAccountIdByBussinespartnerId";
const METERING_POINTS: &str = "/User/GetMeteringPointByAccountId";

/// Portal view the account endpoints are queried in.
const PORTAL_CONTEXT: &str = "2";

#[derive(Serialize)]
struct LoginRequest<'a> {
    user: &'a str,
    pwd: &'a str,
}

/// Stateless HTTP access to the portal endpoints. Session state lives in [`Session`].
#[derive(Debug, Clone)]
pub struct SmartMeterPortal {
    http: reqwest::Client,
    base_url: String,
}

impl SmartMeterPortal {
    pub fn new(base_url: impl Into<String>, settings: &HttpSettings) -> reqwest::Result<Self> {
        Ok(Self::with_client(base_url, settings.build_client()?))
    }

    pub fn with_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) async fn send_get(
        &self,
        session: &Session,
        path: &str,
        query: &[(&str, String)],
    ) -> reqwest::Result<reqwest::Response> {
        let mut request = self.http.get(self.url(path));
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(cookie) = session.cookie_header() {
            request = request.header(COOKIE, cookie);
        }
        request.send().await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        session: &mut Session,
        endpoint: &'static str,
        query: &[(&str, String)],
    ) -> Result<T, SmartMeterError> {
        let response = self
            .send_get(session, endpoint, query)
            .await
            .map_err(|source| SmartMeterError::Http { endpoint, source })?;
        session.absorb(response.headers());

        let status = response.status();
        if !status.is_success() {
            return Err(SmartMeterError::UnexpectedStatus { endpoint, status });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| SmartMeterError::Http { endpoint, source })?;
        serde_json::from_slice(&body).map_err(|source| SmartMeterError::Malformed { endpoint, source })
    }

    /// Submit credentials and return the freshly issued session.
    pub async fn login(&self, credentials: &Credentials) -> Result<Session, SmartMeterError> {
        let body = LoginRequest {
            user: credentials.user(),
            pwd: credentials.password(),
        };
        let response = self
            .http
            .post(self.url(LOGIN))
            .json(&body)
            .send()
            .await
            .map_err(|source| SmartMeterError::Http {
                endpoint: LOGIN,
                source,
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(SmartMeterError::AuthenticationFailed { status });
        }

        let mut session = Session::new();
        session.absorb(response.headers());
        Ok(session)
    }

    /// Lightweight authenticated request used only to test whether `session` is still accepted.
    pub async fn probe(&self, session: &mut Session) -> Result<(), SmartMeterError> {
        let response = self
            .send_get(session, BASIC_INFO, &[])
            .await
            .map_err(|source| SmartMeterError::Http {
                endpoint: BASIC_INFO,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SmartMeterError::SessionInvalid { status });
        }
        session.absorb(response.headers());
        Ok(())
    }

    pub async fn basic_info(&self, session: &mut Session) -> Result<serde_json::Value, SmartMeterError> {
        self.get_json(session, BASIC_INFO, &[]).await
    }

    pub(crate) async fn accounts(&self, session: &mut Session) -> Result<Vec<AccountEntry>, SmartMeterError> {
        self.get_json(session, ACCOUNTS, &[("context", PORTAL_CONTEXT.to_string())])
            .await
    }

    pub(crate) async fn metering_points(
        &self,
        session: &mut Session,
        account_id: &str,
    ) -> Result<Vec<MeteringPointEntry>, SmartMeterError> {
        self.get_json(
            session,
            METERING_POINTS,
            &[
                ("accountId", account_id.to_string()),
                ("context", PORTAL_CONTEXT.to_string()),
            ],
        )
        .await
    }
}
