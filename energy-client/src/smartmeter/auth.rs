use std::fmt;

use super::{
    account::{resolve_account, Account},
    error::SmartMeterError,
    session::{Session, SessionStore},
    SmartMeterPortal,
};

/// Portal login credentials. The password never shows up in `Debug` output.
#[derive(Clone)]
pub struct Credentials {
    user: String,
    password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Establish a session and resolve the account behind it.
///
/// `metering_point` overrides the metering point lookup when the operator
/// already knows the id.
pub async fn authenticate<S>(
    portal: &SmartMeterPortal,
    store: &S,
    credentials: &Credentials,
    metering_point: Option<&str>,
) -> Result<Account, SmartMeterError>
where
    S: SessionStore + ?Sized,
{
    let session = establish_session(portal, store, credentials).await?;
    resolve_account(portal, session, metering_point).await
}

/// Reuse the stored session if the portal still accepts it, otherwise log in
/// and persist the new one.
pub async fn establish_session<S>(
    portal: &SmartMeterPortal,
    store: &S,
    credentials: &Credentials,
) -> Result<Session, SmartMeterError>
where
    S: SessionStore + ?Sized,
{
    if let Some(mut cached) = load_cached(store) {
        tracing::info!("checking whether the stored session is still valid");
        match portal.probe(&mut cached).await {
            Ok(()) => {
                tracing::info!("stored session is valid");
                return Ok(cached);
            }
            Err(SmartMeterError::SessionInvalid { status }) => {
                tracing::warn!(%status, "stored session is not valid, re-authenticating");
            }
            Err(e) => return Err(e),
        }
    }

    let session = portal.login(credentials).await?;
    tracing::info!(user = credentials.user(), "authenticated against the smart meter portal");

    if let Err(e) = store.save(&session) {
        tracing::warn!(error = %e, "failed to persist session; the next run will log in again");
    }

    Ok(session)
}

fn load_cached<S>(store: &S) -> Option<Session>
where
    S: SessionStore + ?Sized,
{
    match store.load() {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unreadable stored session");
            None
        }
    }
}
