use serde::{de::Error as _, Deserialize, Deserializer};
use serde_json::Value;

use super::{
    error::{Capability, SmartMeterError},
    session::Session,
    SmartMeterPortal,
};

/// Capability flags the portal reports for an account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub smart_meter: bool,
    pub electricity: bool,
    pub gas: bool,
    pub communicative: bool,
    pub opt_in: bool,
    pub active: bool,
}

impl Capabilities {
    /// First capability missing for 15-minute readings, if any.
    pub fn missing_for_readings(&self) -> Option<Capability> {
        if !self.smart_meter {
            Some(Capability::SmartMeter)
        } else if !self.communicative {
            Some(Capability::Communicative)
        } else if !self.opt_in {
            Some(Capability::OptIn)
        } else {
            None
        }
    }
}

/// A resolved portal account bound to the session it was resolved with.
#[derive(Debug, Clone)]
pub struct Account {
    account_id: String,
    metering_point_id: String,
    capabilities: Capabilities,
    session: Session,
}

impl Account {
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn metering_point_id(&self) -> &str {
        &self.metering_point_id
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Fails unless the metering point has a communicative smart meter with opt-in.
    pub fn ensure_readable(&self) -> Result<(), SmartMeterError> {
        match self.capabilities.missing_for_readings() {
            Some(missing) => Err(SmartMeterError::MissingCapability(missing)),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AccountEntry {
    #[serde(deserialize_with = "identifier")]
    account_id: String,
    #[serde(default, deserialize_with = "flag")]
    has_smart_meter: bool,
    #[serde(default, deserialize_with = "flag")]
    has_electricity: bool,
    #[serde(default, deserialize_with = "flag")]
    has_gas: bool,
    #[serde(default, deserialize_with = "flag")]
    has_communicative: bool,
    #[serde(default, deserialize_with = "flag")]
    has_opt_in: bool,
    #[serde(default, deserialize_with = "flag")]
    has_active: bool,
}

impl AccountEntry {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            smart_meter: self.has_smart_meter,
            electricity: self.has_electricity,
            gas: self.has_gas,
            communicative: self.has_communicative,
            opt_in: self.has_opt_in,
            active: self.has_active,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MeteringPointEntry {
    #[serde(deserialize_with = "identifier")]
    metering_point_id: String,
}

/// The portal reports flags as booleans or as strings; null means "not set".
fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    match Value::deserialize(d)? {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(b),
        Value::Number(n) => Ok(n.as_f64().is_some_and(|v| v != 0.0)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" | "" => Ok(false),
            other => Err(D::Error::custom(format!("invalid flag value {other:?}"))),
        },
        other => Err(D::Error::custom(format!("invalid flag value {other}"))),
    }
}

fn identifier<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) if !s.trim().is_empty() => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("invalid identifier {other}"))),
    }
}

/// Resolve account identity, capabilities and metering point for `session`.
///
/// Each portal call depends on the previous one. Only the first account and
/// the first metering point are used.
pub async fn resolve_account(
    portal: &SmartMeterPortal,
    mut session: Session,
    metering_point: Option<&str>,
) -> Result<Account, SmartMeterError> {
    let info = portal.basic_info(&mut session).await?;
    tracing::debug!(basic_info = %info, "fetched basic user info");

    let entry = portal
        .accounts(&mut session)
        .await?
        .into_iter()
        .next()
        .ok_or(SmartMeterError::NoAccountData)?;

    let metering_point_id = match metering_point {
        Some(id) => {
            tracing::info!(metering_point = id, "using configured metering point");
            id.to_string()
        }
        None => {
            portal
                .metering_points(&mut session, &entry.account_id)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| SmartMeterError::NoMeteringPoint {
                    account_id: entry.account_id.clone(),
                })?
                .metering_point_id
        }
    };

    let account = Account {
        capabilities: entry.capabilities(),
        account_id: entry.account_id,
        metering_point_id,
        session,
    };
    tracing::info!(
        account_id = account.account_id(),
        metering_point = account.metering_point_id(),
        "resolved smart meter account"
    );

    Ok(account)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smartmeter::test_support::{portal, session_with};
    use mockito::Matcher;

    async fn mock_basic_info(server: &mut mockito::Server) -> mockito::Mock {
        server
            .mock("GET", "/User/GetBasicInfo")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"firstName": "Alice", "lastName": "Example"}"#)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn resolves_first_account_and_metering_point() {
        let mut server = mockito::Server::new_async().await;
        mock_basic_info(&mut server).await;

        server
            .mock("GET", "/User/GetAccountIdByBussinespartnerId")
            .match_query(Matcher::UrlEncoded("context".into(), "2".into()))
            .match_header("cookie", "SESSION=s1")
            .with_status(200)
            .with_body(
                r#"[
                    {"accountId": "A1", "hasSmartMeter": true, "hasElectricity": true,
                     "hasGas": false, "hasCommunicative": "true", "hasOptIn": true, "hasActive": true},
                    {"accountId": "A2", "hasSmartMeter": false}
                ]"#,
            )
            .create_async()
            .await;
        let points = server
            .mock("GET", "/User/GetMeteringPointByAccountId")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("accountId".into(), "A1".into()),
                Matcher::UrlEncoded("context".into(), "2".into()),
            ]))
            .with_status(200)
            .with_body(r#"[{"meteringPointId": "M1"}, {"meteringPointId": "M2"}]"#)
            .create_async()
            .await;

        let account = resolve_account(&portal(server.url()), session_with("SESSION", "s1"), None)
            .await
            .unwrap();

        points.assert_async().await;
        assert_eq!(account.account_id(), "A1");
        assert_eq!(account.metering_point_id(), "M1");
        assert_eq!(
            account.capabilities(),
            Capabilities {
                smart_meter: true,
                electricity: true,
                gas: false,
                communicative: true,
                opt_in: true,
                active: true,
            }
        );
        assert!(account.ensure_readable().is_ok());
        assert_eq!(account.session().cookie("SESSION"), Some("s1"));
    }

    #[tokio::test]
    async fn empty_account_list_is_no_account_data() {
        let mut server = mockito::Server::new_async().await;
        mock_basic_info(&mut server).await;

        server
            .mock("GET", "/User/GetAccountIdByBussinespartnerId")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        let points = server
            .mock("GET", "/User/GetMeteringPointByAccountId")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let result = resolve_account(&portal(server.url()), Session::new(), None).await;

        assert!(matches!(result, Err(SmartMeterError::NoAccountData)));
        points.assert_async().await;
    }

    #[tokio::test]
    async fn empty_metering_point_list_is_fatal() {
        let mut server = mockito::Server::new_async().await;
        mock_basic_info(&mut server).await;

        server
            .mock("GET", "/User/GetAccountIdByBussinespartnerId")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"[{"accountId": "A1", "hasSmartMeter": true}]"#)
            .create_async()
            .await;
        server
            .mock("GET", "/User/GetMeteringPointByAccountId")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let result = resolve_account(&portal(server.url()), Session::new(), None).await;

        assert!(matches!(
            result,
            Err(SmartMeterError::NoMeteringPoint { account_id }) if account_id == "A1"
        ));
    }

    #[tokio::test]
    async fn configured_metering_point_skips_lookup() {
        let mut server = mockito::Server::new_async().await;
        mock_basic_info(&mut server).await;

        server
            .mock("GET", "/User/GetAccountIdByBussinespartnerId")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"[{"accountId": 4711, "hasSmartMeter": true, "hasCommunicative": true, "hasOptIn": null}]"#)
            .create_async()
            .await;
        let points = server
            .mock("GET", "/User/GetMeteringPointByAccountId")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let account = resolve_account(&portal(server.url()), Session::new(), Some("AT0020000000000000000000000123456"))
            .await
            .unwrap();

        points.assert_async().await;
        assert_eq!(account.account_id(), "4711");
        assert_eq!(account.metering_point_id(), "AT0020000000000000000000000123456");
        assert!(matches!(
            account.ensure_readable(),
            Err(SmartMeterError::MissingCapability(Capability::OptIn))
        ));
    }

    #[tokio::test]
    async fn account_lookup_http_error_is_fatal() {
        let mut server = mockito::Server::new_async().await;
        mock_basic_info(&mut server).await;

        server
            .mock("GET", "/User/GetAccountIdByBussinespartnerId")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let result = resolve_account(&portal(server.url()), Session::new(), None).await;

        assert!(matches!(
            result,
            Err(SmartMeterError::UnexpectedStatus { status, .. }) if status.as_u16() == 503
        ));
    }

    #[test]
    fn capabilities_report_first_missing_flag() {
        let none = Capabilities::default();
        assert_eq!(none.missing_for_readings(), Some(Capability::SmartMeter));

        let not_communicative = Capabilities {
            smart_meter: true,
            ..Capabilities::default()
        };
        assert_eq!(
            not_communicative.missing_for_readings(),
            Some(Capability::Communicative)
        );
    }
}
