use std::fmt;

use reqwest::StatusCode;

/// Account capabilities that must all be present before readings can be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    SmartMeter,
    Communicative,
    OptIn,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SmartMeter => "no smart meter is installed",
            Self::Communicative => "the smart meter is installed but not communicative",
            Self::OptIn => "the 15-minute opt-in is not enabled",
        };
        f.write_str(s)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SmartMeterError {
    #[error("authentication failed: username or password not accepted (HTTP {status})")]
    AuthenticationFailed { status: StatusCode },
    #[error("stored session rejected by the portal (HTTP {status})")]
    SessionInvalid { status: StatusCode },
    #[error("the portal returned no account data for this user")]
    NoAccountData,
    #[error("the portal returned no metering point for account {account_id}")]
    NoMeteringPoint { account_id: String },
    #[error("metering point cannot be read: {0}")]
    MissingCapability(Capability),
    #[error("{endpoint} returned HTTP {status}")]
    UnexpectedStatus {
        endpoint: &'static str,
        status: StatusCode,
    },
    #[error("{endpoint} returned a malformed body: {source}")]
    Malformed {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("request to {endpoint} failed: {source}")]
    Http {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

/// Failure of a single consumption query. Never fatal to a run.
#[derive(thiserror::Error, Debug)]
pub enum ConsumptionFetchError {
    #[error("consumption request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("consumption endpoint returned HTTP {0}")]
    Status(StatusCode),
    #[error("consumption response is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("consumption response contains no series")]
    MissingSeries,
    #[error("consumption response is missing `{0}`")]
    MissingField(&'static str),
    #[error("consumption response pairs {times} timestamps with {values} values")]
    LengthMismatch { times: usize, values: usize },
    #[error("invalid reading timestamp {raw:?}: {reason}")]
    InvalidTimestamp { raw: String, reason: String },
    #[error("account is not readable: {0}")]
    NotReadable(Capability),
}
