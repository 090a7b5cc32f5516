//! Newline-delimited JSON protocol.
//!
//! One message per line. The same shapes travel between CLI and daemon and
//! between daemon and page host:
//!
//! ```text
//! -> {"id":"7f0c…","method":"interact","params":{"action":"click","element":{"ref":"e2"}}}
//! <- {"id":"7f0c…","result":{"success":true,"url":"about:blank","title":""}}
//! <- {"id":"7f0c…","error":{"code":"ELEMENT_NOT_FOUND","message":"…","suggestion":"…"}}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::interact::{self, Action, ActionParams};
use crate::selector::ElementSelector;
use crate::snapshot::AriaElement;

/// Longest accepted line, newline excluded.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Methods a page host serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Snapshot,
    Navigate,
    Interact,
    Console,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Snapshot => "snapshot",
            Method::Navigate => "navigate",
            Method::Interact => "interact",
            Method::Console => "console",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "snapshot" => Ok(Method::Snapshot),
            "navigate" => Ok(Method::Navigate),
            "interact" => Ok(Method::Interact),
            "console" => Ok(Method::Console),
            other => Err(ApiError::invalid_request_with_suggestion(
                format!("Unknown method '{}'", other),
                "Methods are snapshot, navigate, interact and console",
            )),
        }
    }
}

/// A request. `method` stays a string so that a request with an unknown
/// method can still be answered under its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default = "empty_params")]
    pub params: Value,
}

fn empty_params() -> Value {
    Value::Object(Default::default())
}

impl Request {
    pub fn new(id: impl Into<String>, method: Method, params: Value) -> Self {
        Self {
            id: id.into(),
            method: method.to_string(),
            params: if params.is_null() { empty_params() } else { params },
        }
    }
}

/// A response carries exactly one of `result` and `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl Response {
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: impl Into<String>, error: ApiError) -> Self {
        Self {
            id: id.into(),
            result: None,
            error: Some(error),
        }
    }

    /// Build a response from a typed outcome.
    pub fn from_result<T: Serialize>(id: impl Into<String>, outcome: Result<T, ApiError>) -> Self {
        let id = id.into();
        match outcome.and_then(|value| {
            serde_json::to_value(value)
                .map_err(|e| ApiError::internal(format!("failed to encode result: {}", e)))
        }) {
            Ok(value) => Self::success(id, value),
            Err(error) => Self::error(id, error),
        }
    }

    pub fn into_result(self) -> Result<Value, ApiError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// A request decoded into its typed form.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Snapshot,
    Navigate(NavigateParams),
    Interact(InteractParams),
    Console,
}

impl Command {
    pub fn from_request(request: &Request) -> Result<Self, ApiError> {
        let method: Method = request.method.parse()?;
        Ok(match method {
            Method::Snapshot => Command::Snapshot,
            Method::Navigate => Command::Navigate(parse_params(method, &request.params)?),
            Method::Interact => {
                let params: InteractParams = parse_params(method, &request.params)?;
                interact::validate(params.action, &params.action_params(), params.element.is_some())?;
                Command::Interact(params)
            }
            Method::Console => Command::Console,
        })
    }

    pub fn method(&self) -> Method {
        match self {
            Command::Snapshot => Method::Snapshot,
            Command::Navigate(_) => Method::Navigate,
            Command::Interact(_) => Method::Interact,
            Command::Console => Method::Console,
        }
    }

    /// Wire form of the parameters.
    pub fn params(&self) -> Value {
        let encoded = match self {
            Command::Navigate(params) => serde_json::to_value(params),
            Command::Interact(params) => serde_json::to_value(params),
            Command::Snapshot | Command::Console => Ok(empty_params()),
        };
        encoded.unwrap_or_else(|_| empty_params())
    }
}

fn parse_params<T: DeserializeOwned>(method: Method, params: &Value) -> Result<T, ApiError> {
    serde_json::from_value(params.clone()).map_err(|e| {
        ApiError::invalid_request(format!("Invalid params for '{}': {}", method, e))
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigateParams {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractParams {
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<ElementSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Append a post-action snapshot to the result.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub snapshot: bool,
}

impl InteractParams {
    pub fn action_params(&self) -> ActionParams<'_> {
        ActionParams {
            text: self.text.as_deref(),
            key: self.key.as_deref(),
            value: self.value.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigateResult {
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractResult {
    pub success: bool,
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elements: Option<Vec<AriaElement>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    pub level: ConsoleLevel,
    /// Milliseconds since the Unix epoch.
    pub ts: i64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleResult {
    pub logs: Vec<ConsoleEntry>,
}
