//! Request/response vocabulary shared by the bridge and its transports

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::executor::CancelToken;

/// One bridge operation with its arguments.
///
/// Node paths and parameter names are opaque; they are forwarded, never parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Request {
    ListNodes {
        document: PathBuf,
    },
    ListParameters {
        document: PathBuf,
        node: String,
    },
    GetParameterValue {
        document: PathBuf,
        node: String,
        parameter: String,
    },
    SetParameterValue {
        document: PathBuf,
        node: String,
        parameter: String,
        value: String,
    },
}

impl Request {
    pub fn document(&self) -> &Path {
        match self {
            Request::ListNodes { document }
            | Request::ListParameters { document, .. }
            | Request::GetParameterValue { document, .. }
            | Request::SetParameterValue { document, .. } => document,
        }
    }

    /// Stable name used in logs and errors
    pub fn operation(&self) -> &'static str {
        match self {
            Request::ListNodes { .. } => "listNodes",
            Request::ListParameters { .. } => "listParameters",
            Request::GetParameterValue { .. } => "getParameterValue",
            Request::SetParameterValue { .. } => "setParameterValue",
        }
    }
}

/// Result of evaluating one parameter.
///
/// `Unavailable` means the interpreter produced no value block, which is
/// different from a value whose text happens to be "N/A".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum ParameterReading {
    Value(String),
    Unavailable,
}

impl ParameterReading {
    pub fn as_value(&self) -> Option<&str> {
        match self {
            ParameterReading::Value(v) => Some(v),
            ParameterReading::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, ParameterReading::Value(_))
    }
}

impl fmt::Display for ParameterReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterReading::Value(v) => f.write_str(v),
            ParameterReading::Unavailable => f.write_str("N/A"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Response {
    Nodes(Vec<String>),
    Parameters(Vec<String>),
    Value(ParameterReading),
    Saved,
}

/// Typed view of a [`Response`] for one operation
pub trait FromResponse: Sized {
    fn from_response(response: Response, operation: &'static str) -> Result<Self>;
}

impl FromResponse for Response {
    fn from_response(response: Response, _operation: &'static str) -> Result<Self> {
        Ok(response)
    }
}

/// Node and parameter listings share a representation
impl FromResponse for Vec<String> {
    fn from_response(response: Response, operation: &'static str) -> Result<Self> {
        match response {
            Response::Nodes(names) | Response::Parameters(names) => Ok(names),
            _ => Err(BridgeError::UnexpectedResponse { operation }),
        }
    }
}

impl FromResponse for ParameterReading {
    fn from_response(response: Response, operation: &'static str) -> Result<Self> {
        match response {
            Response::Value(reading) => Ok(reading),
            _ => Err(BridgeError::UnexpectedResponse { operation }),
        }
    }
}

impl FromResponse for () {
    fn from_response(response: Response, operation: &'static str) -> Result<Self> {
        match response {
            Response::Saved => Ok(()),
            _ => Err(BridgeError::UnexpectedResponse { operation }),
        }
    }
}

/// Executes one request against a document and blocks until it finishes.
///
/// Implementations must stop work promptly once `cancel` fires and must not
/// retry on failure. The bridge calls a transport from one worker thread per
/// document, so calls for different documents can overlap.
pub trait Transport: Send + Sync + 'static {
    fn call(&self, request: &Request, cancel: &CancelToken) -> Result<Response>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn call(&self, request: &Request, cancel: &CancelToken) -> Result<Response> {
        (**self).call(request, cancel)
    }
}
