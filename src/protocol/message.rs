//! Request and response envelopes.
//!
//! Both travel as serialized [`Value`] tuples so any [`Serializer`] that can
//! round-trip a `Value` can carry them:
//!
//! ```text
//! request:  [method: Str, args: List, callback: Bool, keep_alive: Bool]
//! response: [status: Str, value]        status in "success" | "failure" | "yield"
//! ```
//!
//! A failure value is a map `{kind, message, trace}` describing a [`RemoteError`].
//!
//! [`Serializer`]: crate::core::serialization::Serializer

use std::fmt;

use crate::core::value::Value;
use crate::error::{constants, ProtocolError, RemoteError, Result};

/// One call, as sent by the client
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    pub args: Vec<Value>,
    /// The client can answer yield frames for this call
    pub callback: bool,
    /// The client will reuse the connection after the response
    pub keep_alive: bool,
}

impl Request {
    pub fn new(method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            args,
            callback: false,
            keep_alive: false,
        }
    }

    pub fn with_callback(mut self, callback: bool) -> Self {
        self.callback = callback;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn to_value(&self) -> Value {
        Value::List(vec![
            Value::Str(self.method.clone()),
            Value::List(self.args.clone()),
            Value::Bool(self.callback),
            Value::Bool(self.keep_alive),
        ])
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let malformed = || ProtocolError::UnexpectedMessage(constants::ERR_MALFORMED_REQUEST.into());

        let Value::List(items) = value else {
            return Err(malformed());
        };
        let [method, args, callback, keep_alive]: [Value; 4] =
            items.try_into().map_err(|_| malformed())?;

        match (method, args, callback, keep_alive) {
            (Value::Str(method), Value::List(args), Value::Bool(callback), Value::Bool(keep_alive)) => {
                Ok(Self {
                    method,
                    args,
                    callback,
                    keep_alive,
                })
            }
            _ => Err(malformed()),
        }
    }
}

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
    Yield,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Failure => "failure",
            Status::Yield => "yield",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Status::Success),
            "failure" => Some(Status::Failure),
            "yield" => Some(Status::Yield),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One server reply: a final result or a yield request
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: Status,
    pub value: Value,
}

impl Response {
    pub fn success(value: Value) -> Self {
        Self {
            status: Status::Success,
            value,
        }
    }

    pub fn failure(err: &RemoteError) -> Self {
        Self {
            status: Status::Failure,
            value: remote_error_to_value(err),
        }
    }

    /// Ask the client to run its callback with `args`
    pub fn yielded(args: Vec<Value>) -> Self {
        Self {
            status: Status::Yield,
            value: Value::List(args),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::List(vec![
            Value::Str(self.status.as_str().to_string()),
            self.value.clone(),
        ])
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let malformed = || ProtocolError::UnexpectedMessage(constants::ERR_MALFORMED_RESPONSE.into());

        let Value::List(items) = value else {
            return Err(malformed());
        };
        let [status, value]: [Value; 2] = items.try_into().map_err(|_| malformed())?;
        let status = status.as_str().and_then(Status::parse).ok_or_else(malformed)?;

        Ok(Self { status, value })
    }

    /// Callback arguments carried by a yield response
    pub fn yield_args(self) -> Vec<Value> {
        match self.value {
            Value::List(args) => args,
            Value::Null => Vec::new(),
            other => vec![other],
        }
    }
}

fn remote_error_to_value(err: &RemoteError) -> Value {
    Value::Map(vec![
        (Value::from("kind"), Value::Str(err.kind.clone())),
        (Value::from("message"), Value::Str(err.message.clone())),
        (
            Value::from("trace"),
            Value::List(err.trace.iter().cloned().map(Value::Str).collect()),
        ),
    ])
}

/// Decode a failure payload. Unknown shapes are kept as text rather than rejected.
pub fn remote_error_from_value(value: Value) -> RemoteError {
    match &value {
        Value::Map(_) => {
            let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
            let trace = match value.get("trace") {
                Some(Value::List(lines)) => lines
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
                _ => Vec::new(),
            };
            RemoteError {
                kind: text("kind").unwrap_or_else(|| "RemoteError".into()),
                message: text("message").unwrap_or_default(),
                trace,
            }
        }
        Value::Str(message) => RemoteError::new("RemoteError", message.clone()),
        other => RemoteError::new("RemoteError", format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_tuple_layout() {
        let req = Request::new("add", vec![Value::from(1i64), Value::from(2i64)])
            .with_keep_alive(true);
        let Value::List(items) = req.to_value() else {
            panic!("request is not a list");
        };
        assert_eq!(items[0], Value::from("add"));
        assert_eq!(items[2], Value::Bool(false));
        assert_eq!(items[3], Value::Bool(true));
        assert_eq!(Request::from_value(Value::List(items)).unwrap(), req);
    }

    #[test]
    fn test_malformed_request_rejected() {
        assert!(Request::from_value(Value::from("add")).is_err());
        assert!(Request::from_value(Value::List(vec![Value::from("add")])).is_err());
        let wrong_types = Value::List(vec![
            Value::from(1i64),
            Value::List(vec![]),
            Value::Bool(false),
            Value::Bool(false),
        ]);
        assert!(matches!(
            Request::from_value(wrong_types),
            Err(ProtocolError::UnexpectedMessage(_))
        ));
    }

    #[test]
    fn test_status_strings() {
        for status in [Status::Success, Status::Failure, Status::Yield] {
            assert_eq!(Status::parse(status.as_str()), Some(status));
        }
        assert_eq!(Status::parse("SUCCESS"), None);
    }

    #[test]
    fn test_failure_keeps_error_details() {
        let err = RemoteError::new("ValueError", "bad input").with_trace("line 3");
        let resp = Response::from_value(Response::failure(&err).to_value()).unwrap();
        assert_eq!(resp.status, Status::Failure);
        assert_eq!(remote_error_from_value(resp.value), err);
    }

    #[test]
    fn test_unknown_status_rejected() {
        let value = Value::List(vec![Value::from("maybe"), Value::Null]);
        assert!(Response::from_value(value).is_err());
    }

    #[test]
    fn test_plain_string_failure_payload() {
        let err = remote_error_from_value(Value::from("boom"));
        assert_eq!(err.kind, "RemoteError");
        assert_eq!(err.message, "boom");
    }
}
