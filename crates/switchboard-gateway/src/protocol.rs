//! Request and response envelopes exchanged with clients.

use crate::error::GatewayError;
use serde::{Deserialize, Deserializer, Serialize};

/// Positional handler arguments.
pub type Args = Vec<serde_json::Value>;

/// Client request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Client correlation id, echoed verbatim in the response.
    #[serde(default)]
    pub request_id: serde_json::Value,

    /// Target module. `None` selects the built-in handler set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,

    /// Method name.
    pub function: String,

    /// Arguments. Absent or null means none; a non-array is a single argument.
    #[serde(default, deserialize_with = "deserialize_args")]
    pub args: Args,
}

fn deserialize_args<'de, D>(deserializer: D) -> Result<Args, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => Vec::new(),
        serde_json::Value::Array(items) => items,
        other => vec![other],
    })
}

impl RequestEnvelope {
    /// Create a new request for a built-in method.
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            request_id: serde_json::Value::Null,
            module: None,
            function: function.into(),
            args: Vec::new(),
        }
    }

    /// Set the correlation id.
    pub fn with_id(mut self, id: impl Into<serde_json::Value>) -> Self {
        self.request_id = id.into();
        self
    }

    /// Set the target module.
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Set the arguments.
    pub fn with_args(mut self, args: Args) -> Self {
        self.args = args;
        self
    }

    /// Handler arity: the arguments plus the implicit session.
    pub fn arity(&self) -> usize {
        self.args.len() + 1
    }
}

/// Response to a client request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Correlation id copied from the request.
    pub request_id: serde_json::Value,

    /// Whether the call succeeded.
    pub success: bool,

    /// Result (on success, when there is one).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Error message (on failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Machine-readable error code (on failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errcode: Option<String>,
}

impl ResponseEnvelope {
    /// Create a success response with no result.
    pub fn ok(request_id: serde_json::Value) -> Self {
        Self {
            request_id,
            success: true,
            result: None,
            message: None,
            errcode: None,
        }
    }

    /// Create a success response carrying a result.
    pub fn success(request_id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            result: Some(result),
            ..Self::ok(request_id)
        }
    }

    /// Create an error response.
    pub fn error(
        request_id: serde_json::Value,
        message: impl Into<String>,
        errcode: impl Into<String>,
    ) -> Self {
        Self {
            request_id,
            success: false,
            result: None,
            message: Some(message.into()),
            errcode: Some(errcode.into()),
        }
    }

    /// Create an error response from a gateway error.
    pub fn from_error(request_id: serde_json::Value, error: &GatewayError) -> Self {
        Self::error(request_id, error.to_string(), error.errcode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_args_default_to_empty() {
        let req: RequestEnvelope =
            serde_json::from_value(json!({"request_id": 1, "function": "ping"})).unwrap();
        assert!(req.args.is_empty());
        assert!(req.module.is_none());
        assert_eq!(req.arity(), 1);
    }

    #[test]
    fn test_scalar_args_become_single_element() {
        let req: RequestEnvelope = serde_json::from_value(
            json!({"request_id": "a", "function": "set_release", "args": "lunch"}),
        )
        .unwrap();
        assert_eq!(req.args, vec![json!("lunch")]);
        assert_eq!(req.arity(), 2);
    }

    #[test]
    fn test_null_args_are_empty() {
        let req: RequestEnvelope =
            serde_json::from_value(json!({"function": "ping", "args": null})).unwrap();
        assert!(req.args.is_empty());
        assert_eq!(req.request_id, serde_json::Value::Null);
    }

    #[test]
    fn test_response_shapes() {
        let ok = serde_json::to_value(ResponseEnvelope::ok(json!(1))).unwrap();
        assert_eq!(ok, json!({"request_id": 1, "success": true}));

        let with_result =
            serde_json::to_value(ResponseEnvelope::success(json!(2), json!({"a": 1}))).unwrap();
        assert_eq!(
            with_result,
            json!({"request_id": 2, "success": true, "result": {"a": 1}})
        );

        let err = serde_json::to_value(ResponseEnvelope::from_error(
            json!("x"),
            &GatewayError::MethodNotFound("nope/1".into()),
        ))
        .unwrap();
        assert_eq!(err["success"], json!(false));
        assert_eq!(err["errcode"], json!("FUNCTION_NOEXISTS"));
        assert!(err.get("result").is_none());
    }

    #[test]
    fn test_request_id_echoed_verbatim() {
        let id = json!({"nested": [1, "two"]});
        let resp = ResponseEnvelope::ok(id.clone());
        assert_eq!(resp.request_id, id);
    }
}
