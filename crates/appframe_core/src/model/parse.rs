//! Response parsing shared by records and collections.

use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// JSON deserialization failure for a textual response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid JSON response at line {} column {}: {}",
            self.line, self.column, self.message
        )
    }
}

impl Error for ParseError {}

impl From<serde_json::Error> for ParseError {
    fn from(value: serde_json::Error) -> Self {
        Self {
            message: value.to_string(),
            line: value.line(),
            column: value.column(),
        }
    }
}

/// Deserializes textual input; any other value passes through unchanged.
pub fn parse_response(raw: &Value) -> Result<Value, ParseError> {
    match raw {
        Value::String(text) => Ok(serde_json::from_str(text)?),
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::parse_response;
    use serde_json::json;

    #[test]
    fn parses_text_into_structured_data() {
        let parsed = parse_response(&json!(r#"{"foo": "bar"}"#)).unwrap();
        assert_eq!(parsed, json!({"foo": "bar"}));
    }

    #[test]
    fn passes_structured_input_through() {
        let array = json!(["foo", "bar"]);
        assert_eq!(parse_response(&array).unwrap(), array);

        let object = json!({"foo": "bar"});
        assert_eq!(parse_response(&object).unwrap(), object);
    }

    #[test]
    fn reports_position_for_invalid_text() {
        let err = parse_response(&json!("moo")).unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.to_string().contains("invalid JSON response"));
    }
}
