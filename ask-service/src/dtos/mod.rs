use serde::{Deserialize, Serialize};

/// Body of `POST /ask`. `question` is kept loosely typed so that a missing,
/// null, or non-string value is reported as one validation error.
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: Option<serde_json::Value>,
}

impl AskRequest {
    /// The question when it is a non-empty string.
    pub fn question(&self) -> Option<&str> {
        match &self.question {
            Some(serde_json::Value::String(q)) if !q.is_empty() => Some(q),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskResponse {
    pub response: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> AskRequest {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn only_non_empty_strings_are_questions() {
        assert_eq!(parse(r#"{"question":"What is a heap?"}"#).question(), Some("What is a heap?"));
        assert_eq!(parse(r#"{"question":" "}"#).question(), Some(" "));
        assert_eq!(parse(r#"{"question":""}"#).question(), None);
        assert_eq!(parse(r#"{"question":null}"#).question(), None);
        assert_eq!(parse(r#"{"question":42}"#).question(), None);
        assert_eq!(parse(r#"{}"#).question(), None);
    }
}
