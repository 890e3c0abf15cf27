use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One structured message exchanged with the model, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    User {
        user: String,
    },
    Plan {
        plan: String,
    },
    Output {
        output: String,
    },
    Action {
        function: String,
        #[serde(default, deserialize_with = "scalar_as_string")]
        input: String,
    },
    Observation {
        observation: String,
    },
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("model reply was empty")]
    Empty,
    #[error("model reply is not a valid envelope: {0}")]
    Invalid(#[from] serde_json::Error),
}

impl Envelope {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { user: text.into() }
    }

    pub fn observation(text: impl Into<String>) -> Self {
        Self::Observation {
            observation: text.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Plan { .. } => "plan",
            Self::Output { .. } => "output",
            Self::Action { .. } => "action",
            Self::Observation { .. } => "observation",
        }
    }

    /// Parses exactly one envelope from a raw model reply.
    ///
    /// Surrounding whitespace and a single enclosing Markdown code fence are
    /// tolerated; any other deviation is an error for the caller to correct.
    /// A fence info string such as `json` must be followed by a newline;
    /// on a one-line fence it stays part of the body and fails to parse.
    pub fn parse_reply(raw: &str) -> Result<Self, EnvelopeError> {
        let body = strip_code_fence(raw.trim());
        if body.is_empty() {
            return Err(EnvelopeError::Empty);
        }
        Ok(serde_json::from_str(body)?)
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&encoded)
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(inner) = text
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return text;
    };
    // The opening line may carry an info string such as `json`.
    match inner.split_once('\n') {
        Some((_, body)) => body.trim(),
        None => inner.trim(),
    }
}

fn scalar_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "action input must be a string, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_survives_encode_and_parse() {
        let envelopes = [
            Envelope::user("Add milk and bread"),
            Envelope::Plan {
                plan: "I will call createTodo".to_string(),
            },
            Envelope::Output {
                output: "Todo added successfully".to_string(),
            },
            Envelope::Action {
                function: "createTodo".to_string(),
                input: "Buy milk and bread".to_string(),
            },
            Envelope::observation("7"),
        ];
        for envelope in envelopes {
            let parsed = Envelope::parse_reply(&envelope.to_string()).expect("parse back");
            assert_eq!(parsed, envelope);
        }
    }

    #[test]
    fn encodes_with_type_tag() {
        let encoded = Envelope::Action {
            function: "deleteTodoById".to_string(),
            input: "3".to_string(),
        }
        .to_string();
        let value: Value = serde_json::from_str(&encoded).expect("json");
        assert_eq!(value["type"], "action");
        assert_eq!(value["function"], "deleteTodoById");
        assert_eq!(value["input"], "3");
    }

    #[test]
    fn accepts_numeric_and_missing_action_input() {
        let numeric =
            Envelope::parse_reply(r#"{"type":"action","function":"deleteTodoById","input":7}"#)
                .expect("numeric input");
        assert_eq!(
            numeric,
            Envelope::Action {
                function: "deleteTodoById".to_string(),
                input: "7".to_string(),
            }
        );

        let missing = Envelope::parse_reply(r#"{"type":"action","function":"getAllTodos"}"#)
            .expect("missing input");
        assert_eq!(
            missing,
            Envelope::Action {
                function: "getAllTodos".to_string(),
                input: String::new(),
            }
        );
    }

    #[test]
    fn tolerates_a_single_code_fence() {
        let raw = "```json\n{\"type\":\"output\",\"output\":\"done\"}\n```";
        assert_eq!(
            Envelope::parse_reply(raw).expect("fenced"),
            Envelope::Output {
                output: "done".to_string()
            }
        );

        let bare = "```{\"type\":\"output\",\"output\":\"done\"}```";
        assert!(Envelope::parse_reply(bare).is_ok());

        let info_without_newline = "```json{\"type\":\"output\",\"output\":\"done\"}```";
        assert!(matches!(
            Envelope::parse_reply(info_without_newline),
            Err(EnvelopeError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_malformed_and_ambiguous_replies() {
        assert!(matches!(
            Envelope::parse_reply("   "),
            Err(EnvelopeError::Empty)
        ));
        assert!(Envelope::parse_reply("Sure! I added it.").is_err());
        assert!(Envelope::parse_reply(r#"{"type":"shout","shout":"hi"}"#).is_err());
        assert!(
            Envelope::parse_reply(
                "{\"type\":\"plan\",\"plan\":\"a\"}\n{\"type\":\"output\",\"output\":\"b\"}"
            )
            .is_err()
        );
        assert!(
            Envelope::parse_reply(r#"{"type":"action","function":"createTodo","input":["a"]}"#)
                .is_err()
        );
    }
}
