//! Per-call session variables.
//!
//! Captured once from `start.customParameters` and turned into the
//! conversation initiation payload. Blank values count as absent so the
//! configured defaults apply.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::core::convai::{
    AgentOverride, ConversationConfigOverride, ConversationInitiation, PromptOverride,
};

/// Default spoken name when the call carries none.
pub const DEFAULT_CALLER_NAME: &str = "there";

/// Default first utterance. `{{name}}` is filled in by the agent backend.
pub const DEFAULT_FIRST_MESSAGE: &str = "Hi {{name}}, how can I help you today?";

/// Default system prompt override.
pub const DEFAULT_PROMPT: &str =
    "You are a friendly voice assistant on a phone call. Keep your answers short and conversational.";

const NAME_KEY: &str = "name";
const CALLER_ID_KEY: &str = "caller_id";
const PROMPT_KEY: &str = "prompt";
const FIRST_MESSAGE_KEY: &str = "first_message";
const AGENT_ID_KEY: &str = "agent_id";

/// Values used when a call leaves a variable unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDefaults {
    pub name: String,
    pub first_message: String,
    pub prompt: String,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            name: DEFAULT_CALLER_NAME.to_string(),
            first_message: DEFAULT_FIRST_MESSAGE.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

/// Customization fields of one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionVariables {
    pub name: Option<String>,
    pub caller_id: Option<String>,
    pub prompt: Option<String>,
    pub first_message: Option<String>,
    /// Per-call agent override
    pub agent_id: Option<String>,
    /// Remaining parameters, forwarded as dynamic variables
    pub extra: BTreeMap<String, String>,
}

impl SessionVariables {
    /// Extract variables from the `customParameters` of a `start` event.
    pub fn from_custom_parameters(params: &HashMap<String, Value>) -> Self {
        let mut vars = SessionVariables::default();

        for (key, value) in params {
            let Some(value) = value_to_string(value) else {
                continue;
            };
            match key.as_str() {
                NAME_KEY => vars.name = non_blank(value),
                CALLER_ID_KEY => vars.caller_id = non_blank(value),
                PROMPT_KEY => vars.prompt = non_blank(value),
                FIRST_MESSAGE_KEY => vars.first_message = non_blank(value),
                AGENT_ID_KEY => vars.agent_id = non_blank(value),
                _ => {
                    vars.extra.insert(key.clone(), value);
                }
            }
        }

        vars
    }

    /// Agent to dial: the per-call override, else `fallback`.
    pub fn agent_id<'a>(&'a self, fallback: Option<&'a str>) -> Option<&'a str> {
        self.agent_id
            .as_deref()
            .or(fallback)
            .filter(|id| !id.trim().is_empty())
    }

    /// Build the initiation payload, filling gaps from `defaults`.
    pub fn to_initiation(&self, defaults: &SessionDefaults) -> ConversationInitiation {
        let mut dynamic_variables = self.extra.clone();
        dynamic_variables.insert(
            NAME_KEY.to_string(),
            self.name.clone().unwrap_or_else(|| defaults.name.clone()),
        );
        if let Some(caller_id) = &self.caller_id {
            dynamic_variables.insert(CALLER_ID_KEY.to_string(), caller_id.clone());
        }

        ConversationInitiation {
            dynamic_variables,
            conversation_config_override: ConversationConfigOverride {
                agent: AgentOverride {
                    prompt: PromptOverride {
                        prompt: self.prompt.clone().unwrap_or_else(|| defaults.prompt.clone()),
                    },
                    first_message: self
                        .first_message
                        .clone()
                        .unwrap_or_else(|| defaults.first_message.clone()),
                },
            },
        }
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
