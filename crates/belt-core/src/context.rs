use serde::{Deserialize, Serialize};

/// One single-turn request to an AI provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    /// System prompt prepended to every request.
    pub system_prompt: String,
    /// The user message.
    pub current_message: String,
    /// Override the provider's default model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Override the provider's default output budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// A structured message for API-based providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMessage {
    /// "user" or "assistant".
    pub role: String,
    /// The message content.
    pub content: String,
}

impl Context {
    /// Create a new context with just a current message and default system prompt.
    pub fn new(message: &str) -> Self {
        Self {
            system_prompt: default_system_prompt(),
            current_message: message.to_string(),
            model: None,
            max_tokens: None,
        }
    }

    /// Create a context with an explicit system prompt.
    pub fn with_system(system_prompt: &str, message: &str) -> Self {
        let mut ctx = Self::new(message);
        ctx.system_prompt = system_prompt.to_string();
        ctx
    }

    /// Convert context to structured API messages.
    ///
    /// Returns `(system_prompt, messages)`. The system prompt is separated
    /// because the Anthropic API requires it outside the messages array.
    pub fn to_api_messages(&self) -> (String, Vec<ApiMessage>) {
        let message = ApiMessage {
            role: "user".to_string(),
            content: self.current_message.clone(),
        };
        (self.system_prompt.clone(), vec![message])
    }
}

/// Default system prompt for the Belt agent.
fn default_system_prompt() -> String {
    "Je bent een behulpzame Nederlandse AI-assistent van Connect Smart. \
     Je antwoordt kort, vriendelijk en in het Nederlands."
        .to_string()
}
