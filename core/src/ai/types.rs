use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A fully resolved chat completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Provider params merged into the top level of the payload.
    pub params: Map<String, Value>,
}

impl ChatRequest {
    /// Messages are laid out as system prompt, history turns, then the
    /// user prompt.
    pub fn build(
        model: impl Into<String>,
        prompt: &str,
        system_prompt: Option<&str>,
        history: &[ChatMessage],
        params: Map<String, Value>,
    ) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if let Some(system) = system_prompt.filter(|s| !s.trim().is_empty()) {
            messages.push(ChatMessage::system(system));
        }
        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(prompt));

        Self {
            model: model.into(),
            messages,
            params,
        }
    }

    /// Wire payload. `model`, `messages` and `stream` cannot be overridden
    /// by params.
    pub fn to_payload(&self, stream: bool) -> Value {
        let mut body = Map::new();
        for (k, v) in &self.params {
            body.insert(k.clone(), v.clone());
        }
        body.insert("model".to_string(), json!(self.model));
        body.insert("messages".to_string(), json!(self.messages));
        body.insert("stream".to_string(), json!(stream));
        Value::Object(body)
    }
}

/// One piece of a streamed completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    Delta(String),
    Done { finish_reason: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_ordered_system_history_prompt() {
        let history = vec![ChatMessage::user("q1"), ChatMessage::assistant("a1")];
        let req = ChatRequest::build("m", "q2", Some("be brief"), &history, Map::new());

        let roles: Vec<Role> = req.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(req.messages[3].content, "q2");
    }

    #[test]
    fn params_do_not_override_reserved_keys() {
        let mut params = Map::new();
        params.insert("temperature".into(), json!(0.1));
        params.insert("stream".into(), json!(true));
        let req = ChatRequest::build("m", "hi", None, &[], params);

        let payload = req.to_payload(false);
        assert_eq!(payload["stream"], json!(false));
        assert_eq!(payload["temperature"], json!(0.1));
        assert_eq!(payload["messages"][0]["role"], json!("user"));
    }
}
