//! Retrying invoker for schema-constrained and free-form model calls.
//!
//! Transport failures are already retried inside the provider client. This layer
//! handles the other failure mode: a call that completes but yields nothing usable
//! (no content, empty content, JSON that does not match the schema). Both that and
//! any error escaping the provider count as one attempt. Attempts are immediate.

use std::sync::Arc;
use std::time::Duration;

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{ChatMessage, ChatOptions, ChatResponse, LlmClient, MessageContent, ResponseFormat};
use crate::error::{ReportError, Result};

/// Attempt ceiling for a single logical model invocation.
pub const MAX_ATTEMPTS: u32 = 3;

/// A value the model can be asked to produce as structured output.
pub trait StructuredOutput: DeserializeOwned + JsonSchema + Send {
    /// Whether a successfully decoded value is worth returning.
    ///
    /// Values that decode but carry nothing (e.g. an empty list) are retried.
    fn is_usable(&self) -> bool {
        true
    }
}

/// Model invoker shared by every pipeline step.
#[derive(Clone)]
pub struct StructuredInvoker {
    client: Arc<dyn LlmClient>,
    model: String,
    temperature: Option<f64>,
    call_timeout: Option<Duration>,
}

impl StructuredInvoker {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: Some(0.0),
            call_timeout: None,
        }
    }

    /// Bound every individual model call by a deadline.
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask for a value of type `T`, retrying up to [`MAX_ATTEMPTS`] times.
    pub async fn invoke<T: StructuredOutput>(&self, messages: &[ChatMessage]) -> Result<T> {
        let name = T::schema_name();
        let schema = strict_schema::<T>().map_err(|e| {
            ReportError::ModelInvocationExhausted {
                attempts: 0,
                last_error: format!("failed to serialize schema for {}: {}", name, e),
            }
        })?;

        let mut last_error = String::from("no attempts made");

        for attempt in 1..=MAX_ATTEMPTS {
            let options = ChatOptions {
                temperature: self.temperature,
                response_format: Some(ResponseFormat::json_schema(name.clone(), schema.clone())),
                ..Default::default()
            };

            let outcome = match self.call(messages, options).await {
                Ok(response) => decode_structured::<T>(response),
                Err(e) => Err(format!("call failed: {}", e)),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!("{} produced on attempt {}/{}", name, attempt, MAX_ATTEMPTS);
                    }
                    return Ok(value);
                }
                Err(reason) => {
                    tracing::warn!(
                        "Structured call for {} attempt {}/{} unusable: {}",
                        name,
                        attempt,
                        MAX_ATTEMPTS,
                        reason
                    );
                    last_error = reason;
                }
            }
        }

        tracing::error!("Giving up on {} after {} attempts", name, MAX_ATTEMPTS);
        Err(ReportError::ModelInvocationExhausted {
            attempts: MAX_ATTEMPTS,
            last_error,
        })
    }

    /// Free-form completion with the same retry policy as [`Self::invoke`].
    pub async fn invoke_text(&self, messages: &[ChatMessage]) -> Result<MessageContent> {
        let mut last_error = String::from("no attempts made");

        for attempt in 1..=MAX_ATTEMPTS {
            let options = ChatOptions {
                temperature: self.temperature,
                ..Default::default()
            };

            match self.call(messages, options).await {
                Ok(ChatResponse {
                    content: Some(content),
                    ..
                }) if !content.is_empty() => return Ok(content),
                Ok(_) => {
                    tracing::warn!(
                        "Text call attempt {}/{} returned empty content",
                        attempt,
                        MAX_ATTEMPTS
                    );
                    last_error = "empty response".to_string();
                }
                Err(e) => {
                    tracing::warn!("Text call attempt {}/{} failed: {}", attempt, MAX_ATTEMPTS, e);
                    last_error = e.to_string();
                }
            }
        }

        Err(ReportError::ModelInvocationExhausted {
            attempts: MAX_ATTEMPTS,
            last_error,
        })
    }

    async fn call(
        &self,
        messages: &[ChatMessage],
        options: ChatOptions,
    ) -> anyhow::Result<ChatResponse> {
        let fut = self
            .client
            .chat_completion_with_options(&self.model, messages, options);
        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| anyhow::anyhow!("model call exceeded deadline of {:?}", limit))?,
            None => fut.await,
        }
    }
}

/// JSON schema for `T` in the form strict structured-output providers accept.
///
/// Subschemas are inlined, every object is closed with `additionalProperties: false`,
/// every property is listed in `required` (optional fields stay nullable) and
/// `default` keywords are dropped. Decoding stays lenient about missing fields.
pub fn strict_schema<T: JsonSchema>() -> serde_json::Result<Value> {
    let generator = SchemaSettings::draft07()
        .with(|s| s.inline_subschemas = true)
        .into_generator();
    let mut schema = serde_json::to_value(generator.into_root_schema_for::<T>())?;
    if let Value::Object(map) = &mut schema {
        map.remove("$schema");
        map.remove("definitions");
    }
    close_objects(&mut schema);
    Ok(schema)
}

fn close_objects(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("default");
            // Property names are keys, not schema keywords; only their schemas are visited.
            let required = match map.get_mut("properties") {
                Some(Value::Object(props)) => {
                    props.values_mut().for_each(close_objects);
                    Some(props.keys().cloned().map(Value::String).collect::<Vec<_>>())
                }
                _ => None,
            };
            for (key, child) in map.iter_mut() {
                if key != "properties" {
                    close_objects(child);
                }
            }
            if let Some(required) = required {
                map.insert("required".to_string(), Value::Array(required));
                map.insert("additionalProperties".to_string(), Value::Bool(false));
            }
        }
        Value::Array(items) => items.iter_mut().for_each(close_objects),
        _ => {}
    }
}

/// Turn a raw response into a usable `T`, or a reason it is not one.
fn decode_structured<T: StructuredOutput>(response: ChatResponse) -> std::result::Result<T, String> {
    let content = response
        .content
        .ok_or_else(|| "empty response".to_string())?;
    let text = content
        .joined_text()
        .ok_or_else(|| "response has no text parts".to_string())?;
    let json = strip_code_fence(&text);
    if json.is_empty() {
        return Err("empty response".to_string());
    }

    let value: T = serde_json::from_str(json).map_err(|e| format!("invalid JSON: {}", e))?;
    if value.is_usable() {
        Ok(value)
    } else {
        Err("decoded value is empty".to_string())
    }
}

/// Some models wrap JSON in a markdown code fence even when asked not to.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
