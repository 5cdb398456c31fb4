//! Prompt node - one model call per execution
//!
//! Renders the node's prompt template against the run context, then either
//! calls the OpenAI chat-completions API or, in developer mode, simulates
//! the call with a deterministic latency and token estimate. Usage tokens and
//! the accrued dollar amount go to the stats collector; the response lands in
//! the node's own context slot.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::engine::error::ProcessError;
use crate::graph::{Node, NodeKind};

use super::registry::{
    NodeDetails, NodeMetadata, NodeOutputs, NodeProcess, OutputField, ProcessArgs,
};

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Cost per 1K tokens (input, output) in dollars.
fn price_per_1k(model: &str) -> (f64, f64) {
    match model {
        "gpt-4o" => (0.0025, 0.01),
        "gpt-3.5-turbo" => (0.0005, 0.0015),
        _ => (0.0005, 0.0015),
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

struct PromptProcess {
    client: reqwest::Client,
}

#[async_trait]
impl NodeProcess for PromptProcess {
    #[instrument(skip(self, args), fields(node_id = %args.node.id))]
    async fn process(&self, args: ProcessArgs<'_>) -> Result<Vec<Node>, ProcessError> {
        let node = args.node;
        let model = node.data_str("model").unwrap_or(DEFAULT_MODEL).to_string();
        let rendered = render_prompt(node, &args).await?;

        let (response, tokens_in, tokens_out) = if args.config.dev_mode {
            simulate_call(&rendered).await
        } else {
            let key = args
                .config
                .api_key
                .as_deref()
                .ok_or(ProcessError::MissingApiKey)?;
            self.chat(key, &model, &rendered).await?
        };

        args.stats.add_tokens_in(tokens_in);
        args.stats.add_tokens_out(tokens_out);
        let (price_in, price_out) = price_per_1k(&model);
        args.stats.add_amount(
            tokens_in as f64 / 1000.0 * price_in + tokens_out as f64 / 1000.0 * price_out,
        );

        let name = node.name().unwrap_or("hi").to_string();
        let count = args
            .context
            .get_value(&node.id, "count")
            .await
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
            + 1;
        args.context.set(&node.id, "name", json!(name)).await;
        args.context.set(&node.id, "response", json!(response)).await;
        args.context.set(&node.id, "count", json!(count)).await;

        args.stats.log(
            &node.id,
            "prompt node",
            json!({
                "name": name,
                "model": model,
                "tokensIn": tokens_in,
                "tokensOut": tokens_out,
            }),
        );

        Ok(args.candidates.to_vec())
    }
}

impl PromptProcess {
    async fn chat(
        &self,
        api_key: &str,
        model: &str,
        prompt: &str,
    ) -> Result<(String, u64, u64), ProcessError> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(OPENAI_CHAT_URL)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProcessError::ApiStatus {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();
        let usage = parsed.usage.unwrap_or_default();
        Ok((content, usage.prompt_tokens, usage.completion_tokens))
    }
}

/// Render the node's prompt template with `{{node_id.key}}` placeholders
/// resolved from the run context.
async fn render_prompt(node: &Node, args: &ProcessArgs<'_>) -> Result<String, ProcessError> {
    let template = node.data_str("prompt").unwrap_or_default();
    if !template.contains("{{") {
        return Ok(template.to_string());
    }
    let snapshot = args.context.snapshot().await;
    let handlebars = Handlebars::new();
    Ok(handlebars.render_template(template, &snapshot)?)
}

/// Developer-mode stand-in for the model call.
///
/// Latency and token counts are derived from the rendered prompt so reruns
/// of the same graph behave identically.
async fn simulate_call(prompt: &str) -> (String, u64, u64) {
    let tokens_in = estimate_tokens(prompt);
    let tokens_out = tokens_in / 2 + 1;
    let latency = Duration::from_millis((tokens_in * 3).min(1500));
    debug!(?latency, tokens_in, "simulating model call");
    tokio::time::sleep(latency).await;

    let preview: String = prompt.chars().take(48).collect();
    (format!("[dev] echo: {}", preview), tokens_in, tokens_out)
}

/// Rough 4-chars-per-token estimate, matching common tokenizer folklore.
fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64) / 4 + 1
}

fn outputs(node: &Node, slot: &serde_json::Map<String, Value>) -> NodeOutputs {
    let mut outputs = NodeOutputs::new();
    outputs.insert(
        "response".to_string(),
        OutputField {
            title: "Response".to_string(),
            description: node.data_str("model").map(|m| format!("model: {}", m)),
            value: slot.get("response").cloned(),
        },
    );
    outputs.insert(
        "count".to_string(),
        OutputField {
            title: "Executions".to_string(),
            description: None,
            value: slot.get("count").cloned(),
        },
    );
    outputs
}

pub fn details() -> NodeDetails {
    NodeDetails {
        metadata: NodeMetadata {
            kind: NodeKind::Prompt,
            name: "OpenAI Chat Prompt".to_string(),
            description: "Generate a response based on the given prompt".to_string(),
            tags: vec!["llm".to_string(), "openai".to_string()],
            addable: true,
        },
        process: Arc::new(PromptProcess {
            client: reqwest::Client::new(),
        }),
        outputs: Some(outputs),
        on_disconnect: None,
    }
}
