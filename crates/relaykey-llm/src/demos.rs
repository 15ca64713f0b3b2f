//! Canned prompts and tool definitions used by the example runner.

use serde_json::json;

use crate::{Provider, ToolDefinition};

pub const FUNCTION_PROMPT: &str = "What's the weather like in Boston today?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Basic,
    Creative,
}

pub fn prompt_for(provider: Provider, kind: PromptKind) -> &'static str {
    match (kind, provider) {
        (PromptKind::Basic, Provider::Google) => "Explain quantum computing in simple terms",
        (PromptKind::Basic, Provider::OpenAi) => {
            "Describe three innovative applications of blockchain beyond cryptocurrency"
        }
        (PromptKind::Basic, Provider::Anthropic) => {
            "What are the ethical considerations of artificial general intelligence?"
        }
        (PromptKind::Basic, Provider::Groq) => {
            "Compare and contrast classical machine learning with deep learning"
        }
        (PromptKind::Creative, Provider::Google) => {
            "Write a short poem about artificial intelligence"
        }
        (PromptKind::Creative, Provider::OpenAi) => {
            "Create a brief science fiction story about robots developing emotions"
        }
        (PromptKind::Creative, Provider::Anthropic) => {
            "Devise a creative solution to reduce plastic waste in oceans"
        }
        (PromptKind::Creative, Provider::Groq) => {
            "Imagine and describe a day in the life of a person living in 2100"
        }
    }
}

pub fn weather_function() -> ToolDefinition {
    ToolDefinition {
        name: "get_weather".into(),
        description: "Get the current weather in a given location".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The city and state, e.g. San Francisco, CA"
                },
                "unit": {
                    "type": "string",
                    "enum": ["celsius", "fahrenheit"],
                    "description": "The temperature unit to use"
                }
            },
            "required": ["location"]
        }),
    }
}
