// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod anthropic;
mod error;
mod gateway;
mod gemini;
mod mock;
mod openai_compat;
mod provider;
mod types;
mod yaml_mock;

pub use anthropic::AnthropicProvider;
pub use error::ModelError;
pub use gateway::ProviderGateway;
pub use gemini::GeminiProvider;
pub use mock::{MockProvider, ScriptedMockProvider};
pub use openai_compat::{AuthStyle, OpenAICompatProvider};
pub use provider::ModelProvider;
pub use types::*;
pub use yaml_mock::YamlMockProvider;
