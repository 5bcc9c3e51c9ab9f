//! Provider registry: agent kind → (runner, parser).
//!
//! A flat map, no inheritance — adding a provider is one `register` call.

use std::collections::HashMap;
use std::sync::Arc;

use crate::parsers::{ClaudeStreamParser, CodexStreamParser};
use crate::process::{ProcessRunner, ProcessRunnerConfig};
use crate::traits::{ComponentRunner, StreamParser};

/// One registered provider.
#[derive(Clone)]
pub struct ProviderEntry {
    pub runner: Arc<dyn ComponentRunner>,
    pub parser: Arc<dyn StreamParser>,
}

pub struct RunnerRegistry {
    entries: HashMap<String, ProviderEntry>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registry with the stock providers: `claude` and `codex`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            Arc::new(ProcessRunner::new(ProcessRunnerConfig {
                kind: "claude".into(),
                program: "claude".into(),
                args: vec![
                    "-p".into(),
                    "--output-format".into(),
                    "stream-json".into(),
                    "--verbose".into(),
                ],
                model_flag: Some("--model".into()),
            })),
            Arc::new(ClaudeStreamParser),
        );
        registry.register(
            Arc::new(ProcessRunner::new(ProcessRunnerConfig {
                kind: "codex".into(),
                program: "codex".into(),
                args: vec!["exec".into(), "--json".into()],
                model_flag: Some("--model".into()),
            })),
            Arc::new(CodexStreamParser),
        );
        registry
    }

    /// Register a provider under the runner's kind. Replaces any previous
    /// registration for that kind.
    pub fn register(
        &mut self,
        runner: Arc<dyn ComponentRunner>,
        parser: Arc<dyn StreamParser>,
    ) {
        self.entries
            .insert(runner.kind().to_string(), ProviderEntry { runner, parser });
    }

    pub fn get(&self, agent_kind: &str) -> Option<ProviderEntry> {
        self.entries.get(agent_kind).cloned()
    }

    /// Registered agent kinds, sorted for stable display.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.entries.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

impl Default for RunnerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_claude_and_codex() {
        let registry = RunnerRegistry::with_defaults();
        assert_eq!(registry.kinds(), vec!["claude", "codex"]);
        let entry = registry.get("claude").unwrap();
        assert_eq!(entry.runner.kind(), "claude");
        assert_eq!(entry.parser.provider(), "claude");
    }

    #[test]
    fn unknown_kind_is_none() {
        assert!(RunnerRegistry::with_defaults().get("gemini").is_none());
    }

    #[test]
    fn register_replaces_existing_kind() {
        let mut registry = RunnerRegistry::with_defaults();
        registry.register(
            Arc::new(ProcessRunner::new(ProcessRunnerConfig {
                kind: "claude".into(),
                program: "claude-next".into(),
                args: vec![],
                model_flag: None,
            })),
            Arc::new(ClaudeStreamParser),
        );
        assert_eq!(registry.kinds(), vec!["claude", "codex"]);
    }
}
