//! Model descriptor registry.
//!
//! Holds the process-wide table of known model ids, their capabilities,
//! context windows and default latency hints. Any unknown id auto-registers
//! with defaults on first lookup, and fine-tuned ids of the form
//! `ft:<base>:<org>::<suffix>` resolve to the base model's descriptor.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Boolean capability set for a model.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub vision: bool,
    pub reasoning: bool,
    pub tools: bool,
    pub moe: bool,
}

/// A model's static descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub family: String,
    pub capabilities: Capabilities,
    pub context_window: u32,
    pub default_ttft_ms: f64,
    pub default_itl_ms: f64,
}

const DEFAULT_CONTEXT_WINDOW: u32 = 8192;
const DEFAULT_TTFT_MS: f64 = 20.0;
const DEFAULT_ITL_MS: f64 = 5.0;

impl ModelDescriptor {
    fn defaults_for(id: &str) -> Self {
        let family = family_of(id);
        let (context_window, capabilities, ttft, itl) = builtin_profile(&family)
            .unwrap_or((DEFAULT_CONTEXT_WINDOW, Capabilities::default(), DEFAULT_TTFT_MS, DEFAULT_ITL_MS));
        Self {
            id: id.to_string(),
            family,
            capabilities,
            context_window,
            default_ttft_ms: ttft,
            default_itl_ms: itl,
        }
    }
}

/// Extracts the model "family" from an id — everything before the first
/// `-` run of a version suffix is treated loosely; for the builtin table we
/// just match on well-known prefixes.
fn family_of(id: &str) -> String {
    for (prefix, family) in KNOWN_PREFIXES {
        if id.starts_with(prefix) {
            return (*family).to_string();
        }
    }
    id.to_string()
}

const KNOWN_PREFIXES: &[(&str, &str)] = &[
    ("openai/gpt-oss-120b", "gpt-oss"),
    ("openai/gpt-oss-20b", "gpt-oss"),
    ("gpt-4o", "gpt-4o"),
    ("gpt-4", "gpt-4"),
    ("gpt-3.5", "gpt-3.5"),
    ("o1", "o1"),
    ("o3", "o3"),
    ("deepseek-ai/DeepSeek-R1", "deepseek-r1"),
    ("deepseek-ai/DeepSeek-V3", "deepseek-v3"),
    ("meta-llama/Llama-3.1-405B", "llama-3.1-405b"),
    ("meta-llama/Llama-3.1-70B", "llama-3.1-70b"),
    ("meta-llama/Llama-3.1-8B", "llama-3.1-8b"),
    ("mixtral", "mixtral"),
];

/// (context_window, capabilities, default_ttft_ms, default_itl_ms) for known families.
fn builtin_profile(family: &str) -> Option<(u32, Capabilities, f64, f64)> {
    let profile = match family {
        "gpt-oss" => (131072, Capabilities { reasoning: true, tools: true, ..Default::default() }, 30.0, 8.0),
        "gpt-4o" => (128000, Capabilities { vision: true, tools: true, ..Default::default() }, 25.0, 6.0),
        "gpt-4" => (8192, Capabilities { tools: true, ..Default::default() }, 35.0, 10.0),
        "gpt-3.5" => (16385, Capabilities { tools: true, ..Default::default() }, 15.0, 4.0),
        "o1" | "o3" => (200000, Capabilities { reasoning: true, tools: true, ..Default::default() }, 200.0, 15.0),
        "deepseek-r1" => (65536, Capabilities { reasoning: true, moe: true, ..Default::default() }, 150.0, 12.0),
        "deepseek-v3" => (65536, Capabilities { tools: true, moe: true, ..Default::default() }, 40.0, 8.0),
        "llama-3.1-405b" => (131072, Capabilities { tools: true, ..Default::default() }, 60.0, 14.0),
        "llama-3.1-70b" => (131072, Capabilities { tools: true, ..Default::default() }, 30.0, 8.0),
        "llama-3.1-8b" => (131072, Capabilities { tools: true, ..Default::default() }, 10.0, 3.0),
        "mixtral" => (32768, Capabilities { moe: true, tools: true, ..Default::default() }, 20.0, 6.0),
        _ => return None,
    };
    Some(profile)
}

/// Parses a fine-tuned model id `ft:<base>:<org>::<suffix>` and returns the
/// base model id, or `None` if `id` isn't in fine-tuned form.
pub fn fine_tuned_base(id: &str) -> Option<&str> {
    let rest = id.strip_prefix("ft:")?;
    let colon = rest.find(':')?;
    Some(&rest[..colon])
}

/// Process-wide model descriptor registry.
#[derive(Default)]
pub struct ModelRegistry {
    models: DashMap<String, ModelDescriptor>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        let registry = Self { models: DashMap::new() };
        for (prefix, _) in KNOWN_PREFIXES {
            registry.register(ModelDescriptor::defaults_for(prefix));
        }
        registry
    }

    /// Register (or overwrite) a model descriptor explicitly.
    pub fn register(&self, descriptor: ModelDescriptor) {
        self.models.insert(descriptor.id.clone(), descriptor);
    }

    /// Look up a model id, resolving fine-tuned ids to their base and
    /// auto-registering unknown ids with default capabilities.
    pub fn get_or_register(&self, id: &str) -> ModelDescriptor {
        let lookup_id = fine_tuned_base(id).unwrap_or(id);

        if let Some(existing) = self.models.get(lookup_id) {
            return existing.clone();
        }

        let descriptor = ModelDescriptor::defaults_for(lookup_id);
        self.models.insert(lookup_id.to_string(), descriptor.clone());
        descriptor
    }

    /// List all currently-registered descriptors (for `/v1/models`).
    pub fn list(&self) -> Vec<ModelDescriptor> {
        self.models.iter().map(|entry| entry.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fine_tuned_id_resolves_to_base() {
        assert_eq!(fine_tuned_base("ft:gpt-4:my-org::abc123"), Some("gpt-4"));
        assert_eq!(fine_tuned_base("gpt-4"), None);
    }

    #[test]
    fn unknown_model_autoregisters_with_defaults() {
        let registry = ModelRegistry::new();
        let descriptor = registry.get_or_register("some-unheard-of-model");
        assert_eq!(descriptor.context_window, DEFAULT_CONTEXT_WINDOW);
        // Second lookup returns the same registered descriptor.
        let again = registry.get_or_register("some-unheard-of-model");
        assert_eq!(again.context_window, descriptor.context_window);
    }

    #[test]
    fn fine_tuned_model_inherits_base_descriptor() {
        let registry = ModelRegistry::new();
        let base = registry.get_or_register("gpt-4");
        let ft = registry.get_or_register("ft:gpt-4:my-org::abc123");
        assert_eq!(ft.context_window, base.context_window);
        assert_eq!(ft.family, base.family);
    }

    #[test]
    fn known_family_has_larger_context_window() {
        let registry = ModelRegistry::new();
        let descriptor = registry.get_or_register("openai/gpt-oss-120b");
        assert_eq!(descriptor.context_window, 131072);
        assert!(descriptor.capabilities.reasoning);
    }
}
