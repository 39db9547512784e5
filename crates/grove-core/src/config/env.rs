use super::Config;
use crate::secret::Secret;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_llm();
        self.apply_env_overrides_retrieval();
        self.apply_env_overrides_secrets();
    }

    fn apply_env_overrides_llm(&mut self) {
        if let Ok(v) = std::env::var("GROVE_LLM_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.llm.provider = kind;
            } else {
                tracing::warn!("ignoring invalid GROVE_LLM_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("GROVE_LLM_MODEL") {
            self.llm.model = Some(v);
        }
        if let Ok(v) = std::env::var("GROVE_LLM_BASE_URL") {
            self.llm.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("GROVE_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = Some(v);
        }
        if let Ok(v) = std::env::var("GROVE_LLM_TEMPERATURE")
            && let Ok(t) = v.parse::<f32>()
        {
            self.llm.temperature = t;
        }
        if let Ok(v) = std::env::var("GROVE_LLM_MAX_TOKENS")
            && let Ok(n) = v.parse::<u32>()
        {
            self.llm.max_tokens = n;
        }
    }

    fn apply_env_overrides_retrieval(&mut self) {
        if let Ok(v) = std::env::var("GROVE_RETRIEVAL_TOP_K")
            && let Ok(k) = v.parse::<usize>()
        {
            self.retrieval.top_k = k;
        }
        if let Ok(v) = std::env::var("GROVE_VECTOR_BACKEND") {
            if let Ok(backend) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.retrieval.vector_backend = backend;
            } else {
                tracing::warn!("ignoring invalid GROVE_VECTOR_BACKEND value: {v}");
            }
        }
        if let Ok(v) = std::env::var("GROVE_QDRANT_URL") {
            self.retrieval.qdrant_url = v;
        }
        if let Ok(v) = std::env::var("GROVE_SQLITE_PATH") {
            self.index.sqlite_path = v;
        }
        if let Ok(v) = std::env::var("GROVE_MEMORY_RECALL_WINDOW")
            && let Ok(n) = v.parse::<usize>()
        {
            self.memory.recall_window = n;
        }
        if let Ok(v) = std::env::var("GROVE_MEMORY_RECALL_THRESHOLD")
            && let Ok(t) = v.parse::<f64>()
        {
            self.memory.recall_threshold = t.clamp(0.0, 1.0);
        }
        if let Ok(v) = std::env::var("GROVE_TIMEOUT_RETRIEVAL")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.retrieval_seconds = secs;
        }
        if let Ok(v) = std::env::var("GROVE_TIMEOUT_PREPARE")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.prepare_seconds = secs;
        }
        if let Ok(v) = std::env::var("GROVE_TIMEOUT_GENERATION")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.generation_seconds = secs;
        }
    }

    fn apply_env_overrides_secrets(&mut self) {
        let read = |key: &str| {
            std::env::var(key)
                .ok()
                .and_then(|v| Secret::non_blank(&v))
        };
        if let Some(key) = read("GROVE_OPENAI_API_KEY") {
            self.secrets.openai_api_key = Some(key);
        }
        if let Some(key) = read("GROVE_CLAUDE_API_KEY") {
            self.secrets.claude_api_key = Some(key);
        }
        if let Some(key) = read("GROVE_GEMINI_API_KEY") {
            self.secrets.gemini_api_key = Some(key);
        }
    }
}
