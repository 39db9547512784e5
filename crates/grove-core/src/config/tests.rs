use std::io::Write;

use serial_test::serial;

use super::*;

const ENV_KEYS: [&str; 18] = [
    "GROVE_LLM_PROVIDER",
    "GROVE_LLM_MODEL",
    "GROVE_LLM_BASE_URL",
    "GROVE_LLM_EMBEDDING_MODEL",
    "GROVE_LLM_TEMPERATURE",
    "GROVE_LLM_MAX_TOKENS",
    "GROVE_RETRIEVAL_TOP_K",
    "GROVE_VECTOR_BACKEND",
    "GROVE_QDRANT_URL",
    "GROVE_SQLITE_PATH",
    "GROVE_MEMORY_RECALL_WINDOW",
    "GROVE_MEMORY_RECALL_THRESHOLD",
    "GROVE_TIMEOUT_RETRIEVAL",
    "GROVE_TIMEOUT_PREPARE",
    "GROVE_TIMEOUT_GENERATION",
    "GROVE_OPENAI_API_KEY",
    "GROVE_CLAUDE_API_KEY",
    "GROVE_GEMINI_API_KEY",
];

fn clear_env() {
    for key in ENV_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

fn write_config(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grove.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    write!(f, "{content}").unwrap();
    (dir, path)
}

#[test]
fn defaults() {
    let config = Config::default();
    assert_eq!(config.llm.provider, ProviderKind::OpenAi);
    assert_eq!(config.llm.model(), "gpt-4o-mini");
    assert!((config.llm.temperature - 0.7).abs() < f32::EPSILON);
    assert!((config.llm.top_p - 0.8).abs() < f32::EPSILON);
    assert_eq!(config.llm.top_k, 40);
    assert_eq!(config.llm.max_tokens, 2048);
    assert_eq!(config.retrieval.top_k, 20);
    assert_eq!(config.retrieval.vector_backend, VectorBackend::None);
    assert_eq!(config.memory.recall_window, 3);
    assert!((config.memory.recall_threshold - 0.3).abs() < f64::EPSILON);
    assert_eq!(config.index.max_document_tokens, 8192);
    assert!(config.index.excluded_dirs.contains(&"node_modules".to_owned()));
    assert!((config.scoring.title_phrase - 10.0).abs() < f64::EPSILON);
    assert_eq!(config.timeouts, TimeoutConfig::default());
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn missing_file_uses_defaults() {
    clear_env();
    let config = Config::load(std::path::Path::new("/nonexistent/grove.toml")).unwrap();
    assert_eq!(config.retrieval.top_k, 20);
    assert!(config.secrets.openai_api_key.is_none());
}

#[test]
#[serial]
fn parse_valid_toml() {
    let (_dir, path) = write_config(
        r#"
[llm]
provider = "gemini"
model = "gemini-2.5-flash"
embedding_model = "text-embedding-004"
temperature = 0.2

[retrieval]
top_k = 5
vector_backend = "qdrant"

[memory]
recall_window = 6

[index]
sqlite_path = "./cache.db"
excluded_dirs = ["target"]

[scoring]
title_phrase = 12.0

[timeouts]
generation_seconds = 30
"#,
    );
    clear_env();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.llm.provider, ProviderKind::Gemini);
    assert_eq!(config.llm.model(), "gemini-2.5-flash");
    assert!((config.llm.temperature - 0.2).abs() < f32::EPSILON);
    assert_eq!(config.llm.top_k, 40);
    assert_eq!(config.retrieval.top_k, 5);
    assert_eq!(config.retrieval.vector_backend, VectorBackend::Qdrant);
    assert_eq!(config.retrieval.qdrant_url, "http://localhost:6334");
    assert_eq!(config.memory.recall_window, 6);
    assert!((config.memory.recall_threshold - 0.3).abs() < f64::EPSILON);
    assert_eq!(config.index.sqlite_path, "./cache.db");
    assert_eq!(config.index.excluded_dirs, vec!["target"]);
    assert!((config.scoring.title_phrase - 12.0).abs() < f64::EPSILON);
    assert!((config.scoring.text_phrase - 5.0).abs() < f64::EPSILON);
    assert_eq!(config.timeouts.generation_seconds, 30);
    assert_eq!(config.timeouts.retrieval_seconds, 30);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn invalid_toml_is_an_error() {
    let (_dir, path) = write_config("[llm\nprovider = ");
    clear_env();
    assert!(Config::load(&path).is_err());
}

#[test]
#[serial]
fn env_overrides_file() {
    let (_dir, path) = write_config("[retrieval]\ntop_k = 5\n");
    clear_env();
    unsafe {
        std::env::set_var("GROVE_RETRIEVAL_TOP_K", "9");
        std::env::set_var("GROVE_LLM_PROVIDER", "claude");
        std::env::set_var("GROVE_SQLITE_PATH", ":memory:");
        std::env::set_var("GROVE_MEMORY_RECALL_THRESHOLD", "4.0");
        std::env::set_var("GROVE_CLAUDE_API_KEY", "sk-ant-test");
    }

    let config = Config::load(&path).unwrap();
    clear_env();

    assert_eq!(config.retrieval.top_k, 9);
    assert_eq!(config.llm.provider, ProviderKind::Claude);
    assert_eq!(config.llm.model(), "claude-sonnet-4-5");
    assert_eq!(config.index.sqlite_path, ":memory:");
    assert!((config.memory.recall_threshold - 1.0).abs() < f64::EPSILON);
    assert_eq!(
        config
            .secrets
            .api_key(ProviderKind::Claude)
            .map(crate::secret::Secret::expose),
        Some("sk-ant-test")
    );
    assert!(config.secrets.api_key(ProviderKind::OpenAi).is_none());
}

#[test]
#[serial]
fn invalid_env_values_are_ignored() {
    clear_env();
    unsafe {
        std::env::set_var("GROVE_LLM_PROVIDER", "ollama");
        std::env::set_var("GROVE_RETRIEVAL_TOP_K", "many");
        std::env::set_var("GROVE_OPENAI_API_KEY", "");
    }
    let config = Config::load(std::path::Path::new("/nonexistent/grove.toml")).unwrap();
    clear_env();

    assert_eq!(config.llm.provider, ProviderKind::OpenAi);
    assert_eq!(config.retrieval.top_k, 20);
    assert!(config.secrets.openai_api_key.is_none());
}

#[test]
fn validate_rejects_bad_values() {
    let mut config = Config::default();
    config.retrieval.top_k = 0;
    assert!(matches!(config.validate(), Err(RagError::Configuration(_))));

    let mut config = Config::default();
    config.llm.top_p = 0.0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.timeouts.generation_seconds = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.retrieval.vector_backend = VectorBackend::Memory;
    assert!(config.validate().is_err());
    config.llm.embedding_model = Some("text-embedding-3-small".into());
    assert!(config.validate().is_ok());
    config.llm.provider = ProviderKind::Claude;
    assert!(config.validate().is_err());
}

#[test]
fn params_and_recall_conversions() {
    let config = Config::default();
    assert_eq!(config.llm.params(), grove_llm::GenerationParams::default());
    assert_eq!(config.memory.recall(), grove_memory::RecallConfig::default());
    let indexer = config.index.indexer();
    assert_eq!(indexer.max_tokens, 8192);
}

#[test]
fn serialize_round_trip_skips_secrets() {
    let mut config = Config::default();
    config.secrets.openai_api_key = Some(crate::secret::Secret::new("sk-secret"));
    let toml = toml::to_string(&config).unwrap();
    assert!(!toml.contains("sk-secret"));
    let back: Config = toml::from_str(&toml).unwrap();
    assert_eq!(back.retrieval.top_k, config.retrieval.top_k);
}
