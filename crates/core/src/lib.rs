pub mod domain;
pub mod llm;
pub mod storage;

pub mod config {
    use crate::llm::GenerationOptions;
    use anyhow::Context;
    use serde::Deserialize;
    use std::path::Path;

    const ENV_PREFIX: &str = "TRADAR";
    const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
    const DEFAULT_OLLAMA_MODEL: &str = "llama3";
    const DEFAULT_GENERATE_PATH: &str = "/api/generate";
    const DEFAULT_TIMEOUT_SECS: u64 = 120;

    #[derive(Debug, Clone, Default, Deserialize)]
    pub struct Settings {
        #[serde(default)]
        pub database_url: Option<String>,
        #[serde(default)]
        pub sentry_dsn: Option<String>,
        #[serde(default)]
        pub ai: AiSettings,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct AiSettings {
        #[serde(default = "default_ollama_base_url")]
        pub ollama_base_url: String,
        #[serde(default = "default_ollama_model")]
        pub ollama_model: String,
        #[serde(default = "default_generate_path")]
        pub generate_path: String,
        #[serde(default = "default_timeout_secs")]
        pub timeout_secs: u64,
        #[serde(default)]
        pub temperature: Option<f32>,
        #[serde(default)]
        pub top_p: Option<f32>,
        #[serde(default)]
        pub max_tokens: Option<u32>,
        #[serde(default)]
        pub stop: Vec<String>,
    }

    impl Default for AiSettings {
        fn default() -> Self {
            Self {
                ollama_base_url: default_ollama_base_url(),
                ollama_model: default_ollama_model(),
                generate_path: default_generate_path(),
                timeout_secs: default_timeout_secs(),
                temperature: None,
                top_p: None,
                max_tokens: None,
                stop: Vec::new(),
            }
        }
    }

    fn default_ollama_base_url() -> String {
        DEFAULT_OLLAMA_BASE_URL.to_string()
    }
    fn default_ollama_model() -> String {
        DEFAULT_OLLAMA_MODEL.to_string()
    }
    fn default_generate_path() -> String {
        DEFAULT_GENERATE_PATH.to_string()
    }
    fn default_timeout_secs() -> u64 {
        DEFAULT_TIMEOUT_SECS
    }

    impl AiSettings {
        pub fn generation_options(&self) -> GenerationOptions {
            GenerationOptions {
                temperature: self.temperature,
                top_p: self.top_p,
                max_tokens: self.max_tokens,
                stop: self.stop.clone(),
            }
        }
    }

    impl Settings {
        /// Loads settings from an optional YAML/TOML file, then applies
        /// `TRADAR__SECTION__KEY` environment overrides. `DATABASE_URL` and
        /// `SENTRY_DSN` are honoured as plain variables when the layered
        /// sources leave them unset.
        pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
            let mut builder = ::config::Config::builder();
            if let Some(path) = path {
                anyhow::ensure!(path.exists(), "config file not found: {}", path.display());
                builder = builder.add_source(::config::File::from(path));
            }

            let layered = builder
                .add_source(
                    ::config::Environment::with_prefix(ENV_PREFIX)
                        .prefix_separator("__")
                        .separator("__"),
                )
                .build()
                .context("building settings")?;

            let mut settings: Settings = layered
                .try_deserialize()
                .context("deserializing settings")?;

            if settings.database_url.is_none() {
                settings.database_url = std::env::var("DATABASE_URL").ok();
            }
            if settings.sentry_dsn.is_none() {
                settings.sentry_dsn = std::env::var("SENTRY_DSN").ok();
            }
            settings.database_url = settings.database_url.filter(|s| !s.trim().is_empty());
            settings.sentry_dsn = settings.sentry_dsn.filter(|s| !s.trim().is_empty());

            Ok(settings)
        }

        pub fn from_env() -> anyhow::Result<Self> {
            Self::load(None)
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::io::Write;

        #[test]
        fn loads_ai_section_from_yaml_file() {
            let mut file = tempfile::Builder::new()
                .suffix(".yaml")
                .tempfile()
                .unwrap();
            writeln!(
                file,
                "ai:\n  ollama_base_url: \"http://10.0.0.5:11434\"\n  ollama_model: \"qwen2.5:14b\"\n  temperature: 0.1\n  stop: [\"</json>\"]"
            )
            .unwrap();

            let settings = Settings::load(Some(file.path())).unwrap();
            assert_eq!(settings.ai.ollama_base_url, "http://10.0.0.5:11434");
            assert_eq!(settings.ai.ollama_model, "qwen2.5:14b");
            assert_eq!(settings.ai.generate_path, DEFAULT_GENERATE_PATH);
            assert_eq!(settings.ai.timeout_secs, DEFAULT_TIMEOUT_SECS);

            let options = settings.ai.generation_options();
            assert_eq!(options.temperature, Some(0.1));
            assert_eq!(options.stop, vec!["</json>".to_string()]);
            assert!(options.max_tokens.is_none());
        }

        #[test]
        fn missing_config_file_is_an_error() {
            let err = Settings::load(Some(Path::new("/definitely/not/here.yaml"))).unwrap_err();
            assert!(err.to_string().contains("config file not found"));
        }

        #[test]
        fn defaults_point_at_local_ollama() {
            let ai = AiSettings::default();
            assert_eq!(ai.ollama_base_url, "http://localhost:11434");
            assert_eq!(ai.generate_path, "/api/generate");
            assert!(ai.generation_options().is_empty());
        }
    }
}
