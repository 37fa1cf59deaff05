use anyhow::{Context, Result};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database_url: String,
    pub llm: LlmConfig,
    pub images_dir: String,
    pub cors_origins: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let port = env_or("SERVER_PORT", "8080")
            .parse::<u16>()
            .context("SERVER_PORT must be a port number")?;

        Ok(Self {
            server: ServerConfig {
                host: env_or("SERVER_HOST", "0.0.0.0"),
                port,
            },
            database_url,
            llm: LlmConfig {
                api_url: env_or("LLM_API_URL", "https://api.openai.com/v1/chat/completions"),
                api_key: env_or("LLM_API_KEY", ""),
                model: env_or("LLM_MODEL", "gpt-4o-mini"),
            },
            images_dir: env_or("IMAGES_DIR", "data/attachments"),
            cors_origins: env_or("CORS_ORIGINS", "*"),
        })
    }
}
