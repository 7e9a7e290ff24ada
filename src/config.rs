use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    // Storage
    pub database_path: String,
    pub queue_path: String,

    // Groq (OpenAI-compatible chat completions)
    pub groq_api_key: String,
    pub groq_model: String,
    pub groq_api_url: String,

    // Worker pacing
    pub task_delay_ms: u64,
    pub poll_interval_ms: u64,

    // Reconciliation sweep for jobs stuck in pending; 0 disables it
    pub job_expiry_minutes: u64,

    // HTTP server
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            // Storage
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "translation_hub.db".to_string()),
            queue_path: std::env::var("QUEUE_PATH")
                .unwrap_or_else(|_| "translation_queue.db".to_string()),

            // Groq
            groq_api_key: std::env::var("GROQ_API_KEY").context("GROQ_API_KEY not set")?,
            groq_model: std::env::var("GROQ_MODEL")
                .unwrap_or_else(|_| "llama3-8b-8192".to_string()),
            groq_api_url: std::env::var("GROQ_API_URL").unwrap_or_else(|_| {
                "https://api.groq.com/openai/v1/chat/completions".to_string()
            }),

            // Worker pacing
            task_delay_ms: std::env::var("TASK_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),
            poll_interval_ms: std::env::var("POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
            job_expiry_minutes: std::env::var("JOB_EXPIRY_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),

            // HTTP server
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    // ==================== Helper Functions ====================

    const ALL_VARS: &[&str] = &[
        "DATABASE_PATH",
        "QUEUE_PATH",
        "GROQ_API_KEY",
        "GROQ_MODEL",
        "GROQ_API_URL",
        "TASK_DELAY_MS",
        "POLL_INTERVAL_MS",
        "JOB_EXPIRY_MINUTES",
        "PORT",
    ];

    fn clear_env() {
        for var in ALL_VARS {
            std::env::remove_var(var);
        }
    }

    // ==================== from_env Tests ====================

    #[test]
    #[serial]
    fn test_from_env_requires_api_key() {
        clear_env();

        let result = Config::from_env();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("GROQ_API_KEY"));
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        std::env::set_var("GROQ_API_KEY", "test-key");

        let config = Config::from_env().expect("Should load config");

        assert_eq!(config.database_path, "translation_hub.db");
        assert_eq!(config.queue_path, "translation_queue.db");
        assert_eq!(config.groq_model, "llama3-8b-8192");
        assert_eq!(
            config.groq_api_url,
            "https://api.groq.com/openai/v1/chat/completions"
        );
        assert_eq!(config.task_delay_ms, 500);
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.job_expiry_minutes, 30);
        assert_eq!(config.port, 3000);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var("GROQ_API_KEY", "test-key");
        std::env::set_var("GROQ_MODEL", "llama-3.1-70b-versatile");
        std::env::set_var("TASK_DELAY_MS", "0");
        std::env::set_var("JOB_EXPIRY_MINUTES", "0");
        std::env::set_var("PORT", "8080");

        let config = Config::from_env().expect("Should load config");

        assert_eq!(config.groq_model, "llama-3.1-70b-versatile");
        assert_eq!(config.task_delay_ms, 0);
        assert_eq!(config.job_expiry_minutes, 0);
        assert_eq!(config.port, 8080);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_unparseable_numbers() {
        clear_env();
        std::env::set_var("GROQ_API_KEY", "test-key");
        std::env::set_var("TASK_DELAY_MS", "not-a-number");
        std::env::set_var("PORT", "also-not-a-number");

        let config = Config::from_env().expect("Should load config");

        assert_eq!(config.task_delay_ms, 500);
        assert_eq!(config.port, 3000);

        clear_env();
    }
}
