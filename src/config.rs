/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// HTTP 服务监听端口
    pub listen_port: u16,
    /// 提交答案时使用的邮箱
    pub submitter_email: String,
    /// 入站请求的共享密钥
    pub shared_secret: String,
    /// 整条测验链的时间预算（秒）
    pub chain_deadline_secs: u64,
    /// 单次页面渲染的子时限（秒）
    pub fetch_timeout_secs: u64,
    /// 单个文件下载的子时限（秒）
    pub download_timeout_secs: u64,
    /// 同时打开的浏览器页面上限
    pub max_concurrent_pages: usize,
    /// 答错后重新推理的次数上限
    pub wrong_answer_retries: usize,
    /// 答案提交的重试次数上限
    pub submit_max_retries: usize,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// LLM 调用的重试次数上限
    pub llm_max_retries: usize,
    /// LLM 重试的基础退避时间（毫秒）
    pub llm_retry_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_port: 8000,
            submitter_email: "student@example.com".to_string(),
            shared_secret: "Alpha".to_string(),
            chain_deadline_secs: 180,
            fetch_timeout_secs: 30,
            download_timeout_secs: 60,
            max_concurrent_pages: 2,
            wrong_answer_retries: 2,
            submit_max_retries: 3,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o".to_string(),
            llm_max_retries: 3,
            llm_retry_backoff_ms: 1000,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            listen_port: std::env::var("LISTEN_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(default.listen_port),
            submitter_email: std::env::var("SUBMITTER_EMAIL").unwrap_or(default.submitter_email),
            shared_secret: std::env::var("QUIZ_SECRET").unwrap_or(default.shared_secret),
            chain_deadline_secs: std::env::var("CHAIN_DEADLINE_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.chain_deadline_secs),
            fetch_timeout_secs: std::env::var("FETCH_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.fetch_timeout_secs),
            download_timeout_secs: std::env::var("DOWNLOAD_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.download_timeout_secs),
            max_concurrent_pages: std::env::var("MAX_CONCURRENT_PAGES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_concurrent_pages),
            wrong_answer_retries: std::env::var("WRONG_ANSWER_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.wrong_answer_retries),
            submit_max_retries: std::env::var("SUBMIT_MAX_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.submit_max_retries),
            llm_api_key: std::env::var("LLM_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY")).unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            llm_max_retries: std::env::var("LLM_MAX_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.llm_max_retries),
            llm_retry_backoff_ms: std::env::var("LLM_RETRY_BACKOFF_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.llm_retry_backoff_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.listen_port, 8000);
        assert_eq!(config.chain_deadline_secs, 180);
        assert_eq!(config.shared_secret, "Alpha");
        assert!(config.wrong_answer_retries > 0);
        assert!(config.llm_max_retries > 0);
    }
}
