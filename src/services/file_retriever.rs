//! 文件下载 - 业务能力层
//!
//! 负责把题目引用的数据文件拉到内存，并按 content-type / 扩展名推断格式。
//!
//! 部分失败策略：单个文件下载失败只影响该文件（记录后跳过），
//! 整个测验步骤能否继续由编排层决定。

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{SolverError, SolverResult};
use crate::models::{FileFormat, RetrievedFile};

/// 文件下载器
pub struct FileRetriever {
    client: Client,
    timeout: Duration,
}

impl FileRetriever {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            timeout: Duration::from_secs(config.download_timeout_secs),
        }
    }

    /// 下载全部资源文件
    ///
    /// 失败的文件记录 warn 后跳过，返回成功下载的部分。
    pub async fn retrieve_all(&self, urls: &[String]) -> Vec<RetrievedFile> {
        let mut files = Vec::new();
        for url in urls {
            match self.download(url).await {
                Ok(file) => {
                    info!(
                        "✓ 文件下载完成: {} ({} 字节, 格式: {})",
                        url,
                        file.bytes.len(),
                        file.format
                    );
                    files.push(file);
                }
                Err(e) => {
                    warn!("⚠️ 文件下载失败，跳过: {} ({})", url, e);
                }
            }
        }
        files
    }

    /// 限时下载单个文件
    pub async fn download(&self, url: &str) -> SolverResult<RetrievedFile> {
        debug!("开始下载文件: {}", url);

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SolverError::FetchError {
                url: url.to_string(),
                source: anyhow::anyhow!(e),
            })?;

        if !response.status().is_success() {
            return Err(SolverError::FetchError {
                url: url.to_string(),
                source: anyhow::anyhow!("HTTP 状态码 {}", response.status()),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SolverError::FetchError {
                url: url.to_string(),
                source: anyhow::anyhow!(e),
            })?;

        let format = FileFormat::classify(&content_type, url);

        Ok(RetrievedFile {
            url: url.to_string(),
            bytes: bytes.to_vec(),
            format,
        })
    }
}
