//! 测验步骤上下文
//!
//! 封装"我正在处理测验链里的第几个测验"这一信息

use std::fmt::Display;

/// 测验步骤上下文
///
/// 仅用于日志显示，不参与业务判断
#[derive(Debug, Clone)]
pub struct QuizCtx {
    /// 在测验链中的序号（从1开始）
    pub chain_index: usize,

    /// 当前测验页面地址
    pub url: String,
}

impl QuizCtx {
    pub fn new(chain_index: usize, url: String) -> Self {
        Self { chain_index, url }
    }
}

impl Display for QuizCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[测验 #{}] {}", self.chain_index, self.url)
    }
}
