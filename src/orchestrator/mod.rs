//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 驱动一条测验链从头到尾的状态推进，是整个系统的"指挥中心"。
//!
//! ## 层次关系
//!
//! ```text
//! chain_runner (驱动一条测验链的状态机)
//!     ↓
//! workflow::QuizFlow (单个测验步骤的能力集合)
//!     ↓
//! services (能力层：extract / retrieve / process / llm / submit)
//!     ↓
//! infrastructure (基础设施：PageRenderer)
//! ```
//!
//! ## 设计原则
//!
//! 1. **显式状态机**：每个状态携带类型化的数据，转换路径一目了然
//! 2. **时限优先**：全局时间预算覆盖整条链，每次转换前检查
//! 3. **资源隔离**：浏览器资源只在抓取状态期间持有
//! 4. **无回滚**：没有持久化状态，失败即放弃当前链

pub mod chain_runner;

pub use chain_runner::{ChainOutcome, ChainReport, ChainRunner};
