// ==========================================
// 志愿者配对系统 - 配置层
// ==========================================
// 职责: 项目级配置管理（缺省值 + 按项目覆写）
// 存储: config_kv 表
// ==========================================

pub mod config_manager;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
