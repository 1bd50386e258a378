// ==========================================
// 志愿者配对系统 - 操作日志数据仓储
// ==========================================
// 红线: 所有写入必须记录，且与数据变更同一事务
// ==========================================

mod core;
mod queries;

#[cfg(test)]
mod tests;

pub use core::ActionLogRepository;
