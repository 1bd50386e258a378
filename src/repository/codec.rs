// ==========================================
// 志愿者配对系统 - 行编解码工具
// ==========================================
// 时间戳: "%Y-%m-%d %H:%M:%S%.f"（本地时间，无时区）
// 列表列: JSON 数组字符串
// ==========================================

use chrono::NaiveDateTime;

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

pub(crate) fn fmt_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

/// 解析时间戳；格式异常时回退为当前时间
pub(crate) fn parse_ts(raw: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .unwrap_or_else(|_| {
            tracing::warn!(raw_value = %raw, "时间戳格式错误，使用当前时间");
            chrono::Local::now().naive_local()
        })
}

pub(crate) fn to_json_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// 解析 JSON 列表；格式异常时返回空列表
pub(crate) fn from_json_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

/// SQL 占位符列表: "?1, ?2, ..., ?n"（从 start 开始编号）
pub(crate) fn placeholders(start: usize, n: usize) -> String {
    (start..start + n)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}
