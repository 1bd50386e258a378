// ==========================================
// 志愿者配对系统 - 地理编码外部接口
// ==========================================
// 职责: 定义地理编码 trait（实现依赖倒置）
// 说明: 外部服务限流、无 SLA、可能超时或无结果
// ==========================================

use crate::domain::client::GeoPoint;
use async_trait::async_trait;
use thiserror::Error;

/// 地理编码错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeocodeError {
    #[error("地理编码超时: {address}")]
    Timeout { address: String },

    #[error("地理编码请求失败: {0}")]
    Http(String),

    #[error("地理编码响应解析失败: {0}")]
    Decode(String),

    #[error("地理编码已取消")]
    Cancelled,
}

impl From<reqwest::Error> for GeocodeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GeocodeError::Decode(err.to_string())
        } else {
            GeocodeError::Http(err.to_string())
        }
    }
}

/// 地理编码服务
///
/// # 返回
/// - Ok(Some(GeoPoint)): 解析成功
/// - Ok(None): 地址无法解析
/// - Err(GeocodeError): 服务故障
#[async_trait]
pub trait GeocodingOracle: Send + Sync {
    async fn resolve(&self, address: &str) -> Result<Option<GeoPoint>, GeocodeError>;
}
