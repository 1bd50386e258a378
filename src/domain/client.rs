// ==========================================
// 志愿者配对系统 - 客户领域模型
// ==========================================
// 对齐: client 表
// 约束: 每个客户在一个项目内最多属于一个客户组
// ==========================================

use serde::{Deserialize, Serialize};

/// 地球平均半径（公里）
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

// ==========================================
// GeoPoint - 经纬度坐标
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64, // 纬度（度）
    pub lon: f64, // 经度（度）
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// 坐标是否有效（有限且在经纬度范围内）
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Haversine 大圆距离（公里）
    pub fn haversine_km(&self, other: &GeoPoint) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lon = (other.lon - self.lon).to_radians();
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_KM * c
    }
}

// ==========================================
// Client - 服务对象
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    // ===== 主键 =====
    pub client_id: String,
    pub project_id: String,

    // ===== 基本信息 =====
    pub name: String,
    pub src_id: Option<String>, // 来源系统编号
    pub gender: Option<String>,
    pub race: Option<String>,
    pub languages: Vec<String>, // 已拆分的语言列表

    // ===== 位置信息 =====
    pub address: Option<String>,
    pub location: String,                // 区域名
    pub coordinates: Option<GeoPoint>,   // 地理编码结果（可缺失）
}

impl Client {
    pub fn new(project_id: &str, name: &str, location: &str) -> Self {
        Self {
            client_id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            src_id: None,
            gender: None,
            race: None,
            languages: Vec::new(),
            address: None,
            location: location.to_string(),
            coordinates: None,
        }
    }

    pub fn with_languages(mut self, raw: &str) -> Self {
        self.languages = parse_delimited_list(raw);
        self
    }

    pub fn with_address(mut self, address: &str) -> Self {
        self.address = Some(address.to_string());
        self
    }

    pub fn with_coordinates(mut self, lat: f64, lon: f64) -> Self {
        self.coordinates = Some(GeoPoint::new(lat, lon));
        self
    }

    /// 有效坐标（无效坐标视为未编码）
    pub fn geo_point(&self) -> Option<GeoPoint> {
        self.coordinates.filter(|p| p.is_valid())
    }
}

/// 拆分分隔符列表（, ; / |），去除空白与空项
pub fn parse_delimited_list(raw: &str) -> Vec<String> {
    raw.split([',', ';', '/', '|'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
