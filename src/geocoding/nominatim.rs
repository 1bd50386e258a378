// ==========================================
// 志愿者配对系统 - Nominatim 地理编码实现
// ==========================================
// 接口: GET {base_url}/search?format=json&limit=1&q=<address>
// 响应: [{"lat": "1.3", "lon": "103.8", ...}]，空数组表示无结果
// ==========================================

use crate::domain::client::GeoPoint;
use crate::geocoding::oracle::{GeocodeError, GeocodingOracle};
use async_trait::async_trait;
use serde::Deserialize;

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

pub struct NominatimOracle {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimOracle {
    /// 创建 Nominatim 客户端
    ///
    /// # 参数
    /// - `base_url`: 服务地址（测试时指向 mock 服务）
    /// - `user_agent`: Nominatim 使用政策要求标识调用方
    pub fn new(base_url: impl Into<String>, user_agent: &str) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl GeocodingOracle for NominatimOracle {
    async fn resolve(&self, address: &str) -> Result<Option<GeoPoint>, GeocodeError> {
        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("format", "json"), ("limit", "1"), ("q", address)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Http(format!("status={}", status)));
        }

        let places: Vec<NominatimPlace> = response.json().await?;
        let Some(place) = places.into_iter().next() else {
            return Ok(None);
        };

        let lat: f64 = place
            .lat
            .parse()
            .map_err(|e| GeocodeError::Decode(format!("lat={}: {}", place.lat, e)))?;
        let lon: f64 = place
            .lon
            .parse()
            .map_err(|e| GeocodeError::Decode(format!("lon={}: {}", place.lon, e)))?;

        let point = GeoPoint::new(lat, lon);
        Ok(point.is_valid().then_some(point))
    }
}
