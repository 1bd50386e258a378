// ==========================================
// 志愿者配对系统 - 地理编码
// ==========================================

pub mod batch;
pub mod nominatim;
pub mod oracle;

pub use batch::{
    GeocodeBatch, GeocodeBatchConfig, GeocodeFailure, GeocodeFailureReason, GeocodeReport,
};
pub use nominatim::{NominatimOracle, DEFAULT_NOMINATIM_URL};
pub use oracle::{GeocodeError, GeocodingOracle};
