//! Market-mover sources feeding the evening analysis.

use serde_json::Value;

pub mod dragon_tiger;
pub mod tushare;

pub use dragon_tiger::DragonTigerSource;
pub use tushare::TushareSectorSource;

/// Numbers arrive either as JSON numbers or as strings with thousands separators.
pub(crate) fn as_number(value: Option<&Value>) -> Option<f64> {
    match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.replace(',', "").trim().parse().ok(),
        _ => None,
    }
}
