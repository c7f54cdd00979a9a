use serde::{Deserialize, Serialize};

/// Instrument category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentType {
    Spot,
    Margin,
    Swap,
}

/// Static trading parameters of one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentInfo {
    pub inst_type: InstrumentType,
    pub inst_id: String,
    /// Contract value, only set for derivatives
    pub contract_value: Option<f64>,
    pub min_size: f64,
    pub tick_size: Option<f64>,
}

impl InstrumentInfo {
    /// Round a size down to a multiple of the minimum order size
    pub fn round_size(&self, size: f64) -> f64 {
        if self.min_size <= 0.0 {
            return size;
        }
        (size / self.min_size).floor() * self.min_size
    }
}
