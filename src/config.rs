use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenConfig {
    pub namespace: String, // C symbol prefix
    pub arch: String,
    /// Upper bound on the packed parameter struct, in bits.
    pub params_bit_budget: u32,
    pub emit_basic: bool,
}

impl Default for GenConfig {
    fn default() -> Self {
        Self {
            namespace: "asmgen".to_string(),
            arch: "x64".to_string(),
            params_bit_budget: 256,
            emit_basic: true,
        }
    }
}

impl GenConfig {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
