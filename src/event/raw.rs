use crate::ffi::abi as b;

/// A "raw" implementation-specific event, written `r<hex config>`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Raw {
    /// Event config.
    pub config: u64,
}

impl Raw {
    pub fn from_name(name: &str) -> Option<Self> {
        let hex = name.strip_prefix('r')?;
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let config = u64::from_str_radix(hex, 16).ok()?;
        Some(Self { config })
    }
}

super::event_type!(Raw, value, { (b::PERF_TYPE_RAW, value.config) });
