//! Engine configuration shared by the chunker, compositor and registry.

use serde::{Deserialize, Serialize};

use crate::util::{BlueMarbleError, BlueMarbleResult};

/// Default edge length of one site tile, in site pixels.
pub const DEFAULT_TILE_SIZE: u32 = 1000;
/// Default per-pixel magnification of template fragments.
pub const DEFAULT_MAGNIFICATION: u32 = 3;
/// Colour template authors use to mark intentionally blank regions.
pub const DEFAULT_SENTINEL: [u8; 3] = [222, 250, 206];

/// How a template's pixel count is computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CountMode {
    /// `width * height` of the source image.
    #[default]
    All,
    /// Only pixels whose alpha is non-zero.
    OpaqueOnly,
}

/// Settings for chunking and compositing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Edge length of one square site tile.
    pub tile_size: u32,
    /// Requested magnification; see [`EngineConfig::magnification`].
    pub magnification: u32,
    /// Pixel counting policy.
    pub count_mode: CountMode,
    /// RGB colour rendered as a checkerboard instead of a dot.
    pub sentinel: [u8; 3],
    /// Encode fragments in parallel (requires the `rayon` feature).
    pub parallel: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            magnification: DEFAULT_MAGNIFICATION,
            count_mode: CountMode::All,
            sentinel: DEFAULT_SENTINEL,
            parallel: false,
        }
    }
}

impl EngineConfig {
    /// Effective magnification: even values are bumped to the next odd one.
    pub fn magnification(&self) -> u32 {
        if self.magnification % 2 == 0 {
            self.magnification + 1
        } else {
            self.magnification
        }
    }

    /// Index of the preserved sub-pixel inside each magnified block.
    pub fn center_index(&self) -> u32 {
        self.magnification() / 2
    }

    /// Rejects configurations the engine cannot work with.
    pub fn validate(&self) -> BlueMarbleResult<()> {
        if self.tile_size == 0 {
            return Err(BlueMarbleError::InvalidInput("tile_size must be positive"));
        }
        if self.tile_size > 1000 {
            // Pixel offsets are keyed with three digits.
            return Err(BlueMarbleError::InvalidInput(
                "tile_size must not exceed 1000",
            ));
        }
        if self.magnification() > 15 {
            return Err(BlueMarbleError::InvalidInput(
                "magnification must not exceed 15",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_magnification_is_coerced_to_odd() {
        let mut cfg = EngineConfig::default();
        assert_eq!(cfg.magnification(), 3);
        assert_eq!(cfg.center_index(), 1);
        cfg.magnification = 4;
        assert_eq!(cfg.magnification(), 5);
        assert_eq!(cfg.center_index(), 2);
        cfg.magnification = 0;
        assert_eq!(cfg.magnification(), 1);
        assert_eq!(cfg.center_index(), 0);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"count_mode":"opaque-only"}"#).unwrap();
        assert_eq!(cfg.tile_size, 1000);
        assert_eq!(cfg.count_mode, CountMode::OpaqueOnly);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_and_wide_tiles() {
        let cfg = EngineConfig {
            tile_size: 0,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = EngineConfig {
            tile_size: 1001,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
