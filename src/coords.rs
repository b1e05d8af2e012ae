//! Coordinate translation between the site's `(tile, pixel)` addressing and
//! the flattened display readout, plus the typed keys built on top of it.
//!
//! Tiles are addressed by unbounded integer indices; pixels within a tile run
//! `0..tile_size`. The display readout only shows the tile index modulo 4,
//! pre-multiplied into pixel space.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::util::{BlueMarbleError, BlueMarbleResult};

/// Largest tile index the site exposes on either axis.
pub const MAX_TILE_INDEX: u32 = 2047;

/// Number of tiles shown per axis in the display readout.
const DISPLAY_TILE_PERIOD: i64 = 4;

/// Modulo whose result has the sign of the divisor.
pub fn negative_safe_modulo(a: i64, b: i64) -> i64 {
    a.rem_euclid(b)
}

/// Converts a server `(tile, pixel)` pair to display coordinates.
///
/// `disp = (tile mod 4) * tile_size + pixel` on each axis.
pub fn to_display_coordinates(tile: [i64; 2], pixel: [i64; 2], tile_size: u32) -> [i64; 2] {
    let size = i64::from(tile_size);
    [
        negative_safe_modulo(tile[0], DISPLAY_TILE_PERIOD) * size + pixel[0],
        negative_safe_modulo(tile[1], DISPLAY_TILE_PERIOD) * size + pixel[1],
    ]
}

/// Parses textual components and converts them to display coordinates.
///
/// Unlike a lenient integer parse, malformed input is rejected instead of
/// propagating a not-a-number value into the readout.
pub fn parse_display_coordinates(
    tile: [&str; 2],
    pixel: [&str; 2],
    tile_size: u32,
) -> BlueMarbleResult<[i64; 2]> {
    let tile = [parse_i64(tile[0])?, parse_i64(tile[1])?];
    let pixel = [parse_i64(pixel[0])?, parse_i64(pixel[1])?];
    Ok(to_display_coordinates(tile, pixel, tile_size))
}

fn parse_i64(text: &str) -> BlueMarbleResult<i64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(BlueMarbleError::malformed(text, "missing component"));
    }
    trimmed
        .parse::<i64>()
        .map_err(|_| BlueMarbleError::malformed(text, "component is not an integer"))
}

fn parse_u32(text: &str) -> BlueMarbleResult<u32> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(BlueMarbleError::malformed(text, "missing component"));
    }
    trimmed
        .parse::<u32>()
        .map_err(|_| BlueMarbleError::malformed(text, "component is not a non-negative integer"))
}

/// Splits `"a, b, c"` style lists, accepting commas and/or whitespace.
fn split_components(text: &str) -> Vec<&str> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect()
}

/// Address of one tile on the site canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileAddress {
    pub x: u32,
    pub y: u32,
}

impl TileAddress {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Parses the two textual components of a tile address.
    pub fn from_parts(x: &str, y: &str) -> BlueMarbleResult<Self> {
        Ok(Self {
            x: parse_u32(x)?,
            y: parse_u32(y)?,
        })
    }

    /// Zero-padded `TTTT,TTTT` prefix shared by every tile key on this tile.
    pub fn key_prefix(&self) -> String {
        format!("{:04},{:04}", self.x, self.y)
    }
}

impl FromStr for TileAddress {
    type Err = BlueMarbleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match split_components(s).as_slice() {
            [x, y] => Self::from_parts(x, y),
            _ => Err(BlueMarbleError::malformed(s, "expected two components")),
        }
    }
}

/// Absolute position of a template's top-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Anchor {
    pub tile_x: u32,
    pub tile_y: u32,
    pub pixel_x: u32,
    pub pixel_y: u32,
}

impl Anchor {
    /// Creates an anchor, validating the pixel components against `tile_size`.
    pub fn new(
        tile_x: u32,
        tile_y: u32,
        pixel_x: u32,
        pixel_y: u32,
        tile_size: u32,
    ) -> BlueMarbleResult<Self> {
        let anchor = Self {
            tile_x,
            tile_y,
            pixel_x,
            pixel_y,
        };
        anchor.validate(tile_size)?;
        Ok(anchor)
    }

    /// Parses `"tileX, tileY, pixelX, pixelY"` and validates it.
    pub fn parse(text: &str, tile_size: u32) -> BlueMarbleResult<Self> {
        match split_components(text).as_slice() {
            [tx, ty, px, py] => Self::new(
                parse_u32(tx)?,
                parse_u32(ty)?,
                parse_u32(px)?,
                parse_u32(py)?,
                tile_size,
            ),
            _ => Err(BlueMarbleError::malformed(text, "expected four components")),
        }
    }

    /// Checks the tile bounds and that pixel offsets fall inside one tile.
    pub fn validate(&self, tile_size: u32) -> BlueMarbleResult<()> {
        if self.tile_x > MAX_TILE_INDEX || self.tile_y > MAX_TILE_INDEX {
            return Err(BlueMarbleError::malformed(
                self.to_string(),
                "tile index out of range",
            ));
        }
        if self.pixel_x >= tile_size || self.pixel_y >= tile_size {
            return Err(BlueMarbleError::malformed(
                self.to_string(),
                "pixel offset must be smaller than the tile size",
            ));
        }
        Ok(())
    }

    /// Global pixel position of the anchor on the X axis.
    pub fn global_x(&self, tile_size: u32) -> u64 {
        u64::from(self.tile_x) * u64::from(tile_size) + u64::from(self.pixel_x)
    }

    /// Global pixel position of the anchor on the Y axis.
    pub fn global_y(&self, tile_size: u32) -> u64 {
        u64::from(self.tile_y) * u64::from(tile_size) + u64::from(self.pixel_y)
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}",
            self.tile_x, self.tile_y, self.pixel_x, self.pixel_y
        )
    }
}

/// Key of one template fragment: `TTTT,TTTT,PPP,PPP`.
///
/// Tile indices are zero-padded to 4 digits and the pixel offset of the
/// fragment's top-left corner within that tile to 3 digits. Ordering is
/// lexicographic on `(tile_x, tile_y, pixel_x, pixel_y)`, which matches the
/// string ordering for in-range values.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct TileKey {
    pub tile_x: u32,
    pub tile_y: u32,
    pub pixel_x: u32,
    pub pixel_y: u32,
}

impl TileKey {
    /// Tile this fragment is drawn on.
    pub fn address(&self) -> TileAddress {
        TileAddress::new(self.tile_x, self.tile_y)
    }

    /// Returns true when the fragment belongs to `address`.
    pub fn is_on(&self, address: TileAddress) -> bool {
        self.tile_x == address.x && self.tile_y == address.y
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04},{:04},{:03},{:03}",
            self.tile_x, self.tile_y, self.pixel_x, self.pixel_y
        )
    }
}

impl FromStr for TileKey {
    type Err = BlueMarbleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BlueMarbleError::InvalidTileKey { key: s.to_string() };
        let parts: Vec<&str> = s.split(',').collect();
        let [tx, ty, px, py] = parts.as_slice() else {
            return Err(invalid());
        };
        let digits = |part: &str, width: usize| -> Result<u32, BlueMarbleError> {
            if part.len() < width || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse().map_err(|_| invalid())
        };
        Ok(Self {
            tile_x: digits(tx, 4)?,
            tile_y: digits(ty, 4)?,
            pixel_x: digits(px, 3)?,
            pixel_y: digits(py, 3)?,
        })
    }
}

impl TryFrom<String> for TileKey {
    type Error = BlueMarbleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TileKey> for String {
    fn from(value: TileKey) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_coordinates_wrap_tiles_mod_4() {
        assert_eq!(to_display_coordinates([12, 123], [34, 567], 1000), [34, 3567]);
        assert_eq!(to_display_coordinates([-1, 0], [5, 5], 1000), [3005, 5]);
    }

    #[test]
    fn parse_display_rejects_non_numeric() {
        assert_eq!(
            parse_display_coordinates(["12", "123"], ["34", "567"], 1000).unwrap(),
            [34, 3567]
        );
        let err = parse_display_coordinates(["12", "x"], ["34", "567"], 1000).unwrap_err();
        assert!(matches!(err, BlueMarbleError::MalformedCoordinates { .. }));
        let err = parse_display_coordinates(["", "1"], ["34", "567"], 1000).unwrap_err();
        assert!(matches!(err, BlueMarbleError::MalformedCoordinates { .. }));
    }

    #[test]
    fn tile_key_formats_with_padding() {
        let key = TileKey {
            tile_x: 1,
            tile_y: 22,
            pixel_x: 5,
            pixel_y: 950,
        };
        assert_eq!(key.to_string(), "0001,0022,005,950");
        assert_eq!("0001,0022,005,950".parse::<TileKey>().unwrap(), key);
    }

    #[test]
    fn tile_key_rejects_short_fields() {
        assert!("1,22,5,950".parse::<TileKey>().is_err());
        assert!("0001,0022,005".parse::<TileKey>().is_err());
        assert!("0001,0022,00a,950".parse::<TileKey>().is_err());
    }

    #[test]
    fn anchor_parse_validates_pixels() {
        let anchor = Anchor::parse("3, 4, 950, 0", 1000).unwrap();
        assert_eq!(anchor.to_string(), "3, 4, 950, 0");
        assert_eq!(anchor.global_x(1000), 3950);
        assert!(Anchor::parse("3, 4, 1000, 0", 1000).is_err());
        assert!(Anchor::parse("3, 4, 9", 1000).is_err());
        assert!(Anchor::parse("3, -4, 9, 9", 1000).is_err());
        assert!(Anchor::parse("2048, 0, 0, 0", 1000).is_err());
    }

    #[test]
    fn tile_address_prefix() {
        let addr: TileAddress = "7, 12".parse().unwrap();
        assert_eq!(addr.key_prefix(), "0007,0012");
    }
}
