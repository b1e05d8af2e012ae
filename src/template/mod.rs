//! Templates: one user-supplied overlay image, chunked into tile fragments.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::coords::{Anchor, TileAddress, TileKey};
use crate::image::RgbaImage;
use crate::util::{BlueMarbleError, BlueMarbleResult};

pub mod chunk;
pub mod config;

pub use chunk::{chunk_template, plan_fragments, ChunkedTemplate, FragmentPlan};
pub use config::{CountMode, EngineConfig};

/// One magnified, masked fragment and its persisted encoding.
#[derive(Clone, Debug, PartialEq)]
pub struct Fragment {
    /// Bitmap ready for compositing.
    pub bitmap: RgbaImage,
    /// Base64 of the PNG encoding of `bitmap`.
    pub encoded: String,
}

/// Registry key of a template: `"<sortID> <authorID>"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateKey {
    pub sort_id: u32,
    pub author_id: String,
}

impl TemplateKey {
    pub fn new(sort_id: u32, author_id: impl Into<String>) -> Self {
        Self {
            sort_id,
            author_id: author_id.into(),
        }
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.sort_id, self.author_id)
    }
}

impl FromStr for TemplateKey {
    type Err = BlueMarbleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BlueMarbleError::InvalidTemplateKey { key: s.to_string() };
        // Author ids may contain any printable symbol except space, so split once.
        let (sort, author) = s.split_once(' ').ok_or_else(invalid)?;
        let sort_id = sort.parse::<u32>().map_err(|_| invalid())?;
        Ok(Self::new(sort_id, author))
    }
}

/// A managed overlay image.
///
/// Fragments are keyed once at creation; the only later mutation is the
/// `enabled` flag. Changing the image means building a new template.
#[derive(Clone, Debug)]
pub struct Template {
    display_name: String,
    key: TemplateKey,
    anchor: Anchor,
    tile_size: u32,
    fragments: BTreeMap<TileKey, Fragment>,
    pixel_count: u64,
    enabled: bool,
}

impl Template {
    /// Chunks `source` and builds an enabled template.
    pub fn create(
        display_name: impl Into<String>,
        key: TemplateKey,
        source: &RgbaImage,
        anchor: Anchor,
        cfg: &EngineConfig,
    ) -> BlueMarbleResult<Self> {
        let chunked = chunk_template(source, anchor, cfg)?;
        Ok(Self::from_parts(
            display_name,
            key,
            anchor,
            cfg.tile_size,
            chunked,
            true,
        ))
    }

    pub(crate) fn from_parts(
        display_name: impl Into<String>,
        key: TemplateKey,
        anchor: Anchor,
        tile_size: u32,
        chunked: ChunkedTemplate,
        enabled: bool,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            key,
            anchor,
            tile_size,
            fragments: chunked.fragments,
            pixel_count: chunked.pixel_count,
            enabled,
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn key(&self) -> &TemplateKey {
        &self.key
    }

    pub fn sort_id(&self) -> u32 {
        self.key.sort_id
    }

    pub fn author_id(&self) -> &str {
        &self.key.author_id
    }

    pub fn anchor(&self) -> Anchor {
        self.anchor
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn pixel_count(&self) -> u64 {
        self.pixel_count
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// All fragments keyed by tile key.
    pub fn fragments(&self) -> &BTreeMap<TileKey, Fragment> {
        &self.fragments
    }

    /// Base64 PNG fragments keyed by the textual tile key.
    pub fn serialized_chunks(&self) -> BTreeMap<String, String> {
        self.fragments
            .iter()
            .map(|(key, frag)| (key.to_string(), frag.encoded.clone()))
            .collect()
    }

    /// Fragments drawn on the tile at `address`.
    pub fn fragments_on(
        &self,
        address: TileAddress,
    ) -> impl Iterator<Item = (&TileKey, &Fragment)> {
        self.fragments
            .iter()
            .filter(move |(key, _)| key.is_on(address))
    }
}
