//! Persisted template document and the parsers that read it back.
//!
//! ```json
//! {
//!   "whoami": "BlueMarble",
//!   "scriptVersion": "0.1.0",
//!   "schemaVersion": "1.0.0",
//!   "templates": {
//!     "0 !": {
//!       "name": "castle",
//!       "coords": "12, 34, 950, 0",
//!       "enabled": true,
//!       "pixelCount": 1200,
//!       "tiles": { "0012,0034,950,000": "<base64 png>" }
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::coords::{Anchor, TileKey};
use crate::image::io::decode_rgba;
use crate::template::chunk::count_fragment_pixels;
use crate::template::{ChunkedTemplate, EngineConfig, Fragment, Template, TemplateKey};
use crate::util::encoding::base64_to_bytes;
use crate::util::{BlueMarbleError, BlueMarbleResult};

/// `whoami` value written by, and accepted from, this crate.
pub const WHOAMI: &str = "BlueMarble";
/// Schema version written by this crate.
pub const SCHEMA_VERSION: &str = "1.0.0";
/// Major schema version this crate can read.
const SCHEMA_MAJOR: &str = "1";

/// Top-level persisted structure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDocument {
    pub whoami: String,
    pub script_version: String,
    pub schema_version: String,
    #[serde(default)]
    pub templates: BTreeMap<String, TemplateRecord>,
}

/// One persisted template, keyed by `"<sortID> <authorID>"` in the document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRecord {
    pub name: String,
    pub coords: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Count taken from the source image at creation time. Older documents
    /// omit it and the count is recovered from the fragments instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_count: Option<u64>,
    #[serde(default)]
    pub tiles: BTreeMap<String, String>,
}

fn enabled_by_default() -> bool {
    true
}

impl TemplateDocument {
    /// Creates an empty document stamped with this crate's identity.
    pub fn empty(script_version: impl Into<String>) -> Self {
        Self {
            whoami: WHOAMI.to_string(),
            script_version: script_version.into(),
            schema_version: SCHEMA_VERSION.to_string(),
            templates: BTreeMap::new(),
        }
    }

    /// Builds the document for a set of templates.
    pub fn from_templates<'a>(
        script_version: impl Into<String>,
        templates: impl IntoIterator<Item = &'a Template>,
    ) -> Self {
        let mut doc = Self::empty(script_version);
        for template in templates {
            doc.templates
                .insert(template.key().to_string(), TemplateRecord::from(template));
        }
        doc
    }
}

impl From<&Template> for TemplateRecord {
    fn from(template: &Template) -> Self {
        Self {
            name: template.display_name().to_string(),
            coords: template.anchor().to_string(),
            enabled: template.is_enabled(),
            pixel_count: Some(template.pixel_count()),
            tiles: template.serialized_chunks(),
        }
    }
}

/// Strategy for turning one stored document into templates.
///
/// The registry asks each parser in order whether it accepts a document and
/// hands it to the first that does.
pub trait DocumentParser: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Returns true when this parser understands `doc`.
    fn accepts(&self, doc: &Value) -> bool;

    /// Parses an accepted document.
    fn parse(&self, doc: Value, cfg: &EngineConfig) -> BlueMarbleResult<Vec<Template>>;
}

/// Parser for documents written by this crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlueMarbleParser;

impl DocumentParser for BlueMarbleParser {
    fn name(&self) -> &'static str {
        WHOAMI
    }

    fn accepts(&self, doc: &Value) -> bool {
        let whoami = doc.get("whoami").and_then(Value::as_str);
        let schema = doc.get("schemaVersion").and_then(Value::as_str);
        match (whoami, schema) {
            (Some(WHOAMI), Some(version)) => version.split('.').next() == Some(SCHEMA_MAJOR),
            _ => false,
        }
    }

    fn parse(&self, doc: Value, cfg: &EngineConfig) -> BlueMarbleResult<Vec<Template>> {
        let doc: TemplateDocument =
            serde_json::from_value(doc).map_err(BlueMarbleError::serialization)?;
        doc.templates
            .iter()
            .map(|(key, record)| parse_record(key, record, cfg))
            .collect()
    }
}

fn parse_record(
    key: &str,
    record: &TemplateRecord,
    cfg: &EngineConfig,
) -> BlueMarbleResult<Template> {
    let key: TemplateKey = key.parse()?;
    let anchor = Anchor::parse(&record.coords, cfg.tile_size)?;
    let m = cfg.magnification();

    let mut fragments = BTreeMap::new();
    let mut recovered = 0u64;
    for (tile_key, encoded) in &record.tiles {
        let tile_key: TileKey = tile_key.parse()?;
        let bitmap = decode_rgba(&base64_to_bytes(encoded)?)?;
        if bitmap.width() % m != 0 || bitmap.height() % m != 0 {
            return Err(BlueMarbleError::InvalidInput(
                "fragment size is not a multiple of the magnification",
            ));
        }
        recovered += count_fragment_pixels(&bitmap, cfg);
        fragments.insert(
            tile_key,
            Fragment {
                bitmap,
                encoded: encoded.clone(),
            },
        );
    }

    let pixel_count = record.pixel_count.unwrap_or(recovered);

    Ok(Template::from_parts(
        record.name.clone(),
        key,
        anchor,
        cfg.tile_size,
        ChunkedTemplate {
            fragments,
            pixel_count,
        },
        record.enabled,
    ))
}

/// Default parser list used by a new registry.
pub fn default_parsers() -> Vec<Arc<dyn DocumentParser>> {
    vec![Arc::new(BlueMarbleParser)]
}

/// Reads `whoami` and `schemaVersion` for error reporting.
pub(crate) fn unrecognized(doc: &Value) -> BlueMarbleError {
    let field = |name: &str| {
        doc.get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    BlueMarbleError::UnrecognizedSchema {
        whoami: field("whoami"),
        schema_version: field("schemaVersion"),
    }
}
