//! Message handling for the network interception bridge.
//!
//! The host-side interceptor observes the page's fetch traffic and relays
//! JSON bodies and image tiles as messages. This module interprets those
//! messages against a [`TemplateRegistry`]: user info feeds the author
//! namespace, pixel clicks feed the coordinate readout, and tile images are
//! composited and sent back. A tile request is always answered; any failure
//! answers with the original bytes so the page never stalls.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::coords::{to_display_coordinates, Anchor, TileAddress};
use crate::registry::TemplateRegistry;
use crate::trace::{trace_event, trace_warn};
use crate::util::{BlueMarbleError, BlueMarbleResult};

/// Marker identifying messages that belong to this script.
pub const SCRIPT_MARKER: &str = "blue-marble";

/// Message relayed by the interceptor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub source: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub json_data: Option<Value>,
    #[serde(default)]
    pub blob_id: Option<Uuid>,
    #[serde(default)]
    pub blob_data: Option<Vec<u8>>,
}

/// Reply that substitutes an intercepted tile response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileReply {
    pub source: String,
    pub blob_id: Uuid,
    pub blob_data: Vec<u8>,
}

/// What handling a message produced.
#[derive(Clone, Debug, PartialEq)]
pub enum BridgeEvent {
    /// Not addressed to us, or an endpoint we do not use.
    Ignored,
    /// The user endpoint reported a logged-in user.
    UserUpdated {
        name: Option<String>,
        droplets: Option<u64>,
        next_level_pixels: Option<i64>,
        author_id: Option<String>,
    },
    /// The user endpoint answered with a non-2xx status.
    NotLoggedIn,
    /// A pixel was clicked; `display` is the readout the site shows for it.
    PixelSelected { coords: Anchor, display: [i64; 2] },
    /// A tile was answered. `composited` is false for pass-through replies.
    Tile {
        reply: TileReply,
        composited: bool,
        pixel_count: u64,
    },
    /// The site's robots policy was read.
    Robots { disabled: bool },
}

/// Interprets interceptor messages on behalf of one registry.
pub struct Bridge {
    registry: TemplateRegistry,
    marker: String,
    disabled: bool,
    last_pixel: Option<Anchor>,
}

impl Bridge {
    pub fn new(registry: TemplateRegistry) -> Self {
        Self {
            registry,
            marker: SCRIPT_MARKER.to_string(),
            disabled: false,
            last_pixel: None,
        }
    }

    /// Uses a different source marker.
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TemplateRegistry {
        &mut self.registry
    }

    /// True once the site asked userscripts to stay off.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Last clicked pixel, usable to pre-fill template coordinates.
    pub fn last_pixel(&self) -> Option<Anchor> {
        self.last_pixel
    }

    /// Parses and handles a JSON-encoded message.
    pub fn handle_json(&mut self, text: &str) -> BlueMarbleResult<BridgeEvent> {
        let message: InboundMessage =
            serde_json::from_str(text).map_err(BlueMarbleError::serialization)?;
        self.handle(message)
    }

    /// Handles one message.
    ///
    /// Tile messages never fail: errors degrade to a pass-through reply.
    pub fn handle(&mut self, message: InboundMessage) -> BlueMarbleResult<BridgeEvent> {
        if message.source != self.marker {
            return Ok(BridgeEvent::Ignored);
        }
        let Some(endpoint) = message.endpoint.as_deref() else {
            return Ok(BridgeEvent::Ignored);
        };
        let name = endpoint_name(endpoint);
        trace_event!("bridge_message", endpoint = name.unwrap_or(""));

        // A blob id means the page is waiting on a reply, whatever the URL looks like.
        if message.blob_id.is_some() || name == Some("tiles") {
            return Ok(self.handle_tile(endpoint, message.blob_id, message.blob_data));
        }

        match name {
            Some("me") => Ok(self.handle_user(message.json_data.as_ref())),
            Some("pixel") => self.handle_pixel(endpoint),
            Some("robots") => {
                self.disabled = message
                    .json_data
                    .as_ref()
                    .and_then(|data| data.get("userscript"))
                    .is_some_and(|flag| value_text(flag).eq_ignore_ascii_case("false"));
                Ok(BridgeEvent::Robots {
                    disabled: self.disabled,
                })
            }
            _ => Ok(BridgeEvent::Ignored),
        }
    }

    fn handle_user(&mut self, data: Option<&Value>) -> BridgeEvent {
        let Some(data) = data else {
            return BridgeEvent::NotLoggedIn;
        };
        if let Some(status) = data.get("status") {
            if !value_text(status).starts_with('2') {
                return BridgeEvent::NotLoggedIn;
            }
        }

        let author_id = data.get("id").and_then(Value::as_u64).map(|id| {
            self.registry.set_user_id(id);
            self.registry.author_id()
        });
        let next_level_pixels = match (
            data.get("level").and_then(Value::as_f64),
            data.get("pixelsPainted").and_then(Value::as_f64),
        ) {
            (Some(level), Some(painted)) => Some(next_level_pixels(level, painted)),
            _ => None,
        };
        BridgeEvent::UserUpdated {
            name: data.get("name").and_then(Value::as_str).map(str::to_string),
            droplets: data.get("droplets").and_then(Value::as_u64),
            next_level_pixels,
            author_id,
        }
    }

    fn handle_pixel(&mut self, endpoint: &str) -> BlueMarbleResult<BridgeEvent> {
        let (path, query) = endpoint.split_once('?').unwrap_or((endpoint, ""));
        let tile: Vec<&str> = path
            .split('/')
            .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
            .collect();
        let [tile_x, tile_y] = tile.as_slice() else {
            return Err(BlueMarbleError::malformed(
                endpoint,
                "expected two tile components in the path",
            ));
        };
        let pixel_x = query_param(query, "x")
            .ok_or_else(|| BlueMarbleError::malformed(endpoint, "missing x parameter"))?;
        let pixel_y = query_param(query, "y")
            .ok_or_else(|| BlueMarbleError::malformed(endpoint, "missing y parameter"))?;

        let tile_size = self.registry.config().tile_size;
        let coords = Anchor::parse(
            &format!("{tile_x}, {tile_y}, {pixel_x}, {pixel_y}"),
            tile_size,
        )?;
        let display = to_display_coordinates(
            [i64::from(coords.tile_x), i64::from(coords.tile_y)],
            [i64::from(coords.pixel_x), i64::from(coords.pixel_y)],
            tile_size,
        );
        self.last_pixel = Some(coords);
        Ok(BridgeEvent::PixelSelected { coords, display })
    }

    fn handle_tile(
        &self,
        endpoint: &str,
        blob_id: Option<Uuid>,
        blob_data: Option<Vec<u8>>,
    ) -> BridgeEvent {
        let Some(blob_id) = blob_id else {
            return BridgeEvent::Ignored;
        };
        let original = blob_data.unwrap_or_default();
        let pass_through = |original: Vec<u8>| BridgeEvent::Tile {
            reply: TileReply {
                source: self.marker.clone(),
                blob_id,
                blob_data: original,
            },
            composited: false,
            pixel_count: 0,
        };

        if self.disabled {
            return pass_through(original);
        }
        let address = match tile_address(endpoint) {
            Ok(address) => address,
            Err(err) => {
                trace_warn!("tile_address_invalid", reason = err.to_string().as_str());
                return pass_through(original);
            }
        };
        match self.registry.composite_tile(&original, address) {
            Ok(out) => BridgeEvent::Tile {
                reply: TileReply {
                    source: self.marker.clone(),
                    blob_id,
                    blob_data: out.png,
                },
                composited: true,
                pixel_count: out.pixel_count,
            },
            Err(err) => {
                trace_warn!("tile_passthrough", reason = err.to_string().as_str());
                pass_through(original)
            }
        }
    }
}

/// Reduces an endpoint URL to the last path segment that is neither numeric
/// nor a file name.
///
/// `".../api/pixel/0/0?x=1"` gives `pixel`, `".../tiles/0/0.png"` gives `tiles`.
pub fn endpoint_name(endpoint: &str) -> Option<&str> {
    let path = endpoint.split('?').next().unwrap_or_default();
    path.split('/')
        .filter(|s| !s.is_empty())
        .filter(|s| s.parse::<f64>().is_err())
        .filter(|s| !s.contains('.'))
        .last()
}

/// Tile address from the last two path segments, e.g. `.../tiles/12/34.png`.
pub fn tile_address(endpoint: &str) -> BlueMarbleResult<TileAddress> {
    let path = endpoint.split('?').next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let [.., x, y] = segments.as_slice() else {
        return Err(BlueMarbleError::malformed(endpoint, "expected a tile path"));
    };
    let y = y.split('.').next().unwrap_or_default();
    TileAddress::from_parts(x, y)
}

/// Pixels still needed to reach the next level.
pub fn next_level_pixels(level: f64, pixels_painted: f64) -> i64 {
    let needed = (level.floor() * 30f64.powf(0.65)).powf(1.0 / 0.65);
    (needed - pixels_painted).ceil() as i64
}

fn query_param<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
