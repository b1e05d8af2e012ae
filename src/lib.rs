//! BlueMarble overlays pixel-art templates on a tiled collaborative canvas.
//!
//! A template image anchored at a `(tile, pixel)` coordinate is split into
//! tile-aligned fragments, each magnified 3x with all but the centre
//! sub-pixel of every block made transparent. When the site fetches a tile,
//! the matching fragments are composited over it so the live canvas stays
//! visible between the template's dots.
//!
//! Compositing is pure CPU work over `image::RgbaImage`; with the `rayon`
//! feature, fragment encoding runs in parallel. Enable `tracing` to emit
//! spans and events.

pub mod bridge;
pub mod composite;
pub mod coords;
pub mod image;
pub mod registry;
pub mod template;
mod trace;
pub mod util;

pub use bridge::{Bridge, BridgeEvent, InboundMessage, TileReply};
pub use composite::{composite_tile, CompositedTile};
pub use coords::{to_display_coordinates, Anchor, TileAddress, TileKey};
pub use registry::{
    CreatedTemplate, FileStore, ImportReport, ImportedDocument, MemoryStore, Persisted,
    TemplateDocument, TemplateRegistry, TemplateStore,
};
pub use template::{
    chunk_template, plan_fragments, CountMode, EngineConfig, Fragment, FragmentPlan, Template,
    TemplateKey,
};
pub use util::{number_to_encoded, BlueMarbleError, BlueMarbleResult};
