//! Template registry: the owned template collection and its persisted form.
//!
//! The registry is the single shared mutable resource. Mutations (create,
//! delete, enable/disable, import) complete fully before returning; the
//! compositor only ever reads an `Arc` snapshot taken at the start of a
//! pass, so a concurrent mutation never tears a fragment and at worst makes
//! one composite stale until the next tile fetch.
//!
//! Every mutation re-writes the persisted document through the configured
//! [`TemplateStore`]. A failed write is reported through [`Persisted`] and
//! never rolls back the in-memory change.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::composite::{composite_tile, CompositedTile};
use crate::coords::{Anchor, TileAddress};
use crate::image::io::decode_rgba;
use crate::image::RgbaImage;
use crate::template::{EngineConfig, Template, TemplateKey};
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::encoding::author_id;
use crate::util::{BlueMarbleError, BlueMarbleResult};

pub mod document;
pub mod store;

pub use document::{BlueMarbleParser, DocumentParser, TemplateDocument, TemplateRecord};
pub use store::{FileStore, MemoryStore, TemplateStore};

/// Version stamped into exported documents.
pub const SCRIPT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A mutation result together with the outcome of persisting it.
#[derive(Debug)]
#[must_use]
pub struct Persisted<T> {
    pub value: T,
    /// Set when writing the document failed; the in-memory state is still valid.
    pub storage_error: Option<BlueMarbleError>,
}

impl<T> Persisted<T> {
    /// Converts a storage failure into an error, discarding the value.
    pub fn into_result(self) -> BlueMarbleResult<T> {
        match self.storage_error {
            Some(err) => Err(err),
            None => Ok(self.value),
        }
    }
}

/// Summary of a successfully created template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedTemplate {
    pub key: TemplateKey,
    pub pixel_count: u64,
    pub fragments: usize,
}

/// Outcome of importing one document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportedDocument {
    /// Number of templates added or replaced.
    pub imported: usize,
    /// Keys that already existed and were overwritten.
    pub replaced: Vec<TemplateKey>,
}

/// Outcome of importing several documents.
#[derive(Debug, Default)]
pub struct ImportReport {
    /// Number of templates added or replaced.
    pub imported: usize,
    /// Keys overwritten by a later template with the same key, in import order.
    pub replaced: Vec<TemplateKey>,
    /// Index of each skipped document and why it was skipped.
    pub skipped: Vec<(usize, BlueMarbleError)>,
    pub storage_error: Option<BlueMarbleError>,
}

/// Owns the template collection.
pub struct TemplateRegistry {
    config: EngineConfig,
    templates: BTreeMap<TemplateKey, Arc<Template>>,
    parsers: Vec<Arc<dyn DocumentParser>>,
    store: Option<Box<dyn TemplateStore>>,
    user_id: Option<u64>,
}

impl TemplateRegistry {
    /// Creates an empty registry without persistence.
    pub fn new(config: EngineConfig) -> BlueMarbleResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            templates: BTreeMap::new(),
            parsers: document::default_parsers(),
            store: None,
            user_id: None,
        })
    }

    /// Attaches a storage backend used after every mutation.
    pub fn with_store(mut self, store: impl TemplateStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Appends a parser strategy consulted after the built-in ones.
    pub fn with_parser(mut self, parser: impl DocumentParser + 'static) -> Self {
        self.parsers.push(Arc::new(parser));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Records the numeric id of the current user.
    pub fn set_user_id(&mut self, user_id: u64) {
        self.user_id = Some(user_id);
    }

    pub fn user_id(&self) -> Option<u64> {
        self.user_id
    }

    /// Author namespace for templates created in this session.
    ///
    /// Empty until the user id is known.
    pub fn author_id(&self) -> String {
        self.user_id.map(author_id).unwrap_or_default()
    }

    /// Sort id assigned to the next created template.
    pub fn next_sort_id(&self) -> u32 {
        self.templates
            .keys()
            .map(|key| key.sort_id)
            .max()
            .map_or(0, |max| max.saturating_add(1))
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    /// Sum of pixel counts over all templates.
    pub fn total_pixel_count(&self) -> u64 {
        self.templates.values().map(|t| t.pixel_count()).sum()
    }

    pub fn get(&self, key: &TemplateKey) -> Option<&Template> {
        self.templates.get(key).map(Arc::as_ref)
    }

    /// Templates in key order.
    pub fn templates(&self) -> impl Iterator<Item = &Template> {
        self.templates.values().map(Arc::as_ref)
    }

    /// Cheap point-in-time copy of the collection for compositing.
    pub fn snapshot(&self) -> Vec<Arc<Template>> {
        self.templates.values().cloned().collect()
    }

    /// Decodes `image_bytes`, chunks it at `anchor` and registers the result.
    pub fn create_template(
        &mut self,
        image_bytes: &[u8],
        name: &str,
        anchor: Anchor,
    ) -> BlueMarbleResult<Persisted<CreatedTemplate>> {
        anchor.validate(self.config.tile_size)?;
        let source = decode_rgba(image_bytes)?;
        self.create_template_from_image(&source, name, anchor)
    }

    /// Like [`TemplateRegistry::create_template`] with coordinates given as text.
    pub fn create_template_at(
        &mut self,
        image_bytes: &[u8],
        name: &str,
        coords: &str,
    ) -> BlueMarbleResult<Persisted<CreatedTemplate>> {
        let anchor = Anchor::parse(coords, self.config.tile_size)?;
        self.create_template(image_bytes, name, anchor)
    }

    /// Chunks an already decoded image and registers the result.
    pub fn create_template_from_image(
        &mut self,
        source: &RgbaImage,
        name: &str,
        anchor: Anchor,
    ) -> BlueMarbleResult<Persisted<CreatedTemplate>> {
        let key = TemplateKey::new(self.next_sort_id(), self.author_id());
        let template = Template::create(name, key.clone(), source, anchor, &self.config)?;
        let created = CreatedTemplate {
            key: key.clone(),
            pixel_count: template.pixel_count(),
            fragments: template.fragments().len(),
        };
        trace_event!(
            "template_created",
            sort_id = key.sort_id,
            pixel_count = created.pixel_count,
            fragments = created.fragments
        );
        self.templates.insert(key, Arc::new(template));
        Ok(self.persisted(created))
    }

    /// Removes a template from memory and from the persisted document.
    pub fn delete_template(&mut self, key: &TemplateKey) -> BlueMarbleResult<Persisted<()>> {
        if self.templates.remove(key).is_none() {
            return Err(BlueMarbleError::TemplateNotFound {
                key: key.to_string(),
            });
        }
        Ok(self.persisted(()))
    }

    /// Shows or hides a template; hidden templates are skipped when compositing.
    pub fn set_enabled(
        &mut self,
        key: &TemplateKey,
        enabled: bool,
    ) -> BlueMarbleResult<Persisted<()>> {
        let template = self
            .templates
            .get_mut(key)
            .ok_or_else(|| BlueMarbleError::TemplateNotFound {
                key: key.to_string(),
            })?;
        Arc::make_mut(template).set_enabled(enabled);
        Ok(self.persisted(()))
    }

    /// Composites the current templates over a live tile.
    pub fn composite_tile(
        &self,
        tile_bytes: &[u8],
        address: TileAddress,
    ) -> BlueMarbleResult<CompositedTile> {
        let snapshot = self.snapshot();
        crate::composite::composite_tile_bytes(tile_bytes, address, &snapshot, &self.config)
    }

    /// Composites the current templates over an already decoded tile.
    pub fn composite_bitmap(
        &self,
        tile: &RgbaImage,
        address: TileAddress,
    ) -> BlueMarbleResult<CompositedTile> {
        composite_tile(tile, address, &self.snapshot(), &self.config)
    }

    /// Imports one serialized document.
    ///
    /// Templates whose key already exists are replaced and listed in
    /// [`ImportedDocument::replaced`]. A document no parser accepts fails with
    /// `UnrecognizedSchema` and leaves the registry untouched.
    pub fn import_serialized(
        &mut self,
        json: &str,
    ) -> BlueMarbleResult<Persisted<ImportedDocument>> {
        let imported = self.import_without_persist(json)?;
        Ok(self.persisted(imported))
    }

    /// Imports several documents, skipping the ones that fail.
    pub fn import_batch<'a>(&mut self, docs: impl IntoIterator<Item = &'a str>) -> ImportReport {
        let mut report = ImportReport::default();
        for (idx, json) in docs.into_iter().enumerate() {
            match self.import_without_persist(json) {
                Ok(doc) => {
                    report.imported += doc.imported;
                    report.replaced.extend(doc.replaced);
                }
                Err(err) => {
                    trace_warn!("import_skipped", index = idx, reason = err.to_string().as_str());
                    report.skipped.push((idx, err));
                }
            }
        }
        if report.imported > 0 {
            report.storage_error = self.persist();
        }
        report
    }

    /// Merges the document held by the store, if any, without writing back.
    pub fn load_from_store(&mut self) -> BlueMarbleResult<usize> {
        let text = match &self.store {
            Some(store) => store.load()?,
            None => None,
        };
        match text {
            Some(text) => Ok(self.import_without_persist(&text)?.imported),
            None => Ok(0),
        }
    }

    /// Current persisted form of the collection.
    pub fn export_document(&self) -> TemplateDocument {
        TemplateDocument::from_templates(SCRIPT_VERSION, self.templates())
    }

    /// Current persisted form as pretty JSON.
    pub fn export_serialized(&self) -> BlueMarbleResult<String> {
        serde_json::to_string_pretty(&self.export_document()).map_err(BlueMarbleError::serialization)
    }

    fn import_without_persist(&mut self, json: &str) -> BlueMarbleResult<ImportedDocument> {
        let _span = trace_span!("import_document").entered();
        let value: Value = serde_json::from_str(json).map_err(BlueMarbleError::serialization)?;
        let parser = self
            .parsers
            .iter()
            .find(|parser| parser.accepts(&value))
            .cloned()
            .ok_or_else(|| document::unrecognized(&value))?;
        let templates = parser.parse(value, &self.config)?;
        let mut doc = ImportedDocument {
            imported: templates.len(),
            replaced: Vec::new(),
        };
        for template in templates {
            let key = template.key().clone();
            if self.templates.insert(key.clone(), Arc::new(template)).is_some() {
                trace_warn!("template_replaced", key = key.to_string().as_str());
                doc.replaced.push(key);
            }
        }
        trace_event!(
            "imported",
            parser = parser.name(),
            templates = doc.imported,
            replaced = doc.replaced.len()
        );
        Ok(doc)
    }

    fn persisted<T>(&mut self, value: T) -> Persisted<T> {
        Persisted {
            value,
            storage_error: self.persist(),
        }
    }

    fn persist(&mut self) -> Option<BlueMarbleError> {
        self.store.as_ref()?;
        let text = match self.export_serialized() {
            Ok(text) => text,
            Err(err) => return Some(err),
        };
        let store = self.store.as_mut()?;
        let err = store.save(&text).err()?;
        trace_warn!("persist_failed", reason = err.to_string().as_str());
        Some(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::io::encode_png;
    use crate::image::Rgba;

    fn png(width: u32, height: u32) -> Vec<u8> {
        encode_png(&RgbaImage::from_pixel(width, height, Rgba([200, 10, 10, 255]))).unwrap()
    }

    fn registry() -> TemplateRegistry {
        TemplateRegistry::new(EngineConfig {
            tile_size: 10,
            ..EngineConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn sort_ids_increase_from_zero() {
        let mut reg = registry();
        assert_eq!(reg.next_sort_id(), 0);
        let anchor = Anchor::new(0, 0, 0, 0, 10).unwrap();
        let a = reg.create_template(&png(2, 2), "a", anchor).unwrap().value;
        let b = reg.create_template(&png(2, 2), "b", anchor).unwrap().value;
        assert_eq!(a.key.sort_id, 0);
        assert_eq!(b.key.sort_id, 1);
        assert_eq!(reg.total_pixel_count(), 8);
    }

    #[test]
    fn author_id_follows_user() {
        let mut reg = registry();
        assert_eq!(reg.author_id(), "");
        reg.set_user_id(92);
        assert_eq!(reg.author_id(), "#!");
    }

    #[test]
    fn malformed_coordinates_abort_before_decode() {
        let mut reg = registry();
        let err = reg
            .create_template_at(b"not an image", "a", "1, 2, x, 4")
            .unwrap_err();
        assert!(matches!(err, BlueMarbleError::MalformedCoordinates { .. }));
        assert_eq!(reg.template_count(), 0);
    }

    #[test]
    fn snapshot_is_not_affected_by_later_toggle() {
        let mut reg = registry();
        let anchor = Anchor::new(0, 0, 0, 0, 10).unwrap();
        let key = reg.create_template(&png(1, 1), "a", anchor).unwrap().value.key;
        let snapshot = reg.snapshot();
        reg.set_enabled(&key, false).unwrap().into_result().unwrap();
        assert!(snapshot[0].is_enabled());
        assert!(!reg.get(&key).unwrap().is_enabled());
    }
}
