// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The CPU-bound half of a generation: photo normalization, MRZ and barcode
// encoding, card rendering and PDF assembly. Everything here is synchronous
// and deterministic; the orchestrator runs it on the blocking pool.

use cardwerk_core::config::EngineConfig;
use cardwerk_core::error::Result;
use cardwerk_core::types::{CropRegion, Identity, MrzPayload};
use cardwerk_render::{
    BarcodeEncoder, BarcodePayload, CardRenderer, DocumentAssembler, MrzEncoder, PhotoNormalizer,
    ProcessedPhoto, TemplateAssets, encode_png,
};
use cardwerk_store::hash_parts;
use tracing::{debug, instrument};

/// Encoded outputs of one render pass, not yet stored.
#[derive(Debug, Clone)]
pub struct RenderedArtifacts {
    pub original_photo: Vec<u8>,
    pub processed_photo: ProcessedPhoto,
    /// Cache key the processed photo is remembered under.
    pub photo_cache_key: String,
    pub front_png: Vec<u8>,
    pub back_png: Vec<u8>,
    pub front_pdf: Vec<u8>,
    pub back_pdf: Vec<u8>,
    pub combined_pdf: Vec<u8>,
    pub mrz: MrzPayload,
}

/// Renderers and loaded template assets, built once per engine.
#[derive(Debug)]
pub struct Pipeline {
    normalizer: PhotoNormalizer,
    mrz: MrzEncoder,
    barcode: BarcodeEncoder,
    renderer: CardRenderer,
    assets: TemplateAssets,
    documents: DocumentAssembler,
    issuing_state: String,
}

impl Pipeline {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let renderer = CardRenderer::new(config);
        let assets = TemplateAssets::load(&config.assets, &config.card, renderer.layout());
        Ok(Self {
            normalizer: PhotoNormalizer::new(config.photo.clone()),
            mrz: MrzEncoder::new(&config.assets.issuing_state),
            barcode: renderer.barcode_encoder()?,
            documents: DocumentAssembler::new(&config.card),
            issuing_state: config.assets.issuing_state.clone(),
            renderer,
            assets,
        })
    }

    /// Key of the processed-photo cache: source hash, processing parameters
    /// and the requested crop.
    pub fn photo_cache_key(&self, source_hash: &str, region: Option<CropRegion>) -> String {
        let region = region
            .map(|r| format!("{},{},{},{}", r.x, r.y, r.width, r.height))
            .unwrap_or_else(|| "auto".to_owned());
        hash_parts(&[source_hash, &self.normalizer.spec().parameter_key(), &region])
    }

    pub fn normalize(&self, raw: &[u8], region: Option<CropRegion>) -> Result<ProcessedPhoto> {
        self.normalizer.normalize(raw, region)
    }

    /// Wrap a cached processed JPEG.
    pub fn reuse_photo(&self, jpeg: Vec<u8>) -> Result<ProcessedPhoto> {
        ProcessedPhoto::from_jpeg(jpeg, self.normalizer.spec().parameter_key())
    }

    /// Encode, render and assemble every output for `identity`.
    #[instrument(skip_all, fields(license = %identity.license_number, photo = %photo.hash))]
    pub fn render(
        &self,
        identity: &Identity,
        photo: ProcessedPhoto,
        original_photo: Vec<u8>,
        photo_cache_key: String,
    ) -> Result<RenderedArtifacts> {
        let mrz = self.mrz.encode(identity)?;
        let payload = BarcodePayload::from_identity(identity, &self.issuing_state).to_bytes()?;
        let symbol = self.barcode.encode(&payload)?;
        debug!(payload_len = payload.len(), rows = symbol.rows(), "barcode encoded");

        let front = self.renderer.render_front(identity, &photo, &self.assets)?;
        let back = self.renderer.render_back(identity, &mrz, &symbol, &self.assets)?;

        let front_pdf = self
            .documents
            .to_document(&front, &format!("{} front", identity.license_number))?;
        let back_pdf = self
            .documents
            .to_document(&back, &format!("{} back", identity.license_number))?;
        let combined_pdf = self
            .documents
            .combine(&front_pdf, &back_pdf, &identity.license_number)?;

        Ok(RenderedArtifacts {
            front_png: encode_png(&front)?,
            back_png: encode_png(&back)?,
            front_pdf,
            back_pdf,
            combined_pdf,
            original_photo,
            processed_photo: photo,
            photo_cache_key,
            mrz,
        })
    }
}
