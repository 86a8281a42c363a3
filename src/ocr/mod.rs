mod parse;
mod preprocess;
mod tesseract;
mod text;

use std::io::Write;

use image::DynamicImage;
use tracing::{debug, info};

use crate::error::{PipelineError, PipelineResult};
use crate::languages::LanguagePair;

pub use tesseract::list_tesseract_languages;

/// Turns one raster image into the text lines found on it, top to bottom.
pub trait TextRecognizer {
    fn recognize(&self, image: &DynamicImage) -> PipelineResult<Vec<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcrOptions {
    pub psm: u32,
    pub dpi: u32,
    pub preprocess: bool,
    pub binarize: bool,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            psm: 6,
            dpi: 300,
            preprocess: true,
            binarize: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TesseractEngine {
    languages: String,
    options: OcrOptions,
}

impl TesseractEngine {
    /// Probes the installed traineddata once; recognition reuses the result.
    pub fn new(pair: &LanguagePair, options: OcrOptions) -> PipelineResult<Self> {
        let available = list_tesseract_languages().map_err(ocr_error)?;
        let languages =
            tesseract::select_languages(&pair.ocr_codes(), &available).map_err(ocr_error)?;
        info!("tesseract ready (languages: {}, psm: {})", languages, options.psm);
        Ok(Self { languages, options })
    }

    pub fn languages(&self) -> &str {
        &self.languages
    }
}

impl TextRecognizer for TesseractEngine {
    fn recognize(&self, image: &DynamicImage) -> PipelineResult<Vec<String>> {
        let prepared = if self.options.preprocess {
            let scale = preprocess::ocr_scale(image.width());
            preprocess::prepare_for_ocr(image, scale, self.options.binarize)
        } else {
            image.clone()
        };

        let mut tmp = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .map_err(|err| PipelineError::Ocr(format!("failed to create temp file: {}", err)))?;
        prepared
            .write_to(&mut tmp, image::ImageFormat::Png)
            .map_err(|err| PipelineError::Ocr(format!("failed to write temp image: {}", err)))?;
        tmp.flush()
            .map_err(|err| PipelineError::Ocr(format!("failed to write temp image: {}", err)))?;

        let tsv = tesseract::run_tesseract_tsv(
            tmp.path(),
            &self.languages,
            self.options.psm,
            self.options.dpi,
        )
        .map_err(ocr_error)?;
        let lines = parse::tsv_lines(&tsv);
        debug!("recognized {} lines", lines.len());
        Ok(lines)
    }
}

fn ocr_error(err: anyhow::Error) -> PipelineError {
    PipelineError::Ocr(format!("{:#}", err))
}
