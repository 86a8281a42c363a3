use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{PipelineError, PipelineResult};
use crate::languages::LanguagePair;
use crate::logging::RunLog;
use crate::ocr::TextRecognizer;
use crate::output::write_result;
use crate::pdf::PdfImages;
use crate::providers::Provider;
use crate::structuring::{Structured, StructuringClient};

/// Everything one run needs, captured when the run is requested.
#[derive(Clone)]
pub struct PipelineConfig {
    pub pdf_path: PathBuf,
    pub output_json_path: PathBuf,
    /// Accepted for compatibility; nothing is written here.
    pub output_csv_path: Option<PathBuf>,
    pub api_key: String,
    pub languages: LanguagePair,
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("pdf_path", &self.pdf_path)
            .field("output_json_path", &self.output_json_path)
            .field("output_csv_path", &self.output_csv_path)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .field("languages", &self.languages)
            .finish()
    }
}

/// Shared stop request, checked between stages and between images.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub images: usize,
    pub result: Structured,
    pub output_path: PathBuf,
}

pub fn aggregate_text(page_texts: &[String]) -> String {
    page_texts.join("\n")
}

pub struct Pipeline<R: TextRecognizer, P: Provider> {
    recognizer: R,
    client: StructuringClient<P>,
    cancel: CancelFlag,
}

impl<R: TextRecognizer, P: Provider> Pipeline<R, P> {
    pub fn new(recognizer: R, client: StructuringClient<P>) -> Self {
        Self {
            recognizer,
            client,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// PDF images → OCR → one text blob → AI structuring → JSON file.
    /// The first error stops the run and nothing is written.
    pub async fn run(
        &self,
        config: &PipelineConfig,
        log: &mut RunLog,
    ) -> PipelineResult<RunSummary> {
        self.checkpoint()?;
        let pdf = PdfImages::open(&config.pdf_path)?;
        log.info(format!(
            "Reading {} ({} pages)",
            config.pdf_path.display(),
            pdf.page_count()
        ));

        let mut page_texts = Vec::new();
        for extracted in pdf.iter() {
            self.checkpoint()?;
            let extracted = extracted?;
            let raster = extracted.decode()?;
            let lines = self.recognizer.recognize(&raster)?;
            log.info(format!(
                "Page {} image {}: {} lines recognized",
                extracted.page + 1,
                extracted.index + 1,
                lines.len()
            ));
            page_texts.push(lines.join("\n"));
        }
        drop(pdf);

        if page_texts.is_empty() {
            log.warn("No embedded images found; sending empty text");
        }
        let text = aggregate_text(&page_texts);

        self.checkpoint()?;
        let result = self.client.structure(&text, log).await?;

        self.checkpoint()?;
        write_result(&config.output_json_path, &result)?;
        log.info(format!("JSON saved: {}", config.output_json_path.display()));
        if let Some(csv) = &config.output_csv_path {
            log.warn(format!("CSV output is not produced; ignoring {}", csv.display()));
        }
        log.info("OCR & AI processing completed!");

        Ok(RunSummary {
            images: page_texts.len(),
            result,
            output_path: config.output_json_path.clone(),
        })
    }

    fn checkpoint(&self) -> PipelineResult<()> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }
}
