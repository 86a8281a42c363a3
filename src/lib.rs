use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};

pub mod error;
pub mod languages;
pub mod logging;
pub mod ocr;
pub mod output;
pub mod pdf;
pub mod pipeline;
mod providers;
pub mod settings;
pub mod structuring;

#[cfg(test)]
mod test_util;

pub use error::{PipelineError, PipelineResult, ResponseParseError};
pub use languages::{Language, LanguagePair};
pub use logging::RunLog;
pub use ocr::{OcrOptions, TesseractEngine, TextRecognizer};
pub use pipeline::{CancelFlag, Pipeline, PipelineConfig, RunSummary};
pub use providers::{Gemini, Provider, ProviderFuture, ProviderResponse, ProviderUsage};
pub use structuring::{ParseMode, Structured, StructuringClient, WordEntry};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub pdf: Option<String>,
    pub output_json: Option<String>,
    pub output_csv: Option<String>,
    pub key: Option<String>,
    pub lang1: Option<String>,
    pub lang2: Option<String>,
    pub model: Option<String>,
    pub strict: bool,
    pub settings_path: Option<String>,
    pub list_languages: bool,
}

pub async fn run(config: Config, cancel: CancelFlag) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;

    if config.list_languages {
        return Ok(languages::format_language_list());
    }

    let pipeline_config = build_pipeline_config(&config, &settings)?;
    let mode = if config.strict || settings.strict {
        ParseMode::Strict
    } else {
        ParseMode::Compatible
    };

    let engine = TesseractEngine::new(&pipeline_config.languages, settings.ocr)?;

    let mut log = RunLog::echoing();
    log.info(format!(
        "Selected OCR languages: {} + {} (tesseract: {})",
        pipeline_config.languages.primary(),
        pipeline_config.languages.secondary(),
        engine.languages()
    ));

    let model = config
        .model
        .clone()
        .unwrap_or_else(|| settings.gemini_model.clone());
    let mut provider = Gemini::new(pipeline_config.api_key.clone()).with_model(model);
    if let Some(base_url) = settings.gemini_base_url.as_deref() {
        provider = provider.with_base_url(base_url);
    }

    let pipeline = Pipeline::new(engine, StructuringClient::new(provider, mode))
        .with_cancel_flag(cancel);
    let summary = pipeline.run(&pipeline_config, &mut log).await?;

    Ok(format_summary(&summary))
}

fn build_pipeline_config(config: &Config, settings: &settings::Settings) -> Result<PipelineConfig> {
    let pdf_path = required_path(config.pdf.as_deref(), "--pdf")?;
    let output_json_path = required_path(config.output_json.as_deref(), "--output-json")?;
    let output_csv_path = config
        .output_csv
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from);

    let languages = LanguagePair::from_names(
        config.lang1.as_deref().unwrap_or(&settings.primary_language),
        config.lang2.as_deref().unwrap_or(&settings.secondary_language),
    )?;

    let api_key = config
        .key
        .clone()
        .or_else(|| settings.gemini_key.clone())
        .unwrap_or_default();

    Ok(PipelineConfig {
        pdf_path,
        output_json_path,
        output_csv_path,
        api_key: api_key.trim().to_string(),
        languages,
    })
}

fn required_path(value: Option<&str>, flag: &str) -> Result<PathBuf> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("{} is required", flag))
}

fn format_summary(summary: &RunSummary) -> String {
    match &summary.result {
        Structured::Entries(entries) => format!(
            "{} words from {} images written to {}",
            entries.len(),
            summary.images,
            summary.output_path.display()
        ),
        Structured::Failed => format!(
            "no usable word list from {} images; wrote [\"{}\"] to {}",
            summary.images,
            structuring::SENTINEL,
            summary.output_path.display()
        ),
    }
}
