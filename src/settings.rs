use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ocr::OcrOptions;
use crate::providers::DEFAULT_MODEL;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub primary_language: String,
    pub secondary_language: String,
    pub gemini_model: String,
    pub gemini_key: Option<String>,
    pub gemini_base_url: Option<String>,
    pub ocr: OcrOptions,
    pub strict: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            primary_language: "English".to_string(),
            secondary_language: "Turkish".to_string(),
            gemini_model: DEFAULT_MODEL.to_string(),
            gemini_key: None,
            gemini_base_url: None,
            ocr: OcrOptions::default(),
            strict: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    languages: Option<LanguageSettings>,
    gemini: Option<GeminiSettings>,
    ocr: Option<OcrSettings>,
    output: Option<OutputSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct LanguageSettings {
    primary: Option<String>,
    secondary: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GeminiSettings {
    model: Option<String>,
    key: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSettings {
    psm: Option<u32>,
    dpi: Option<u32>,
    preprocess: Option<bool>,
    binarize: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct OutputSettings {
    strict: Option<bool>,
}

/// Built-in defaults, then `settings.toml` and `settings.local.toml` from the
/// working directory, then `extra_path`. Later files win field by field.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    let defaults: SettingsFile =
        toml::from_str(DEFAULT_SETTINGS_TOML).with_context(|| "failed to parse built-in settings")?;
    settings.merge(defaults);

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            settings.merge_file(&path)?;
        }
    }

    Ok(settings)
}

impl Settings {
    fn merge_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings: {}", path.display()))?;
        let parsed: SettingsFile = toml::from_str(&content)
            .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        self.merge(parsed);
        Ok(())
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(languages) = incoming.languages {
            if let Some(primary) = non_blank(languages.primary) {
                self.primary_language = primary;
            }
            if let Some(secondary) = non_blank(languages.secondary) {
                self.secondary_language = secondary;
            }
        }
        if let Some(gemini) = incoming.gemini {
            if let Some(model) = non_blank(gemini.model) {
                self.gemini_model = model;
            }
            if let Some(key) = non_blank(gemini.key) {
                self.gemini_key = Some(key);
            }
            if let Some(base_url) = non_blank(gemini.base_url) {
                self.gemini_base_url = Some(base_url);
            }
        }
        if let Some(ocr) = incoming.ocr {
            if let Some(psm) = ocr.psm {
                self.ocr.psm = psm;
            }
            if let Some(dpi) = ocr.dpi
                && dpi > 0
            {
                self.ocr.dpi = dpi;
            }
            if let Some(preprocess) = ocr.preprocess {
                self.ocr.preprocess = preprocess;
            }
            if let Some(binarize) = ocr.binarize {
                self.ocr.binarize = binarize;
            }
        }
        if let Some(output) = incoming.output
            && let Some(strict) = output.strict
        {
            self.strict = strict;
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
