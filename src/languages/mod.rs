use std::fmt;

use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    English,
    Turkish,
    SimplifiedChinese,
    Japanese,
    French,
    Spanish,
    German,
    Russian,
}

impl Language {
    pub const ALL: [Language; 8] = [
        Language::English,
        Language::Turkish,
        Language::SimplifiedChinese,
        Language::Japanese,
        Language::French,
        Language::Spanish,
        Language::German,
        Language::Russian,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Turkish => "Turkish",
            Language::SimplifiedChinese => "Simplified Chinese",
            Language::Japanese => "Japanese",
            Language::French => "French",
            Language::Spanish => "Spanish",
            Language::German => "German",
            Language::Russian => "Russian",
        }
    }

    /// Tesseract traineddata name.
    pub fn ocr_code(&self) -> &'static str {
        match self {
            Language::English => "eng",
            Language::Turkish => "tur",
            Language::SimplifiedChinese => "chi_sim",
            Language::Japanese => "jpn",
            Language::French => "fra",
            Language::Spanish => "spa",
            Language::German => "deu",
            Language::Russian => "rus",
        }
    }

    pub fn from_name(name: &str) -> PipelineResult<Self> {
        let needle = name.trim();
        Self::ALL
            .into_iter()
            .find(|lang| {
                lang.display_name().eq_ignore_ascii_case(needle)
                    || lang.ocr_code().eq_ignore_ascii_case(needle)
            })
            .ok_or_else(|| PipelineError::UnknownLanguage(needle.to_string()))
    }

    fn needs_english_partner(&self) -> bool {
        matches!(self, Language::SimplifiedChinese | Language::Japanese)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// The two OCR languages active for one run.
///
/// Chinese and Japanese recognition models only load alongside English, so a
/// pair containing either of them always has English as the other member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguagePair {
    primary: Language,
    secondary: Language,
}

impl LanguagePair {
    pub fn new(primary: Language, secondary: Language) -> Self {
        let mut primary = primary;
        let mut secondary = secondary;
        if primary.needs_english_partner() && secondary != Language::English {
            secondary = Language::English;
        }
        if secondary.needs_english_partner() && primary != Language::English {
            primary = Language::English;
        }
        Self { primary, secondary }
    }

    pub fn from_names(primary: &str, secondary: &str) -> PipelineResult<Self> {
        Ok(Self::new(
            Language::from_name(primary)?,
            Language::from_name(secondary)?,
        ))
    }

    pub fn primary(&self) -> Language {
        self.primary
    }

    pub fn secondary(&self) -> Language {
        self.secondary
    }

    pub fn ocr_codes(&self) -> Vec<&'static str> {
        let mut codes = vec![self.primary.ocr_code()];
        if self.secondary != self.primary {
            codes.push(self.secondary.ocr_code());
        }
        codes
    }
}

impl Default for LanguagePair {
    fn default() -> Self {
        Self::new(Language::English, Language::Turkish)
    }
}

pub fn format_language_list() -> String {
    Language::ALL
        .iter()
        .map(|lang| format!("{}\t{}", lang.display_name(), lang.ocr_code()))
        .collect::<Vec<_>>()
        .join("\n")
}
