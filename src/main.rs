use anyhow::Result;
use clap::Parser;

use ocr_wordlist_rust::{CancelFlag, Config, logging};

#[derive(Parser, Debug)]
#[command(
    name = "ocr-wordlist-rust",
    version,
    about = "OCR the images in a PDF and extract a word/translation list with Gemini"
)]
struct Cli {
    /// PDF file whose embedded images are read
    #[arg(short = 'p', long = "pdf")]
    pdf: Option<String>,

    /// Destination of the JSON word list (overwritten)
    #[arg(short = 'o', long = "output-json")]
    output_json: Option<String>,

    /// Accepted for compatibility; no CSV is written
    #[arg(long = "output-csv")]
    output_csv: Option<String>,

    /// Gemini API key (overrides settings)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Primary OCR language (display name or tesseract code)
    #[arg(long = "lang1")]
    lang1: Option<String>,

    /// Secondary OCR language (display name or tesseract code)
    #[arg(long = "lang2")]
    lang2: Option<String>,

    /// Gemini model name
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// Fail instead of writing the "Failed!" sentinel
    #[arg(long = "strict")]
    strict: bool,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Show supported languages and exit
    #[arg(long = "list-languages")]
    list_languages: bool,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; stopping after the current step");
            on_interrupt.cancel();
        }
    });

    let output = ocr_wordlist_rust::run(
        Config {
            pdf: cli.pdf,
            output_json: cli.output_json,
            output_csv: cli.output_csv,
            key: cli.key,
            lang1: cli.lang1,
            lang2: cli.lang2,
            model: cli.model,
            strict: cli.strict,
            settings_path: cli.read_settings,
            list_languages: cli.list_languages,
        },
        cancel,
    )
    .await?;

    println!("{}", output);
    Ok(())
}
