//! Generate Command
//!
//! Run one prompt over a batch of examples and print one JSON object per
//! result (JSON Lines).
//!
//! Usage:
//!   allm generate --prompt "Summarize: {text}" --input data.jsonl [--schema summary]
//!   allm generate --prompt @prompt.txt --long-text --output results.jsonl

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::ai::model::LlmModel;
use crate::ai::provider::create_backend;
use crate::ai::schema::{KeywordsOutput, SummaryOutput};
use crate::cli::ui::Output;
use crate::config::{Config, ConfigLoader, ModelKind};
use crate::io::load_input_data;
use crate::types::{ResponseData, Result};

/// Built-in output schema selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchemaKind {
    Summary,
    Keywords,
}

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Prompt text, or `@path` to read it from a file
    pub prompt: String,
    pub input: Option<PathBuf>,
    pub limit: Option<usize>,
    pub system: Option<String>,
    pub schema: Option<SchemaKind>,
    pub long_text: bool,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub kind: Option<ModelKind>,
}

pub async fn run(options: GenerateOptions) -> Result<()> {
    let out = Output::new();
    let config = load_config(&options)?;
    let prompt = read_prompt(&options.prompt)?;
    let input = options
        .input
        .as_deref()
        .map(|path| load_input_data(path, options.limit))
        .transpose()?;

    let backend = create_backend(&config.model)?;
    let model = LlmModel::new(backend, config.model_config()?)?;
    out.info(&format!(
        "Generating with {} ({} examples)",
        model.backend_name(),
        input.as_ref().map_or(1, Vec::len)
    ));

    let input = input.as_deref();
    let system = options.system.as_deref();
    let (lines, failed) = match options.schema {
        None => to_json_lines(&model.generate(&prompt, input, system).await?)?,
        Some(SchemaKind::Summary) => to_json_lines(
            &model
                .generate_structured::<SummaryOutput>(&prompt, input, system)
                .await?,
        )?,
        Some(SchemaKind::Keywords) => to_json_lines(
            &model
                .generate_structured::<KeywordsOutput>(&prompt, input, system)
                .await?,
        )?,
    };

    match &options.output {
        Some(path) => {
            fs::write(path, &lines)?;
            out.success(&format!("Results written to {}", path.display()));
        }
        None => print!("{}", lines),
    }

    if failed > 0 {
        out.warning(&format!("{} example(s) returned an error", failed));
    }
    Ok(())
}

fn load_config(options: &GenerateOptions) -> Result<Config> {
    let mut config = match &options.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };

    if let Some(kind) = options.kind {
        config.model.kind = kind;
    }
    if options.long_text {
        config.long_text.enabled = true;
    }

    config.validate()?;
    Ok(config)
}

/// Prompt text, read from a file when given as `@path`
fn read_prompt(arg: &str) -> Result<String> {
    match arg.strip_prefix('@') {
        Some(path) => Ok(fs::read_to_string(Path::new(path))?),
        None => Ok(arg.to_string()),
    }
}

/// JSON Lines plus the number of failed examples
fn to_json_lines<R: Serialize>(results: &[ResponseData<R>]) -> Result<(String, usize)> {
    let mut lines = String::new();
    for result in results {
        lines.push_str(&serde_json::to_string(result)?);
        lines.push('\n');
    }
    let failed = results.iter().filter(|r| !r.is_success()).count();
    Ok((lines, failed))
}
