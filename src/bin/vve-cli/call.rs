
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use base64::{engine::general_purpose, Engine as _};
use clap::Args;
use serde::Serialize;
use serde_json::Value;

use vve_cli::types::{AccentPhrase, AudioQuery};
use vve_cli::{EndpointName, TextSource, VveService};

#[derive(Debug, Args)]
pub(crate) struct CallArgs {
    /// Input file (text, JSON, or a directory of wavs for connect_waves)
    #[arg(short, long)]
    file_path: Option<PathBuf>,

    /// Input text, takes precedence over --file-path
    #[arg(long)]
    text: Option<String>,

    /// Treat the text as AquesTalk-style kana
    #[arg(long)]
    kana: bool,

    /// 0-based line of --file-path to use as text
    #[arg(short, long, default_value_t = 0)]
    line_number: usize,

    /// Preset ID for audio_query_from_preset
    #[arg(short, long)]
    preset_id: Option<i32>,
}

pub(crate) fn call_endpoint(
    service: &mut VveService,
    endpoint: EndpointName,
    args: &CallArgs,
    speaker_id: u32,
) -> anyhow::Result<()> {
    match endpoint {
        EndpointName::Version => println!("{}", service.version()?),
        EndpointName::Speakers => print_json(&service.speakers()?)?,
        EndpointName::Presets => print_json(&service.presets()?)?,
        EndpointName::AudioQuery => {
            let text = input_text(args)?;
            print_json(&service.audio_query(&text, speaker_id, None)?)?;
        },
        EndpointName::AudioQueryFromPreset => {
            let preset_id = args.preset_id.ok_or_else(|| anyhow!("--preset-id is required for {}", endpoint))?;
            let text = input_text(args)?;
            print_json(&service.audio_query_from_preset(&text, preset_id, None)?)?;
        },
        EndpointName::AccentPhrases => {
            let text = input_text(args)?;
            print_json(&service.accent_phrases(&text, speaker_id, args.kana, None)?)?;
        },
        EndpointName::MoraData | EndpointName::MoraLength | EndpointName::MoraPitch => {
            let phrases = accent_phrases_from(&read_json(required_file(args)?)?)?;
            let edited = match endpoint {
                EndpointName::MoraData => service.mora_data(&phrases, speaker_id, None)?,
                EndpointName::MoraLength => service.mora_length(&phrases, speaker_id, None)?,
                _ => service.mora_pitch(&phrases, speaker_id, None)?,
            };
            print_json(&edited)?;
        },
        EndpointName::Synthesis => {
            let query: AudioQuery = serde_json::from_value(read_json(required_file(args)?)?)?;
            report_binary(endpoint, &service.synthesis(&query, speaker_id, None)?);
        },
        EndpointName::MultiSynthesis => {
            let queries = audio_queries_from(read_json(required_file(args)?)?)?;
            report_binary(endpoint, &service.multi_synthesis(&queries, speaker_id, None)?);
        },
        EndpointName::ConnectWaves => {
            let waves = encoded_waves(required_file(args)?)?;
            report_binary(endpoint, &service.connect_waves(&waves, None)?);
        },
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report_binary(endpoint: EndpointName, bytes: &[u8]) {
    println!("{}: {} bytes", endpoint, bytes.len());
}

fn required_file(args: &CallArgs) -> anyhow::Result<&Path> {
    args.file_path
        .as_deref()
        .ok_or_else(|| anyhow!("[Error] Less or invalid argument(s): --file-path is required"))
}

/// `--text`, or the chosen line of `--file-path` (line 0 when out of range).
fn input_text(args: &CallArgs) -> anyhow::Result<String> {
    if let Some(text) = args.text.as_ref().filter(|t| !t.is_empty()) {
        return Ok(text.clone());
    }
    let path = args
        .file_path
        .as_ref()
        .filter(|p| p.is_file())
        .ok_or_else(|| anyhow!("[Error] Less or invalid argument(s): --text or --file-path is required"))?;

    let mut texts = TextSource::File(path.clone()).read_texts()?;
    let index = if args.line_number < texts.len() { args.line_number } else { 0 };
    Ok(texts.swap_remove(index))
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let content = std::fs::read_to_string(path).with_context(|| format!("[Error] Invalid path: {}", path.display()))?;
    Ok(serde_json::from_str(&content)?)
}

/// Accepts an audio query, a single accent phrase, or a list of accent phrases.
pub(crate) fn accent_phrases_from(value: &Value) -> anyhow::Result<Vec<AccentPhrase>> {
    let phrases = match value {
        Value::Object(map) => match map.get("accent_phrases") {
            Some(phrases) => serde_json::from_value(phrases.clone())?,
            None => vec![serde_json::from_value(value.clone())?],
        },
        Value::Array(_) => serde_json::from_value(value.clone())?,
        _ => Vec::new(),
    };
    Ok(phrases)
}

/// Accepts a list of audio queries or a single one.
pub(crate) fn audio_queries_from(value: Value) -> anyhow::Result<Vec<AudioQuery>> {
    if value.is_object() {
        Ok(vec![serde_json::from_value(value)?])
    } else {
        Ok(serde_json::from_value(value)?)
    }
}

fn encoded_waves(dir: &Path) -> anyhow::Result<Vec<String>> {
    if !dir.is_dir() {
        return Err(anyhow!("[Error] Invalid path: directory required"));
    }

    let mut paths = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "wav"))
        .collect::<Vec<_>>();
    if paths.is_empty() {
        return Err(anyhow!("[Error] Wave file not found in specified directory"));
    }
    paths.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)));

    paths
        .iter()
        .map(|path| -> anyhow::Result<String> { Ok(general_purpose::STANDARD.encode(std::fs::read(path)?)) })
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum NamePart {
    Number(u64),
    Text(String),
}

fn name_parts(name: &str) -> Vec<NamePart> {
    let mut parts = Vec::new();
    let mut rest = name;
    while let Some(c) = rest.chars().next() {
        let is_digit = c.is_ascii_digit();
        let end = rest
            .find(|c: char| c.is_ascii_digit() != is_digit)
            .unwrap_or(rest.len());
        let (run, tail) = rest.split_at(end);
        parts.push(match run.parse() {
            Ok(n) if is_digit => NamePart::Number(n),
            _ => NamePart::Text(run.to_string()),
        });
        rest = tail;
    }
    parts
}

/// Orders names with digit runs compared by value, so `wave_2` sorts before `wave_10`.
fn natural_cmp(a: &str, b: &str) -> Ordering {
    name_parts(a).cmp(&name_parts(b))
}
