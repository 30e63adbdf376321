
pub(crate) mod audio_output;
mod call;

use vve_cli::{
    ClientConfig,
    DumpPolicy,
    EndpointName,
    IngestError,
    LineSelector,
    TextSource,
    VveService,
    pipeline::{self, NoPlayback, Playback},
};

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub(crate) const DEFAULT_CALL_DUMP_DIR: &str = "dump";

#[derive(Debug, Parser)]
#[command(about = "Command line client for a VOICEVOX engine", long_about = None, version)]
struct Cli {
    /// Engine host
    #[arg(long, global = true, default_value = vve_cli::transport::DEFAULT_HOST)]
    host: String,

    /// Engine port
    #[arg(long, global = true, default_value_t = vve_cli::transport::DEFAULT_PORT)]
    port: u16,

    /// Speaker (style) ID, negative values mean 0
    #[arg(short, long, global = true, default_value_t = 0, allow_negative_numbers = true)]
    speaker_id: i64,

    /// Directory for request/response dumps
    #[arg(short, long, global = true)]
    dump_dir: Option<PathBuf>,

    /// Remove earlier dumps with the same name before writing
    #[arg(long, global = true)]
    clear_dump: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reads text aloud, one line per utterance
    Tts {
        /// Text file (reads stdin when omitted)
        speech_file: Option<PathBuf>,

        /// Synthesize all lines in one request and play the joined result
        #[arg(long)]
        batch: bool,

        /// Line numbers to read: "n", "n-m" or "n:m" (either end optional), comma separated
        #[arg(short = 'n', long, value_name = "N")]
        line_numbers: Option<LineSelector>,

        /// Do not open the audio device
        #[arg(long)]
        no_play: bool,
    },

    /// Calls a single engine endpoint and prints the result
    #[command(arg_required_else_help = true)]
    Call {
        #[arg(value_enum)]
        endpoint: EndpointName,

        #[command(flatten)]
        args: call::CallArgs,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Cli::parse();

    if let Err(e) = run(args) {
        let code = e
            .downcast_ref::<IngestError>()
            .and_then(|e| e.code())
            .unwrap_or(1);
        eprintln!("{}", e);
        std::process::exit(code);
    }
}

fn run(args: Cli) -> anyhow::Result<()> {
    let speaker_id = args.speaker_id.clamp(0, u32::MAX as i64) as u32;
    let dump_policy = if args.clear_dump {
        DumpPolicy::ClearFirst
    } else {
        DumpPolicy::Accumulate
    };

    match args.command {
        Command::Tts { speech_file, batch, line_numbers, no_play } => {
            let source = speech_file.map(TextSource::File).unwrap_or(TextSource::Stdin);
            let mut texts = source.read_texts()?;
            if let Some(selector) = line_numbers {
                texts = selector.select(&texts)?;
            }

            let config = ClientConfig {
                host: args.host,
                port: args.port,
                dump_dir: args.dump_dir,
                dump_policy,
            };
            let mut service = VveService::new(&config);
            log::debug!("Engine at {}", service.origin());

            let version = service.version()?;
            println!("{:>18}:  {}", "ENGINE version", version);
            println!("{}", serde_json::to_string_pretty(&service.speakers()?)?);

            let tag = source.name();
            if no_play {
                speak(&mut service, &mut NoPlayback, &texts, speaker_id, &tag, batch)?;
            } else {
                let mut player = audio_output::AudioPlayer::new()?;
                speak(&mut service, &mut player, &texts, speaker_id, &tag, batch)?;
                player.drain();
                log::debug!("Processed blocks count: {}", player.blocks_processed());
            }
        },

        Command::Call { endpoint, args: call_args } => {
            let config = ClientConfig {
                host: args.host,
                port: args.port,
                dump_dir: Some(args.dump_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_CALL_DUMP_DIR))),
                dump_policy,
            };
            let mut service = VveService::new(&config);
            call::call_endpoint(&mut service, endpoint, &call_args, speaker_id)?;
        },
    }

    Ok(())
}

fn speak<P: Playback>(
    service: &mut VveService,
    player: &mut P,
    texts: &[String],
    speaker_id: u32,
    tag: &str,
    batch: bool,
) -> anyhow::Result<()> {
    let elapsed = if batch {
        pipeline::batch(service, player, texts, speaker_id, tag)?.network_elapsed
    } else {
        pipeline::stream(service, player, texts, speaker_id, tag)?.network_elapsed
    };
    println!("{:.3} [sec]", elapsed.as_secs_f64());
    Ok(())
}
