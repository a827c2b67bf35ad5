mod args;
mod assemble;
mod audio;
mod chunk;
mod script;
mod tts;

use args::Args;
use assemble::assemble_podcast;
use chrono::Local;
use clap::Parser;
use script::parse_script;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tts::{RetryPolicy, Synthesizer, TtsClient, TtsConfig, VoiceMap, VoiceProfile};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info") // set to "debug" for more logs
        .init();

    info!("Starting podcast synthesis pipeline");

    let args = Args::parse();

    if args.chunk_chars == 0 {
        error!("--chunk-chars must be greater than zero");
        std::process::exit(1);
    }
    if !args.script.exists() {
        error!("Script file not found: {}", args.script.display());
        std::process::exit(1);
    }

    let raw = fs::read_to_string(&args.script)?;
    let utterances = parse_script(&raw);
    if utterances.is_empty() {
        anyhow::bail!("No dialogue lines found in {}", args.script.display());
    }
    info!(
        "Parsed {} utterances from {}",
        utterances.len(),
        args.script.display()
    );

    let voices = VoiceMap::new(
        VoiceProfile {
            voice_id: args.vincent_voice.clone(),
            stability: args.stability,
            similarity_boost: args.similarity_boost,
        },
        VoiceProfile {
            voice_id: args.marina_voice.clone(),
            stability: args.stability,
            similarity_boost: args.similarity_boost,
        },
    );

    let client = TtsClient::new(TtsConfig {
        api_base: args.api_base.clone(),
        api_key: args.api_key.clone(),
        model_id: args.model_id.clone(),
        max_chunk_chars: args.chunk_chars,
        retry: RetryPolicy {
            max_retries: args.max_retries,
            base_delay: Duration::from_millis(args.backoff_base_ms),
        },
        pacing: Duration::from_millis(args.pacing_ms),
        request_timeout: Duration::from_secs(args.request_timeout_secs),
    })?;
    let synth: Arc<dyn Synthesizer> = Arc::new(client);

    let stamp = Local::now().format("%y%m%d%H%M%S").to_string();
    let run_dir = args.out_dir.join(&stamp);
    let out_name = format!("podcast_{stamp}.mp3");

    let out_path = assemble_podcast(
        synth,
        &voices,
        utterances,
        &run_dir,
        &out_name,
        args.concurrency,
    )
    .await?;

    info!("Podcast written to {}", out_path.display());
    Ok(())
}
