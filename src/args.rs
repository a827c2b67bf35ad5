use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
pub struct Args {
    /// Dialogue transcript with "Vincent:" / "Marina:" prefixed lines
    #[clap(long)]
    pub script: PathBuf,

    #[clap(long, default_value = "./podcasts")]
    pub out_dir: PathBuf,

    #[clap(long, env = "ELEVENLABS_API_KEY", hide_env_values = true)]
    pub api_key: String,

    #[clap(long, default_value = "https://api.elevenlabs.io")]
    pub api_base: String,

    #[clap(long, default_value = "eleven_monolingual_v1")]
    pub model_id: String,

    #[clap(long, default_value_t = 500)]
    pub chunk_chars: usize,

    /// How many utterances to synthesize at once
    #[clap(long, default_value_t = 2)]
    pub concurrency: usize,

    #[clap(long, default_value_t = 3)]
    pub max_retries: u32,

    #[clap(long, default_value_t = 1000)]
    pub backoff_base_ms: u64,

    /// Delay between chunk requests of one utterance
    #[clap(long, default_value_t = 500)]
    pub pacing_ms: u64,

    #[clap(long, default_value_t = 60)]
    pub request_timeout_secs: u64,

    #[clap(long, default_value = "bIHbv24MWmeRgasZH58o")]
    pub vincent_voice: String,

    #[clap(long, default_value = "Xb7hH8MSUJpSbSDYk0k2")]
    pub marina_voice: String,

    #[clap(long, default_value_t = 0.5)]
    pub stability: f32,

    #[clap(long, default_value_t = 0.75)]
    pub similarity_boost: f32,
}
