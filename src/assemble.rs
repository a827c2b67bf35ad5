use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::audio::{strip_id3v1, strip_id3v2};
use crate::script::{Speaker, Utterance};
use crate::tts::{Synthesizer, SynthesisError, VoiceMap};

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("no utterances to assemble")]
    EmptyScript,

    #[error("synthesis failed for {speaker} (utterance {index})")]
    Synthesis {
        speaker: Speaker,
        index: usize,
        #[source]
        cause: SynthesisError,
    },

    #[error("synthesis task aborted: {0}")]
    Worker(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn segment_file_name(utterance: &Utterance) -> String {
    // Zero-padded so a lexicographic listing matches playback order.
    format!("{:03}_{}.mp3", utterance.index, utterance.speaker)
}

fn discard_run(run_dir: &Path) {
    if let Err(e) = fs::remove_dir_all(run_dir) {
        warn!(
            "Failed to discard partial run dir {}: {}",
            run_dir.display(),
            e
        );
    }
}

/// Synthesize every utterance (bounded fan-out) and merge the segments, in
/// index order, into one playable MP3 under `run_dir`.
///
/// The first synthesis failure aborts the in-flight siblings and discards
/// the whole run directory; a gapped podcast is never produced.
pub async fn assemble_podcast(
    synth: Arc<dyn Synthesizer>,
    voices: &VoiceMap,
    utterances: Vec<Utterance>,
    run_dir: &Path,
    out_name: &str,
    concurrency: usize,
) -> Result<PathBuf, AssemblyError> {
    if utterances.is_empty() {
        return Err(AssemblyError::EmptyScript);
    }
    fs::create_dir_all(run_dir)?;

    let total = utterances.len();
    info!(
        "Synthesizing {} utterances into {} (concurrency {})",
        total,
        run_dir.display(),
        concurrency
    );

    let sem = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut set = JoinSet::new();
    for utterance in utterances {
        let sem = Arc::clone(&sem);
        let synth = Arc::clone(&synth);
        let voice = voices.profile(utterance.speaker).clone();
        let path = run_dir.join(segment_file_name(&utterance));
        set.spawn(async move {
            let _permit = sem.acquire_owned().await.expect("semaphore closed");
            info!(
                "Synthesizing utterance {}/{} ({})",
                utterance.index + 1,
                total,
                utterance.speaker
            );
            match synth.synthesize(&utterance, &voice, &path).await {
                Ok(()) => Ok((utterance.index, path)),
                Err(e) => Err((utterance.index, utterance.speaker, e)),
            }
        });
    }

    let mut slots: Vec<Option<PathBuf>> = (0..total).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok((index, path))) => {
                debug!("Utterance {} done: {}", index, path.display());
                slots[index] = Some(path);
            }
            Ok(Err((index, speaker, cause))) => {
                error!(
                    "Synthesis failed for {} (utterance {}): {}",
                    speaker, index, cause
                );
                set.abort_all();
                while set.join_next().await.is_some() {}
                discard_run(run_dir);
                return Err(AssemblyError::Synthesis {
                    speaker,
                    index,
                    cause,
                });
            }
            Err(join_err) if join_err.is_cancelled() => {}
            Err(join_err) => {
                set.abort_all();
                while set.join_next().await.is_some() {}
                discard_run(run_dir);
                return Err(AssemblyError::Worker(join_err.to_string()));
            }
        }
    }

    let segments: Vec<PathBuf> = slots
        .into_iter()
        .map(|s| s.expect("every utterance yields a segment"))
        .collect();

    let out_path = run_dir.join(out_name);
    let bytes = merge_segments(&segments, &out_path)?;
    info!(
        "Merged {} segments into {} ({} bytes)",
        segments.len(),
        out_path.display(),
        bytes
    );
    Ok(out_path)
}

/// Append the segments in order, stripping ID3 framing so the stream stays
/// playable across boundaries. The first segment keeps its leading header
/// (the merged file must remain a valid standalone container); trailing
/// tags are dropped everywhere.
pub fn merge_segments(segments: &[PathBuf], out_path: &Path) -> Result<u64, AssemblyError> {
    let mut out = File::create(out_path)?;
    let mut total = 0u64;
    for (i, seg) in segments.iter().enumerate() {
        let buf = fs::read(seg)?;
        let kept = if i == 0 {
            strip_id3v1(&buf)
        } else {
            strip_id3v1(strip_id3v2(&buf))
        };
        out.write_all(kept)?;
        total += kept.len() as u64;
    }
    out.flush()?;
    Ok(total)
}
