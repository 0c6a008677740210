//! Local MP3 playback
//!
//! Decodes with minimp3 and plays through the default cpal output device.
//! Decoding and the playback wait both happen on a blocking thread so the
//! async delivery worker is never stalled by the audio driver.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::debug;

use crate::{Error, Result};

/// Play an MP3 buffer to completion at the given volume (0.0 to 1.0).
///
/// # Errors
///
/// Returns `Error::Audio` when decoding fails or no output device is
/// available.
pub async fn play_mp3(audio: Vec<u8>, volume: f32) -> Result<()> {
    tokio::task::spawn_blocking(move || play_blocking(&audio, volume))
        .await
        .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
}

fn play_blocking(audio: &[u8], volume: f32) -> Result<()> {
    let decoded = decode_mp3(audio)?;
    let duration = decoded.duration();
    debug!(
        samples = decoded.samples.len(),
        sample_rate = decoded.sample_rate,
        channels = decoded.channels,
        ?duration,
        "playing decoded audio"
    );

    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| Error::Audio("no audio output device".to_string()))?;

    let config = cpal::StreamConfig {
        channels: decoded.channels,
        sample_rate: cpal::SampleRate(decoded.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let samples = Arc::new(apply_volume(decoded.samples, volume));
    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new((Mutex::new(false), Condvar::new()));

    let stream = {
        let samples = Arc::clone(&samples);
        let position = Arc::clone(&position);
        let finished = Arc::clone(&finished);
        device
            .build_output_stream(
                &config,
                move |out: &mut [f32], _| {
                    let start = position.fetch_add(out.len(), Ordering::SeqCst);
                    for (i, sample) in out.iter_mut().enumerate() {
                        *sample = samples.get(start + i).copied().unwrap_or(0.0);
                    }
                    if start >= samples.len() {
                        let (done, cvar) = &*finished;
                        if let Ok(mut done) = done.lock() {
                            *done = true;
                            cvar.notify_one();
                        }
                    }
                },
                |err| debug!(error = %err, "output stream error"),
                None,
            )
            .map_err(|e| Error::Audio(format!("output stream: {e}")))?
    };
    stream
        .play()
        .map_err(|e| Error::Audio(format!("playback start: {e}")))?;

    // Wait for the callback to run past the end of the buffer, with a
    // margin over the nominal duration in case the driver stalls
    let (done, cvar) = &*finished;
    let deadline = duration + Duration::from_secs(2);
    let guard = done
        .lock()
        .map_err(|_| Error::Audio("playback state poisoned".to_string()))?;
    let (_guard, _timeout) = cvar
        .wait_timeout_while(guard, deadline, |done| !*done)
        .map_err(|_| Error::Audio("playback state poisoned".to_string()))?;

    Ok(())
}

struct DecodedAudio {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
}

impl DecodedAudio {
    fn duration(&self) -> Duration {
        let frames = self.samples.len() / usize::from(self.channels.max(1));
        Duration::from_secs_f64(f64::from(u32::try_from(frames).unwrap_or(u32::MAX)) / f64::from(self.sample_rate.max(1)))
    }
}

fn decode_mp3(audio: &[u8]) -> Result<DecodedAudio> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(audio));
    let mut samples = Vec::new();
    let mut sample_rate = 0u32;
    let mut channels = 0u16;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = u32::try_from(frame.sample_rate).unwrap_or(44_100);
                channels = u16::try_from(frame.channels).unwrap_or(2);
                samples.extend_from_slice(&frame.data);
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("mp3 decode: {e}"))),
        }
    }

    if samples.is_empty() {
        return Err(Error::Audio("mp3 buffer decoded to no audio".to_string()));
    }
    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

fn apply_volume(samples: Vec<i16>, volume: f32) -> Vec<f32> {
    let gain = volume.clamp(0.0, 1.0) / f32::from(i16::MAX);
    samples.into_iter().map(|s| f32::from(s) * gain).collect()
}
