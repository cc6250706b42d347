//! Sound-card boundary (ambient, outside the transport pipeline proper): a blocking
//! source/sink of raw PCM frames, wrapping `cpal` the way
//! `audio::AudioEngine` drives input/output streams. The demo binaries
//! use this to stand in for the sound card; the pipeline itself only
//! ever sees `Frame` values and never touches `cpal` directly.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat as CpalSampleFormat, Stream, StreamConfig};
use tracing::{info, warn};

use crate::sample_spec::{Frame, SampleSpec};

/// Blocking source of interleaved `f32` frames, fed by the default
/// input device's callback through a bounded channel; `read` blocks
/// until a full frame of `samples_per_chan` is available.
pub struct MicrophoneSource {
    spec: SampleSpec,
    samples_per_chan: usize,
    rx: Receiver<f32>,
    pending: Vec<f32>,
    _stream: Stream,
}

impl MicrophoneSource {
    pub fn open(spec: SampleSpec, samples_per_chan: usize) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("no default input device"))?;
        info!(device = %device.name().unwrap_or_default(), "opening microphone source");

        let config = StreamConfig {
            channels: spec.num_channels() as u16,
            sample_rate: cpal::SampleRate(spec.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        // Deep enough to absorb one scheduling hiccup without the
        // producer callback blocking (it never may: it runs on the
        // realtime audio thread).
        let (tx, rx) = sync_channel::<f32>(samples_per_chan * spec.num_channels() * 16);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for &sample in data {
                        let _ = tx.try_send(sample);
                    }
                },
                |err| warn!(%err, "microphone input stream error"),
                None,
            )
            .context("building input stream")?;
        stream.play().context("starting input stream")?;

        Ok(Self { spec, samples_per_chan, rx, pending: Vec::new(), _stream: stream })
    }

    /// Blocks until a full frame is available, or the stream closes.
    pub fn read(&mut self) -> Result<Frame> {
        let wanted = self.samples_per_chan * self.spec.num_channels();
        while self.pending.len() < wanted {
            let sample = self.rx.recv().context("microphone input stream closed")?;
            self.pending.push(sample);
        }
        let samples: Vec<f32> = self.pending.drain(0..wanted).collect();
        Ok(Frame {
            samples,
            spec: self.spec,
            stream_timestamp: 0,
            capture_timestamp: now_ns(),
            flags: crate::sample_spec::CompletenessFlags::SIGNAL_PRESENT,
        })
    }
}

/// Blocking sink writing interleaved `f32` frames to the default
/// output device through a bounded channel; `write` blocks (briefly)
/// if the channel is momentarily full.
pub struct SpeakerSink {
    spec: SampleSpec,
    tx: SyncSender<f32>,
    _stream: Stream,
    running: Arc<AtomicBool>,
}

impl SpeakerSink {
    pub fn open(spec: SampleSpec) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("no default output device"))?;
        info!(device = %device.name().unwrap_or_default(), "opening speaker sink");

        let config = StreamConfig {
            channels: spec.num_channels() as u16,
            sample_rate: cpal::SampleRate(spec.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (tx, rx) = sync_channel::<f32>(spec.sample_rate as usize * spec.num_channels());
        let running = Arc::new(AtomicBool::new(true));

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for sample in data.iter_mut() {
                        *sample = rx.try_recv().unwrap_or(0.0);
                    }
                },
                |err| warn!(%err, "speaker output stream error"),
                None,
            )
            .context("building output stream")?;
        stream.play().context("starting output stream")?;

        Ok(Self { spec, tx, _stream: stream, running })
    }

    pub fn write(&self, frame: &Frame) -> Result<()> {
        if !self.running.load(Ordering::Relaxed) {
            return Err(anyhow!("speaker sink closed"));
        }
        for &sample in &frame.samples {
            self.tx.send(sample).map_err(|_| anyhow!("speaker output stream closed"))?;
        }
        Ok(())
    }

    pub fn spec(&self) -> SampleSpec {
        self.spec
    }
}

/// Queries the supported native sample format of the given format hint,
/// logged at startup (matching the device-enumeration log lines
/// elsewhere in this crate) so mismatches between `SessionConfig` and
/// the sound card show up immediately instead of as silent distortion.
pub fn describe_native_format(cpal_format: CpalSampleFormat) -> &'static str {
    match cpal_format {
        CpalSampleFormat::F32 => "f32",
        CpalSampleFormat::I16 => "i16",
        CpalSampleFormat::U16 => "u16",
        _ => "unknown",
    }
}

fn now_ns() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as i64).unwrap_or(0)
}
