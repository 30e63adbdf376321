
use std::collections::VecDeque;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use hound::WavReader;
use rubato::{Resampler, SincFixedIn, SincInterpolationType, SincInterpolationParameters, WindowFunction};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    FromSample,
    Sample,
    StreamConfig,
};

use vve_cli::error::{ClientError, ClientErrorDescription};
use vve_cli::pipeline::{Playback, PlaybackHandle};

/// Time for the device to play out its last buffer after the queue empties.
const DRAIN_GRACE: Duration = Duration::from_millis(100);

pub(crate) fn format_sample<O: FromSample<i16> + Sample>(sample: i16) -> O {
    O::from_sample(sample)
}

fn playback_error(e: impl std::fmt::Display) -> ClientError {
    ClientError::new(ClientErrorDescription::Playback(e.to_string()))
}

#[derive(Debug)]
struct QueuedWave {
    samples: Vec<i16>,
    done: oneshot::Sender<()>,
}

#[derive(Debug)]
struct CurrentWave {
    samples: Vec<i16>,
    pos: usize,
    done: Option<oneshot::Sender<()>>,
}

/// State shared between the player and the device callback.
#[derive(Debug, Clone, Default)]
struct Shared {
    queue: Arc<Mutex<VecDeque<QueuedWave>>>,
    current: Arc<Mutex<Option<CurrentWave>>>,
    blocks_processed: Arc<AtomicUsize>,
}

impl Shared {
    fn is_idle(&self) -> bool {
        self.current.lock().is_none() && self.queue.lock().is_empty()
    }

    fn fill<S: FromSample<i16> + Sample>(&self, buffer: &mut [S]) {
        self.blocks_processed.fetch_add(1, Ordering::Relaxed);
        let mut current = self.current.lock();
        let mut written = 0;

        while written < buffer.len() {
            if current.is_none() {
                let next = self.queue.lock().pop_front();
                match next {
                    Some(wave) => {
                        log::debug!("Playing wave of {} samples", wave.samples.len());
                        *current = Some(CurrentWave {
                            samples: wave.samples,
                            pos: 0,
                            done: Some(wave.done),
                        });
                    },
                    None => break,
                }
            }

            let Some(wave) = current.as_mut() else {
                break;
            };
            let remaining = &wave.samples[wave.pos..];
            let count = remaining.len().min(buffer.len() - written);
            for (out, sample) in buffer[written..written + count].iter_mut().zip(remaining) {
                *out = format_sample::<S>(*sample);
            }
            written += count;
            wave.pos += count;

            if wave.pos >= wave.samples.len() {
                if let Some(done) = wave.done.take() {
                    let _ = done.send(());
                }
                *current = None;
            }
        }

        for out in &mut buffer[written..] {
            *out = S::EQUILIBRIUM;
        }
    }
}

/// Default output device, fed whole waveforms through a queue.
pub struct AudioPlayer {
    shared: Shared,
    sample_rate: u32,
    channel_count: u16,
    _stream: cpal::Stream,
}

/// Resolves once its waveform has been handed to the device in full.
#[derive(Debug)]
pub struct PlaybackTicket {
    receiver: oneshot::Receiver<()>,
}

impl PlaybackHandle for PlaybackTicket {
    fn wait(self) -> Result<(), ClientError> {
        self.receiver
            .blocking_recv()
            .map_err(|_| playback_error("audio stream stopped before the wave finished"))
    }
}

impl AudioPlayer {
    pub fn new() -> Result<Self, anyhow::Error> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| anyhow::anyhow!("No default output device"))?;
        let mut supported_configs_range = device.supported_output_configs()?;
        let supported_config = supported_configs_range.next().ok_or_else(|| anyhow::anyhow!("No supported audio config"))?.with_max_sample_rate();
        let sample_format = supported_config.sample_format();
        let config: StreamConfig = supported_config.into();

        let shared = Shared::default();

        let err_fn = |err| log::error!("an error occurred on the output audio stream: {}", err);

        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_output_stream(&config, Self::callback::<f32>(&shared), err_fn, None)?,
            cpal::SampleFormat::F64 => device.build_output_stream(&config, Self::callback::<f64>(&shared), err_fn, None)?,
            cpal::SampleFormat::I8 => device.build_output_stream(&config, Self::callback::<i8>(&shared), err_fn, None)?,
            cpal::SampleFormat::U8 => device.build_output_stream(&config, Self::callback::<u8>(&shared), err_fn, None)?,
            cpal::SampleFormat::I16 => device.build_output_stream(&config, Self::callback::<i16>(&shared), err_fn, None)?,
            cpal::SampleFormat::U16 => device.build_output_stream(&config, Self::callback::<u16>(&shared), err_fn, None)?,
            cpal::SampleFormat::I32 => device.build_output_stream(&config, Self::callback::<i32>(&shared), err_fn, None)?,
            cpal::SampleFormat::U32 => device.build_output_stream(&config, Self::callback::<u32>(&shared), err_fn, None)?,
            cpal::SampleFormat::I64 => device.build_output_stream(&config, Self::callback::<i64>(&shared), err_fn, None)?,
            cpal::SampleFormat::U64 => device.build_output_stream(&config, Self::callback::<u64>(&shared), err_fn, None)?,
            _ => {
                return Err(anyhow::anyhow!("Unsupported sample format"));
            },
        };

        stream.play()?;

        Ok(Self {
            shared,
            sample_rate: config.sample_rate.0,
            channel_count: config.channels,
            _stream: stream,
        })
    }

    fn callback<T>(shared: &Shared) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static
    where
        T: FromSample<i16> + Sample,
    {
        let shared = shared.clone();
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            shared.fill(data);
        }
    }

    pub fn blocks_processed(&self) -> usize {
        self.shared.blocks_processed.load(Ordering::Relaxed)
    }

    /// Blocks until every queued wave has reached the device, then lets its buffer play out.
    ///
    /// Completion tickets fire when the last sample is copied to the device, not when it is heard,
    /// so this must run before the player is dropped.
    pub fn drain(&self) {
        while !self.shared.is_idle() {
            std::thread::sleep(Duration::from_millis(10));
        }
        std::thread::sleep(DRAIN_GRACE);
    }

    /// Queues a wav file for playback behind whatever is already queued.
    pub fn play_wav<R: Read>(&self, wav: R) -> Result<PlaybackTicket, anyhow::Error> {
        let samples = self.convert_wav(wav)?;
        let (done, receiver) = oneshot::channel();

        if samples.is_empty() {
            let _ = done.send(());
        } else {
            self.shared.queue.lock().push_back(QueuedWave { samples, done });
        }

        Ok(PlaybackTicket { receiver })
    }

    /// Decodes 16-bit PCM, downmixes to mono and resamples to the device rate,
    /// returning interleaved samples for every device channel.
    fn convert_wav<R: Read>(&self, wav: R) -> Result<Vec<i16>, anyhow::Error> {
        let mut reader = WavReader::new(wav)?;
        let spec = reader.spec();

        let orig_sample_rate = spec.sample_rate;
        let orig_channel_count = spec.channels;
        let orig_sample_count = reader.len();
        if orig_sample_count == 0 {
            return Ok(Vec::new());
        }

        let samples = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Int, 16) => {
                reader.samples::<i16>()
                    .filter_map(Result::ok)
                    .map(format_sample::<f64>)
                    .collect::<Vec<_>>()
            },
            (format, bits) => {
                return Err(anyhow::anyhow!("Unsupported sample format: {:?} / {}", format, bits));
            },
        };

        let mono_samples = samples.chunks(orig_channel_count as usize).map(|chunk| {
            chunk.iter().sum::<f64>() / orig_channel_count as f64
        }).collect::<Vec<_>>();

        let resample_ratio = self.sample_rate as f64 / orig_sample_rate as f64;

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let input_chunk_size = mono_samples.len().clamp(1, 1024);
        let mut resampler = SincFixedIn::<f64>::new(resample_ratio, 2.0, params, input_chunk_size, 1)?;

        let new_length = (mono_samples.len() as f64 * resample_ratio) as usize;
        let output_delay = resampler.output_delay();
        let mut output_buffer: Vec<f64> = Vec::with_capacity(new_length + output_delay);

        let mut input_buffer = vec![Vec::with_capacity(input_chunk_size)];
        let mut output_frames = vec![vec![0.0f64; resampler.output_frames_max()]];
        let mut input_index = 0;
        loop {
            let frames = resampler.input_frames_next();
            let remaining = mono_samples.len() - input_index;
            if frames > remaining {
                break;
            }

            input_buffer[0].clear();
            input_buffer[0].extend_from_slice(&mono_samples[input_index..input_index + frames]);

            let (_, output_count) = resampler.process_into_buffer(&input_buffer, &mut output_frames, None)?;
            output_buffer.extend_from_slice(&output_frames[0][..output_count]);

            input_index += frames;
        }

        if input_index < mono_samples.len() {
            let frames = resampler.input_frames_next();
            input_buffer[0].clear();
            input_buffer[0].extend_from_slice(&mono_samples[input_index..]);
            input_buffer[0].resize(frames, 0.0);

            let (_, output_count) = resampler.process_into_buffer(&input_buffer, &mut output_frames, None)?;
            output_buffer.extend_from_slice(&output_frames[0][..output_count]);
        }

        while output_buffer.len() < new_length + output_delay {
            let (_, output_count) = resampler.process_partial_into_buffer(None::<&[Vec<f64>]>, &mut output_frames, None)?;
            output_buffer.extend_from_slice(&output_frames[0][..output_count]);
        }

        let channels = self.channel_count as usize;
        Ok(output_buffer[output_delay..]
            .iter()
            .flat_map(|sample| std::iter::repeat(<i16 as Sample>::from_sample(*sample)).take(channels))
            .collect())
    }
}

impl Playback for AudioPlayer {
    type Handle = PlaybackTicket;

    fn play(&mut self, wav: Vec<u8>) -> Result<PlaybackTicket, ClientError> {
        self.play_wav(Cursor::new(wav)).map_err(playback_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(shared: &Shared, samples: Vec<i16>) -> oneshot::Receiver<()> {
        let (done, receiver) = oneshot::channel();
        shared.queue.lock().push_back(QueuedWave { samples, done });
        receiver
    }

    #[test]
    fn callback_signals_each_wave_when_consumed() {
        let shared = Shared::default();
        let mut first = queue(&shared, vec![1, 2, 3]);
        let mut second = queue(&shared, vec![4, 5, 6, 7]);

        let mut buffer = [0i16; 4];
        shared.fill(&mut buffer);
        assert_eq!(buffer, [1, 2, 3, 4]);
        assert!(first.try_recv().is_ok());
        assert!(second.try_recv().is_err());

        shared.fill(&mut buffer);
        assert_eq!(buffer, [5, 6, 7, 0]);
        assert!(second.try_recv().is_ok());
    }

    #[test]
    fn idle_only_after_the_last_wave_is_consumed() {
        let shared = Shared::default();
        assert!(shared.is_idle());

        let _done = queue(&shared, vec![1, 2, 3, 4, 5]);
        assert!(!shared.is_idle());

        let mut buffer = [0i16; 3];
        shared.fill(&mut buffer);
        assert!(!shared.is_idle(), "wave still partly unplayed");

        shared.fill(&mut buffer);
        assert!(shared.is_idle());
    }

    #[test]
    fn idle_callback_writes_silence() {
        let shared = Shared::default();
        let mut buffer = [0.5f32; 8];
        shared.fill(&mut buffer);
        assert!(buffer.iter().all(|s| *s == 0.0));
    }
}
