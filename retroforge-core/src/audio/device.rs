//! Audio output device abstraction (§4.5, §1a ambient stack).
//!
//! The mixer produces fixed-size 16-bit PCM chunks and hands them to whatever
//! implements `AudioDevice`. Production code uses `CpalDevice`; tests and headless
//! runs use `NullDevice`, which drops everything and reports an empty queue.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};

use super::voice::{MAX_QUEUE_MS, SAMPLE_RATE};

/// Failure opening the platform output device. Surfaced once to the caller of
/// `init`; the mixer silently no-ops on subsequent calls per §4.5.
#[derive(Debug)]
pub struct DeviceError(pub String);

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "audio device error: {}", self.0)
    }
}

impl std::error::Error for DeviceError {}

/// A sink that accepts mono 16-bit PCM chunks from the mixer tick.
pub trait AudioDevice: Send {
    /// Enqueue one mixer-tick chunk of samples.
    fn push(&mut self, samples: &[i16]);

    /// Approximate queued audio length in milliseconds.
    fn queued_ms(&self) -> u32;

    /// Drop all queued audio immediately.
    fn clear(&mut self);
}

/// Discards everything; used for headless/test engines with no real audio output.
#[derive(Default)]
pub struct NullDevice {
    queued: usize,
}

impl AudioDevice for NullDevice {
    fn push(&mut self, samples: &[i16]) {
        self.queued += samples.len();
    }

    fn queued_ms(&self) -> u32 {
        ((self.queued * 1000) / SAMPLE_RATE as usize) as u32
    }

    fn clear(&mut self) {
        self.queued = 0;
    }
}

/// Real cross-platform output backed by `cpal`. The ring buffer is shared with the
/// device callback via a mutex; `push`/`clear` only ever touch the producer side.
pub struct CpalDevice {
    buffer: Arc<Mutex<VecDeque<i16>>>,
    _stream: cpal::Stream,
}

impl CpalDevice {
    /// Open the default output device at the mixer's native sample rate, falling
    /// back to the device's default config's channel count by duplicating the mono
    /// stream across channels.
    pub fn open() -> Result<Self, DeviceError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| DeviceError("no default output device".into()))?;

        let supported = device
            .default_output_config()
            .map_err(|e| DeviceError(e.to_string()))?;
        let channels = supported.channels().max(1) as usize;
        let sample_format = supported.sample_format();

        let config = StreamConfig {
            channels: channels as u16,
            sample_rate: cpal::SampleRate(SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        let buffer = Arc::new(Mutex::new(VecDeque::<i16>::new()));
        let buffer_cb = Arc::clone(&buffer);

        let err_fn = |err| log::error!("audio stream error: {err}");

        let stream = match sample_format {
            SampleFormat::I16 => device
                .build_output_stream(
                    &config,
                    move |data: &mut [i16], _| fill_from_queue(&buffer_cb, data, channels),
                    err_fn,
                    None,
                )
                .map_err(|e| DeviceError(e.to_string()))?,
            SampleFormat::F32 => {
                let buffer_cb = Arc::clone(&buffer);
                device
                    .build_output_stream(
                        &config,
                        move |data: &mut [f32], _| {
                            let mut queue = buffer_cb.lock().unwrap();
                            for frame in data.chunks_mut(channels) {
                                let s = queue.pop_front().unwrap_or(0);
                                let f = s as f32 / i16::MAX as f32;
                                for out in frame {
                                    *out = f;
                                }
                            }
                        },
                        err_fn,
                        None,
                    )
                    .map_err(|e| DeviceError(e.to_string()))?
            }
            other => return Err(DeviceError(format!("unsupported sample format {other:?}"))),
        };

        stream.play().map_err(|e| DeviceError(e.to_string()))?;

        Ok(CpalDevice {
            buffer,
            _stream: stream,
        })
    }
}

fn fill_from_queue(buffer: &Arc<Mutex<VecDeque<i16>>>, data: &mut [i16], channels: usize) {
    let mut queue = buffer.lock().unwrap();
    for frame in data.chunks_mut(channels) {
        let s = queue.pop_front().unwrap_or(0);
        for out in frame {
            *out = s;
        }
    }
}

impl AudioDevice for CpalDevice {
    fn push(&mut self, samples: &[i16]) {
        let mut queue = self.buffer.lock().unwrap();
        queue.extend(samples.iter().copied());
        let max_samples = (MAX_QUEUE_MS as usize * SAMPLE_RATE as usize) / 1000;
        while queue.len() > max_samples {
            queue.pop_front();
        }
    }

    fn queued_ms(&self) -> u32 {
        let queue = self.buffer.lock().unwrap();
        ((queue.len() * 1000) / SAMPLE_RATE as usize) as u32
    }

    fn clear(&mut self) {
        self.buffer.lock().unwrap().clear();
    }
}

// SAFETY: `cpal::Stream` is not `Send` on some backends because it holds a raw
// platform handle; we only ever touch it from the audio-producer task that created
// it and never share it across threads beyond that single owner.
unsafe impl Send for CpalDevice {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_device_tracks_queued_ms() {
        let mut dev = NullDevice::default();
        dev.push(&[0i16; 4410]); // 100ms at 44100Hz
        assert_eq!(dev.queued_ms(), 100);
        dev.clear();
        assert_eq!(dev.queued_ms(), 0);
    }
}
