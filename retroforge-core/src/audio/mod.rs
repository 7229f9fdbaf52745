//! Real-time audio mixer (§4.5).
//!
//! A shared voice list feeds a 44.1kHz mono device in ~20ms ticks from a dedicated
//! producer thread. The public surface (`play_sine`, `play_noise`, `thrust`,
//! `stop_all`, `play_notes`) only ever takes the voice-list mutex for the duration of
//! a `Vec::push`/`retain`; the sequence player sleeps between notes without holding it.

pub mod device;
pub mod notes;
pub mod voice;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use device::{AudioDevice, CpalDevice, DeviceError, NullDevice};
use voice::{mix_tick, Voice, MAX_QUEUE_MS, MIXER_TICK_SAMPLES, SAMPLE_RATE};

const MIXER_TICK: Duration = Duration::from_millis(20);
const THRUST_FREQ_HZ: f64 = 110.0;
const THRUST_GAIN: f64 = 0.2;

struct MixerShared {
    voices: Mutex<Vec<Voice>>,
    device: Mutex<Box<dyn AudioDevice>>,
    thrust_on: AtomicBool,
    noise_seed: AtomicU32,
    running: AtomicBool,
}

/// Owns the shared voice list and drives the background mixer-tick producer thread.
/// `init()` is idempotent: a failed device open is reported once, after which the
/// mixer silently keeps accepting play calls (they queue but nothing is ever heard).
pub struct AudioMixer {
    shared: Arc<MixerShared>,
    producer: Option<thread::JoinHandle<()>>,
    initialized: bool,
}

impl Default for AudioMixer {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioMixer {
    /// Construct a mixer with no device open and no producer thread running yet.
    pub fn new() -> Self {
        AudioMixer {
            shared: Arc::new(MixerShared {
                voices: Mutex::new(Vec::new()),
                device: Mutex::new(Box::new(NullDevice::default())),
                thrust_on: AtomicBool::new(false),
                noise_seed: AtomicU32::new(0x1234_5678),
                running: AtomicBool::new(false),
            }),
            producer: None,
            initialized: false,
        }
    }

    /// Open the real output device and start the producer thread. Safe to call more
    /// than once; only the first call attempts to open hardware. Returns the device
    /// error the first time it fails; later calls silently no-op per §4.5.
    pub fn init(&mut self) -> Result<(), DeviceError> {
        if self.initialized {
            return Ok(());
        }
        self.initialized = true;

        let device = CpalDevice::open()?;
        *self.shared.device.lock().unwrap() = Box::new(device);
        self.start_producer();
        Ok(())
    }

    /// Construct a mixer that never opens real hardware, for headless engines and
    /// tests. The producer thread still runs so queued voices actually mix down.
    pub fn init_headless(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        self.start_producer();
    }

    fn start_producer(&mut self) {
        self.shared.running.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        self.producer = Some(thread::spawn(move || producer_loop(shared)));
    }

    /// Queue a one-shot sine voice.
    pub fn play_sine(&self, freq_hz: f64, duration_s: f64, gain: f64) {
        self.shared
            .voices
            .lock()
            .unwrap()
            .push(Voice::sine(freq_hz, duration_s, gain));
    }

    /// Queue a one-shot noise voice; the seed advances deterministically per call so
    /// repeated calls with the same engine state produce the same sequence of buffers.
    pub fn play_noise(&self, duration_s: f64, gain: f64) {
        let seed = self.shared.noise_seed.fetch_add(0x9E3779B9, Ordering::SeqCst);
        self.shared
            .voices
            .lock()
            .unwrap()
            .push(Voice::noise(duration_s, gain, seed));
    }

    /// Toggle exactly one loop voice at 110Hz / gain 0.2 on or off.
    pub fn thrust(&self, on: bool) {
        let was_on = self.shared.thrust_on.swap(on, Ordering::SeqCst);
        if on == was_on {
            return;
        }
        let mut voices = self.shared.voices.lock().unwrap();
        if on {
            voices.push(Voice::loop_buzz(THRUST_FREQ_HZ, THRUST_GAIN));
        } else {
            voices.retain(|v| v.kind != voice::VoiceKind::Loop);
        }
    }

    /// Clear all voices and the device queue, and reset the thrust flag.
    pub fn stop_all(&self) {
        self.shared.voices.lock().unwrap().clear();
        self.shared.device.lock().unwrap().clear();
        self.shared.thrust_on.store(false, Ordering::SeqCst);
    }

    /// Play a note sequence on its own task. `bpm <= 0` is treated as 120.
    /// Each token's sine duration is 5% short of its nominal beat length so
    /// consecutive notes don't click from overlap.
    pub fn play_notes(&self, tokens: &str, bpm: f64, gain: f64) {
        let shared = Arc::clone(&self.shared);
        let tokens = notes::parse_sequence(tokens);
        let bpm = if bpm <= 0.0 { 120.0 } else { bpm };
        let beat = 60.0 / bpm;

        thread::spawn(move || {
            for token in tokens {
                match token {
                    notes::Token::Rest { length } => {
                        thread::sleep(Duration::from_secs_f64(length as f64 * beat));
                    }
                    notes::Token::Note { freq_hz, length } => {
                        let nominal = length as f64 * beat;
                        let sounding = nominal * 0.95;
                        shared
                            .voices
                            .lock()
                            .unwrap()
                            .push(Voice::sine(freq_hz, sounding, gain));
                        thread::sleep(Duration::from_secs_f64(nominal));
                    }
                }
            }
        });
    }

    /// Stop the producer thread and join it. Idempotent.
    pub fn shutdown(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.producer.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AudioMixer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn producer_loop(shared: Arc<MixerShared>) {
    while shared.running.load(Ordering::SeqCst) {
        thread::sleep(MIXER_TICK);

        let buf = {
            let mut voices = shared.voices.lock().unwrap();
            mix_tick(&mut voices)
        };

        let mut device = shared.device.lock().unwrap();
        device.push(&buf);
        if device.queued_ms() > MAX_QUEUE_MS {
            device.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_mixer_has_no_voices() {
        let mixer = AudioMixer::new();
        assert!(mixer.shared.voices.lock().unwrap().is_empty());
    }

    #[test]
    fn thrust_toggles_exactly_one_voice() {
        let mixer = AudioMixer::new();
        mixer.thrust(true);
        assert_eq!(mixer.shared.voices.lock().unwrap().len(), 1);
        mixer.thrust(true);
        assert_eq!(mixer.shared.voices.lock().unwrap().len(), 1);
        mixer.thrust(false);
        assert_eq!(mixer.shared.voices.lock().unwrap().len(), 0);
    }

    #[test]
    fn stop_all_clears_voices_and_thrust() {
        let mixer = AudioMixer::new();
        mixer.thrust(true);
        mixer.play_sine(440.0, 1.0, 0.5);
        mixer.stop_all();
        assert!(mixer.shared.voices.lock().unwrap().is_empty());
        assert!(!mixer.shared.thrust_on.load(Ordering::SeqCst));
    }

    #[test]
    fn play_sine_and_noise_queue_without_init() {
        let mixer = AudioMixer::new();
        mixer.play_sine(220.0, 0.1, 0.3);
        mixer.play_noise(0.1, 0.3);
        assert_eq!(mixer.shared.voices.lock().unwrap().len(), 2);
    }

    #[test]
    fn mixer_tick_constants_match_50hz_at_44100() {
        assert_eq!(SAMPLE_RATE / 50, MIXER_TICK_SAMPLES as u32);
    }
}
