//! Individual mixer voices: sine, noise, and looped buzz (§4.5, §3 "Voice").

pub const SAMPLE_RATE: u32 = 44_100;
pub const MIXER_TICK_SAMPLES: usize = 882; // 44100 / 50, one ~20ms mixer tick.
pub const MAX_QUEUE_MS: u32 = 300;

/// What kind of oscillator a voice runs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VoiceKind {
    Sine,
    Noise,
    Loop,
}

/// A single active oscillator. Loop voices never decrement `time_left` and persist
/// until explicitly removed by `stop_all` or an equivalent control call.
#[derive(Copy, Clone, Debug)]
pub struct Voice {
    pub kind: VoiceKind,
    pub freq: f64,
    pub gain: f64,
    pub phase: f64,
    pub time_left: f64,
    rng_state: u32,
}

impl Voice {
    pub fn sine(freq: f64, duration: f64, gain: f64) -> Self {
        Voice {
            kind: VoiceKind::Sine,
            freq,
            gain,
            phase: 0.0,
            time_left: duration,
            rng_state: 0x2545F491,
        }
    }

    pub fn noise(duration: f64, gain: f64, seed: u32) -> Self {
        Voice {
            kind: VoiceKind::Noise,
            freq: 0.0,
            gain,
            phase: 0.0,
            time_left: duration,
            rng_state: seed,
        }
    }

    pub fn loop_buzz(freq: f64, gain: f64) -> Self {
        Voice {
            kind: VoiceKind::Loop,
            freq,
            gain,
            phase: 0.0,
            time_left: f64::INFINITY,
            rng_state: 0x9E3779B9,
        }
    }

    /// Whether a non-loop voice has expired and should be culled after the tick.
    pub fn finished(&self) -> bool {
        self.kind != VoiceKind::Loop && self.time_left <= 0.0
    }

    /// Produce one sample and advance internal state by `dt` seconds.
    fn next_sample(&mut self, dt: f64) -> f64 {
        match self.kind {
            VoiceKind::Sine | VoiceKind::Loop => {
                let sample = (std::f64::consts::TAU * self.phase).sin() * self.gain;
                self.phase = (self.phase + self.freq * dt).fract();
                if self.phase < 0.0 {
                    self.phase += 1.0;
                }
                sample
            }
            VoiceKind::Noise => {
                // Same LCG shape as the script bridge's `rnd` (§4.12): fast and
                // deterministic given a fixed seed, masked to 31 bits.
                let next = self
                    .rng_state
                    .wrapping_mul(1_103_515_245)
                    .wrapping_add(12345)
                    & 0x7FFF_FFFF;
                self.rng_state = next;
                let unit = next as f64 / 2_147_483_648.0;
                (unit * 2.0 - 1.0) * self.gain
            }
        }
    }
}

/// Mix one mixer-tick's worth of samples (`MIXER_TICK_SAMPLES` frames) from `voices`
/// into 16-bit PCM, culling finished non-loop voices in place.
pub fn mix_tick(voices: &mut Vec<Voice>) -> Vec<i16> {
    let dt = 1.0 / SAMPLE_RATE as f64;
    let mut out = vec![0i16; MIXER_TICK_SAMPLES];

    for frame in out.iter_mut() {
        let mut acc = 0f64;
        for voice in voices.iter_mut() {
            if voice.kind != VoiceKind::Loop && voice.time_left <= 0.0 {
                continue;
            }
            acc += voice.next_sample(dt);
            if voice.kind != VoiceKind::Loop {
                voice.time_left -= dt;
            }
        }
        *frame = sat_to_i16(acc);
    }

    voices.retain(|v| !v.finished());
    out
}

/// Clamp a float accumulator into the i16 PCM range without wrapping.
fn sat_to_i16(sample: f64) -> i16 {
    let scaled = sample * i16::MAX as f64;
    if scaled >= i16::MAX as f64 {
        i16::MAX
    } else if scaled <= i16::MIN as f64 {
        i16::MIN
    } else {
        scaled as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_voice_starts_at_zero_crossing() {
        let mut voices = vec![Voice::sine(440.0, 1.0, 1.0)];
        let buf = mix_tick(&mut voices);
        assert_eq!(buf[0], 0);
    }

    #[test]
    fn non_loop_voice_is_culled_after_expiry() {
        let mut voices = vec![Voice::sine(440.0, 0.0001, 1.0)];
        mix_tick(&mut voices);
        assert!(voices.is_empty());
    }

    #[test]
    fn loop_voice_survives_many_ticks() {
        let mut voices = vec![Voice::loop_buzz(110.0, 0.2)];
        for _ in 0..10 {
            mix_tick(&mut voices);
        }
        assert_eq!(voices.len(), 1);
    }

    #[test]
    fn noise_voice_is_deterministic_given_same_seed() {
        let mut a = vec![Voice::noise(1.0, 1.0, 42)];
        let mut b = vec![Voice::noise(1.0, 1.0, 42)];
        assert_eq!(mix_tick(&mut a), mix_tick(&mut b));
    }

    #[test]
    fn mix_tick_never_panics_on_many_voices() {
        let mut voices: Vec<Voice> = (0..32)
            .map(|i| Voice::sine(110.0 + i as f64, 1.0, 0.05))
            .collect();
        let buf = mix_tick(&mut voices);
        assert_eq!(buf.len(), MIXER_TICK_SAMPLES);
    }
}
