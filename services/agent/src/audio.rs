use agent_core::audio::AudioFrame;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Rate of the PCM16 audio browser clients send and play back.
pub const CLIENT_SAMPLE_RATE: u32 = 24_000;

/// Input chunk handed to the resampler: 20 ms at the client rate.
const RESAMPLER_CHUNK: usize = 480;

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,                     // No cutoff frequency, pass all frequencies
        PolynomialDegree::Cubic, // Cubic interpolation for quality
        chunk_size,
        1, // 1 channel (mono)
    )?;
    Ok(resampler)
}

/// Converts a slice of f32 samples to a vector of i16 samples.
pub fn convert_f32_to_i16(pcm32: &[f32]) -> Vec<i16> {
    pcm32
        .iter()
        .map(|&sample| (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Converts a slice of i16 samples to a vector of f32 samples.
pub fn convert_i16_to_f32(pcm16: &[i16]) -> Vec<f32> {
    pcm16
        .iter()
        .map(|&sample| sample as f32 / 32768.0)
        .collect()
}

/// Turns raw client PCM16 into pipeline frames at the target rate.
///
/// Input arrives in arbitrary sizes; samples are buffered until a full
/// resampler chunk is available. A message may end halfway through a sample,
/// so an odd trailing byte is held until the next one.
pub struct InputResampler {
    in_rate: u32,
    out_rate: u32,
    resampler: Option<FastFixedIn<f32>>,
    pending: Vec<f32>,
    leftover: Option<u8>,
}

impl InputResampler {
    pub fn new(in_rate: u32, out_rate: u32) -> anyhow::Result<Self> {
        let resampler = if in_rate == out_rate {
            None
        } else {
            Some(create_resampler(
                in_rate as f64,
                out_rate as f64,
                RESAMPLER_CHUNK,
            )?)
        };
        Ok(Self {
            in_rate,
            out_rate,
            resampler,
            pending: Vec::new(),
            leftover: None,
        })
    }

    pub fn push(&mut self, pcm: &[u8]) -> anyhow::Result<Vec<AudioFrame>> {
        let mut bytes = Vec::with_capacity(pcm.len() + 1);
        bytes.extend(self.leftover.take());
        bytes.extend_from_slice(pcm);
        if bytes.len() % 2 == 1 {
            self.leftover = bytes.pop();
        }
        let frame = AudioFrame::from_pcm16_le(&bytes, self.in_rate);
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(if frame.samples.is_empty() {
                Vec::new()
            } else {
                vec![frame]
            });
        };

        self.pending.extend(convert_i16_to_f32(&frame.samples));
        let mut frames = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            let output = resampler.process(&[chunk], None)?;
            if let Some(channel) = output.first() {
                frames.push(AudioFrame::new(convert_f32_to_i16(channel), self.out_rate));
            }
        }
        Ok(frames)
    }
}
