/// Turns whatever the input device delivers into the configured PCM layout.
///
/// cpal hands out interleaved samples at the device's native rate, channel
/// count and sample type. The capture pipeline wants 16-bit little-endian
/// PCM at the configured rate and channel count, so each callback buffer is
/// downmixed to mono, linearly resampled, spread back out to the target
/// channel count and quantized.
///
/// Resampling is streaming: the interpolation phase and the last input
/// sample carry over between buffers, so output length tracks real time
/// regardless of callback size. Use one converter per stream.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmConverter {
    pub target_sample_rate: u32,
    pub target_channels: u16,
    /// Source position of the next output sample, relative to `previous`.
    phase: f64,
    previous: Option<f32>,
}

impl PcmConverter {
    pub fn new(target_sample_rate: u32, target_channels: u16) -> Self {
        Self {
            target_sample_rate,
            target_channels,
            phase: 0.0,
            previous: None,
        }
    }

    /// Forget resampler history, e.g. before feeding an unrelated stream.
    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.previous = None;
    }

    /// Full conversion of one device buffer to PCM bytes.
    pub fn process<T, F>(&mut self, data: &[T], source_channels: usize, source_sample_rate: u32, convert: F) -> Vec<u8>
    where
        T: Copy,
        F: FnMut(T) -> f32,
    {
        let mono = downmix_to_mono(data, source_channels, convert);
        let resampled = self.resample(&mono, source_sample_rate);
        let spread = self.spread_channels(&resampled);
        convert_to_int16_pcm(&spread)
    }

    /// Linear interpolation resampling for mono audio, continuing from the
    /// previous call.
    ///
    /// Returns input unchanged if rates match.
    pub fn resample(&mut self, samples: &[f32], source_sample_rate: u32) -> Vec<f32> {
        if source_sample_rate == self.target_sample_rate || source_sample_rate == 0 || samples.is_empty() {
            return samples.to_vec();
        }

        // Source samples advanced per output sample.
        let step = f64::from(source_sample_rate) / f64::from(self.target_sample_rate);

        // Index 0 is the carried-over sample when there is one.
        let previous = self.previous;
        let offset = usize::from(previous.is_some());
        let len = samples.len() + offset;
        let at = |i: usize| match (i.checked_sub(offset), previous) {
            (Some(j), _) => samples[j],
            (None, Some(previous)) => previous,
            (None, None) => 0.0,
        };

        let mut output = Vec::with_capacity((samples.len() as f64 / step) as usize + 1);
        while self.phase < (len - 1) as f64 {
            let index = self.phase as usize;
            let fraction = (self.phase - index as f64) as f32;
            output.push(at(index) * (1.0 - fraction) + at(index + 1) * fraction);
            self.phase += step;
        }

        self.phase -= (len - 1) as f64;
        self.previous = samples.last().copied();
        output
    }

    /// Duplicate each mono sample across the target channels, interleaved.
    pub fn spread_channels(&self, mono: &[f32]) -> Vec<f32> {
        let channels = usize::from(self.target_channels.max(1));
        if channels == 1 {
            return mono.to_vec();
        }
        mono.iter()
            .flat_map(|&s| std::iter::repeat(s).take(channels))
            .collect()
    }
}

/// Average interleaved frames down to one channel, converting each sample
/// to `f32` on the way. A trailing partial frame is averaged over what is
/// present.
pub fn downmix_to_mono<T, F>(data: &[T], channels: usize, mut convert: F) -> Vec<f32>
where
    T: Copy,
    F: FnMut(T) -> f32,
{
    if channels <= 1 {
        return data.iter().copied().map(convert).collect();
    }
    data.chunks(channels)
        .map(|frame| {
            let sum: f32 = frame.iter().copied().map(&mut convert).sum();
            sum / frame.len() as f32
        })
        .collect()
}

/// Convert f32 samples `[-1.0, 1.0]` to 16-bit PCM (little-endian bytes).
///
/// Clamps out-of-range values. Output length = `samples.len() * 2` bytes.
pub fn convert_to_int16_pcm(samples: &[f32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        data.extend_from_slice(&value.to_le_bytes());
    }
    data
}

pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32_768.0
}

pub fn u16_to_f32(sample: u16) -> f32 {
    (f32::from(sample) - 32_768.0) / 32_768.0
}
