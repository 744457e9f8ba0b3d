//! Offline tempo estimation from a decoded buffer.
//!
//! Peak-picking on a decimated channel, then a histogram over quantized
//! inter-peak intervals. Runs ahead of playback, never in the audio callback.

use duodeck_core::AudioBuffer;

/// Estimator tuning.
#[derive(Debug, Clone)]
pub struct EstimatorConfig {
    /// Keep every n-th sample.
    pub decimation: usize,
    /// Absolute amplitude a sample must exceed to count as a peak.
    pub threshold: f32,
    /// Fewer peaks than this yields an unknown tempo.
    pub min_peaks: usize,
    /// Intervals are rounded to a multiple of this (decimated samples).
    pub quantum: usize,
    /// Raw samples skipped after each peak, as a fraction of the sample rate.
    pub retrigger_seconds: f64,
    /// Lower edge of the octave-correction range.
    pub min_bpm: f64,
    /// Upper edge of the octave-correction range.
    pub max_bpm: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            decimation: 4,
            threshold: 0.6,
            min_peaks: 10,
            quantum: 100,
            retrigger_seconds: 0.25,
            min_bpm: 70.0,
            max_bpm: 180.0,
        }
    }
}

/// Full result of an estimation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TempoAnalysis {
    /// Rounded tempo, 0 when unknown.
    pub bpm: f64,
    /// Number of peaks found.
    pub peaks: usize,
    /// Winning quantized interval in decimated samples (0 when unknown).
    pub winning_interval: usize,
    /// Share of intervals that fell in the winning bucket.
    pub confidence: f64,
}

impl TempoAnalysis {
    fn unknown(peaks: usize) -> Self {
        Self {
            bpm: 0.0,
            peaks,
            winning_interval: 0,
            confidence: 0.0,
        }
    }

    /// True when a usable tempo was found.
    pub fn is_known(&self) -> bool {
        self.bpm > 0.0
    }
}

/// Peak-interval tempo estimator.
#[derive(Debug, Clone, Default)]
pub struct TempoEstimator {
    config: EstimatorConfig,
}

impl TempoEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Estimate the tempo of mono samples. Returns 0 when unknown.
    pub fn estimate(&self, samples: &[f32], sample_rate: u32) -> f64 {
        self.analyze(samples.iter().copied(), sample_rate).bpm
    }

    /// Estimate the tempo of channel 0 of an interleaved buffer.
    pub fn estimate_buffer(&self, buffer: &AudioBuffer) -> f64 {
        self.analyze_buffer(buffer).bpm
    }

    pub fn analyze_buffer(&self, buffer: &AudioBuffer) -> TempoAnalysis {
        self.analyze(buffer.channel(0), buffer.sample_rate())
    }

    /// Run the estimator over one channel of samples.
    pub fn analyze(&self, samples: impl Iterator<Item = f32>, sample_rate: u32) -> TempoAnalysis {
        let config = &self.config;
        if sample_rate == 0 {
            return TempoAnalysis::unknown(0);
        }

        let decimated: Vec<f32> = samples.step_by(config.decimation.max(1)).collect();
        let peaks = self.find_peaks(&decimated, sample_rate);
        if peaks.len() < config.min_peaks {
            log::debug!(
                "Only {} peaks found, tempo unknown (need {})",
                peaks.len(),
                config.min_peaks
            );
            return TempoAnalysis::unknown(peaks.len());
        }

        // Buckets in first-seen order so ties go to the earliest interval.
        let quantum = config.quantum.max(1) as f64;
        let mut buckets: Vec<(usize, usize)> = Vec::new();
        for pair in peaks.windows(2) {
            let interval = (pair[1] - pair[0]) as f64;
            let key = ((interval / quantum).round() * quantum) as usize;
            match buckets.iter_mut().find(|(k, _)| *k == key) {
                Some((_, count)) => *count += 1,
                None => buckets.push((key, 1)),
            }
        }

        let mut winner = (0usize, 0usize);
        for &(key, count) in &buckets {
            if count > winner.1 {
                winner = (key, count);
            }
        }
        let (interval, count) = winner;
        if interval == 0 {
            return TempoAnalysis::unknown(peaks.len());
        }

        let raw = 60.0 * sample_rate as f64 / (interval as f64 * config.decimation.max(1) as f64);
        let corrected = self.octave_correct(raw);
        let bpm = corrected.round();

        log::debug!(
            "Tempo: {} peaks, interval {} -> {:.2} BPM, corrected {:.2}",
            peaks.len(),
            interval,
            raw,
            corrected
        );

        TempoAnalysis {
            bpm,
            peaks: peaks.len(),
            winning_interval: interval,
            confidence: count as f64 / (peaks.len() - 1) as f64,
        }
    }

    fn find_peaks(&self, decimated: &[f32], sample_rate: u32) -> Vec<usize> {
        let config = &self.config;
        let skip = ((sample_rate as f64 * config.retrigger_seconds) / config.decimation.max(1) as f64)
            .floor()
            .max(1.0) as usize;

        let mut peaks = Vec::new();
        let mut i = 0;
        while i < decimated.len() {
            if decimated[i].abs() > config.threshold {
                peaks.push(i);
                i += skip;
            } else {
                i += 1;
            }
        }
        peaks
    }

    /// Fold a tempo into the plausible range by doubling or halving.
    fn octave_correct(&self, bpm: f64) -> f64 {
        let (min, max) = (self.config.min_bpm, self.config.max_bpm);
        let mut bpm = bpm;
        if !bpm.is_finite() || bpm <= 0.0 || min <= 0.0 || max < min * 2.0 {
            return bpm.max(0.0);
        }
        while bpm < min {
            bpm *= 2.0;
        }
        while bpm > max {
            bpm /= 2.0;
        }
        bpm
    }
}
