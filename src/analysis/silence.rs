/// Silence detection thresholds. Activation must sit strictly below
/// deactivation so the flag cannot flap around a single noisy threshold.
#[derive(Debug, Clone, Copy)]
pub struct SilenceConfig {
    /// Enter silence only below this RMS level (dBFS).
    pub activation_db: f64,
    /// Leave silence only above this RMS level (dBFS).
    pub deactivation_db: f64,
    /// Rolling analysis window in seconds.
    pub window_secs: f64,
    pub sample_rate: u32,
}

impl Default for SilenceConfig {
    fn default() -> Self {
        Self {
            activation_db: -50.0,
            deactivation_db: -45.0,
            window_secs: 0.2,
            sample_rate: 44_100,
        }
    }
}

/// Hysteresis silence detector over a rolling sample window.
///
/// Returns the previous flag unchanged until the window has filled once;
/// after that the buffer is trimmed to the most recent window on every push.
pub struct SilenceDetector {
    activation_db: f64,
    deactivation_db: f64,
    window_size: usize,
    buffer: Vec<f32>,
    is_silent: bool,
}

impl SilenceDetector {
    pub fn new(config: &SilenceConfig) -> Self {
        let window_size = (config.sample_rate as f64 * config.window_secs).max(1.0) as usize;
        Self {
            activation_db: config.activation_db,
            deactivation_db: config.deactivation_db,
            window_size,
            buffer: Vec::with_capacity(window_size),
            is_silent: false,
        }
    }

    /// Feed decoded samples and return the current silence flag.
    pub fn push(&mut self, samples: &[f32]) -> bool {
        self.buffer.extend_from_slice(samples);

        if self.buffer.len() >= self.window_size {
            let excess = self.buffer.len() - self.window_size;
            self.buffer.drain(..excess);

            let db = rms_db(&self.buffer);
            if !self.is_silent && db < self.activation_db {
                self.is_silent = true;
            } else if self.is_silent && db > self.deactivation_db {
                self.is_silent = false;
            }
        }

        self.is_silent
    }

    pub fn is_silent(&self) -> bool {
        self.is_silent
    }

    /// Clear the sample buffer and flag when starting a new session.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.is_silent = false;
    }
}

fn rms_db(samples: &[f32]) -> f64 {
    let mean_sq = samples
        .iter()
        .map(|&s| s as f64 * s as f64)
        .sum::<f64>()
        / samples.len() as f64;
    20.0 * (mean_sq.sqrt() + 1e-10).log10()
}
