//! Learning-rate warmup.

/// Linear warmup followed by linear decay.
///
/// `progress` is the fraction of all optimizer steps already taken. The
/// multiplier rises from 0 to 1 over the first `warmup` fraction, then
/// falls as `1 - progress`.
pub fn warmup_linear(progress: f64, warmup: f64) -> f64 {
    if progress < warmup {
        progress / warmup
    } else {
        (1.0 - progress).max(0.0)
    }
}

/// Step counter mapping optimizer steps to learning rates.
#[derive(Debug, Clone)]
pub struct WarmupSchedule {
    total_steps: usize,
    warmup: f64,
    step: usize,
}

impl WarmupSchedule {
    pub fn new(total_steps: usize, warmup: f64) -> Self {
        Self {
            total_steps,
            warmup,
            step: 0,
        }
    }

    /// Resume at `step`, as after loading a checkpoint.
    pub fn starting_at(mut self, step: usize) -> Self {
        self.step = step;
        self
    }

    pub fn step(&self) -> usize {
        self.step
    }

    /// Multiplier for the current step.
    pub fn factor(&self) -> f64 {
        if self.total_steps == 0 {
            return 1.0;
        }
        warmup_linear(self.step as f64 / self.total_steps as f64, self.warmup)
    }

    pub fn advance(&mut self) {
        self.step += 1;
    }
}
