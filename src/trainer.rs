//! Epoch/batch training loop.
//!
//! The trainer shuffles the samples once per call, cuts the shuffled order
//! into `ceil(n / batch_size)` full-size batches (the last one wraps around to
//! the front), back-propagates each batch in parallel and applies one update
//! per batch.

use std::time::{Duration, Instant};

use crate::config::{OptimizerKind, TrainingConfig};
use crate::error::{CnnError, Result};
use crate::network::{Network, Sample};
use crate::utils::SimpleRng;

/// Progress is reported once at least this fraction has accumulated.
pub const PROGRESS_THRESHOLD: f32 = 0.02;

/// Number of batches per epoch.
pub fn batch_count(sample_count: usize, batch_size: usize) -> usize {
    sample_count.div_ceil(batch_size)
}

/// Positions in the shuffled order that make up batch `batch_index`.
///
/// Every batch holds exactly `batch_size` positions; positions past the end
/// wrap around to the front.
pub fn batch_positions(sample_count: usize, batch_size: usize, batch_index: usize) -> Vec<usize> {
    let start = batch_index * batch_size;
    (0..batch_size)
        .map(|k| (start + k) % sample_count)
        .collect()
}

/// Accumulates fractional progress and flushes it in coalesced steps.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    step: f32,
    completed: f32,
    pending: f32,
    threshold: f32,
}

impl ProgressReporter {
    /// Reporter for a run of `total_steps` equal steps.
    pub fn new(total_steps: usize, threshold: f32) -> Self {
        Self {
            step: 1.0 / total_steps.max(1) as f32,
            completed: 0.0,
            pending: 0.0,
            threshold,
        }
    }

    /// Records one finished step; returns the completed fraction when a
    /// report is due.
    pub fn advance(&mut self) -> Option<f32> {
        self.pending += self.step;
        if self.pending >= self.threshold {
            self.completed = (self.completed + self.pending).min(1.0);
            self.pending = 0.0;
            Some(self.completed)
        } else {
            None
        }
    }

    /// Flushes whatever is pending; the run is complete.
    pub fn finish(&mut self) -> Option<f32> {
        if self.completed < 1.0 {
            self.completed = 1.0;
            self.pending = 0.0;
            Some(1.0)
        } else {
            None
        }
    }
}

/// Figures of a finished training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary {
    pub epochs: usize,
    pub batches_per_epoch: usize,
    pub updates: usize,
    pub elapsed: Duration,
}

/// Drives a network through epochs of batched updates.
pub struct Trainer<'a> {
    network: &'a mut Network,
}

impl<'a> Trainer<'a> {
    pub fn new(network: &'a mut Network) -> Self {
        Self { network }
    }

    /// Trains on `samples` and reports the completed fraction (in `(0, 1]`,
    /// non-decreasing, ending at 1.0) to `progress`.
    ///
    /// # Errors
    ///
    /// - [`CnnError::Config`] for an empty sample set or an invalid config
    /// - [`CnnError::Unsupported`] when the network cannot be trained
    /// - any error raised by a backward pass or an update; the layers'
    ///   accumulators are then left partially filled
    pub fn train<F>(
        &mut self,
        samples: &[Sample],
        config: &TrainingConfig,
        rng: &mut SimpleRng,
        progress: F,
    ) -> Result<TrainingSummary>
    where
        F: FnMut(f32) + Send,
    {
        if samples.is_empty() {
            return Err(CnnError::config("training set is empty"));
        }
        config.validate()?;
        self.network.validate()?;

        match config.threads {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| CnnError::config(format!("cannot build thread pool: {}", e)))?;
                let network = &mut *self.network;
                pool.install(|| run(network, samples, config, rng, progress))
            }
            None => run(&mut *self.network, samples, config, rng, progress),
        }
    }
}

fn run<F>(
    network: &mut Network,
    samples: &[Sample],
    config: &TrainingConfig,
    rng: &mut SimpleRng,
    mut progress: F,
) -> Result<TrainingSummary>
where
    F: FnMut(f32),
{
    let start = Instant::now();
    let mut order: Vec<usize> = (0..samples.len()).collect();
    rng.shuffle(&mut order);

    let batches = batch_count(samples.len(), config.batch_size);
    let mut reporter = ProgressReporter::new(batches * config.epochs, PROGRESS_THRESHOLD);
    log::info!(
        "Training on {} samples: {} epochs of {} batches of {}",
        samples.len(),
        config.epochs,
        batches,
        config.batch_size
    );

    let mut updates = 0;
    for epoch in 0..config.epochs {
        let epoch_start = Instant::now();
        for batch_index in 0..batches {
            let batch: Vec<&Sample> = batch_positions(samples.len(), config.batch_size, batch_index)
                .into_iter()
                .map(|position| &samples[order[position]])
                .collect();

            network.backward_batch(&batch)?;
            match config.optimizer {
                OptimizerKind::Sgd => network.apply_update(config.learning_rate)?,
                OptimizerKind::Momentum => {
                    network.apply_update_momentum(config.learning_rate, config.pulse)?
                }
                OptimizerKind::Adam => network.apply_update_adam(
                    config.learning_rate,
                    config.pulse,
                    config.momentum,
                )?,
            }
            updates += 1;
            log::debug!("Epoch {} batch {}/{} done", epoch + 1, batch_index + 1, batches);

            if let Some(done) = reporter.advance() {
                progress(done);
            }
        }
        log::info!(
            "Epoch {}/{} finished in {:.2}s",
            epoch + 1,
            config.epochs,
            epoch_start.elapsed().as_secs_f32()
        );
    }

    if let Some(done) = reporter.finish() {
        progress(done);
    }

    let elapsed = start.elapsed();
    log::info!("Training finished: {} updates in {:.2}s", updates, elapsed.as_secs_f32());
    Ok(TrainingSummary {
        epochs: config.epochs,
        batches_per_epoch: batches,
        updates,
        elapsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batches_wrap_to_front() {
        assert_eq!(batch_count(5, 2), 3);
        assert_eq!(batch_positions(5, 2, 0), vec![0, 1]);
        assert_eq!(batch_positions(5, 2, 2), vec![4, 0]);
        assert_eq!(batch_positions(2, 5, 0), vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_progress_coalesces_small_steps() {
        let mut reporter = ProgressReporter::new(200, PROGRESS_THRESHOLD);
        let reports: Vec<f32> = (0..200).filter_map(|_| reporter.advance()).collect();

        // 200 steps of 0.005 flush every 4 or 5 steps.
        assert!(reports.len() >= 40 && reports.len() <= 50);
        assert!(reports.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(reporter.finish(), Some(1.0));
        assert_eq!(reporter.finish(), None);
    }

    #[test]
    fn test_large_steps_report_every_time() {
        let mut reporter = ProgressReporter::new(3, PROGRESS_THRESHOLD);
        assert!(reporter.advance().is_some());
        assert!(reporter.advance().is_some());
        assert!(reporter.advance().is_some());
    }
}
