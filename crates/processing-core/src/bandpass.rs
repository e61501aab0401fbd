//! Temporal bandpass filter over the frame history.
//!
//! Every sample position (pixel and channel) of the history is an
//! independent time series of length `N`. The filter transforms all of
//! them to the frequency domain in one batched pass, zeroes the bins
//! outside the passband, transforms back, and keeps only the newest time
//! step.
//!
//! # Layout
//!
//! The spectrum buffer is sample-major: series `p` occupies
//! `spectrum[p * N..(p + 1) * N]`. Contiguous series let `rustfft` run a
//! whole batch with one call, and let `rayon` hand each worker a disjoint
//! run of series with its own scratch buffer.
//!
//! # Bin selection
//!
//! Bin `k` has frequency `k / (N * dt)` for `k <= N/2` and mirrors to
//! `-(N - k) / (N * dt)` above that. Bounds are located on the folded index
//! `min(k, N - k)`, so a positive bin and its Hermitian mirror are always
//! kept or dropped together and the Nyquist bin of an even-length window
//! (whose folded index is its own mirror) is decided exactly once.

use std::sync::Arc;

use lazyeyes_common::error::{LazyEyesError, LazyEyesResult};
use lazyeyes_frame_model::FloatImage;
use rayon::prelude::*;
use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftDirection};

use crate::history::HistoryBuffer;
use crate::plan_cache::PlanCache;

const ZERO: Complex32 = Complex32::new(0.0, 0.0);

/// Work items handed out per pool thread; more than one evens out stragglers.
const CHUNKS_PER_THREAD: usize = 4;

/// Temporal frequency interval `[min_hz, max_hz)` kept by the filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Passband {
    pub min_hz: f64,
    pub max_hz: f64,
}

impl Passband {
    pub fn new(min_hz: f64, max_hz: f64) -> LazyEyesResult<Self> {
        if !min_hz.is_finite() || !max_hz.is_finite() || min_hz < 0.0 || min_hz >= max_hz {
            return Err(LazyEyesError::config(format!(
                "invalid passband [{min_hz}, {max_hz}) Hz"
            )));
        }
        Ok(Self { min_hz, max_hz })
    }
}

/// Passband edges resolved to folded FFT bin indices for one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassbandBins {
    /// Transform length `N`.
    pub len: usize,
    /// First kept folded index (inclusive).
    pub low: usize,
    /// End of the kept folded range (exclusive).
    pub high: usize,
}

impl PassbandBins {
    /// Resolve `passband` for a window of `len` samples spaced
    /// `spacing_secs` apart.
    ///
    /// Each edge snaps to the non-negative bin nearest to it (the lower
    /// index on ties). A strictly positive `min_hz` never keeps DC. A
    /// `max_hz` at or above the highest representable frequency keeps
    /// everything up to and including it.
    pub fn locate(len: usize, spacing_secs: f64, passband: Passband) -> Self {
        let half = len / 2;
        let resolution = 1.0 / (len as f64 * spacing_secs);
        let nearest = |hz: f64| {
            (0..=half)
                .min_by(|&a, &b| {
                    let da = (a as f64 * resolution - hz).abs();
                    let db = (b as f64 * resolution - hz).abs();
                    da.total_cmp(&db)
                })
                .unwrap_or(0)
        };

        let mut low = nearest(passband.min_hz);
        if passband.min_hz > 0.0 && low == 0 {
            low = 1;
        }

        // Relative slack so a max_hz computed as Nyquist still reaches it.
        let top_hz = half as f64 * resolution * (1.0 - 1e-9);
        let high = if passband.max_hz >= top_hz {
            half + 1
        } else {
            nearest(passband.max_hz)
        };

        Self { len, low, high }
    }

    /// Whether bin `k` (in `0..len`) survives the mask.
    pub fn keeps(&self, k: usize) -> bool {
        let folded = k.min(self.len - k);
        self.low <= folded && folded < self.high
    }

    /// Keep/drop flag for each of the `len` bins.
    pub fn mask(&self) -> Vec<bool> {
        (0..self.len).map(|k| self.keeps(k)).collect()
    }

    /// Number of bins that survive.
    pub fn kept(&self) -> usize {
        (0..self.len).filter(|&k| self.keeps(k)).count()
    }
}

/// Signed frequency of each bin, in standard FFT order.
pub fn fft_frequencies(len: usize, spacing_secs: f64) -> Vec<f64> {
    let resolution = 1.0 / (len as f64 * spacing_secs);
    (0..len)
        .map(|k| {
            if k <= (len - 1) / 2 {
                k as f64 * resolution
            } else {
                -((len - k) as f64) * resolution
            }
        })
        .collect()
}

/// Batched FFT bandpass over the history's time axis.
pub struct TemporalBandpassFilter {
    passband: Passband,
    plans: PlanCache,
    forward_pool: rayon::ThreadPool,
    inverse_pool: rayon::ThreadPool,
    spectrum: Vec<Complex32>,
    last_bins: Option<PassbandBins>,
}

impl TemporalBandpassFilter {
    /// Create a filter with dedicated worker pools for each direction.
    pub fn new(
        passband: Passband,
        forward_threads: usize,
        inverse_threads: usize,
    ) -> LazyEyesResult<Self> {
        let forward_pool = build_pool("fwd", forward_threads)?;
        let inverse_pool = build_pool("inv", inverse_threads)?;

        tracing::debug!(
            min_hz = passband.min_hz,
            max_hz = passband.max_hz,
            forward_threads,
            inverse_threads,
            "Temporal bandpass filter ready"
        );

        Ok(Self {
            passband,
            plans: PlanCache::default(),
            forward_pool,
            inverse_pool,
            spectrum: Vec::new(),
            last_bins: None,
        })
    }

    pub fn passband(&self) -> Passband {
        self.passband
    }

    /// Bins used by the most recent `apply`.
    pub fn last_bins(&self) -> Option<PassbandBins> {
        self.last_bins
    }

    pub fn plan_cache(&self) -> &PlanCache {
        &self.plans
    }

    /// Filter the buffered window and return the newest filtered frame.
    pub fn apply_history(
        &mut self,
        history: &HistoryBuffer,
        time_per_frame: f64,
    ) -> LazyEyesResult<FloatImage> {
        self.apply(&history.snapshot(), time_per_frame)
    }

    /// Filter `history` (oldest first) and return the band-limited signal
    /// at its newest time step. The result is not amplified.
    pub fn apply(
        &mut self,
        history: &[&FloatImage],
        time_per_frame: f64,
    ) -> LazyEyesResult<FloatImage> {
        let len = history.len();
        let newest = *history
            .last()
            .ok_or_else(|| LazyEyesError::processing("cannot filter an empty history"))?;

        if !time_per_frame.is_finite() || time_per_frame <= 0.0 {
            return Err(LazyEyesError::processing(format!(
                "sample spacing must be positive, got {time_per_frame}"
            )));
        }
        if let Some(frame) = history.iter().find(|f| !f.same_shape(newest)) {
            return Err(LazyEyesError::processing(format!(
                "history frames differ in shape: {}x{}x{} vs {}x{}x{}",
                frame.width(),
                frame.height(),
                frame.channels(),
                newest.width(),
                newest.height(),
                newest.channels()
            )));
        }

        let samples = newest.len();
        let bins = PassbandBins::locate(len, time_per_frame, self.passband);
        let mask = bins.mask();
        let forward = self.plans.get(len, FftDirection::Forward);
        let inverse = self.plans.get(len, FftDirection::Inverse);

        self.spectrum.clear();
        self.spectrum.resize(len * samples, ZERO);
        let spectrum = &mut self.spectrum;

        // Forward: gather each series out of the frames, then transform.
        let forward_batch = batch_len(samples, self.forward_pool.current_num_threads());
        self.forward_pool.install(|| {
            spectrum
                .par_chunks_mut(forward_batch * len)
                .enumerate()
                .for_each_init(
                    || scratch_for(&forward),
                    |scratch, (chunk_idx, chunk)| {
                        let first = chunk_idx * forward_batch;
                        for (offset, series) in chunk.chunks_exact_mut(len).enumerate() {
                            let p = first + offset;
                            for (slot, frame) in series.iter_mut().zip(history) {
                                *slot = Complex32::new(frame.data()[p], 0.0);
                            }
                        }
                        forward.process_with_scratch(chunk, scratch);
                    },
                );
        });

        // Inverse: mask, transform back, keep the newest sample of each series.
        let mut filtered = FloatImage::zeros(newest.width(), newest.height(), newest.layout());
        let norm = 1.0 / len as f32;
        let inverse_batch = batch_len(samples, self.inverse_pool.current_num_threads());
        self.inverse_pool.install(|| {
            spectrum
                .par_chunks_mut(inverse_batch * len)
                .zip(filtered.data_mut().par_chunks_mut(inverse_batch))
                .for_each_init(
                    || scratch_for(&inverse),
                    |scratch, (chunk, out)| {
                        for series in chunk.chunks_exact_mut(len) {
                            for (bin, &keep) in series.iter_mut().zip(&mask) {
                                if !keep {
                                    *bin = ZERO;
                                }
                            }
                        }
                        inverse.process_with_scratch(chunk, scratch);
                        for (value, series) in out.iter_mut().zip(chunk.chunks_exact(len)) {
                            *value = series[len - 1].re * norm;
                        }
                    },
                );
        });

        if let Some(p) = filtered.data().iter().position(|v| !v.is_finite()) {
            return Err(LazyEyesError::transform(format!(
                "inverse transform produced a non-finite sample at index {p}"
            )));
        }

        self.last_bins = Some(bins);
        Ok(filtered)
    }
}

impl std::fmt::Debug for TemporalBandpassFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemporalBandpassFilter")
            .field("passband", &self.passband)
            .field("plans", &self.plans)
            .field("forward_threads", &self.forward_pool.current_num_threads())
            .field("inverse_threads", &self.inverse_pool.current_num_threads())
            .finish()
    }
}

fn build_pool(direction: &'static str, threads: usize) -> LazyEyesResult<rayon::ThreadPool> {
    if threads == 0 {
        return Err(LazyEyesError::config(format!(
            "{direction} FFT pool needs at least one thread"
        )));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(move |i| format!("lazyeyes-fft-{direction}-{i}"))
        .build()
        .map_err(|e| LazyEyesError::config(format!("failed to start {direction} FFT pool: {e}")))
}

fn scratch_for(plan: &Arc<dyn Fft<f32>>) -> Vec<Complex32> {
    vec![ZERO; plan.get_inplace_scratch_len()]
}

/// Series per work item so each pool thread gets a few chunks.
fn batch_len(samples: usize, threads: usize) -> usize {
    samples.div_ceil(threads.max(1) * CHUNKS_PER_THREAD).max(1)
}
