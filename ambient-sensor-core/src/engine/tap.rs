//! Realtime side of the pipeline.
//!
//! The tap reduces each buffer to one decibel scalar and forwards it through
//! a bounded channel; raw samples go through a lock-free SPSC ring. Neither
//! path blocks, locks, logs or allocates. Overflow is counted, not reported.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use ringbuf::traits::Producer;
use ringbuf::HeapProd;

use crate::processing::signal::{decibels, first_channel_rms, FULL_SCALE_REFERENCE};
use crate::traits::input_provider::TapCallback;

/// Capacity of the realtime → control reading queue.
pub const READING_QUEUE_CAPACITY: usize = 1024;

/// One buffer's loudness, computed on the realtime thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TapReading {
    pub decibels: f32,
    pub frames: u32,
}

/// Drop counters written by the realtime thread.
#[derive(Debug, Default)]
pub struct TapCounters {
    pub readings_dropped: AtomicU64,
    pub raw_samples_dropped: AtomicU64,
}

pub(crate) struct Tap {
    readings: Sender<TapReading>,
    meter: bool,
    raw: Option<HeapProd<f32>>,
    counters: Arc<TapCounters>,
}

impl Tap {
    pub(crate) fn new(
        readings: Sender<TapReading>,
        meter: bool,
        raw: Option<HeapProd<f32>>,
        counters: Arc<TapCounters>,
    ) -> Self {
        Self {
            readings,
            meter,
            raw,
            counters,
        }
    }

    pub(crate) fn into_callback(mut self) -> TapCallback {
        Box::new(move |samples: &[f32], _sample_rate: f64, channels: u16| {
            self.process(samples, channels);
        })
    }

    pub(crate) fn process(&mut self, samples: &[f32], channels: u16) {
        if channels == 0 {
            return;
        }
        let stride = channels as usize;

        if let Some(raw) = self.raw.as_mut() {
            let mut dropped = 0u64;
            for &sample in samples.iter().step_by(stride) {
                if raw.try_push(sample).is_err() {
                    dropped += 1;
                }
            }
            if dropped > 0 {
                self.counters.raw_samples_dropped.fetch_add(dropped, Ordering::Relaxed);
            }
        }

        if !self.meter {
            return;
        }
        let rms = first_channel_rms(samples, channels);
        if rms.is_nan() {
            return;
        }
        let reading = TapReading {
            decibels: decibels(rms, FULL_SCALE_REFERENCE),
            frames: (samples.len() / stride) as u32,
        };
        if self.readings.try_send(reading).is_err() {
            self.counters.readings_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ringbuf::traits::{Consumer, Split};
    use ringbuf::HeapRb;

    #[test]
    fn forwards_one_reading_per_buffer() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        let mut tap = Tap::new(tx, true, None, Arc::default());

        tap.process(&[1.0, 0.0, 1.0, 0.0], 2);

        let reading = rx.try_recv().unwrap();
        assert_relative_eq!(reading.decibels, 0.0, epsilon = 1e-5);
        assert_eq!(reading.frames, 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn empty_buffer_sends_nothing() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        let mut tap = Tap::new(tx, true, None, Arc::default());

        tap.process(&[], 1);
        tap.process(&[0.5], 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn full_queue_counts_drops() {
        let (tx, _rx) = crossbeam_channel::bounded(1);
        let counters = Arc::new(TapCounters::default());
        let mut tap = Tap::new(tx, true, None, Arc::clone(&counters));

        for _ in 0..3 {
            tap.process(&[0.1; 8], 1);
        }
        assert_eq!(counters.readings_dropped.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn raw_ring_receives_first_channel() {
        let (tx, _rx) = crossbeam_channel::bounded(4);
        let (prod, mut cons) = HeapRb::<f32>::new(3).split();
        let counters = Arc::new(TapCounters::default());
        let mut tap = Tap::new(tx, false, Some(prod), Arc::clone(&counters));

        tap.process(&[0.1, 9.0, 0.2, 9.0, 0.3, 9.0, 0.4, 9.0], 2);

        let mut out = [0.0f32; 4];
        let n = cons.pop_slice(&mut out);
        assert_eq!(&out[..n], &[0.1, 0.2, 0.3]);
        assert_eq!(counters.raw_samples_dropped.load(Ordering::Relaxed), 1);
    }
}
