//! Fault-injecting directory wrapper
//!
//! Every injected failure is an `io::Error` whose message starts with
//! `FAKE_FAULT_MARKER`, so `Error::is_fake_fault` can tell it apart from a
//! genuine codec bug.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Directory, IndexOutput, OwnedBytes};
use crate::error::FAKE_FAULT_MARKER;

struct FaultInjector {
    rng: Mutex<StdRng>,
    /// Probability in [0, 1]
    rate: Mutex<f64>,
    enabled: AtomicBool,
    injected: AtomicUsize,
}

impl FaultInjector {
    fn maybe_fail(&self, op: &str, name: &str) -> io::Result<()> {
        if !self.enabled.load(Ordering::Relaxed) {
            return Ok(());
        }
        let rate = *self.rate.lock();
        if rate <= 0.0 {
            return Ok(());
        }
        if self.rng.lock().random_bool(rate.min(1.0)) {
            self.injected.fetch_add(1, Ordering::Relaxed);
            log::debug!("[mock_dir] injecting fault on {} {}", op, name);
            return Err(io::Error::other(format!(
                "{}: {} {}",
                FAKE_FAULT_MARKER, op, name
            )));
        }
        Ok(())
    }
}

/// Wraps any directory, injecting faults with a configurable probability and
/// counting outputs that were created but never finished.
#[derive(Clone)]
pub struct MockDirectoryWrapper {
    inner: Arc<dyn Directory>,
    faults: Arc<FaultInjector>,
    open_outputs: Arc<AtomicUsize>,
}

impl MockDirectoryWrapper {
    pub fn new(inner: Arc<dyn Directory>, seed: u64, fault_rate: f64) -> Self {
        Self {
            inner,
            faults: Arc::new(FaultInjector {
                rng: Mutex::new(StdRng::seed_from_u64(seed)),
                rate: Mutex::new(fault_rate),
                enabled: AtomicBool::new(true),
                injected: AtomicUsize::new(0),
            }),
            open_outputs: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_fault_rate(&self, rate: f64) {
        *self.faults.rate.lock() = rate;
    }

    /// Switch fault injection on or off without changing the rate.
    pub fn set_enabled(&self, enabled: bool) {
        self.faults.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn injected_faults(&self) -> usize {
        self.faults.injected.load(Ordering::Relaxed)
    }

    /// Outputs created through this wrapper that are neither finished nor dropped.
    pub fn open_outputs(&self) -> usize {
        self.open_outputs.load(Ordering::Relaxed)
    }
}

impl Directory for MockDirectoryWrapper {
    fn exists(&self, name: &str) -> io::Result<bool> {
        self.inner.exists(name)
    }

    fn file_length(&self, name: &str) -> io::Result<u64> {
        self.inner.file_length(name)
    }

    fn open_input(&self, name: &str) -> io::Result<OwnedBytes> {
        self.faults.maybe_fail("open_input", name)?;
        self.inner.open_input(name)
    }

    fn create_output(&self, name: &str) -> io::Result<Box<dyn IndexOutput>> {
        self.faults.maybe_fail("create_output", name)?;
        let inner = self.inner.create_output(name)?;
        self.open_outputs.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MockOutput {
            inner: Some(inner),
            name: name.to_string(),
            faults: Arc::clone(&self.faults),
            open_outputs: Arc::clone(&self.open_outputs),
        }))
    }

    fn delete_file(&self, name: &str) -> io::Result<()> {
        self.faults.maybe_fail("delete_file", name)?;
        self.inner.delete_file(name)
    }

    fn list_all(&self) -> io::Result<Vec<String>> {
        self.inner.list_all()
    }
}

struct MockOutput {
    inner: Option<Box<dyn IndexOutput>>,
    name: String,
    faults: Arc<FaultInjector>,
    open_outputs: Arc<AtomicUsize>,
}

impl MockOutput {
    fn inner(&mut self) -> io::Result<&mut Box<dyn IndexOutput>> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::other(format!("output {} already finished", self.name)))
    }
}

impl io::Write for MockOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.faults.maybe_fail("write", &self.name)?;
        self.inner()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner()?.flush()
    }
}

impl IndexOutput for MockOutput {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.faults.maybe_fail("finish", &self.name)?;
        match self.inner.take() {
            Some(inner) => {
                self.open_outputs.fetch_sub(1, Ordering::Relaxed);
                inner.finish()
            }
            None => Ok(()),
        }
    }

    fn bytes_written(&self) -> u64 {
        self.inner.as_ref().map_or(0, |inner| inner.bytes_written())
    }
}

impl Drop for MockOutput {
    fn drop(&mut self) {
        if self.inner.is_some() {
            self.open_outputs.fetch_sub(1, Ordering::Relaxed);
        }
    }
}
