//! In-memory [`PtyBackend`] for tests that must not start real processes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use crate::launch::LaunchSpec;
use crate::pty::{ExitNotifier, PtyBackend, PtyProcess, TerminalSize};

struct FakeProcess {
    notifier: ExitNotifier,
    terminated: AtomicBool,
    killed: AtomicBool,
    input: Mutex<Vec<u8>>,
    size: Mutex<TerminalSize>,
    output: broadcast::Sender<Vec<u8>>,
}

impl FakeProcess {
    fn finish(&self) {
        if !self.terminated.swap(true, Ordering::SeqCst) {
            self.notifier.notify();
        }
    }
}

struct FakeProcessHandle(Arc<FakeProcess>);

impl PtyProcess for FakeProcessHandle {
    fn write_input(&self, bytes: &[u8]) -> anyhow::Result<()> {
        if self.0.terminated.load(Ordering::SeqCst) {
            anyhow::bail!("process exited");
        }
        self.0
            .input
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .extend_from_slice(bytes);
        Ok(())
    }

    fn resize(&self, size: TerminalSize) -> anyhow::Result<()> {
        *self.0.size.lock().unwrap_or_else(|err| err.into_inner()) = size;
        Ok(())
    }

    fn subscribe_output(&self) -> broadcast::Receiver<Vec<u8>> {
        self.0.output.subscribe()
    }

    fn snapshot_output_history(&self) -> Vec<Vec<u8>> {
        Vec::new()
    }

    fn is_terminated(&self) -> bool {
        self.0.terminated.load(Ordering::SeqCst)
    }

    fn kill(&self) {
        self.0.killed.store(true, Ordering::SeqCst);
        self.0.finish();
    }
}

/// Records every spawn and lets tests end processes by generation.
#[derive(Default)]
pub struct FakePtyBackend {
    processes: Mutex<Vec<Arc<FakeProcess>>>,
    specs: Mutex<Vec<LaunchSpec>>,
    fail_spawns: AtomicBool,
}

impl FakePtyBackend {
    pub fn spawn_count(&self) -> usize {
        self.processes
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .len()
    }

    pub fn spawned_specs(&self) -> Vec<LaunchSpec> {
        self.specs
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    pub fn set_fail_spawns(&self, fail: bool) {
        self.fail_spawns.store(fail, Ordering::SeqCst);
    }

    fn find(&self, generation: u64) -> Option<Arc<FakeProcess>> {
        self.processes
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .iter()
            .find(|p| p.notifier.generation() == generation)
            .cloned()
    }

    /// Simulates the process exiting on its own.
    pub fn exit(&self, generation: u64) {
        if let Some(process) = self.find(generation) {
            process.finish();
        }
    }

    pub fn was_killed(&self, generation: u64) -> bool {
        self.find(generation)
            .is_some_and(|p| p.killed.load(Ordering::SeqCst))
    }

    pub fn killed_count(&self) -> usize {
        self.processes
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .iter()
            .filter(|p| p.killed.load(Ordering::SeqCst))
            .count()
    }

    pub fn input(&self, generation: u64) -> Vec<u8> {
        self.find(generation)
            .map(|p| p.input.lock().unwrap_or_else(|err| err.into_inner()).clone())
            .unwrap_or_default()
    }

    pub fn size(&self, generation: u64) -> Option<TerminalSize> {
        self.find(generation)
            .map(|p| *p.size.lock().unwrap_or_else(|err| err.into_inner()))
    }
}

impl PtyBackend for FakePtyBackend {
    fn spawn(
        &self,
        spec: &LaunchSpec,
        size: TerminalSize,
        on_exit: ExitNotifier,
    ) -> anyhow::Result<Box<dyn PtyProcess>> {
        if self.fail_spawns.load(Ordering::SeqCst) {
            anyhow::bail!("spawn {} failed", spec.program.display());
        }
        let (output, _) = broadcast::channel(16);
        let process = Arc::new(FakeProcess {
            notifier: on_exit,
            terminated: AtomicBool::new(false),
            killed: AtomicBool::new(false),
            input: Mutex::new(Vec::new()),
            size: Mutex::new(size),
            output,
        });
        self.specs
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push(spec.clone());
        self.processes
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push(process.clone());
        Ok(Box::new(FakeProcessHandle(process)))
    }
}
