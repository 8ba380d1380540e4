use anyhow::Context as _;
use portable_pty::{Child, ChildKiller as _, CommandBuilder, MasterPty, PtySize, native_pty_system};
use std::collections::VecDeque;
use std::io::{Read as _, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};

use crate::launch::LaunchSpec;
use crate::{TerminalExit, TerminalKey};

pub(crate) const MAX_OUTPUT_HISTORY_BYTES: usize = 512 * 1024;
const OUTPUT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

/// Reports a process exit back to the owner of the terminal cache.
#[derive(Clone, Debug)]
pub struct ExitNotifier {
    key: TerminalKey,
    generation: u64,
    tx: mpsc::UnboundedSender<TerminalExit>,
}

impl ExitNotifier {
    pub(crate) fn new(
        key: TerminalKey,
        generation: u64,
        tx: mpsc::UnboundedSender<TerminalExit>,
    ) -> Self {
        Self {
            key,
            generation,
            tx,
        }
    }

    pub fn key(&self) -> TerminalKey {
        self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn notify(&self) {
        let _ = self.tx.send(TerminalExit {
            key: self.key,
            generation: self.generation,
        });
    }
}

/// Starts processes attached to a pseudo terminal.
pub trait PtyBackend: Send + Sync {
    fn spawn(
        &self,
        spec: &LaunchSpec,
        size: TerminalSize,
        on_exit: ExitNotifier,
    ) -> anyhow::Result<Box<dyn PtyProcess>>;
}

/// A running pty child. Output is pushed, never polled.
pub trait PtyProcess: Send + Sync {
    fn write_input(&self, bytes: &[u8]) -> anyhow::Result<()>;
    fn resize(&self, size: TerminalSize) -> anyhow::Result<()>;
    fn subscribe_output(&self) -> broadcast::Receiver<Vec<u8>>;
    fn snapshot_output_history(&self) -> Vec<Vec<u8>>;
    fn is_terminated(&self) -> bool;
    fn kill(&self);
}

#[derive(Default)]
pub(crate) struct OutputHistory {
    chunks: VecDeque<Vec<u8>>,
    total_bytes: usize,
}

impl OutputHistory {
    pub(crate) fn push(&mut self, chunk: Vec<u8>) {
        self.total_bytes = self.total_bytes.saturating_add(chunk.len());
        self.chunks.push_back(chunk);
        while self.total_bytes > MAX_OUTPUT_HISTORY_BYTES {
            let Some(front) = self.chunks.pop_front() else {
                self.total_bytes = 0;
                break;
            };
            self.total_bytes = self.total_bytes.saturating_sub(front.len());
        }
    }

    pub(crate) fn snapshot_chunks(&self) -> Vec<Vec<u8>> {
        self.chunks.iter().cloned().collect()
    }
}

/// [`PtyBackend`] over the platform pty via `portable-pty`.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativePtyBackend;

impl PtyBackend for NativePtyBackend {
    fn spawn(
        &self,
        spec: &LaunchSpec,
        size: TerminalSize,
        on_exit: ExitNotifier,
    ) -> anyhow::Result<Box<dyn PtyProcess>> {
        Ok(Box::new(NativePtyProcess::spawn(spec, size, on_exit)?))
    }
}

struct NativePtyProcess {
    output: broadcast::Sender<Vec<u8>>,
    terminated: Arc<AtomicBool>,
    history: Arc<Mutex<OutputHistory>>,
    writer: Mutex<Box<dyn Write + Send>>,
    master: Mutex<Box<dyn MasterPty + Send>>,
    child: Mutex<Option<Box<dyn Child + Send + Sync>>>,
}

impl NativePtyProcess {
    fn spawn(spec: &LaunchSpec, size: TerminalSize, on_exit: ExitNotifier) -> anyhow::Result<Self> {
        let pty = native_pty_system();
        let pair = pty
            .openpty(PtySize {
                rows: size.rows,
                cols: size.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("openpty failed")?;

        let mut cmd = CommandBuilder::new(&spec.program);
        cmd.args(&spec.args);
        cmd.cwd(&spec.cwd);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("spawn {}", spec.program.display()))?;
        // The child holds its own copy of the slave side.
        drop(pair.slave);
        let reader = pair.master.try_clone_reader().context("clone pty reader")?;
        let writer = pair.master.take_writer().context("take pty writer")?;

        let (output, _) = broadcast::channel::<Vec<u8>>(OUTPUT_CHANNEL_CAPACITY);
        let terminated = Arc::new(AtomicBool::new(false));
        let history = Arc::new(Mutex::new(OutputHistory::default()));
        let output_for_thread = output.clone();
        let terminated_for_thread = terminated.clone();
        let history_for_thread = history.clone();

        std::thread::Builder::new()
            .name("arbor-pty-read".to_owned())
            .spawn(move || {
                let mut reader = reader;
                let mut buf = [0u8; 16 * 1024];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            let chunk = buf[..n].to_vec();
                            history_for_thread
                                .lock()
                                .unwrap_or_else(|err| err.into_inner())
                                .push(chunk.clone());
                            let _ = output_for_thread.send(chunk);
                        }
                        Err(_) => break,
                    }
                }
                terminated_for_thread.store(true, Ordering::SeqCst);
                on_exit.notify();
            })
            .context("spawn pty reader thread")?;

        Ok(Self {
            output,
            terminated,
            history,
            writer: Mutex::new(writer),
            master: Mutex::new(pair.master),
            child: Mutex::new(Some(child)),
        })
    }
}

impl PtyProcess for NativePtyProcess {
    fn write_input(&self, bytes: &[u8]) -> anyhow::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|err| err.into_inner());
        if let Err(err) = writer.write_all(bytes) {
            self.terminated.store(true, Ordering::SeqCst);
            return Err(err).context("pty write");
        }
        writer.flush().ok();
        Ok(())
    }

    fn resize(&self, size: TerminalSize) -> anyhow::Result<()> {
        let master = self.master.lock().unwrap_or_else(|err| err.into_inner());
        master
            .resize(PtySize {
                rows: size.rows,
                cols: size.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("pty resize")?;
        Ok(())
    }

    fn subscribe_output(&self) -> broadcast::Receiver<Vec<u8>> {
        self.output.subscribe()
    }

    fn snapshot_output_history(&self) -> Vec<Vec<u8>> {
        self.history
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .snapshot_chunks()
    }

    fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    fn kill(&self) {
        let Some(child) = self
            .child
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .take()
        else {
            return;
        };
        // portable-pty sleeps between SIGHUP and SIGKILL, then waits; keep
        // that off the caller's thread.
        if let Err(err) = std::thread::Builder::new()
            .name("arbor-pty-reap".to_owned())
            .spawn(move || reap(child))
        {
            tracing::warn!(error = %err, "failed to spawn pty reaper thread");
        }
    }
}

fn reap(mut child: Box<dyn Child + Send + Sync>) {
    if matches!(child.try_wait(), Ok(Some(_))) {
        return;
    }
    if let Err(err) = child.kill() {
        tracing::warn!(error = %err, "failed to kill pty child");
    }
    let _ = child.wait();
}

impl Drop for NativePtyProcess {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_history_is_bounded() {
        let mut history = OutputHistory::default();

        let chunk = vec![0u8; 128 * 1024];
        for _ in 0..16 {
            history.push(chunk.clone());
        }

        assert!(history.total_bytes <= MAX_OUTPUT_HISTORY_BYTES);
        assert_eq!(history.snapshot_chunks().len(), 4);
    }

    #[test]
    fn output_history_keeps_newest_chunks() {
        let mut history = OutputHistory::default();
        history.push(vec![1u8; MAX_OUTPUT_HISTORY_BYTES]);
        history.push(vec![2u8; 10]);

        let chunks = history.snapshot_chunks();
        assert_eq!(chunks, vec![vec![2u8; 10]]);
    }

    #[cfg(unix)]
    #[test]
    fn kill_does_not_wait_for_a_stubborn_child() {
        use arbor_domain::WorkspaceId;
        use std::time::{Duration, Instant};

        let (tx, mut rx) = mpsc::unbounded_channel();
        let spec = LaunchSpec {
            program: "/bin/sh".into(),
            args: vec!["-c".to_owned(), "trap '' HUP; exec sleep 30".to_owned()],
            cwd: std::env::temp_dir(),
            env: Vec::new(),
        };
        let notifier = ExitNotifier::new(TerminalKey::assistant(WorkspaceId::new()), 1, tx);
        let process = NativePtyBackend
            .spawn(&spec, TerminalSize::default(), notifier)
            .expect("pty spawn should succeed");

        let started = Instant::now();
        process.kill();
        process.kill();
        assert!(
            started.elapsed() < Duration::from_millis(100),
            "kill blocked for {:?}",
            started.elapsed()
        );

        let deadline = Instant::now() + Duration::from_secs(10);
        let exit = loop {
            if let Ok(exit) = rx.try_recv() {
                break exit;
            }
            assert!(Instant::now() < deadline, "child was never reaped");
            std::thread::sleep(Duration::from_millis(20));
        };
        assert_eq!(exit.generation, 1);
    }
}
