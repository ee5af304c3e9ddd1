//! Thin pass-through façade over the external async runtime.
//!
//! The supervisor owns an explicit [`Runtime`] handle rather than reaching
//! for an ambient/global event loop; a root handle is constructed with one
//! and children inherit it by cloning. Every method here forwards directly
//! to tokio and preserves its contract — this module adds no design
//! surface of its own.

// Layer 1: Standard library imports
use std::future::Future;
use std::io;
use std::path::Path;
use std::process::Command as StdCommand;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs, UdpSocket};
use tokio::process::{Child, Command};
use tokio::runtime::Handle as TokioHandle;
use tokio::task::JoinError;

#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};
#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

// Layer 3: Internal module imports
// (none)

/// A hook invoked whenever a supervised coroutine raises an exception the
/// application wants to observe outside the normal result channel.
pub type ExceptionHandler = Arc<dyn Fn(&(dyn std::error::Error + Send + Sync)) + Send + Sync>;

/// A hook invoked whenever the runtime is about to spawn a task, mirroring
/// the original source's `task_factory` override point.
pub type TaskFactory = Arc<dyn Fn(&str) + Send + Sync>;

struct RuntimeInner {
    handle: TokioHandle,
    debug_mode: AtomicBool,
    slow_callback_duration: RwLock<Duration>,
    exception_handler: RwLock<Option<ExceptionHandler>>,
    task_factory: RwLock<Option<TaskFactory>>,
}

/// Handle to the external async runtime, passed explicitly to root task
/// handles. Cloning is cheap; children inherit their parent's runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Wraps the currently-entered tokio runtime.
    pub fn current() -> Self {
        Self::from_handle(TokioHandle::current())
    }

    /// Wraps an explicit tokio runtime handle.
    pub fn from_handle(handle: TokioHandle) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                handle,
                debug_mode: AtomicBool::new(false),
                slow_callback_duration: RwLock::new(Duration::from_millis(100)),
                exception_handler: RwLock::new(None),
                task_factory: RwLock::new(None),
            }),
        }
    }

    /// The underlying tokio handle, for spawning supervised tasks.
    pub(crate) fn tokio_handle(&self) -> &TokioHandle {
        &self.inner.handle
    }

    pub async fn tcp_listen(&self, addr: impl ToSocketAddrs) -> io::Result<TcpListener> {
        TcpListener::bind(addr).await
    }

    pub async fn tcp_connect(&self, addr: impl ToSocketAddrs) -> io::Result<TcpStream> {
        TcpStream::connect(addr).await
    }

    pub async fn udp_bind(&self, addr: impl ToSocketAddrs) -> io::Result<UdpSocket> {
        UdpSocket::bind(addr).await
    }

    #[cfg(unix)]
    pub async fn unix_listen(&self, path: impl AsRef<Path>) -> io::Result<UnixListener> {
        UnixListener::bind(path)
    }

    #[cfg(unix)]
    pub async fn unix_connect(&self, path: impl AsRef<Path>) -> io::Result<UnixStream> {
        UnixStream::connect(path).await
    }

    /// Launches a subprocess, forwarding directly to `tokio::process::Command`.
    pub fn spawn_subprocess(&self, mut cmd: Command) -> io::Result<Child> {
        cmd.spawn()
    }

    /// Convenience constructor mirroring the façade's "exec" entry point.
    pub fn command(program: impl AsRef<std::ffi::OsStr>) -> Command {
        Command::from(StdCommand::new(program))
    }

    #[cfg(unix)]
    pub fn signal(&self, kind: SignalKind) -> io::Result<Signal> {
        signal(kind)
    }

    /// Offloads a blocking closure to the runtime's blocking-task pool.
    pub async fn run_in_executor<F, T>(&self, f: F) -> Result<T, JoinError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.inner.handle.spawn_blocking(f).await
    }

    pub fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    pub fn set_debug_mode(&self, enabled: bool) {
        self.inner.debug_mode.store(enabled, Ordering::SeqCst);
    }

    pub fn debug_mode(&self) -> bool {
        self.inner.debug_mode.load(Ordering::SeqCst)
    }

    pub fn set_slow_callback_duration(&self, duration: Duration) {
        *self.inner.slow_callback_duration.write().unwrap_or_else(|e| e.into_inner()) = duration;
    }

    pub fn slow_callback_duration(&self) -> Duration {
        *self
            .inner
            .slow_callback_duration
            .read()
            .unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_exception_handler(&self, handler: ExceptionHandler) {
        *self
            .inner
            .exception_handler
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(handler);
    }

    pub fn exception_handler(&self) -> Option<ExceptionHandler> {
        self.inner
            .exception_handler
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_task_factory(&self, factory: TaskFactory) {
        *self
            .inner
            .task_factory
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(factory);
    }

    pub fn task_factory(&self) -> Option<TaskFactory> {
        self.inner
            .task_factory
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Spawns a plain (unsupervised) future on this runtime, for façade
    /// callers that do not need a task handle.
    pub fn spawn<F>(&self, fut: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.inner.handle.spawn(fut)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_debug_mode_toggle() {
        let rt = Runtime::current();
        assert!(!rt.debug_mode());
        rt.set_debug_mode(true);
        assert!(rt.debug_mode());
    }

    #[tokio::test]
    async fn test_slow_callback_duration_default() {
        let rt = Runtime::current();
        assert_eq!(rt.slow_callback_duration(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_run_in_executor_returns_value() {
        let rt = Runtime::current();
        let value = rt.run_in_executor(|| 2 + 2).await.unwrap();
        assert_eq!(value, 4);
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let rt = Runtime::current();
        let rt2 = rt.clone();
        rt.set_debug_mode(true);
        assert!(rt2.debug_mode());
    }
}
