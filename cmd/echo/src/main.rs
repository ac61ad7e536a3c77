//! # workq echo server
//!
//! Classic handoff architecture: one accept loop, N worker threads, one
//! `WorkQueue<RawFd>` between them.
//!
//! - The accept loop (main thread) accepts connections and pushes the raw
//!   descriptor onto the queue. If the push is rejected, the connection is
//!   closed immediately instead of being queued in a broken state.
//! - Each worker blocks in `pop()`, then echoes bytes on the descriptor
//!   until the peer hangs up.
//! - SIGINT/SIGTERM stop the accept loop, close the queue, and let the
//!   workers drain what was already accepted before exiting.
//!
//! ## Usage
//!
//!     cargo run -p workq-echo --release -- [--port 7777] [--workers 4]
//!
//! Environment: `WQ_PORT`, `WQ_WORKERS`, `WQ_LOG_LEVEL`.
//!
//! ## Try it
//!
//!     printf 'hello\n' | nc 127.0.0.1 7777

use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use workq::env::env_get;
use workq::{qerror, qinfo, qwarn};
use workq::{PoolConfig, PushError, WorkQueue, WorkerPool};

// ── Configuration ──

const RECV_BUF_SIZE: usize = 4096;
const LISTEN_BACKLOG: i32 = 1024;
const ACCEPT_POLL_MS: i32 = 500;

static RUNNING: AtomicBool = AtomicBool::new(true);
static TOTAL_CONNECTIONS: AtomicU64 = AtomicU64::new(0);
static REJECTED_CONNECTIONS: AtomicU64 = AtomicU64::new(0);
static TOTAL_BYTES: AtomicU64 = AtomicU64::new(0);

// ── Socket setup ──

/// Create, configure, bind, and listen. Returns the listener fd.
fn bind_socket(port: u16) -> io::Result<RawFd> {
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    unsafe {
        let opt: i32 = 1;
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &opt as *const _ as *const _,
            4,
        );
    }

    let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    addr.sin_family = libc::AF_INET as libc::sa_family_t;
    addr.sin_port = port.to_be();
    addr.sin_addr.s_addr = libc::INADDR_ANY.to_be();

    let rc = unsafe {
        libc::bind(
            fd,
            &addr as *const _ as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        let err = io::Error::last_os_error();
        unsafe { libc::close(fd) };
        return Err(err);
    }

    let rc = unsafe { libc::listen(fd, LISTEN_BACKLOG) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        unsafe { libc::close(fd) };
        return Err(err);
    }

    Ok(fd)
}

/// What poll() reported about the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenerPoll {
    /// Nothing pending; re-check the shutdown flag and poll again.
    Timeout,
    /// A connection is waiting in the accept backlog.
    Readable,
    /// POLLERR/POLLHUP/POLLNVAL: the listener is unusable, stop accepting.
    /// Returning Timeout here would make the accept loop spin at full speed
    /// since poll() keeps reporting the condition immediately.
    Fatal,
}

/// Wait up to `timeout_ms` for the listener to become readable, so the
/// accept loop can re-check the shutdown flag instead of blocking forever
/// in accept().
fn poll_listener(fd: RawFd, timeout_ms: i32) -> ListenerPoll {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return ListenerPoll::Timeout;
        }
        qerror!("poll on listener fd {} failed: {}", fd, err);
        return ListenerPoll::Fatal;
    }
    if rc == 0 {
        return ListenerPoll::Timeout;
    }
    if pfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
        return ListenerPoll::Fatal;
    }
    if pfd.revents & libc::POLLIN != 0 {
        ListenerPoll::Readable
    } else {
        ListenerPoll::Timeout
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        fn accept_connection(listener_fd: RawFd) -> io::Result<RawFd> {
            let fd = unsafe {
                libc::accept4(
                    listener_fd,
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                    libc::SOCK_CLOEXEC,
                )
            };
            if fd < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(fd)
            }
        }
    } else {
        fn accept_connection(listener_fd: RawFd) -> io::Result<RawFd> {
            let fd = unsafe {
                libc::accept(listener_fd, std::ptr::null_mut(), std::ptr::null_mut())
            };
            if fd < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(fd)
            }
        }
    }
}

// ── Per-connection handler ──

/// Echo everything back until EOF. Runs on a worker thread; the descriptor
/// is owned here and closed on exit.
fn handle_connection(worker_id: usize, fd: RawFd) {
    let mut buf = [0u8; RECV_BUF_SIZE];

    loop {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, RECV_BUF_SIZE) };
        if n == 0 {
            break; // EOF
        }
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            qwarn!("worker {}: read on fd {} failed: {}", worker_id, fd, err);
            break;
        }

        TOTAL_BYTES.fetch_add(n as u64, Ordering::Relaxed);
        if write_all(fd, &buf[..n as usize]).is_err() {
            break;
        }
    }

    unsafe { libc::close(fd) };
}

fn write_all(fd: RawFd, mut data: &[u8]) -> io::Result<()> {
    while !data.is_empty() {
        let n = unsafe { libc::write(fd, data.as_ptr() as *const _, data.len()) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        data = &data[n as usize..];
    }
    Ok(())
}

// ── Accept loop ──

/// Producer side: accept and push until told to stop. A rejected push means
/// the descriptor never entered the queue, so it is closed here.
fn accept_loop(listener_fd: RawFd, queue: &WorkQueue<RawFd>) {
    while RUNNING.load(Ordering::Relaxed) {
        match poll_listener(listener_fd, ACCEPT_POLL_MS) {
            ListenerPoll::Timeout => continue,
            ListenerPoll::Readable => {}
            ListenerPoll::Fatal => {
                qerror!("listener fd {} is dead, stopping accept loop", listener_fd);
                break;
            }
        }

        let fd = match accept_connection(listener_fd) {
            Ok(fd) => fd,
            Err(err) => {
                if err.kind() == io::ErrorKind::Interrupted
                    || err.kind() == io::ErrorKind::WouldBlock
                {
                    continue;
                }
                qerror!("accept failed: {}", err);
                break;
            }
        };

        TOTAL_CONNECTIONS.fetch_add(1, Ordering::Relaxed);

        if let Err(err) = queue.push(fd) {
            // Reject cleanly: the connection is closed, never half-queued.
            let fd = match err {
                PushError::Closed(fd) => fd,
                PushError::AllocFailed(fd) => {
                    qwarn!("queue allocation failed, rejecting fd {}", fd);
                    fd
                }
            };
            REJECTED_CONNECTIONS.fetch_add(1, Ordering::Relaxed);
            unsafe { libc::close(fd) };
        }
    }
}

// ── Signals ──

extern "C" fn handle_shutdown_signal(_sig: libc::c_int) {
    RUNNING.store(false, Ordering::SeqCst);
}

fn install_signal_handlers() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(handle_shutdown_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe {
        signal::sigaction(Signal::SIGINT, &action)?;
        signal::sigaction(Signal::SIGTERM, &action)?;
        // A peer resetting mid-write must not kill the process.
        signal::sigaction(
            Signal::SIGPIPE,
            &SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty()),
        )?;
    }
    Ok(())
}

// ── Main ──

fn main() {
    workq::qlog::init();

    let mut port: u16 = env_get("WQ_PORT", 7777);
    let mut config = PoolConfig::from_env().thread_name_prefix("echo-worker");

    // CLI flags override env vars
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                i += 1;
                if let Some(p) = args.get(i).and_then(|s| s.parse().ok()) {
                    port = p;
                }
            }
            "--workers" | "-w" => {
                i += 1;
                if let Some(w) = args.get(i).and_then(|s| s.parse().ok()) {
                    config = config.num_workers(w);
                }
            }
            s if s.parse::<u16>().is_ok() => {
                port = s.parse().unwrap();
            }
            _ => {}
        }
        i += 1;
    }

    if let Err(e) = install_signal_handlers() {
        qerror!("failed to install signal handlers: {}", e);
        std::process::exit(1);
    }

    let listener_fd = match bind_socket(port) {
        Ok(fd) => fd,
        Err(e) => {
            qerror!("failed to bind port {}: {}", port, e);
            std::process::exit(1);
        }
    };

    let queue: Arc<WorkQueue<RawFd>> = Arc::new(WorkQueue::new());
    let pool = match WorkerPool::spawn(Arc::clone(&queue), &config, handle_connection) {
        Ok(pool) => pool,
        Err(e) => {
            qerror!("failed to start worker pool: {}", e);
            std::process::exit(1);
        }
    };

    qinfo!(
        "wq-echo: listening on port {} with {} workers",
        port,
        pool.num_workers()
    );

    accept_loop(listener_fd, &queue);

    // Shutdown: stop producing, let the workers drain, then join.
    qinfo!("wq-echo: shutting down, draining {} queued", queue.len());
    unsafe { libc::close(listener_fd) };
    queue.close();
    pool.join();

    qinfo!(
        "wq-echo: done. connections={} rejected={} bytes_echoed={}",
        TOTAL_CONNECTIONS.load(Ordering::Relaxed),
        REJECTED_CONNECTIONS.load(Ordering::Relaxed),
        TOTAL_BYTES.load(Ordering::Relaxed),
    );
}
