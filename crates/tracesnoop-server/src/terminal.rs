//! The user's own terminal: raw mode, window size and keystroke reading.

use std::io::{self, Read};
use std::thread::JoinHandle;
use tokio::sync::mpsc;

const STDIN_BUFFER_SIZE: usize = 1024;

/// Puts stdin into raw mode and restores the original settings on drop.
pub struct RawModeGuard {
    original: libc::termios,
}

impl RawModeGuard {
    /// Enable raw mode. Returns `None` when stdin is not a terminal.
    pub fn enable() -> io::Result<Option<Self>> {
        if unsafe { libc::isatty(libc::STDIN_FILENO) } != 1 {
            return Ok(None);
        }

        let mut original: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(libc::STDIN_FILENO, &mut original) } != 0 {
            return Err(io::Error::last_os_error());
        }

        let mut raw = original;
        unsafe { libc::cfmakeraw(&mut raw) };
        if unsafe { libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &raw) } != 0 {
            return Err(io::Error::last_os_error());
        }

        tracing::debug!(target: "tracesnoop::startup", "Terminal switched to raw mode");
        Ok(Some(Self { original }))
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        unsafe {
            libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &self.original);
        }
    }
}

/// Current size of the terminal on stdout as `(rows, cols)`.
pub fn window_size() -> Option<(u16, u16)> {
    let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
    if unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut ws) } != 0 {
        return None;
    }
    size_of(&ws)
}

fn size_of(ws: &libc::winsize) -> Option<(u16, u16)> {
    (ws.ws_row > 0 && ws.ws_col > 0).then_some((ws.ws_row, ws.ws_col))
}

/// Read raw keystrokes from stdin on a dedicated thread.
///
/// The thread stops at EOF or once the receiver is dropped and the next
/// keystroke arrives.
pub fn spawn_stdin_reader(tx: mpsc::UnboundedSender<Vec<u8>>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut stdin = io::stdin().lock();
        let mut buf = [0u8; STDIN_BUFFER_SIZE];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(target: "tracesnoop::session", "Stdin read failed: {}", e);
                    break;
                }
            }
        }
        tracing::debug!(target: "tracesnoop::session", "Stdin reader exiting");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn winsize(rows: u16, cols: u16) -> libc::winsize {
        libc::winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        }
    }

    #[test]
    fn test_size_of_rejects_zero_dimensions() {
        assert_eq!(size_of(&winsize(40, 120)), Some((40, 120)));
        assert_eq!(size_of(&winsize(0, 120)), None);
        assert_eq!(size_of(&winsize(40, 0)), None);
    }
}
