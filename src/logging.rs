use alloc::{collections::VecDeque, string::String, vec::Vec};
use core::fmt::Write;

use lazy_static::lazy_static;
use log::{LevelFilter, Metadata, Record};
use spin::{Mutex, Once};

const DEFAULT_CONSOLE_LINES: usize = 1024;

lazy_static! {
    static ref CONSOLE: Mutex<Console> = Mutex::new(Console::new(DEFAULT_CONSOLE_LINES));
}

static LOGGER: Logger = Logger;
// the console is shared by every kernel in the process, the first one sizes it
static CONSOLE_SIZED: Once<()> = Once::new();

pub(crate) struct Logger;
impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            crate::kprintln!(
                "[{}:{}] {}",
                record.file().unwrap_or("?"),
                record.line().unwrap_or(0),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

/// Installs the kernel logger. Safe to call more than once; later calls only
/// change the level, the console keeps the size it got first.
pub fn init(level: LevelFilter, console_lines: usize) {
    // another kernel instance may have installed it already
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
    CONSOLE_SIZED.call_once(|| set_console_lines(console_lines));
}

// line oriented ring buffer, oldest lines drop off the front
#[derive(Debug)]
struct Console {
    lines: VecDeque<String>,
    partial: String,
    cap: usize,
}

impl Console {
    fn new(cap: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(cap),
            partial: String::new(),
            cap,
        }
    }

    fn push_line(&mut self, line: String) {
        if self.lines.len() == self.cap {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }
}

impl Write for Console {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for c in s.chars() {
            match c {
                '\n' => {
                    let line = core::mem::take(&mut self.partial);
                    self.push_line(line);
                }
                // printable ASCII
                ' '..='~' => self.partial.push(c),
                _ => self.partial.push('\u{fffd}'),
            }
        }
        Ok(())
    }
}

#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => ($crate::logging::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! kprintln {
    () => ($crate::kprint!("\n"));
    ($($arg:tt)*) => ($crate::kprint!("{}\n", format_args!($($arg)*)));
}

#[doc(hidden)]
pub fn _print(args: core::fmt::Arguments) {
    // Console::write_str never fails
    let _ = CONSOLE.lock().write_fmt(args);
}

/// Resizes the console ring, dropping the oldest lines if it shrinks.
pub fn set_console_lines(cap: usize) {
    let mut console = CONSOLE.lock();
    console.cap = cap.max(1);
    while console.lines.len() > console.cap {
        console.lines.pop_front();
    }
}

pub fn console_lines() -> Vec<String> {
    CONSOLE.lock().lines.iter().cloned().collect()
}

pub fn console_contains(needle: &str) -> bool {
    let console = CONSOLE.lock();
    console.lines.iter().any(|line| line.contains(needle)) || console.partial.contains(needle)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn later_init_keeps_console_size() {
        init(log::max_level(), 1024);
        crate::kprintln!("console marker a");
        crate::kprintln!("console marker b");
        init(log::max_level(), 1);
        assert!(console_contains("console marker a"));
        assert!(console_contains("console marker b"));
    }

    #[test]
    fn console_splits_lines_and_drops_oldest() {
        let mut console = Console::new(2);
        write!(console, "one\ntwo\nthr").unwrap();
        write!(console, "ee\n").unwrap();
        assert_eq!(console.lines, ["two", "three"]);
        assert!(console.partial.is_empty());
    }

    #[test]
    fn logger_writes_to_console() {
        init(LevelFilter::Info, DEFAULT_CONSOLE_LINES);
        log::warn!("logger test marker {}", 0x2a);
        assert!(console_contains("logger test marker 42"));
    }
}
