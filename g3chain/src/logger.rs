/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt::Arguments;
use std::io::{self, IsTerminal, Write};

use chrono::Local;
use slog::{Drain, KV, Key, Level, OwnedKVList, Record, Serializer, slog_o};
use slog_scope::GlobalLoggerGuard;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

struct KvCollector<'a> {
    pairs: &'a mut Vec<(String, String)>,
}

impl Serializer for KvCollector<'_> {
    fn emit_arguments(&mut self, key: Key, value: &Arguments) -> slog::Result {
        self.pairs.push((key.to_string(), value.to_string()));
        Ok(())
    }
}

/// Writes one line per record to stderr, colored on a terminal.
struct StderrDrain {
    console: bool,
}

impl StderrDrain {
    fn collect_kv(
        record: &Record,
        logger_values: &OwnedKVList,
    ) -> slog::Result<Vec<(String, String)>> {
        let mut pairs = Vec::new();
        let mut collector = KvCollector { pairs: &mut pairs };
        record.kv().serialize(record, &mut collector)?;
        logger_values.serialize(record, &mut collector)?;
        Ok(pairs)
    }

    fn write_plain<IO: Write>(
        &self,
        io: &mut IO,
        record: &Record,
        logger_values: &OwnedKVList,
    ) -> slog::Result {
        let pairs = Self::collect_kv(record, logger_values)?;

        write!(io, "{}", Local::now().format(TIME_FORMAT))?;
        write!(io, " {}", record.level())?;
        for (k, v) in &pairs {
            write!(io, " {k}: {v},")?;
        }
        write!(io, " {}", record.msg())?;
        if !record.module().is_empty() {
            write!(io, " <{}>", record.module())?;
        }
        writeln!(io)?;
        Ok(())
    }

    fn write_console<IO: Write>(
        &self,
        io: &mut IO,
        record: &Record,
        logger_values: &OwnedKVList,
    ) -> slog::Result {
        use anstyle::{AnsiColor, Color, Style};

        const COLOR_MAGENTA: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Magenta)));
        const COLOR_RED: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Red)));
        const COLOR_YELLOW: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Yellow)));
        const COLOR_GREEN: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green)));
        const COLOR_CYAN: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Cyan)));
        const COLOR_BLUE: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Blue)));
        const STYLE_BOLD: Style = Style::new().bold();
        const STYLE_ITALIC: Style = Style::new().italic();

        let bold_s = STYLE_BOLD.render();
        let bold_e = STYLE_BOLD.render_reset();

        let pairs = Self::collect_kv(record, logger_values)?;

        write!(io, "{}", Local::now().format(TIME_FORMAT))?;
        let level_color = match record.level() {
            Level::Critical => COLOR_MAGENTA,
            Level::Error => COLOR_RED,
            Level::Warning => COLOR_YELLOW,
            Level::Info => COLOR_GREEN,
            Level::Debug => COLOR_CYAN,
            Level::Trace => COLOR_BLUE,
        };
        write!(
            io,
            " {}{}{}",
            level_color.render(),
            record.level(),
            level_color.render_reset(),
        )?;
        for (k, v) in &pairs {
            write!(io, " {bold_s}{k}{bold_e}={v},")?;
        }
        write!(io, " {bold_s}{}{bold_e}", record.msg())?;
        if !record.module().is_empty() {
            write!(
                io,
                " <{}{}{}>",
                STYLE_ITALIC.render(),
                record.module(),
                STYLE_ITALIC.render_reset()
            )?;
        }
        writeln!(io)?;
        Ok(())
    }
}

impl Drain for StderrDrain {
    type Ok = ();
    type Err = slog::Error;

    fn log(&self, record: &Record, logger_values: &OwnedKVList) -> slog::Result {
        let mut buf: Vec<u8> = Vec::with_capacity(256);
        if self.console {
            self.write_console(&mut buf, record, logger_values)?;
        } else {
            self.write_plain(&mut buf, record, logger_values)?;
        }
        let mut stderr = io::stderr().lock();
        stderr.write_all(&buf)?;
        stderr.flush()?;
        Ok(())
    }
}

fn log_level(verbose_level: u8) -> log::Level {
    match verbose_level {
        0 => log::Level::Warn,
        1 => log::Level::Info,
        2 => log::Level::Debug,
        _ => log::Level::Trace,
    }
}

/// Route the `log` facade to stderr through a global slog logger.
///
/// The returned guard must be kept alive while logging.
pub(crate) fn setup(verbose_level: u8) -> Result<GlobalLoggerGuard, log::SetLoggerError> {
    let drain = StderrDrain {
        console: io::stderr().is_terminal(),
    };
    let logger = slog::Logger::root(drain.ignore_res(), slog_o!());
    let scope_guard = slog_scope::set_global_logger(logger);

    slog_stdlog::init_with_level(log_level(verbose_level))?;
    Ok(scope_guard)
}
