use super::{record_fields, EXC_INFO};
use colored::{ColoredString, Colorize};
use env_logger::{Target, WriteStyle};
use log::{Level, LevelFilter, Log, Record};
use std::io::{self, IsTerminal, Write};

/// How console records are dressed up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleStyle {
    /// Colors, no level header.
    Interactive,
    /// Plain text with a `[LEVEL]` header, for redirected output.
    Plain,
}

impl ConsoleStyle {
    pub fn detect() -> Self {
        if io::stdout().is_terminal() {
            ConsoleStyle::Interactive
        } else {
            ConsoleStyle::Plain
        }
    }
}

pub(super) enum ConsoleOutput {
    Stdout,
    #[cfg(test)]
    Capture(CaptureBuffer),
}

pub(super) struct ConsoleSink {
    level: LevelFilter,
    writer: env_logger::Logger,
}

impl ConsoleSink {
    pub(super) fn new(output: &ConsoleOutput, style: ConsoleStyle) -> Self {
        let mut builder = env_logger::Builder::new();
        builder
            .filter_level(LevelFilter::Trace)
            .write_style(match style {
                ConsoleStyle::Interactive => WriteStyle::Always,
                ConsoleStyle::Plain => WriteStyle::Never,
            })
            .format(move |buf, record| writeln!(buf, "{}", render(record, style)));

        match output {
            ConsoleOutput::Stdout => builder.target(Target::Stdout),
            #[cfg(test)]
            ConsoleOutput::Capture(buffer) => {
                builder.target(Target::Pipe(Box::new(buffer.clone())))
            }
        };

        Self {
            level: LevelFilter::Error,
            writer: builder.build(),
        }
    }

    pub(super) fn level(&self) -> LevelFilter {
        self.level
    }

    pub(super) fn set_level(&mut self, level: LevelFilter) {
        self.level = level;
    }

    pub(super) fn log(&self, record: &Record) {
        if record.level() <= self.level {
            self.writer.log(record);
        }
    }

    pub(super) fn flush(&self) {
        self.writer.flush();
    }
}

fn header(level: Level) -> &'static str {
    match level {
        Level::Info => "[INFO]  ",
        Level::Error => "[ERROR] ",
        Level::Warn => "[WARNING] ",
        Level::Debug => "[DEBUG] ",
        Level::Trace => "[TRACE] ",
    }
}

fn paint(text: &str, level: Level) -> ColoredString {
    let text = text.bold();
    match level {
        Level::Error => text.red(),
        Level::Warn => text.yellow(),
        Level::Info => text.green(),
        Level::Debug => text.cyan(),
        Level::Trace => text.magenta(),
    }
}

/// Highlights `backticked` spans, coloring the rest of the message by level. A backtick
/// without a partner is ordinary text.
fn paint_message(message: &str, level: Level) -> String {
    let mut painted = String::new();
    let mut rest = message;
    while let Some(open) = rest.find('`') {
        let Some(length) = rest[open + 1..].find('`') else {
            break;
        };
        let close = open + 1 + length;
        if open > 0 {
            painted.push_str(&paint(&rest[..open], level).to_string());
        }
        painted.push_str(&rest[open..=close].bright_white().to_string());
        rest = &rest[close + 1..];
    }
    if !rest.is_empty() {
        painted.push_str(&paint(rest, level).to_string());
    }
    painted
}

/// `name: value`, indented under the message. Continuation lines line up with the value.
fn format_field(name: &str, value: &serde_json::Value) -> String {
    let value = match value {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    let continuation = format!("\n{}", " ".repeat(name.len() + 4));
    format!("  {name}: {}", value.trim().replace('\n', &continuation))
}

pub(super) fn render(record: &Record, style: ConsoleStyle) -> String {
    let message = record.args().to_string();
    let fields: Vec<String> = record_fields(record)
        .iter()
        .filter(|(name, _)| name != EXC_INFO)
        .map(|(name, value)| format_field(name, value))
        .collect();

    let mut rendered = match style {
        ConsoleStyle::Interactive => paint_message(&message, record.level()),
        ConsoleStyle::Plain => format!("{}{message}", header(record.level())),
    };
    if !fields.is_empty() {
        let fields = fields.join("\n\n");
        match style {
            ConsoleStyle::Interactive => {
                rendered.push_str(&paint(":", record.level()).to_string());
                rendered.push_str("\n\n");
                rendered.push_str(&fields.bright_white().to_string());
            }
            ConsoleStyle::Plain => {
                rendered.push_str(":\n\n");
                rendered.push_str(&fields);
            }
        }
    }
    rendered
}

#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct CaptureBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(test)]
impl CaptureBuffer {
    pub(crate) fn contents(&self) -> String {
        let bytes = super::lock(&self.0);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[cfg(test)]
impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        super::lock(&self.0).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::kv;

    fn render_with(
        level: Level,
        message: &str,
        pairs: &[(&str, kv::Value)],
        style: ConsoleStyle,
    ) -> String {
        render(
            &Record::builder()
                .args(format_args!("{message}"))
                .level(level)
                .key_values(&pairs)
                .build(),
            style,
        )
    }

    #[test]
    fn plain_style_uses_bracketed_headers() {
        let style = ConsoleStyle::Plain;
        assert_eq!(render_with(Level::Debug, "x", &[], style), "[DEBUG] x");
        assert_eq!(render_with(Level::Info, "x", &[], style), "[INFO]  x");
        assert_eq!(render_with(Level::Warn, "x", &[], style), "[WARNING] x");
        assert_eq!(render_with(Level::Error, "x", &[], style), "[ERROR] x");
    }

    #[test]
    fn plain_style_lists_fields_beneath_the_message() {
        let pairs = [
            ("path", kv::Value::from("notes.txt")),
            ("lines", kv::Value::from(12u64)),
        ];
        let rendered = render_with(Level::Info, "Read content", &pairs, ConsoleStyle::Plain);
        assert_eq!(
            rendered,
            "[INFO]  Read content:\n\n  path: notes.txt\n\n  lines: 12"
        );
    }

    #[test]
    fn multiline_field_values_are_indented() {
        let pairs = [("cfg", kv::Value::from("a: 1\nb: 2\n"))];
        let rendered = render_with(Level::Debug, "Configuration", &pairs, ConsoleStyle::Plain);
        assert_eq!(
            rendered,
            "[DEBUG] Configuration:\n\n  cfg: a: 1\n       b: 2"
        );
    }

    #[test]
    fn error_detail_never_reaches_the_console() {
        let pairs = [(EXC_INFO, kv::Value::from("Caused by:\n    boom"))];
        let rendered = render_with(Level::Error, "An error occurred", &pairs, ConsoleStyle::Plain);
        assert_eq!(rendered, "[ERROR] An error occurred");
    }

    #[test]
    fn interactive_style_has_no_header() {
        let rendered = render_with(
            Level::Info,
            "Reading `notes.txt`",
            &[],
            ConsoleStyle::Interactive,
        );
        assert!(!rendered.contains("[INFO]"));
        assert!(rendered.contains("Reading "));
        assert!(rendered.contains("notes.txt"));
    }

    #[test]
    fn interactive_style_highlights_backticked_spans() {
        colored::control::set_override(true);
        let rendered = render_with(
            Level::Error,
            "unknown variant `LOUD`, expected `NONE`",
            &[],
            ConsoleStyle::Interactive,
        );
        let lone = render_with(Level::Info, "a ` b", &[], ConsoleStyle::Interactive);
        colored::control::unset_override();

        assert_eq!(
            rendered,
            "\x1b[1;31munknown variant \x1b[0m\x1b[97m`LOUD`\x1b[0m\
             \x1b[1;31m, expected \x1b[0m\x1b[97m`NONE`\x1b[0m"
        );
        assert!(rendered.ends_with("\x1b[0m"));
        assert_eq!(lone, "\x1b[1;32ma ` b\x1b[0m");
    }

    #[test]
    fn capture_pipe_receives_filtered_records() {
        let buffer = CaptureBuffer::default();
        let mut sink = ConsoleSink::new(&ConsoleOutput::Capture(buffer.clone()), ConsoleStyle::Plain);
        sink.set_level(LevelFilter::Info);

        for (level, message) in [(Level::Debug, "quiet"), (Level::Warn, "careful")] {
            sink.log(
                &Record::builder()
                    .args(format_args!("{message}"))
                    .level(level)
                    .build(),
            );
        }
        sink.flush();

        assert_eq!(buffer.contents(), "[WARNING] careful\n");
    }
}
