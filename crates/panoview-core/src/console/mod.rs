//! Remote console: frontend-submitted Lua snippets evaluated in-process.
//!
//! Execution is opt-in per session. While disabled every command or
//! completion request is a no-op apart from a single warning line.
//! Execution and completion share one lock, so commands never interleave.

mod complete;
pub mod output;
mod scope;

use std::io::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mlua::{Lua, MultiValue, Value, Variadic};
use parking_lot::Mutex;

pub use output::{ConsoleBuffer, ConsoleColor, ConsoleOutput, Segment, split_text_to_segments};
pub use scope::ConsoleScope;

use crate::transport::Outbound;

pub const CONSOLE_COMMAND: &str = "console_command";
pub const CONSOLE_COMPLETE: &str = "console_complete";

const DISABLED_WARNING: &str = "[panoview] Interactive console is disabled for this viewer. \
     Reconnect with interactive_console enabled to allow code execution.\n";

const ENABLED_BANNER: &str = "[panoview] Interactive console is enabled: \
     the connected frontend can execute arbitrary code in this process.\n";

/// Where `print` output from the interpreter goes.
#[derive(Debug, Default)]
struct PrintCapture {
    /// Persistent mirroring to the frontend, set by `capture_prints`.
    mirror: bool,
    /// Per-command buffer, present only while a command runs unmirrored.
    pending: Option<String>,
}

pub struct ConsoleSession {
    enabled: bool,
    warned: AtomicBool,
    output: Arc<ConsoleOutput>,
    lua: Lua,
    scope: Mutex<Option<ConsoleScope>>,
    capture: Arc<Mutex<PrintCapture>>,
    exec_lock: Mutex<()>,
}

impl ConsoleSession {
    /// Create the console. `enabled` is fixed for the session's lifetime.
    pub fn new(outbound: Outbound, enabled: bool) -> Result<Self, mlua::Error> {
        let output = Arc::new(ConsoleOutput::new(outbound));
        let capture = Arc::new(Mutex::new(PrintCapture::default()));
        let lua = Lua::new();
        install_print(&lua, Arc::clone(&capture), Arc::clone(&output))?;
        Ok(Self {
            enabled,
            warned: AtomicBool::new(false),
            output,
            lua,
            scope: Mutex::new(None),
            capture,
            exec_lock: Mutex::new(()),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The interpreter backing the ambient scope.
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn output(&self) -> &ConsoleOutput {
        &self.output
    }

    /// Full console history, ANSI-encoded, for replay to late joiners.
    pub fn history(&self) -> String {
        self.output.history()
    }

    /// Emit the "frontend can execute code" banner if enabled.
    pub fn announce(&self) {
        if self.enabled {
            self.output
                .emit_text(ENABLED_BANNER, Some(ConsoleColor::Yellow));
        }
    }

    /// Evaluate subsequent commands against `scope` instead of the ambient
    /// namespace. The scope's interpreter gets the capturing `print`.
    pub fn set_scope(&self, scope: ConsoleScope) -> Result<(), mlua::Error> {
        install_print(scope.lua(), Arc::clone(&self.capture), Arc::clone(&self.output))?;
        *self.scope.lock() = Some(scope);
        Ok(())
    }

    /// Explicit scope if set, else the interpreter's globals.
    pub fn resolve_scope(&self) -> ConsoleScope {
        self.scope
            .lock()
            .clone()
            .unwrap_or_else(|| ConsoleScope::ambient(&self.lua))
    }

    /// Mirror every interpreter `print` to the frontend from now on.
    pub fn capture_prints(&self) {
        self.capture.lock().mirror = true;
    }

    /// Run one frontend command and stream its output.
    pub fn execute(&self, command: &str) {
        if !self.enabled {
            self.warn_disabled_once();
            return;
        }
        let command = command.trim_end_matches('\n');
        if command.trim().is_empty() {
            return;
        }

        let _guard = self.exec_lock.lock();
        let scope = self.resolve_scope();
        let capture_output = {
            let mut capture = self.capture.lock();
            let capture_output = !capture.mirror;
            if capture_output {
                capture.pending = Some(String::new());
            }
            capture_output
        };

        match evaluate(&scope, command) {
            Ok(Some(text)) => self.output.emit_text(&format!("{text}\n"), None),
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(error = %e, "console command failed");
                self.output
                    .emit_text(&format_error(&e), Some(ConsoleColor::Red));
            }
        }

        if capture_output {
            let printed = self.capture.lock().pending.take().unwrap_or_default();
            self.output.emit_text(&printed, None);
        }
    }

    /// Stream completions for the partial input `command`.
    pub fn complete(&self, command: &str) {
        if !self.enabled {
            self.warn_disabled_once();
            return;
        }
        let _guard = self.exec_lock.lock();
        let scope = self.resolve_scope();
        match complete::collect(&scope, command) {
            Ok(names) if names.is_empty() => self
                .output
                .emit_text("(no completions)\n", Some(ConsoleColor::Yellow)),
            Ok(names) => self.output.emit_text(&format!("{}\n", names.join(", ")), None),
            Err(e) => self
                .output
                .emit_text(&format_error(&e), Some(ConsoleColor::Red)),
        }
    }

    fn warn_disabled_once(&self) {
        if !self.warned.swap(true, Ordering::SeqCst) {
            self.output
                .emit_text(DISABLED_WARNING, Some(ConsoleColor::Yellow));
        }
    }
}

impl std::fmt::Debug for ConsoleSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleSession")
            .field("enabled", &self.enabled)
            .field("warned", &self.warned.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

// ─── Evaluation ──────────────────────────────────────────────────────

/// Evaluate as an expression first, falling back to statements.
///
/// Returns the printable result, or `None` when there is nothing to show.
fn evaluate(scope: &ConsoleScope, command: &str) -> mlua::Result<Option<String>> {
    let lua = scope.lua();
    let as_expr = lua
        .load(format!("return {command}"))
        .set_name("=console")
        .set_environment(scope.env())
        .into_function();

    let function = match as_expr {
        Ok(function) => function,
        Err(mlua::Error::SyntaxError { .. }) => {
            lua.load(command)
                .set_name("=console")
                .set_environment(scope.env())
                .exec()?;
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let values = function.call::<MultiValue>(())?;
    if values.iter().all(|v| matches!(v, Value::Nil)) {
        return Ok(None);
    }
    let rendered = values
        .iter()
        .map(|v| display_value(lua, v))
        .collect::<mlua::Result<Vec<_>>>()?;
    Ok(Some(rendered.join("\t")))
}

/// `tostring` semantics, honouring `__tostring`.
fn display_value(lua: &Lua, value: &Value) -> mlua::Result<String> {
    let tostring: mlua::Function = lua.globals().raw_get("tostring")?;
    let text: mlua::String = tostring.call(value.clone())?;
    Ok(text.to_str()?.to_string())
}

fn error_name(e: &mlua::Error) -> &'static str {
    match e {
        mlua::Error::SyntaxError { .. } => "SyntaxError",
        mlua::Error::RuntimeError(_) => "RuntimeError",
        mlua::Error::MemoryError(_) => "MemoryError",
        mlua::Error::CallbackError { .. } => "CallbackError",
        _ => "Error",
    }
}

fn format_error(e: &mlua::Error) -> String {
    let message = match e {
        mlua::Error::SyntaxError { message, .. } => message.clone(),
        mlua::Error::RuntimeError(message) => message.clone(),
        other => other.to_string(),
    };
    format!("{}: {}\n", error_name(e), message.trim_end())
}

/// Replace `print` so output can be captured per command or mirrored.
fn install_print(
    lua: &Lua,
    capture: Arc<Mutex<PrintCapture>>,
    output: Arc<ConsoleOutput>,
) -> mlua::Result<()> {
    let print = lua.create_function(move |lua, args: Variadic<Value>| {
        let mut line = args
            .iter()
            .map(|v| display_value(lua, v))
            .collect::<mlua::Result<Vec<_>>>()?
            .join("\t");
        line.push('\n');

        let mut capture = capture.lock();
        if let Some(pending) = capture.pending.as_mut() {
            pending.push_str(&line);
        } else if capture.mirror {
            drop(capture);
            output.emit_text(&line, None);
        } else {
            drop(capture);
            if let Err(e) = std::io::stdout().write_all(line.as_bytes()) {
                tracing::trace!(error = %e, "console print to stdout failed");
            }
        }
        Ok(())
    })?;
    lua.globals().raw_set("print", print)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RecordingTransport;
    use crate::types::ViewerId;

    const OUT: &str = crate::registry::CONSOLE_OUTPUT;

    fn console(enabled: bool) -> (ConsoleSession, Arc<RecordingTransport>) {
        let rec = Arc::new(RecordingTransport::new());
        let outbound = Outbound::new(ViewerId::new("v1"), rec.clone());
        (ConsoleSession::new(outbound, enabled).expect("lua"), rec)
    }

    /// All segments sent so far, flattened.
    fn segments(rec: &RecordingTransport) -> Vec<Segment> {
        rec.payloads(OUT)
            .into_iter()
            .flat_map(|p| {
                serde_json::from_value::<Vec<Segment>>(p["segments"].clone()).expect("segments")
            })
            .collect()
    }

    fn text(rec: &RecordingTransport) -> String {
        segments(rec).into_iter().map(|s| s.text).collect()
    }

    #[test]
    fn commands_and_completions_never_interleave() {
        use std::sync::atomic::AtomicBool;
        use std::time::Duration;

        let (console, rec) = console(true);
        let started = Arc::new(AtomicBool::new(false));
        {
            let started = Arc::clone(&started);
            let slow = console
                .lua()
                .create_function(move |_, ()| {
                    started.store(true, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(200));
                    Ok("done")
                })
                .expect("function");
            console.lua().globals().set("slow", slow).expect("global");
        }

        std::thread::scope(|s| {
            s.spawn(|| console.execute("slow()"));
            s.spawn(|| {
                while !started.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(1));
                }
                console.complete("pri");
                console.execute("1+1");
            });
        });

        let texts: Vec<String> = segments(&rec).into_iter().map(|s| s.text).collect();
        assert_eq!(texts.first().map(String::as_str), Some("done\n"));
        assert!(texts[1].contains("print"), "{texts:?}");
        assert_eq!(texts.last().map(String::as_str), Some("2\n"));
    }

    #[test]
    fn expression_result_is_printed() {
        let (console, rec) = console(true);
        console.execute("1+1");
        assert_eq!(text(&rec), "2\n");
    }

    #[test]
    fn assignment_persists_between_commands() {
        let (console, rec) = console(true);
        console.execute("x = 5");
        assert!(rec.payloads(OUT).is_empty(), "statements print nothing");
        console.execute("x");
        assert_eq!(text(&rec), "5\n");
    }

    #[test]
    fn nil_result_prints_nothing() {
        let (console, rec) = console(true);
        console.execute("undefined_name");
        console.execute("   ");
        assert!(rec.payloads(OUT).is_empty());
    }

    #[test]
    fn multiple_results_are_tab_joined() {
        let (console, rec) = console(true);
        console.execute("1, 'two', nil");
        assert_eq!(text(&rec), "1\ttwo\tnil\n");
    }

    #[test]
    fn errors_stream_red_with_name() {
        let (console, rec) = console(true);
        console.execute("error('kaboom')");
        console.execute("local = = 1");
        let segs = segments(&rec);
        assert_eq!(segs.len(), 2);
        assert!(segs.iter().all(|s| s.color == Some(ConsoleColor::Red)));
        assert!(segs[0].text.starts_with("RuntimeError:"), "{}", segs[0].text);
        assert!(segs[0].text.contains("kaboom"));
        assert!(segs[1].text.starts_with("SyntaxError:"), "{}", segs[1].text);

        console.execute("2 * 21");
        assert_eq!(segments(&rec).last().map(|s| s.text.as_str()), Some("42\n"));
    }

    #[test]
    fn print_is_captured_per_command() {
        let (console, rec) = console(true);
        console.execute("print('a', 1); print('b')");
        assert_eq!(text(&rec), "a\t1\nb\n");
        assert_eq!(rec.payloads(OUT).len(), 1, "flushed once after the command");
    }

    #[test]
    fn mirrored_print_streams_live() {
        let (console, rec) = console(true);
        console.capture_prints();
        console.execute("print('a'); print('b')");
        assert_eq!(text(&rec), "a\nb\n");
        assert_eq!(rec.payloads(OUT).len(), 2, "one message per print");
    }

    #[test]
    fn print_outside_a_command_goes_to_stdout() {
        let (console, rec) = console(true);
        console
            .lua()
            .load("print('from host')")
            .exec()
            .expect("print never fails the caller");
        assert!(rec.payloads(OUT).is_empty());
    }

    #[test]
    fn disabled_console_warns_once() {
        let (console, rec) = console(false);
        console.execute("1+1");
        let first = segments(&rec);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].color, Some(ConsoleColor::Yellow));
        assert!(first[0].text.contains("disabled"));

        console.execute("x = 1");
        console.complete("pri");
        assert_eq!(segments(&rec).len(), 1, "no further output");
        assert!(console.lua().globals().get::<Option<i64>>("x").expect("get").is_none());
    }

    #[test]
    fn completion_renders_joined_line() {
        let (console, rec) = console(true);
        console.complete("pri");
        assert_eq!(text(&rec), "print\n");

        rec.take();
        console.complete("zzz_nothing");
        let segs = segments(&rec);
        assert_eq!(segs, vec![Segment::new("(no completions)\n", Some(ConsoleColor::Yellow))]);
    }

    #[test]
    fn explicit_scope_is_live() {
        let (console, rec) = console(true);
        let scope = ConsoleScope::isolated(console.lua()).expect("scope");
        console.set_scope(scope.clone()).expect("scope");
        scope.set("answer", 41).expect("bind");
        console.execute("answer + 1");
        assert_eq!(text(&rec), "42\n");
        console.execute("fresh = 1");
        assert_eq!(scope.get::<i64>("fresh").expect("visible to host"), 1);
        assert!(console.lua().globals().get::<Option<i64>>("fresh").expect("get").is_none());
    }

    #[test]
    fn history_replays_colors() {
        let (console, _rec) = console(true);
        console.execute("error('x')");
        console.execute("'ok'");
        let replay = split_text_to_segments(&console.history());
        assert_eq!(replay.len(), 2);
        assert_eq!(replay[0].color, Some(ConsoleColor::Red));
        assert_eq!(replay[1], Segment::new("ok\n", None));
    }

    #[test]
    fn banner_only_when_enabled() {
        let (off, rec_off) = console(false);
        off.announce();
        assert!(rec_off.sent().is_empty());
        let (on, rec_on) = console(true);
        on.announce();
        assert_eq!(segments(&rec_on)[0].color, Some(ConsoleColor::Yellow));
    }
}
