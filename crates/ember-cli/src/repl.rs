//! Read-eval-print loop: reads one literal expression per line, pushes it
//! through the host interface, and prints it back via `luaL_tolstring`'s
//! equivalent. Straightforward prompt, read line, report-or-print cycle
//! over stdin/stdout.

use std::io::Write;

use ember_core::api::Api;
use ember_core::aux;
use ember_core::executor::{BytecodeExecutor, NullExecutor};
use ember_core::state::GlobalState;
use ember_core::thread::ThreadState;

/// Drives its own `ThreadState`, built the same way
/// [`GlobalState::new`] builds the main one, rather than reaching into
/// the arena for the registered main thread: `Api` borrows its thread and
/// global state as two disjoint `&mut` references, and the registered
/// main thread's `ThreadState` lives *inside* that same global state's GC
/// arena, which a host driving it from the outside can't alias safely.
pub fn run(global: &mut GlobalState) {
    let mut thread = ThreadState::new(
        global.new_thread_id(),
        global.runtime_config.initial_stack_size,
        global.runtime_config.max_stack_size,
    );
    let mut executor = NullExecutor;
    println!("ember {} -- literal reader, Ctrl-D to exit", global.version);
    loop {
        print!("ember> ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).unwrap_or(0) == 0 {
            println!();
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        eval_print(&mut thread, global, &mut executor, trimmed);
    }
}

fn eval_print(thread: &mut ThreadState, global: &mut GlobalState, executor: &mut dyn BytecodeExecutor, line: &str) {
    match crate::reader::read(line) {
        Ok(None) => {}
        Ok(Some(expr)) => {
            let mut api = Api::new(thread, global);
            if let Err(e) = crate::reader::push(&mut api, &expr) {
                eprintln!("error: {e}");
                return;
            }
            match aux::to_display_string(&mut api, -1, executor) {
                Ok(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
                Err(e) => eprintln!("error: {e}"),
            }
            api.pop(1);
        }
        Err(e) => eprintln!("parse error: {e}"),
    }
}
