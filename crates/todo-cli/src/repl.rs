use std::io::{self, BufRead, Write};

use todo_agent::Agent;
use todo_model::ChatBackend;
use tracing::warn;

pub const PROMPT: &str = ">> ";

/// Reads one request per line until EOF. A failed turn is reported on `errors`
/// and the loop carries on with the next line.
pub fn run<B, R, W, E>(
    agent: &mut Agent<B>,
    mut input: R,
    mut output: W,
    mut errors: E,
) -> io::Result<()>
where
    B: ChatBackend,
    R: BufRead,
    W: Write,
    E: Write,
{
    let mut line = String::new();
    loop {
        write!(output, "{PROMPT}")?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            return Ok(());
        }
        let request = line.trim();
        if request.is_empty() {
            continue;
        }

        match agent.run_turn(request) {
            Ok(outcome) => writeln!(output, "{}", outcome.output)?,
            Err(err) => {
                warn!(error = %err, "turn failed");
                writeln!(errors, "error: {err}")?;
            }
        }
    }
}
