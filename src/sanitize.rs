//! Raw-capture cleanup.
//!
//! Echo and prompt conventions vary with the interpreter and terminal
//! settings, so this stays a pure text transform: the framing protocol never
//! needs to know what a prompt looks like.

/// Prompt prefixes stripped from captured lines.
pub const PROMPTS: &[&str] = &[">>> ", "... "];

/// Clean one call's raw capture into user-facing output.
///
/// Removes, in order: input echo (lines byte-identical to lines just sent),
/// interactive prompt prefixes, and the blank framing lines at either end.
/// Interior blank lines are genuine program output and are preserved.
pub fn clean(raw: &str, sent_lines: &[String]) -> String {
    let normalized = raw.replace("\r\n", "\n");

    let mut lines: Vec<&str> = Vec::new();
    for line in normalized.split('\n') {
        let line = strip_prompts(line);
        if sent_lines.iter().any(|sent| sent == line) {
            continue;
        }
        lines.push(line);
    }

    // Trim blank lines introduced by framing at either end only.
    while lines.first().is_some_and(|l| l.trim().is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }

    lines.join("\n")
}

/// Drop repeated leading prompt tokens from a line.
///
/// Interactive interpreters emit one prompt per consumed input line; with a
/// multi-line payload they pile up at the start of the next real output
/// line, so repetitions are stripped, not just the first.
fn strip_prompts(mut line: &str) -> &str {
    loop {
        let mut stripped = false;
        for prompt in PROMPTS {
            if let Some(rest) = line.strip_prefix(prompt) {
                line = rest;
                stripped = true;
            }
        }
        if !stripped {
            return line;
        }
    }
}

/// Cap output size, marking the cut.
pub fn truncate(mut output: String, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output;
    }
    let mut cut = max_bytes;
    while cut > 0 && !output.is_char_boundary(cut) {
        cut -= 1;
    }
    output.truncate(cut);
    output.push_str("\n... [output truncated]");
    output
}
