//! Per-call sentinel framing.
//!
//! An interactive interpreter never signals "end of statement" on its own,
//! and its stream never reaches EOF between calls. The only reliable
//! boundary in pure text I/O is one we print ourselves: each call wraps the
//! fragment so that a marker line carrying a fresh, unforgeable sentinel and
//! the trailing expression's value is printed after everything else. A
//! single `read_until` on the closing token both ends the capture and
//! yields the value.
//!
//! Wire shape for one call (each payload line is a single physical line;
//! multi-line fragment text travels inside string literals, so the
//! interpreter's continuation prompt is never involved):
//!
//! ```text
//! _replbox_value_xxxxxxxx = 'N'
//! exec('<body>')
//! _replbox_value_xxxxxxxx = 'V' + repr(eval('<expr>'))
//! print('<sentinel>:' + _replbox_value_xxxxxxxx + ':<sentinel>')
//! ```
//!
//! Pre-seeding the value slot keeps the marker line unconditionally
//! executable: when the body or the expression raises, the traceback lands
//! in the captured output and the marker still prints `N`.

use thiserror::Error;
use uuid::Uuid;

use crate::splitter::SplitFragment;

/// Marker region prefix for "a value is present".
const REGION_VALUE: char = 'V';
/// Marker region spelling for "no trailing expression value".
const REGION_NO_VALUE: &str = "N";

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("captured stream carries no marker for this call")]
    MissingMarker,

    #[error("malformed marker region: {0:?}")]
    MalformedRegion(String),
}

/// One framed call: the payload to send and the terminator to watch for.
#[derive(Debug, Clone)]
pub struct CallFrame {
    payload: String,
    terminator: String,
    sentinel: String,
    sent_lines: Vec<String>,
}

impl CallFrame {
    /// Frame a split fragment for execution.
    pub fn for_fragment(split: &SplitFragment) -> Self {
        let sentinel = new_sentinel();
        let value_slot = format!("_replbox_value_{}", &sentinel[..8]);

        let mut lines = vec![format!("{} = '{}'", value_slot, REGION_NO_VALUE)];
        if !split.body.trim().is_empty() {
            lines.push(format!("exec({})", py_string_literal(&split.body)));
        }
        if let Some(expr) = &split.trailing_expr {
            lines.push(format!(
                "{} = '{}' + repr(eval({}))",
                value_slot,
                REGION_VALUE,
                py_string_literal(expr)
            ));
        }
        lines.push(format!(
            "print({} + {} + {})",
            py_string_literal(&format!("{}:", sentinel)),
            value_slot,
            py_string_literal(&format!(":{}", sentinel))
        ));

        let payload = format!("{}\n", lines.join("\n"));
        let terminator = format!(":{}\n", sentinel);
        Self {
            payload,
            terminator,
            sentinel,
            sent_lines: lines,
        }
    }

    /// Frame the session-startup handshake: silence the interactive prompts
    /// and print a ready marker. The capture preceding it (banner, default
    /// prompts) is discarded by the caller.
    pub fn for_startup() -> Self {
        let sentinel = new_sentinel();
        let lines = vec![
            "import sys".to_string(),
            "sys.ps1 = ''".to_string(),
            "sys.ps2 = ''".to_string(),
            format!("print({})", py_string_literal(&sentinel)),
        ];

        let payload = format!("{}\n", lines.join("\n"));
        let terminator = format!("{}\n", sentinel);
        Self {
            payload,
            terminator,
            sentinel,
            sent_lines: lines,
        }
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Pattern the transport must block on for this call.
    pub fn terminator(&self) -> &str {
        &self.terminator
    }

    /// Payload lines as sent, for input-echo stripping.
    pub fn sent_lines(&self) -> &[String] {
        &self.sent_lines
    }

    /// Split a capture (everything before the closing token) into the raw
    /// program output and the optional value carried by the marker region.
    pub fn parse_capture(&self, captured: &str) -> Result<(String, Option<String>), FramingError> {
        let open = format!("{}:", self.sentinel);
        let pos = captured.rfind(&open).ok_or(FramingError::MissingMarker)?;

        let mut raw = &captured[..pos];
        if let Some(stripped) = raw.strip_suffix('\n') {
            raw = stripped;
        }

        let region = &captured[pos + open.len()..];
        let value = if region == REGION_NO_VALUE {
            None
        } else if let Some(repr) = region.strip_prefix(REGION_VALUE) {
            Some(repr.to_string())
        } else {
            return Err(FramingError::MalformedRegion(
                region.chars().take(64).collect(),
            ));
        };

        Ok((raw.to_string(), value))
    }
}

/// Fresh single-use sentinel: 128 random bits as hex.
fn new_sentinel() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Encode arbitrary text as a single-line Python string literal.
///
/// Newlines and control characters are escaped, so the literal survives the
/// interpreter's line-oriented input no matter what the fragment contains.
pub fn py_string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}
