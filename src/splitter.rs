//! Statement/expression splitting for submitted fragments.
//!
//! A fragment whose last top-level unit is a bare expression gets that
//! expression excised so it can be evaluated for its value; everything else
//! runs for effect. The split is structural (a real parse), never textual.

use rustpython_parser::{ast, Parse};
use tracing::debug;

/// One fragment partitioned into effect statements and an optional trailing
/// expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitFragment {
    pub body: String,
    pub trailing_expr: Option<String>,
}

impl SplitFragment {
    pub fn is_empty(&self) -> bool {
        self.body.trim().is_empty() && self.trailing_expr.is_none()
    }
}

/// Partition `source` into `(body, trailing_expression)`.
///
/// A fragment that fails to parse is forwarded whole as `body` with no
/// trailing expression: the interpreter's own syntax error is part of the
/// captured output, and this function never repairs or drops invalid input.
pub fn split(source: &str) -> SplitFragment {
    if source.trim().is_empty() {
        return SplitFragment {
            body: String::new(),
            trailing_expr: None,
        };
    }

    let suite = match ast::Suite::parse(source, "<fragment>") {
        Ok(suite) => suite,
        Err(e) => {
            debug!(error = %e, "fragment does not parse, forwarding verbatim");
            return SplitFragment {
                body: source.to_string(),
                trailing_expr: None,
            };
        }
    };

    match suite.last() {
        Some(ast::Stmt::Expr(expr_stmt)) => {
            let start = usize::from(expr_stmt.range.start());
            let end = usize::from(expr_stmt.range.end());
            SplitFragment {
                body: source[..start].to_string(),
                trailing_expr: Some(source[start..end].to_string()),
            }
        }
        _ => SplitFragment {
            body: source.to_string(),
            trailing_expr: None,
        },
    }
}
