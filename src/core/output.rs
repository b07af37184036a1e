//! Terminal rendering for gate results.

use crate::core::gate_result::GateResult;
use colored::Colorize;

/// Collapse whitespace runs (newlines included) and bound the length.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let preview: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

/// Multi-line human rendering: verdict line, then errors, then evidence.
pub fn render_result(label: &str, res: &GateResult) -> String {
    let mut out = String::new();
    if res.ok() {
        out.push_str(&format!("{} {}\n", "✓".bright_green(), label.bold()));
    } else {
        out.push_str(&format!(
            "{} {} (exit {})\n",
            "✗".bright_red(),
            label.bold(),
            res.exit_code()
        ));
    }
    for err in res.errors() {
        out.push_str(&format!("  {} {}\n", "error:".bright_red(), err));
    }
    for ev in res.evidence() {
        out.push_str(&format!("  {} {}\n", "▸".bright_cyan(), ev));
    }
    out
}
