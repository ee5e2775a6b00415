use std::sync::LazyLock;

use regex::Regex;

const PROSE_FALLBACK: &str = "Action plan generated from your request.";
const PENDING_APPROVAL_POINTER: &str = "Pending approval actions are queued for the approval step.";

static FILLER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:Want me to proceed|Proceed)\?").unwrap());
static BLANK_RUN_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Assembles the final reply for a planned-action turn. Ordering is fixed:
/// planner prose, rendered blocks in action order, execution notes, then a
/// pointer when anything is still gated.
pub fn compose(
    planner_prose: &str,
    executed_blocks: &[String],
    execution_notes: &[String],
    any_pending_approval: bool,
) -> String {
    let prose = planner_prose.trim();
    let mut lines: Vec<String> = Vec::new();
    if prose.is_empty() {
        lines.push(PROSE_FALLBACK.to_string());
    } else {
        lines.push(prose.to_string());
    }
    if !executed_blocks.is_empty() {
        lines.push(String::new());
        lines.extend(executed_blocks.iter().cloned());
    }
    if !execution_notes.is_empty() {
        lines.push(String::new());
        lines.push("Execution results:".to_string());
        lines.extend(execution_notes.iter().map(|note| format!("- {note}")));
    }
    if any_pending_approval {
        lines.push(String::new());
        lines.push(PENDING_APPROVAL_POINTER.to_string());
    }
    clean_mechanical_prompting(&lines.join("\n"))
}

/// Strips "Proceed?" style prompts the model appends out of habit. Approval
/// state is carried structurally on the proposals, so asking again in prose
/// only confuses the reader.
pub fn clean_mechanical_prompting(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let stripped = FILLER_REGEX.replace_all(text, "");
    BLANK_RUN_REGEX.replace_all(&stripped, "\n\n").trim().to_string()
}
