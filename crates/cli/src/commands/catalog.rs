use trestle_core::catalog::ActionCatalog;

/// Prints the capability catalog: every action type the broker will ever
/// propose, with its operation class, route, and approval gate.
pub fn run(json_output: bool) -> String {
    let catalog = ActionCatalog::builtin();

    if json_output {
        return serde_json::to_string_pretty(&catalog.planner_digest())
            .unwrap_or_else(|_| "[]".to_string());
    }

    let mut lines = vec![format!("capability catalog ({} entries):", catalog.entries().len())];
    for entry in catalog.entries() {
        let gate = if entry.requires_approval { " (approval required)" } else { "" };
        lines.push(format!(
            "- {} [{}] {} {}: {}{}",
            entry.kind,
            entry.op.as_str(),
            entry.method.as_str(),
            entry.endpoint,
            entry.description,
            gate
        ));
    }
    lines.join("\n")
}
