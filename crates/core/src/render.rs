use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Hard row caps for rendered blocks. Backends can return unbounded result
/// sets; these bound the reply instead of making callers paginate.
pub const TOPOLOGY_ROW_CAP: usize = 150;
pub const QUEUE_ROW_CAP: usize = 150;
pub const EVENT_ROW_CAP: usize = 30;
pub const LOOKUP_NAME_CAP: usize = 100;
pub const LOOKUP_ENTRY_CAP: usize = 300;
pub const SCHEMA_NAME_CAP: usize = 300;
pub const SQL_ROW_CAP: usize = 25;
pub const METHOD_SIGNATURE_CAP: usize = 30;
pub const CLASS_ROW_CAP: usize = 200;

/// Maps an action's `target` (preferred) or declared type to the rendering
/// kind. Targets are the stable vocabulary; types are whatever the planner
/// chose to call the action.
pub fn resolve_read_kind<'a>(kind: &'a str, target: Option<&str>) -> &'a str {
    let target = target.unwrap_or("").to_lowercase();
    match target.as_str() {
        "production/status" => return "production_status",
        "production/topology" => return "production_topology",
        "production/queues" => return "queue_counts",
        "production/events" => return "event_log",
        "lookups" => return "lookup_tables",
        "schemas" => return "schema_catalog_read",
        "sql/select" => return "sql_read",
        "dictionary/classes" => return "dictionary_classes_read",
        "invoke-policy" | "discover/invoke-policy" => return "invoke_policy_read",
        _ => {}
    }
    if target.starts_with("lookup/") {
        return "lookup_read";
    }
    if target.starts_with("classmeta/") {
        return "class_meta_read";
    }
    if kind.is_empty() {
        "unknown"
    } else {
        kind
    }
}

static NAMES_ONLY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(names?|host names?|just.*names?)\b").unwrap());
static FULL_DETAILS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(full|detail|all fields|full detail)\b").unwrap());

/// One-line execution note for a successful read, e.g.
/// `Queue snapshot read: 12 host(s).`
pub fn summarize_read_result(kind: &str, target: Option<&str>, data: &Value) -> String {
    match resolve_read_kind(kind, target) {
        "production_status" => {
            let map = as_map(data);
            format!(
                "Production status: {} ({})",
                text_at(map, &["statusText", "status"], "unknown"),
                text_at(map, &["productionName"], "unknown")
            )
        }
        "production_topology" => {
            format!("Production topology read: {} host(s).", extract_hosts(data).len())
        }
        "queue_counts" => format!("Queue snapshot read: {} host(s).", extract_queue_rows(data).len()),
        "event_log" => format!("Recent event log read: {} row(s).", extract_events(data).len()),
        "lookup_tables" => {
            format!("Lookup table list read: {} table(s).", extract_lookup_tables(data).len())
        }
        "schema_catalog_read" => {
            let rows = extract_array(data, &["items", "schemas", "data"]);
            format!("Schema catalog read: {} schema item(s).", rows.len())
        }
        "sql_read" => format!("SQL read executed: {} row(s).", sql_row_count(data)),
        "class_meta_read" => {
            let map = as_map(data);
            let methods = nested_array(map, "methods");
            let properties = nested_array(map, "properties");
            format!(
                "Class metadata read: {} ({} method(s), {} propert(ies)).",
                text_at(map, &["className"], "unknown"),
                methods.len(),
                properties.len()
            )
        }
        "dictionary_classes_read" => {
            let rows = extract_array(data, &["items", "rows", "data"]);
            format!("Dictionary class catalog read: {} class(es).", rows.len())
        }
        "invoke_policy_read" => "Invocation policy read.".to_string(),
        other => format!("{} executed.", target.unwrap_or(other)),
    }
}

/// Fixed mapping from resolved read kind to a table-like text block. The
/// user's own phrasing only influences the topology view (names-only vs
/// full rows); everything else renders the same regardless of wording.
pub fn render_read_block(kind: &str, target: Option<&str>, data: &Value, user_message: &str) -> String {
    match resolve_read_kind(kind, target) {
        "production_topology" => render_topology(data, user_message),
        "production_status" => render_status(data),
        "queue_counts" => render_queues(data),
        "event_log" => render_events(data),
        "lookup_tables" => render_lookup_tables(data),
        "lookup_read" => render_lookup_entries(data),
        "schema_catalog_read" => render_schemas(data),
        "sql_read" => render_sql(data),
        "class_meta_read" => render_class_meta(data),
        "dictionary_classes_read" => render_classes(data),
        "invoke_policy_read" => render_policy(data),
        _ => {
            if data.is_object() || data.is_array() {
                let pretty = serde_json::to_string_pretty(data).unwrap_or_default();
                format!("Result:\n```json\n{pretty}\n```")
            } else {
                String::new()
            }
        }
    }
}

fn render_topology(data: &Value, user_message: &str) -> String {
    let hosts = extract_hosts(data);
    if hosts.is_empty() {
        return "No production hosts were returned.".to_string();
    }
    let names_only = NAMES_ONLY_REGEX.is_match(user_message);
    let full_details = FULL_DETAILS_REGEX.is_match(user_message);

    let mut lines = vec![format!("Production hosts ({}):", hosts.len())];
    for host in hosts.iter().take(TOPOLOGY_ROW_CAP) {
        if names_only && !full_details {
            lines.push(format!("- {}", host.name));
        } else {
            lines.push(format!(
                "- {} | {} | {} | {}",
                host.name,
                host.class_name,
                host.category,
                if host.enabled { "Enabled" } else { "Disabled" }
            ));
        }
    }
    if hosts.len() > TOPOLOGY_ROW_CAP {
        lines.push(format!("... {} more host(s) not shown.", hosts.len() - TOPOLOGY_ROW_CAP));
    }
    lines.join("\n")
}

fn render_status(data: &Value) -> String {
    let map = as_map(data);
    [
        "Production status:".to_string(),
        format!("- Name: {}", text_at(map, &["productionName"], "Unknown")),
        format!("- Status: {}", text_at(map, &["statusText", "status"], "Unknown")),
        format!("- Namespace: {}", text_at(map, &["namespace"], "Unknown")),
    ]
    .join("\n")
}

fn render_queues(data: &Value) -> String {
    let rows = extract_queue_rows(data);
    if rows.is_empty() {
        return "No queue rows were returned.".to_string();
    }
    let mut lines = vec![format!("Queue counts ({} host(s)):", rows.len())];
    for row in rows.iter().take(QUEUE_ROW_CAP) {
        lines.push(format!("- {}: {}", row.name, row.count));
    }
    if rows.len() > QUEUE_ROW_CAP {
        lines.push(format!("... {} more host(s) not shown.", rows.len() - QUEUE_ROW_CAP));
    }
    lines.join("\n")
}

fn render_events(data: &Value) -> String {
    let rows = extract_events(data);
    if rows.is_empty() {
        return "No recent event rows were returned.".to_string();
    }
    let mut lines = vec![format!("Recent events ({}):", rows.len())];
    for event in rows.iter().take(EVENT_ROW_CAP) {
        lines.push(format!("- {} | {} | {} | {}", event.when, event.level, event.source, event.message));
    }
    lines.join("\n")
}

fn render_lookup_tables(data: &Value) -> String {
    let tables = extract_lookup_tables(data);
    if tables.is_empty() {
        return "No lookup tables were returned.".to_string();
    }
    let mut lines = vec![format!("Lookup tables ({}):", tables.len())];
    for table in tables.iter().take(LOOKUP_NAME_CAP) {
        lines.push(format!("- {table}"));
    }
    if tables.len() > LOOKUP_NAME_CAP {
        lines.push(format!("... {} more table(s) not shown.", tables.len() - LOOKUP_NAME_CAP));
    }
    lines.join("\n")
}

fn render_lookup_entries(data: &Value) -> String {
    let map = as_map(data);
    let table_name = text_at(map, &["tableName"], "Unknown");
    let entries = nested_array(map, "entries");
    if entries.is_empty() {
        return format!("Lookup table {table_name} has no entries.");
    }
    let mut lines = vec![format!("Lookup table {table_name} entries ({}):", entries.len())];
    for entry in entries.iter().take(LOOKUP_ENTRY_CAP) {
        let map = as_map(entry);
        lines.push(format!(
            "- {} => {}",
            text_at(map, &["name", "key", "Name"], ""),
            text_at(map, &["value", "Value"], "")
        ));
    }
    lines.join("\n")
}

fn render_schemas(data: &Value) -> String {
    let rows = extract_array(data, &["items", "schemas", "data"]);
    if rows.is_empty() {
        return "No message schemas were returned.".to_string();
    }
    let mut lines = vec![format!("Message schemas ({}):", rows.len())];
    for row in rows.iter().take(SCHEMA_NAME_CAP) {
        match row.as_str() {
            Some(name) => lines.push(format!("- {name}")),
            None => lines.push(format!(
                "- {}",
                text_at(as_map(row), &["name", "schema", "SchemaName"], "Unknown")
            )),
        }
    }
    lines.join("\n")
}

fn render_sql(data: &Value) -> String {
    let map = as_map(data);
    let rows = nested_array_with(map, "rows", &["rows", "items", "data"]);
    let row_count = sql_row_count(data);
    if rows.is_empty() {
        return format!("SQL query returned {row_count} row(s).");
    }
    let mut lines = vec![format!("SQL result ({row_count} row(s)):")];
    for row in rows.iter().take(SQL_ROW_CAP) {
        lines.push(format!("- {}", serde_json::to_string(row).unwrap_or_default()));
    }
    if rows.len() > SQL_ROW_CAP {
        lines.push(format!("... {} more row(s) omitted.", rows.len() - SQL_ROW_CAP));
    }
    lines.join("\n")
}

fn render_class_meta(data: &Value) -> String {
    let map = as_map(data);
    let methods = nested_array(map, "methods");
    let properties = nested_array(map, "properties");
    let parameters = nested_array(map, "parameters");

    let mut lines = vec![
        format!("Class metadata: {}", text_at(map, &["className"], "Unknown")),
        format!("- Super: {}", text_at(map, &["super"], "")),
        format!("- Methods: {}", methods.len()),
        format!("- Properties: {}", properties.len()),
        format!("- Parameters: {}", parameters.len()),
    ];
    for method in methods.iter().take(METHOD_SIGNATURE_CAP) {
        let map = as_map(method);
        lines.push(format!(
            "- Method {}({}) -> {}",
            text_at(map, &["name"], ""),
            text_at(map, &["formalSpec"], ""),
            text_at(map, &["returnType"], "%Status")
        ));
    }
    lines.join("\n")
}

fn render_classes(data: &Value) -> String {
    let rows = extract_array(data, &["items", "rows", "data"]);
    if rows.is_empty() {
        return "No classes were returned.".to_string();
    }
    let mut lines = vec![format!("Classes ({}):", rows.len())];
    for row in rows.iter().take(CLASS_ROW_CAP) {
        let map = as_map(row);
        lines.push(format!(
            "- {} | {}",
            text_at(map, &["name"], ""),
            text_at(map, &["super"], "")
        ));
    }
    if rows.len() > CLASS_ROW_CAP {
        lines.push(format!("... {} more class(es) omitted.", rows.len() - CLASS_ROW_CAP));
    }
    lines.join("\n")
}

fn render_policy(data: &Value) -> String {
    let map = as_map(data);
    [
        "Invocation policy:".to_string(),
        format!("- Mode: {}", text_at(map, &["mode"], "unknown")),
        format!("- Max arguments: {}", text_at(map, &["maxArguments"], "")),
    ]
    .join("\n")
}

struct HostRow {
    name: String,
    class_name: String,
    category: String,
    enabled: bool,
}

struct QueueRow {
    name: String,
    count: i64,
}

struct EventRow {
    when: String,
    level: String,
    source: String,
    message: String,
}

fn extract_hosts(data: &Value) -> Vec<HostRow> {
    extract_array(data, &["hosts", "items", "productionItems", "businessHosts"])
        .iter()
        .map(|item| {
            let map = as_map(item);
            HostRow {
                name: text_at(map, &["name", "Name", "configName"], "Unknown"),
                class_name: text_at(map, &["className", "ClassName"], "Unknown"),
                category: text_at(map, &["category", "Category", "businessType"], "Unknown"),
                enabled: bool_at(map, &["enabled", "Enabled"]),
            }
        })
        .collect()
}

fn extract_queue_rows(data: &Value) -> Vec<QueueRow> {
    extract_array(data, &["queues", "items", "hosts"])
        .iter()
        .map(|item| {
            let map = as_map(item);
            QueueRow {
                name: text_at(map, &["name", "Name", "host"], "Unknown"),
                count: count_at(map, &["count", "queueCount", "depth", "QueueCount"]),
            }
        })
        .collect()
}

fn extract_events(data: &Value) -> Vec<EventRow> {
    extract_array(data, &["events", "items", "rows"])
        .iter()
        .map(|item| {
            let map = as_map(item);
            EventRow {
                when: text_at(map, &["time", "timestamp", "TimeLogged"], ""),
                level: text_at(map, &["level", "severity", "Type"], ""),
                source: text_at(map, &["source", "host", "Source"], ""),
                message: text_at(map, &["message", "text", "Description"], ""),
            }
        })
        .collect()
}

fn extract_lookup_tables(data: &Value) -> Vec<String> {
    extract_array(data, &["tables", "items", "lookups"])
        .iter()
        .map(|item| match item.as_str() {
            Some(name) => name.to_string(),
            None => text_at(as_map(item), &["name", "tableName", "Name"], "Unknown"),
        })
        .collect()
}

/// Tolerant array extraction: the payload itself, or the first of `keys`
/// holding an array. Engine responses are not uniform about the wrapper key.
fn extract_array<'a>(data: &'a Value, keys: &[&str]) -> &'a [Value] {
    if let Some(rows) = data.as_array() {
        return rows;
    }
    if let Some(map) = data.as_object() {
        for key in keys {
            if let Some(rows) = map.get(*key).and_then(Value::as_array) {
                return rows;
            }
        }
    }
    &[]
}

fn nested_array<'a>(map: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    nested_array_with(map, key, &[key])
}

fn nested_array_with<'a>(map: &'a Map<String, Value>, key: &str, inner_keys: &[&str]) -> &'a [Value] {
    match map.get(key) {
        Some(value) => extract_array(value, inner_keys),
        None => &[],
    }
}

fn sql_row_count(data: &Value) -> i64 {
    let map = as_map(data);
    let reported = count_at(map, &["rowCount"]);
    if reported > 0 {
        return reported;
    }
    nested_array_with(map, "rows", &["rows"]).len() as i64
}

static EMPTY_MAP: LazyLock<Map<String, Value>> = LazyLock::new(Map::new);

fn as_map(value: &Value) -> &Map<String, Value> {
    value.as_object().unwrap_or(&EMPTY_MAP)
}

/// First present, non-empty scalar among `keys`, rendered as text.
fn text_at(map: &Map<String, Value>, keys: &[&str], default: &str) -> String {
    for key in keys {
        match map.get(*key) {
            Some(Value::String(text)) if !text.is_empty() => return text.clone(),
            Some(Value::Number(number)) => return number.to_string(),
            Some(Value::Bool(true)) => return "true".to_string(),
            _ => {}
        }
    }
    default.to_string()
}

fn bool_at(map: &Map<String, Value>, keys: &[&str]) -> bool {
    for key in keys {
        match map.get(*key) {
            None | Some(Value::Null) => continue,
            Some(Value::Bool(flag)) => return *flag,
            Some(Value::Number(number)) => return number.as_f64().unwrap_or(0.0) != 0.0,
            Some(Value::String(text)) => return !text.is_empty(),
            Some(_) => return true,
        }
    }
    false
}

fn count_at(map: &Map<String, Value>, keys: &[&str]) -> i64 {
    for key in keys {
        match map.get(*key) {
            None | Some(Value::Null) => continue,
            Some(Value::Number(number)) => {
                return number.as_i64().unwrap_or_else(|| number.as_f64().unwrap_or(0.0) as i64)
            }
            Some(Value::String(text)) => return text.trim().parse::<i64>().unwrap_or(0),
            Some(Value::Bool(flag)) => return i64::from(*flag),
            Some(_) => return 0,
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{
        render_read_block, resolve_read_kind, summarize_read_result, EVENT_ROW_CAP, SQL_ROW_CAP,
        TOPOLOGY_ROW_CAP,
    };

    fn host(index: usize) -> Value {
        json!({
            "name": format!("Host{index}"),
            "className": "Engine.BusinessService",
            "category": "Intake",
            "enabled": index % 2 == 0,
        })
    }

    #[test]
    fn targets_win_over_declared_types() {
        assert_eq!(resolve_read_kind("custom_read", Some("production/queues")), "queue_counts");
        assert_eq!(resolve_read_kind("lookup_read", Some("lookup/ErrorCodes")), "lookup_read");
        assert_eq!(resolve_read_kind("class_meta_read", Some("classmeta/Foo.Bar")), "class_meta_read");
        assert_eq!(resolve_read_kind("anything", Some("discover/invoke-policy")), "invoke_policy_read");
        assert_eq!(resolve_read_kind("sql_read", None), "sql_read");
        assert_eq!(resolve_read_kind("", None), "unknown");
    }

    #[test]
    fn topology_caps_rows_and_reports_the_remainder() {
        let hosts: Vec<Value> = (0..151).map(host).collect();
        let block = render_read_block(
            "production_topology",
            Some("production/topology"),
            &json!({ "hosts": hosts }),
            "show production hosts",
        );

        let lines: Vec<&str> = block.lines().collect();
        assert_eq!(lines[0], "Production hosts (151):");
        assert_eq!(lines.len(), 1 + TOPOLOGY_ROW_CAP + 1);
        assert_eq!(lines.last().unwrap(), &"... 1 more host(s) not shown.");
        assert!(lines[1].contains("Host0 | Engine.BusinessService | Intake | Enabled"));
    }

    #[test]
    fn topology_honors_names_only_phrasing() {
        let block = render_read_block(
            "production_topology",
            Some("production/topology"),
            &json!({ "items": [host(1)] }),
            "just the host names please",
        );
        assert_eq!(block, "Production hosts (1):\n- Host1");
    }

    #[test]
    fn empty_topology_renders_a_plain_notice() {
        let block = render_read_block(
            "production_topology",
            Some("production/topology"),
            &json!({ "hosts": [] }),
            "",
        );
        assert_eq!(block, "No production hosts were returned.");
    }

    #[test]
    fn status_block_reads_aliased_fields() {
        let block = render_read_block(
            "production_status",
            Some("production/status"),
            &json!({ "productionName": "Hospital.Main", "status": "Running", "namespace": "PROD" }),
            "",
        );
        assert_eq!(
            block,
            "Production status:\n- Name: Hospital.Main\n- Status: Running\n- Namespace: PROD"
        );
    }

    #[test]
    fn queue_rows_coerce_count_aliases() {
        let block = render_read_block(
            "queue_counts",
            Some("production/queues"),
            &json!({ "queues": [
                { "name": "Intake", "count": 4 },
                { "host": "Export", "QueueCount": "17" },
            ] }),
            "",
        );
        assert_eq!(block, "Queue counts (2 host(s)):\n- Intake: 4\n- Export: 17");
    }

    #[test]
    fn event_rows_are_capped_at_thirty() {
        let events: Vec<Value> = (0..40)
            .map(|i| json!({ "time": format!("t{i}"), "level": "Error", "source": "S", "message": "m" }))
            .collect();
        let block = render_read_block(
            "event_log",
            Some("production/events"),
            &json!({ "events": events }),
            "",
        );
        assert_eq!(block.lines().count(), 1 + EVENT_ROW_CAP);
        assert!(block.starts_with("Recent events (40):"));
    }

    #[test]
    fn lookup_entries_render_key_value_rows() {
        let block = render_read_block(
            "lookup_read",
            Some("lookup/ErrorCodes"),
            &json!({
                "tableName": "ErrorCodes",
                "entries": [ { "key": "E100", "value": "Timeout" }, { "name": "E200", "Value": "Rejected" } ],
            }),
            "",
        );
        assert_eq!(
            block,
            "Lookup table ErrorCodes entries (2):\n- E100 => Timeout\n- E200 => Rejected"
        );
    }

    #[test]
    fn sql_rows_render_as_json_with_a_truncation_tail() {
        let rows: Vec<Value> = (0..30).map(|i| json!({ "id": i })).collect();
        let block =
            render_read_block("sql_read", Some("sql/select"), &json!({ "rows": rows }), "");

        let lines: Vec<&str> = block.lines().collect();
        assert_eq!(lines[0], "SQL result (30 row(s)):");
        assert_eq!(lines[1], "- {\"id\":0}");
        assert_eq!(lines.len(), 1 + SQL_ROW_CAP + 1);
        assert_eq!(lines.last().unwrap(), &"... 5 more row(s) omitted.");
    }

    #[test]
    fn class_metadata_lists_method_signatures() {
        let block = render_read_block(
            "class_meta_read",
            Some("classmeta/Billing.Export"),
            &json!({
                "className": "Billing.Export",
                "super": "Engine.BusinessOperation",
                "methods": [ { "name": "Send", "formalSpec": "pRequest:Message" } ],
                "properties": [ {}, {} ],
                "parameters": [],
            }),
            "",
        );
        assert_eq!(
            block,
            "Class metadata: Billing.Export\n- Super: Engine.BusinessOperation\n- Methods: 1\n- Properties: 2\n- Parameters: 0\n- Method Send(pRequest:Message) -> %Status"
        );
    }

    #[test]
    fn unknown_objects_dump_as_fenced_json_and_scalars_render_nothing() {
        let block = render_read_block("mystery", None, &json!({ "a": 1 }), "");
        assert!(block.starts_with("Result:\n```json\n"));
        assert!(block.ends_with("\n```"));

        assert_eq!(render_read_block("mystery", None, &json!(42), ""), "");
        assert_eq!(render_read_block("mystery", None, &Value::Null, ""), "");
    }

    #[test]
    fn summaries_follow_the_read_kind() {
        assert_eq!(
            summarize_read_result(
                "production_status",
                Some("production/status"),
                &json!({ "statusText": "Running", "productionName": "Main" })
            ),
            "Production status: Running (Main)"
        );
        assert_eq!(
            summarize_read_result(
                "production_topology",
                Some("production/topology"),
                &json!({ "hosts": [host(0), host(1)] })
            ),
            "Production topology read: 2 host(s)."
        );
        assert_eq!(
            summarize_read_result("invoke_policy_read", Some("invoke-policy"), &json!({})),
            "Invocation policy read."
        );
        assert_eq!(
            summarize_read_result("custom_op", Some("custom/target"), &json!({})),
            "custom/target executed."
        );
    }

    #[test]
    fn sql_summary_prefers_the_reported_row_count() {
        assert_eq!(
            summarize_read_result(
                "sql_read",
                Some("sql/select"),
                &json!({ "rowCount": 120, "rows": [ { "id": 1 } ] })
            ),
            "SQL read executed: 120 row(s)."
        );
    }
}
