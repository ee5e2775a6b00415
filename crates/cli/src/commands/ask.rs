use trestle_agent::BrokerRequest;

use super::{build_broker, CommandResult};

/// One request through the broker. Plain output is the reply text alone;
/// `--json` emits the full reply record (source, actions, execution).
pub fn run(message: &str, json_output: bool, namespace: Option<String>) -> CommandResult {
    let handle = match build_broker("ask") {
        Ok(handle) => handle,
        Err(result) => return result,
    };

    let mut request = BrokerRequest::new(message);
    request.namespace = namespace;
    let response = handle.runtime.block_on(handle.broker.handle(request));

    if json_output {
        match serde_json::to_string_pretty(&response) {
            Ok(output) => CommandResult { exit_code: 0, output },
            Err(error) => CommandResult::failure("ask", "serialization", error.to_string(), 5),
        }
    } else {
        CommandResult { exit_code: 0, output: response.reply }
    }
}
