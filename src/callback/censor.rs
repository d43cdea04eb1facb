//! Redaction of no-log task results.
//!
//! A result is censored when it carries its own `_ansible_no_log` marker or
//! when the caller says so. Censoring keeps a short allow-list of status
//! fields, truncates the command line to its program name and recurses into
//! loop `results`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value as JsonValue};

/// Placeholder that replaces hidden output.
pub const CENSORED: &str =
    "the output has been hidden due to the fact that 'no_log: true' was specified for this result";

/// Result field that marks a result as no-log.
pub const NO_LOG_MARKER: &str = "_ansible_no_log";

/// Fields that survive censoring.
pub const CENSOR_FIELD_ALLOWLIST: [&str; 13] = [
    "msg",
    "failed",
    "changed",
    "results",
    "start",
    "end",
    "delta",
    "cmd",
    NO_LOG_MARKER,
    "rc",
    "failed_when_result",
    "skipped",
    "skip_reason",
];

/// Leading command token; a backslash-escaped whitespace stays in the token.
static CMD_HEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^((?:[^\s\\]|\\\s)+).*$").expect("command head pattern is valid")
});

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s").expect("whitespace pattern is valid"));

/// Truthiness of a JSON value, following the rules playbook authors expect
/// (`0`, `""`, `[]`, `{}`, `null` and `false` are all falsy).
pub fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(a) => !a.is_empty(),
        JsonValue::Object(o) => !o.is_empty(),
    }
}

/// Returns a redacted copy of `result`.
///
/// The input is never modified. Non-map results are replaced by
/// [`CENSORED`] when `no_log` is set and returned as-is otherwise.
pub fn censor_result(result: &JsonValue, no_log: bool) -> JsonValue {
    censor_owned(result.clone(), no_log)
}

fn censor_owned(result: JsonValue, no_log: bool) -> JsonValue {
    let mut res = match result {
        JsonValue::Object(map) => map,
        _ if no_log => return JsonValue::String(CENSORED.to_string()),
        other => return other,
    };

    // An explicit marker wins over the inherited flag, in both directions.
    let effective_no_log = res.get(NO_LOG_MARKER).map_or(no_log, is_truthy);

    if effective_no_log {
        res = allowlisted(res);
    }

    let own_marker = res.get(NO_LOG_MARKER).map_or(false, is_truthy);
    match res.get_mut("results") {
        Some(JsonValue::Array(items)) => {
            for item in items.iter_mut() {
                *item = censor_owned(item.take(), effective_no_log);
            }
        }
        // Only the result's own marker hides a non-list `results`; an
        // inherited flag leaves it alone.
        Some(other) if own_marker => *other = JsonValue::String(CENSORED.to_string()),
        _ => {}
    }

    JsonValue::Object(res)
}

fn allowlisted(res: Map<String, JsonValue>) -> Map<String, JsonValue> {
    let mut kept = Map::new();
    for key in CENSOR_FIELD_ALLOWLIST {
        let Some(value) = res.get(key) else {
            continue;
        };
        let value = if key == "cmd" {
            censor_cmd(value)
        } else {
            value.clone()
        };
        kept.insert(key.to_string(), value);
    }
    kept.insert(
        "censored".to_string(),
        JsonValue::String(CENSORED.to_string()),
    );
    kept
}

/// Keeps the program name of a command line and hides its arguments.
fn censor_cmd(cmd: &JsonValue) -> JsonValue {
    let line = match cmd {
        JsonValue::String(s) => s.clone(),
        JsonValue::Array(parts) => parts
            .iter()
            .map(|p| match p {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" "),
        other => return other.clone(),
    };

    if !WHITESPACE.is_match(&line) {
        return JsonValue::String(line);
    }
    match CMD_HEAD.captures(&line).and_then(|c| c.get(1)) {
        Some(head) => JsonValue::String(format!("{} <censored>", head.as_str())),
        None => JsonValue::String("<censored>".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_scalar_with_no_log_is_placeholder() {
        assert_eq!(
            censor_result(&json!("raw-secret-string"), true),
            json!(CENSORED)
        );
        assert_eq!(censor_result(&json!("visible"), false), json!("visible"));
    }

    #[test]
    fn test_cmd_truncation() {
        let res = json!({
            "cmd": "secret-tool --password=abc123 extra args",
            "stdout": "abc123",
            "rc": 0,
        });
        let out = censor_result(&res, true);
        assert_eq!(out["cmd"], json!("secret-tool <censored>"));
        assert_eq!(out["rc"], json!(0));
        assert!(out.get("stdout").is_none());
        assert_eq!(out["censored"], json!(CENSORED));
    }

    #[test]
    fn test_cmd_list_is_joined_first() {
        let res = json!({"cmd": ["mysql", "-p", "hunter2"], "_ansible_no_log": true});
        let out = censor_result(&res, false);
        assert_eq!(out["cmd"], json!("mysql <censored>"));
    }

    #[test]
    fn test_cmd_without_whitespace_is_kept() {
        let res = json!({"cmd": "uptime", "_ansible_no_log": true});
        assert_eq!(censor_result(&res, false)["cmd"], json!("uptime"));
    }

    #[test]
    fn test_cmd_with_escaped_space_keeps_escape_in_head() {
        let res = json!({"cmd": r"/opt/my\ tool --token=x", "_ansible_no_log": true});
        assert_eq!(
            censor_result(&res, false)["cmd"],
            json!(r"/opt/my\ tool <censored>")
        );
    }

    #[test]
    fn test_multiline_cmd_is_truncated() {
        let res = json!({"cmd": "psql\n-c 'ALTER USER x PASSWORD y'", "_ansible_no_log": true});
        assert_eq!(censor_result(&res, false)["cmd"], json!("psql <censored>"));
    }

    #[test]
    fn test_marker_censors_without_flag() {
        let res = json!({"_ansible_no_log": true, "changed": true, "password": "x"});
        let out = censor_result(&res, false);
        assert_eq!(
            out,
            json!({"_ansible_no_log": true, "changed": true, "censored": CENSORED})
        );
    }

    #[test]
    fn test_false_marker_overrides_flag() {
        let res = json!({"_ansible_no_log": false, "stdout": "fine"});
        assert_eq!(censor_result(&res, true), res);
    }

    #[test]
    fn test_unmarked_result_passes_through() {
        let res = json!({"changed": true, "stdout": "hello"});
        assert_eq!(censor_result(&res, false), res);
    }

    #[test]
    fn test_loop_results_inherit_flag() {
        let res = json!({
            "_ansible_no_log": true,
            "changed": true,
            "results": [
                {"item": "a", "stdout": "secret-a"},
                "secret-b",
                {"item": "c", "_ansible_no_log": false, "stdout": "public"}
            ]
        });
        let out = censor_result(&res, false);
        let results = out["results"].as_array().unwrap();
        assert_eq!(results[0], json!({"censored": CENSORED}));
        assert_eq!(results[1], json!(CENSORED));
        assert_eq!(results[2], json!({"item": "c", "_ansible_no_log": false, "stdout": "public"}));
    }

    #[test]
    fn test_per_item_marker_without_parent_flag() {
        let res = json!({
            "changed": false,
            "results": [
                {"item": "a", "_ansible_no_log": true, "stdout": "secret"},
                {"item": "b", "stdout": "public"}
            ]
        });
        let out = censor_result(&res, false);
        assert_eq!(out["results"][0]["censored"], json!(CENSORED));
        assert!(out["results"][0].get("stdout").is_none());
        assert_eq!(out["results"][1]["stdout"], json!("public"));
    }

    #[test]
    fn test_scalar_results_hidden_only_by_own_marker() {
        let marked = json!({"_ansible_no_log": true, "results": "secret"});
        assert_eq!(censor_result(&marked, false)["results"], json!(CENSORED));

        // Inherited flag alone leaves a non-list `results` untouched.
        let inherited = json!({"results": "kept"});
        assert_eq!(censor_result(&inherited, true)["results"], json!("kept"));
    }

    #[test]
    fn test_input_is_not_mutated() {
        let res = json!({"_ansible_no_log": true, "stdout": "s", "cmd": ["a", "b"]});
        let before = res.clone();
        let _ = censor_result(&res, true);
        assert_eq!(res, before);
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(is_truthy(&json!("yes")));
        assert!(is_truthy(&json!(1)));
    }
}
