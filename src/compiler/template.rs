//! Template rewriting (spec §4.8 "Template rewrite" and "Input/context
//! edges"). `{{input.X}} → {{.X}}`; `{{tasks.T.output}} → {{.<id>_output}}`.
//! Unresolved references are left untouched.

use rustc_hash::FxHashMap;

/// A reference to another task's output found inside a template string,
/// e.g. `{{tasks.research.output}}` → `task_id = "research"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutputRef {
    pub task_id: String,
}

/// Extracts every `{{tasks.T.output}}` reference in `source`, in the order
/// they appear, without deduplicating.
pub fn extract_task_output_refs(source: &str) -> Vec<TaskOutputRef> {
    let mut refs = Vec::new();
    let mut rest = source;
    while let Some(start) = rest.find("{{tasks.") {
        let after = &rest[start + "{{tasks.".len()..];
        let Some(dot) = after.find('.') else {
            break;
        };
        let task_id = &after[..dot];
        let tail = &after[dot..];
        if tail.starts_with(".output}}") {
            refs.push(TaskOutputRef {
                task_id: task_id.to_string(),
            });
        }
        rest = &after[dot..];
        if rest.is_empty() {
            break;
        }
        rest = &rest[1..];
    }
    refs
}

/// Rewrites `{{input.X}} → {{.X}}` and `{{tasks.T.output}} → {{.<id>_output}}`
/// using `compiled_node_ids` (task id → its compiled LLM node id). A
/// `tasks.T.output` reference to an unknown task is left untouched.
pub fn rewrite_template(source: &str, compiled_node_ids: &FxHashMap<String, String>) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    loop {
        let input_pos = rest.find("{{input.");
        let tasks_pos = rest.find("{{tasks.");

        let next = match (input_pos, tasks_pos) {
            (Some(i), Some(t)) => i.min(t),
            (Some(i), None) => i,
            (None, Some(t)) => t,
            (None, None) => {
                out.push_str(rest);
                break;
            }
        };

        out.push_str(&rest[..next]);
        let tail = &rest[next..];

        if tail.starts_with("{{input.") {
            let after = &tail["{{input.".len()..];
            if let Some(end) = after.find("}}") {
                let name = &after[..end];
                out.push_str(&format!("{{{{.{name}}}}}"));
                rest = &after[end + 2..];
                continue;
            }
            out.push_str("{{input.");
            rest = after;
            continue;
        }

        // "{{tasks."
        let after = &tail["{{tasks.".len()..];
        if let Some(dot) = after.find('.') {
            let task_id = &after[..dot];
            let maybe_output = &after[dot..];
            if let Some(end) = maybe_output.find("}}") {
                if maybe_output.starts_with(".output}}") {
                    if let Some(compiled_id) = compiled_node_ids.get(task_id) {
                        out.push_str(&format!("{{{{.{compiled_id}_output}}}}"));
                        rest = &maybe_output[end + 2..];
                        continue;
                    }
                }
            }
        }

        // Unresolved `{{tasks.…}}` reference: left untouched.
        out.push_str("{{tasks.");
        rest = after;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_input_reference() {
        let map = FxHashMap::default();
        assert_eq!(rewrite_template("Summarize {{input.topic}}.", &map), "Summarize {{.topic}}.");
    }

    #[test]
    fn rewrites_task_output_reference() {
        let mut map = FxHashMap::default();
        map.insert("research".to_string(), "research__analyst".to_string());
        assert_eq!(
            rewrite_template("Use {{tasks.research.output}} here.", &map),
            "Use {{.research__analyst_output}} here."
        );
    }

    #[test]
    fn unresolved_task_reference_is_left_untouched() {
        let map = FxHashMap::default();
        assert_eq!(
            rewrite_template("Use {{tasks.missing.output}} here.", &map),
            "Use {{tasks.missing.output}} here."
        );
    }

    #[test]
    fn extracts_task_output_refs_in_order() {
        let refs = extract_task_output_refs("{{tasks.a.output}} and {{tasks.b.output}}");
        assert_eq!(
            refs,
            vec![
                TaskOutputRef { task_id: "a".to_string() },
                TaskOutputRef { task_id: "b".to_string() },
            ]
        );
    }
}
