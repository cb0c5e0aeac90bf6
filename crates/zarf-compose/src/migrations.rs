//! Deprecation migrations
//!
//! Known-obsolete definition fields are rewritten in place before the
//! typed parse. Each rewrite emits a warning carried out of composition
//! so the CLI can surface it once.

use serde_yaml::{Mapping, Value};

/// Identifier recorded in build info for the setVariable rewrite
pub const PLURALIZE_SET_VARIABLE: &str = "pluralize-set-variable";
/// Identifier recorded in build info for the scripts rewrite
pub const SCRIPTS_TO_ACTIONS: &str = "scripts-to-actions";

/// Rewrite deprecated fields in a raw definition document.
///
/// Returns human-readable warnings; the ids of applied migrations can be
/// recovered from the warnings' prefixes by the caller.
pub fn migrate_definition(doc: &mut Value) -> Vec<String> {
    let mut warnings = Vec::new();

    let Some(components) = doc
        .get_mut("components")
        .and_then(|c| c.as_sequence_mut())
    else {
        return warnings;
    };

    for component in components.iter_mut() {
        let name = component
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or("<unnamed>")
            .to_string();

        if migrate_scripts(component) {
            warnings.push(format!(
                "{}: component '{}' uses deprecated 'scripts'; rewritten to 'actions.onDeploy'",
                SCRIPTS_TO_ACTIONS, name
            ));
        }
        if migrate_set_variable(component) {
            warnings.push(format!(
                "{}: component '{}' uses deprecated 'setVariable'; rewritten to 'setVariables'",
                PLURALIZE_SET_VARIABLE, name
            ));
        }
    }

    warnings
}

/// `scripts.{before,after}` command lists become `actions.onDeploy` actions.
fn migrate_scripts(component: &mut Value) -> bool {
    let Some(scripts) = component.get("scripts").cloned() else {
        return false;
    };
    let Some(map) = component.as_mapping_mut() else {
        return false;
    };
    map.remove("scripts");

    let mute = scripts
        .get("showOutput")
        .and_then(Value::as_bool)
        .map(|show| !show)
        .unwrap_or(false);
    let timeout = scripts.get("timeoutSeconds").cloned();
    let retries = scripts.get("retry").and_then(Value::as_bool).unwrap_or(false);

    let to_actions = |cmds: Option<&Value>| -> Vec<Value> {
        cmds.and_then(Value::as_sequence)
            .map(|seq| {
                seq.iter()
                    .filter_map(|cmd| cmd.as_str())
                    .map(|cmd| {
                        let mut action = Mapping::new();
                        action.insert("cmd".into(), cmd.into());
                        if mute {
                            action.insert("mute".into(), true.into());
                        }
                        if let Some(t) = &timeout {
                            action.insert("maxTotalSeconds".into(), t.clone());
                        }
                        if retries {
                            // The old retry flag looped forever; keep it bounded.
                            action.insert("maxRetries".into(), Value::from(u32::MAX as u64));
                        }
                        Value::Mapping(action)
                    })
                    .collect()
            })
            .unwrap_or_default()
    };

    let before = to_actions(scripts.get("before"));
    let after = to_actions(scripts.get("after"));

    let actions = map
        .entry("actions".into())
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    if let Some(actions) = actions.as_mapping_mut() {
        let on_deploy = actions
            .entry("onDeploy".into())
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        if let Some(on_deploy) = on_deploy.as_mapping_mut() {
            append_actions(on_deploy, "before", before);
            append_actions(on_deploy, "after", after);
        }
    }

    true
}

fn append_actions(set: &mut Mapping, key: &str, mut actions: Vec<Value>) {
    if actions.is_empty() {
        return;
    }
    let list = set
        .entry(key.into())
        .or_insert_with(|| Value::Sequence(Vec::new()));
    if let Some(list) = list.as_sequence_mut() {
        list.append(&mut actions);
    }
}

/// `setVariable: NAME` on an action becomes `setVariables: [{name: NAME}]`.
fn migrate_set_variable(component: &mut Value) -> bool {
    let mut migrated = false;

    let Some(actions) = component
        .get_mut("actions")
        .and_then(Value::as_mapping_mut)
    else {
        return false;
    };

    for (_, action_set) in actions.iter_mut() {
        let Some(action_set) = action_set.as_mapping_mut() else {
            continue;
        };
        for list_key in ["before", "after", "onSuccess", "onFailure"] {
            let Some(actions) = action_set
                .get_mut(list_key)
                .and_then(Value::as_sequence_mut)
            else {
                continue;
            };
            for action in actions.iter_mut() {
                let Some(action) = action.as_mapping_mut() else {
                    continue;
                };
                if let Some(Value::String(name)) = action.remove("setVariable") {
                    let mut entry = Mapping::new();
                    entry.insert("name".into(), name.into());
                    let existing = action
                        .entry("setVariables".into())
                        .or_insert_with(|| Value::Sequence(Vec::new()));
                    if let Some(existing) = existing.as_sequence_mut() {
                        existing.push(Value::Mapping(entry));
                    }
                    migrated = true;
                }
            }
        }
    }

    migrated
}
