//! Lifecycle action execution
//!
//! Actions run through the platform shell with merged defaults, bounded
//! retries and a total-seconds budget. Declared `setVariables` are
//! captured from well-formed `NAME=value` lines on stdout. A `wait`
//! action polls a cluster resource or network endpoint instead of
//! running a command.

use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

use zarf_core::component::{Action, ActionDefaults, ActionSet, ActionWait};
use zarf_core::config::ACTION_TIMEOUT;
use zarf_core::variables::{SetVariableMap, VariableValue};

use crate::cluster::wait_for_cluster_resource;
use crate::error::{KubeError, Result};

/// Position of an action within its lifecycle set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionPhase {
    Before,
    After,
    OnSuccess,
    OnFailure,
}

/// Runs one component's actions with shared variable state
pub struct ActionRunner<'a> {
    /// Working directory actions run from by default
    pub base_dir: &'a Path,
    /// Cluster access for `wait.cluster` actions
    pub client: Option<&'a kube::Client>,
    /// Component name for error context
    pub component: &'a str,
}

impl ActionRunner<'_> {
    /// Run every action of a phase in order, threading captured
    /// variables into later substitutions.
    pub async fn run_phase(
        &self,
        set: &ActionSet,
        phase: ActionPhase,
        variables: &mut SetVariableMap,
    ) -> Result<()> {
        let actions = match phase {
            ActionPhase::Before => &set.before,
            ActionPhase::After => &set.after,
            ActionPhase::OnSuccess => &set.on_success,
            ActionPhase::OnFailure => &set.on_failure,
        };
        for action in actions {
            self.run_action(action, &set.defaults, variables).await?;
        }
        Ok(())
    }

    async fn run_action(
        &self,
        action: &Action,
        defaults: &ActionDefaults,
        variables: &mut SetVariableMap,
    ) -> Result<()> {
        let budget = action
            .max_total_seconds
            .or(defaults.max_total_seconds)
            .map(Duration::from_secs)
            .unwrap_or(ACTION_TIMEOUT);

        if let Some(wait) = &action.wait {
            return tokio::time::timeout(budget, self.run_wait(wait))
                .await
                .map_err(|_| KubeError::ActionTimeout {
                    seconds: budget.as_secs(),
                })?;
        }

        let Some(cmd) = &action.cmd else {
            return Ok(());
        };

        let cmd = substitute_variables(cmd, variables);
        let mute = action.mute.unwrap_or(defaults.mute);
        let retries = action.max_retries.or(defaults.max_retries).unwrap_or(0);
        let dir = action
            .dir
            .as_deref()
            .or(defaults.dir.as_deref())
            .map(|d| self.base_dir.join(d))
            .unwrap_or_else(|| self.base_dir.to_path_buf());
        let shell = shell_for_platform(action, defaults);

        let mut env: Vec<(String, String)> = defaults
            .env
            .iter()
            .chain(&action.env)
            .filter_map(|pair| {
                pair.split_once('=')
                    .map(|(k, v)| (k.to_string(), v.to_string()))
            })
            .collect();
        for (name, value) in variables.iter() {
            env.push((format!("ZARF_VAR_{}", name), value.value.clone()));
        }

        // The whole retry loop shares one total-seconds budget.
        let attempts = retries + 1;
        let run = async {
            let mut last = String::new();
            for attempt in 0..attempts {
                match self.run_once(&shell, &cmd, &dir, &env, mute).await {
                    Ok(stdout) => return Ok(stdout),
                    Err(message) => {
                        tracing::warn!(
                            component = self.component,
                            attempt = attempt + 1,
                            "action attempt failed"
                        );
                        last = message;
                    }
                }
            }
            Err(KubeError::Action {
                component: self.component.to_string(),
                message: last,
            })
        };

        let stdout = tokio::time::timeout(budget, run)
            .await
            .map_err(|_| KubeError::ActionTimeout {
                seconds: budget.as_secs(),
            })??;

        capture_variables(action, &stdout, variables)?;
        Ok(())
    }

    async fn run_once(
        &self,
        shell: &str,
        cmd: &str,
        dir: &Path,
        env: &[(String, String)],
        mute: bool,
    ) -> std::result::Result<String, String> {
        let mut command = Command::new(shell);
        command.arg(shell_flag(shell)).arg(cmd).current_dir(dir);
        for (key, value) in env {
            command.env(key, value);
        }

        let output = command.output().await.map_err(|e| e.to_string())?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !mute {
            for line in stdout.lines().chain(stderr.lines()) {
                tracing::info!(component = self.component, "  {}", line);
            }
        }

        if output.status.success() {
            Ok(stdout)
        } else {
            Err(format!(
                "exit status {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ))
        }
    }

    async fn run_wait(&self, wait: &ActionWait) -> Result<()> {
        if let Some(cluster) = &wait.cluster {
            let client = self.client.ok_or_else(|| KubeError::Action {
                component: self.component.to_string(),
                message: "cluster wait requires cluster access".to_string(),
            })?;
            return wait_for_cluster_resource(client, cluster).await;
        }

        if let Some(network) = &wait.network {
            loop {
                let ready = match network.protocol.as_str() {
                    "tcp" => tokio::net::TcpStream::connect(&network.address)
                        .await
                        .is_ok(),
                    "http" | "https" => {
                        let url = format!("{}://{}", network.protocol, network.address);
                        match reqwest::get(&url).await {
                            Ok(resp) => match network.code {
                                Some(code) => resp.status().as_u16() == code,
                                None => resp.status().is_success(),
                            },
                            Err(_) => false,
                        }
                    }
                    other => {
                        return Err(KubeError::Action {
                            component: self.component.to_string(),
                            message: format!("unsupported wait protocol '{}'", other),
                        })
                    }
                };
                if ready {
                    return Ok(());
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }

        Ok(())
    }
}

/// Substitute `###ZARF_VAR_*###` tokens in a command string
fn substitute_variables(cmd: &str, variables: &SetVariableMap) -> String {
    let mut out = cmd.to_string();
    for (name, value) in variables {
        out = out.replace(&format!("###ZARF_VAR_{}###", name), &value.value);
    }
    out
}

/// Capture declared variables from `NAME=value` stdout lines
fn capture_variables(
    action: &Action,
    stdout: &str,
    variables: &mut SetVariableMap,
) -> Result<()> {
    for set_variable in &action.set_variables {
        let captured = stdout.lines().rev().find_map(|line| {
            line.split_once('=')
                .filter(|(key, _)| key.trim() == set_variable.name)
                .map(|(_, value)| value.trim().to_string())
        });

        let Some(value) = captured else {
            return Err(KubeError::VariableNotCaptured {
                name: set_variable.name.clone(),
            });
        };

        variables.insert(
            set_variable.name.clone(),
            VariableValue {
                value,
                sensitive: set_variable.sensitive,
                auto_indent: set_variable.auto_indent,
                kind: set_variable.kind,
            },
        );
    }
    Ok(())
}

fn shell_for_platform(action: &Action, defaults: &ActionDefaults) -> String {
    let shell = action.shell.as_ref().or(defaults.shell.as_ref());
    let pick = |s: Option<&String>, fallback: &str| {
        s.cloned().unwrap_or_else(|| fallback.to_string())
    };
    match std::env::consts::OS {
        "windows" => pick(shell.and_then(|s| s.windows.as_ref()), "powershell"),
        "macos" => pick(shell.and_then(|s| s.darwin.as_ref()), "sh"),
        _ => pick(shell.and_then(|s| s.linux.as_ref()), "sh"),
    }
}

fn shell_flag(shell: &str) -> &'static str {
    match shell {
        "powershell" | "pwsh" => "-Command",
        _ => "-c",
    }
}
