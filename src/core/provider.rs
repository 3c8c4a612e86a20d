//! Provider service interfaces and their CLI-backed clients.
//!
//! The provisioning and object storage services are modeled as traits so the
//! pipeline can be exercised against scripted implementations. The shipped
//! clients shell out to the `aws` CLI with explicit argument arrays; the
//! credential profile is bound at construction, never via the process
//! environment.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;

use crate::error::{Error, Result};
use crate::utils::command::{error_text, run_shell_in};

pub const CAPABILITY_IAM: &str = "CAPABILITY_IAM";

pub const STATUS_CREATE_COMPLETE: &str = "CREATE_COMPLETE";
pub const STATUS_CREATE_IN_PROGRESS: &str = "CREATE_IN_PROGRESS";

pub const DEFAULT_TEST_COMMAND: &str = "python -m unittest discover";

/// Provisioning state of a stack, parsed from the provider's status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackState {
    InProgress,
    Complete,
    Failed,
    Unknown,
}

impl StackState {
    pub fn from_status(status: &str) -> Self {
        match status {
            STATUS_CREATE_IN_PROGRESS => StackState::InProgress,
            STATUS_CREATE_COMPLETE => StackState::Complete,
            "CREATE_FAILED" | "ROLLBACK_IN_PROGRESS" | "ROLLBACK_COMPLETE"
            | "ROLLBACK_FAILED" | "DELETE_IN_PROGRESS" | "DELETE_COMPLETE" => StackState::Failed,
            _ => StackState::Unknown,
        }
    }
}

/// One key/value pair exposed by a provisioned stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackOutput {
    #[serde(rename = "OutputKey")]
    pub key: String,
    #[serde(rename = "OutputValue")]
    pub value: String,
}

/// One template parameter, in the provider's wire naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(rename = "ParameterKey")]
    pub key: String,
    #[serde(rename = "ParameterValue")]
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct StackDescription {
    pub status: String,
    pub outputs: Vec<StackOutput>,
}

pub trait Provisioner {
    fn create_stack(
        &self,
        name: &str,
        template_body: &str,
        parameters: &[Parameter],
        capabilities: &[&str],
        region: &str,
    ) -> Result<String>;

    fn describe_stack(&self, name: &str, region: &str) -> Result<StackDescription>;
}

pub trait ObjectStore {
    fn put_object(&self, local_path: &Path, bucket: &str, key: &str) -> Result<()>;
}

pub trait TestRunner {
    fn run_all(&self, source_path: &Path) -> Result<bool>;
}

// =============================================================================
// CLI-backed clients
// =============================================================================

/// Provisioner backed by `aws cloudformation`.
pub struct CliProvisioner {
    profile: Option<String>,
}

impl CliProvisioner {
    pub fn new(profile: Option<String>) -> Self {
        Self { profile }
    }

    fn invoke(&self, region: &str, args: &[&str]) -> Result<String> {
        let mut command = Command::new("aws");
        command.args(["cloudformation", "--output", "json", "--region", region]);
        if let Some(profile) = &self.profile {
            command.args(["--profile", profile]);
        }
        command.args(args);

        let output = command
            .output()
            .map_err(|e| Error::Provider(format!("Failed to run aws cloudformation: {}", e)))?;
        if !output.status.success() {
            return Err(Error::Provider(format!(
                "aws cloudformation {} failed: {}",
                args.first().unwrap_or(&""),
                error_text(&output)
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[derive(Deserialize)]
struct CreateStackResponse {
    #[serde(rename = "StackId")]
    stack_id: String,
}

#[derive(Deserialize)]
struct DescribeStacksResponse {
    #[serde(rename = "Stacks")]
    stacks: Vec<DescribedStack>,
}

#[derive(Deserialize)]
struct DescribedStack {
    #[serde(rename = "StackStatus")]
    stack_status: String,
    #[serde(rename = "Outputs", default)]
    outputs: Vec<StackOutput>,
}

impl Provisioner for CliProvisioner {
    fn create_stack(
        &self,
        name: &str,
        template_body: &str,
        parameters: &[Parameter],
        capabilities: &[&str],
        region: &str,
    ) -> Result<String> {
        let parameters_json = serde_json::to_string(parameters)?;
        let mut args = vec![
            "create-stack",
            "--stack-name",
            name,
            "--template-body",
            template_body,
            "--parameters",
            parameters_json.as_str(),
        ];
        for capability in capabilities {
            args.push("--capabilities");
            args.push(capability);
        }

        let stdout = self.invoke(region, &args)?;
        let response: CreateStackResponse = serde_json::from_str(&stdout)
            .map_err(|e| Error::Provider(format!("Unparseable create-stack response: {}", e)))?;
        Ok(response.stack_id)
    }

    fn describe_stack(&self, name: &str, region: &str) -> Result<StackDescription> {
        let stdout = self.invoke(region, &["describe-stacks", "--stack-name", name])?;
        let response: DescribeStacksResponse = serde_json::from_str(&stdout)
            .map_err(|e| Error::Provider(format!("Unparseable describe-stacks response: {}", e)))?;
        let stack = response
            .stacks
            .into_iter()
            .next()
            .ok_or_else(|| Error::Provider(format!("Stack '{}' not found", name)))?;
        Ok(StackDescription {
            status: stack.stack_status,
            outputs: stack.outputs,
        })
    }
}

/// Object store backed by `aws s3api`.
pub struct CliObjectStore {
    profile: Option<String>,
}

impl CliObjectStore {
    pub fn new(profile: Option<String>) -> Self {
        Self { profile }
    }
}

impl ObjectStore for CliObjectStore {
    fn put_object(&self, local_path: &Path, bucket: &str, key: &str) -> Result<()> {
        let body = local_path.to_string_lossy();
        let mut command = Command::new("aws");
        command.args(["s3api", "put-object", "--bucket", bucket, "--key", key, "--body", body.as_ref()]);
        if let Some(profile) = &self.profile {
            command.args(["--profile", profile]);
        }

        let output = command
            .output()
            .map_err(|e| Error::Provider(format!("Failed to run aws s3api: {}", e)))?;
        if !output.status.success() {
            return Err(Error::Provider(format!(
                "put-object '{}' to '{}/{}' failed: {}",
                local_path.display(),
                bucket,
                key,
                error_text(&output)
            )));
        }
        Ok(())
    }
}

/// Unit-test runner executing a shell command in the source tree.
///
/// Any non-zero exit is a failed run; the command's own output is the report.
pub struct CommandTestRunner {
    command: String,
}

impl CommandTestRunner {
    pub fn new(command: Option<String>) -> Self {
        Self {
            command: command.unwrap_or_else(|| DEFAULT_TEST_COMMAND.to_string()),
        }
    }
}

impl TestRunner for CommandTestRunner {
    fn run_all(&self, source_path: &Path) -> Result<bool> {
        let output = run_shell_in(source_path, &self.command)?;
        if !output.success {
            eprintln!("[tests] {}", output.stderr.trim_end());
        }
        Ok(output.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn stack_state_parses_known_statuses() {
        assert_eq!(StackState::from_status("CREATE_IN_PROGRESS"), StackState::InProgress);
        assert_eq!(StackState::from_status("CREATE_COMPLETE"), StackState::Complete);
        assert_eq!(StackState::from_status("ROLLBACK_COMPLETE"), StackState::Failed);
        assert_eq!(StackState::from_status("UPDATE_COMPLETE"), StackState::Unknown);
    }

    #[test]
    fn parameters_serialize_in_wire_naming() {
        let parameters = vec![Parameter {
            key: "Env".to_string(),
            value: "prod".to_string(),
        }];
        let json = serde_json::to_string(&parameters).unwrap();
        assert_eq!(json, r#"[{"ParameterKey":"Env","ParameterValue":"prod"}]"#);
    }

    #[test]
    fn describe_response_tolerates_missing_outputs() {
        let response: DescribeStacksResponse = serde_json::from_str(
            r#"{"Stacks": [{"StackStatus": "CREATE_IN_PROGRESS"}]}"#,
        )
        .unwrap();
        assert!(response.stacks[0].outputs.is_empty());
    }

    #[test]
    fn command_test_runner_reports_pass_and_fail() {
        let dir = tempdir().unwrap();
        let passing = CommandTestRunner::new(Some("true".to_string()));
        assert!(passing.run_all(dir.path()).unwrap());

        let failing = CommandTestRunner::new(Some("false".to_string()));
        assert!(!failing.run_all(dir.path()).unwrap());
    }
}
