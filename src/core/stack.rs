//! Stack provisioning.
//!
//! Submitting a template is asynchronous on the provider side; the two poll
//! loops here turn it into a synchronous result with a bounded budget. Stack
//! creation takes tens of minutes, so its wait uses a long cadence; output
//! collection only defends against the short race where a stack reports
//! complete before its outputs are queryable.

use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::config::StackSpec;
use crate::error::{Error, Result};
use crate::provider::{Parameter, Provisioner, StackOutput, StackState, CAPABILITY_IAM};
use crate::utils::io;

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollConfig {
    pub fn budget_secs(&self) -> u64 {
        self.interval.as_secs() * u64::from(self.max_attempts)
    }
}

/// Wait budget for stack creation: 30s delay, 50 attempts.
pub const CREATE_WAIT: PollConfig = PollConfig {
    interval: Duration::from_secs(30),
    max_attempts: 50,
};

/// Wait budget for output collection: 5s interval within a 50s ceiling.
pub const OUTPUT_WAIT: PollConfig = PollConfig {
    interval: Duration::from_secs(5),
    max_attempts: 10,
};

pub struct StackProvisioner<'a> {
    client: &'a dyn Provisioner,
    create_wait: PollConfig,
    output_wait: PollConfig,
}

impl<'a> StackProvisioner<'a> {
    pub fn new(client: &'a dyn Provisioner) -> Self {
        Self {
            client,
            create_wait: CREATE_WAIT,
            output_wait: OUTPUT_WAIT,
        }
    }

    pub fn with_poll_configs(
        client: &'a dyn Provisioner,
        create_wait: PollConfig,
        output_wait: PollConfig,
    ) -> Self {
        Self {
            client,
            create_wait,
            output_wait,
        }
    }

    /// Submit a stack for provisioning and return its identifier.
    pub fn submit(&self, spec: &StackSpec) -> Result<String> {
        let template_body = io::read_file(Path::new(&spec.template_path), "read template")?;
        let parameters = load_parameters(spec)?;
        self.client.create_stack(
            &spec.name,
            &template_body,
            &parameters,
            &[CAPABILITY_IAM],
            &spec.region,
        )
    }

    /// Poll until the stack reports complete.
    pub fn await_create_complete(&self, name: &str, region: &str) -> Result<()> {
        self.poll(name, region, self.create_wait).map(|_| ())
    }

    /// Poll until the stack reports complete, then return its outputs.
    pub fn collect_outputs(&self, name: &str, region: &str) -> Result<Vec<StackOutput>> {
        self.poll(name, region, self.output_wait)
    }

    fn poll(&self, name: &str, region: &str, wait: PollConfig) -> Result<Vec<StackOutput>> {
        for attempt in 0..wait.max_attempts {
            let description = self.client.describe_stack(name, region)?;
            match StackState::from_status(&description.status) {
                StackState::Complete => return Ok(description.outputs),
                StackState::InProgress => {
                    log_status!(
                        "stack",
                        "Stack '{}' is {}, sleeping {}s",
                        name,
                        description.status,
                        wait.interval.as_secs()
                    );
                    if attempt + 1 < wait.max_attempts {
                        thread::sleep(wait.interval);
                    }
                }
                StackState::Failed | StackState::Unknown => {
                    return Err(Error::UnexpectedStackState {
                        stack: name.to_string(),
                        status: description.status,
                    });
                }
            }
        }
        Err(Error::ProvisioningTimeout {
            stack: name.to_string(),
            waited_secs: wait.budget_secs(),
        })
    }
}

/// Parameters for a stack: the parameters file, with inline overrides merged
/// over it by key.
fn load_parameters(spec: &StackSpec) -> Result<Vec<Parameter>> {
    let mut parameters: Vec<Parameter> = Vec::new();
    if let Some(params_path) = &spec.template_params_path {
        let content = io::read_file(Path::new(params_path), "read template parameters")?;
        parameters = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("parse template parameters: {}: {}", params_path, e))
        })?;
    }

    for (key, value) in &spec.params {
        match parameters.iter_mut().find(|p| &p.key == key) {
            Some(existing) => existing.value = value.clone(),
            None => parameters.push(Parameter {
                key: key.clone(),
                value: value.clone(),
            }),
        }
    }

    Ok(parameters)
}
