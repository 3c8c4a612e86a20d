//! Deployment orchestration.
//!
//! `Deployer` owns the configuration, the provider clients, and the run
//! state, and drives the seven pipeline steps in fixed order. Ordering is
//! part of the contract: packages are uploaded before stacks are created,
//! and outputs are collected before static artifacts can resolve a bucket.

use std::path::Path;

use crate::config::DeployConfig;
use crate::error::{Error, Result};
use crate::package;
use crate::pipeline::{self, Step, StepOutcome};
use crate::provider::{
    CliObjectStore, CliProvisioner, CommandTestRunner, ObjectStore, Provisioner, TestRunner,
};
use crate::publish;
use crate::stack::StackProvisioner;
use crate::state::{self, RunState};

/// Provisioning and storage clients, created once per run and reused.
pub struct ProviderClients {
    pub provisioner: Box<dyn Provisioner>,
    pub object_store: Box<dyn ObjectStore>,
}

impl ProviderClients {
    pub fn connect(profile: Option<&str>) -> Self {
        Self {
            provisioner: Box::new(CliProvisioner::new(profile.map(str::to_string))),
            object_store: Box::new(CliObjectStore::new(profile.map(str::to_string))),
        }
    }
}

pub struct Deployer {
    config: DeployConfig,
    test_runner: Box<dyn TestRunner>,
    clients: Option<ProviderClients>,
    state: RunState,
}

const DEPLOY_STEPS: &[Step<Deployer>] = &[
    Step { name: "run_tests", run: Deployer::run_tests },
    Step { name: "make_packages", run: Deployer::make_packages },
    Step { name: "init_clients", run: Deployer::init_clients },
    Step { name: "upload_packages", run: Deployer::upload_packages },
    Step { name: "create_stacks", run: Deployer::create_stacks },
    Step { name: "collect_stack_outputs", run: Deployer::collect_stack_outputs },
    Step { name: "upload_static_artifacts", run: Deployer::upload_static_artifacts },
];

impl Deployer {
    pub fn new(config: DeployConfig) -> Self {
        let test_runner = Box::new(CommandTestRunner::new(config.test_command.clone()));
        Self {
            config,
            test_runner,
            clients: None,
            state: RunState::new(),
        }
    }

    /// Construct with injected collaborators. The client-initialization step
    /// keeps clients that are already present.
    pub fn with_clients(
        config: DeployConfig,
        test_runner: Box<dyn TestRunner>,
        clients: ProviderClients,
    ) -> Self {
        Self {
            config,
            test_runner,
            clients: Some(clients),
            state: RunState::new(),
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Run the deployment pipeline to completion or first failure.
    pub fn run(&mut self) -> StepOutcome {
        log_status!("deploy", "Starting deployment pipeline");
        let outcome = pipeline::run_steps(self, DEPLOY_STEPS);
        log_status!("deploy", "Finished deployment pipeline: {}", outcome);
        outcome
    }

    fn run_tests(&mut self) -> Result<StepOutcome> {
        if !self.config.options.run_unit_tests {
            return Ok(StepOutcome::Skipped);
        }
        let passed = self
            .test_runner
            .run_all(Path::new(&self.config.source_path))?;
        Ok(if passed {
            StepOutcome::Succeeded
        } else {
            StepOutcome::Failed
        })
    }

    fn make_packages(&mut self) -> Result<StepOutcome> {
        if !self.config.options.make_packages {
            return Ok(StepOutcome::Skipped);
        }
        let source_root = Path::new(&self.config.source_path);
        for spec in &self.config.packages {
            let archive_path = Path::new(&spec.name);
            package::build_package(
                archive_path,
                source_root,
                &spec.source_dirs_to_exclude,
                spec.add_init_at_root,
            )?;
            log_status!("deploy", "Created package '{}'", spec.name);

            if let Some(lib_path) = &self.config.lib_path {
                package::merge_library_archives(
                    archive_path,
                    Path::new(lib_path),
                    &spec.libs_to_exclude,
                    &spec.libs_to_include,
                )?;
                log_status!("deploy", "Added libraries to package '{}'", spec.name);
            }
        }
        Ok(StepOutcome::Succeeded)
    }

    fn init_clients(&mut self) -> Result<StepOutcome> {
        if self.clients.is_none() {
            match &self.config.profile {
                Some(profile) => log_status!("deploy", "Using provider profile '{}'", profile),
                None => log_status!("deploy", "Using default provider credentials"),
            }
            self.clients = Some(ProviderClients::connect(self.config.profile.as_deref()));
        }
        Ok(StepOutcome::Succeeded)
    }

    fn upload_packages(&mut self) -> Result<StepOutcome> {
        if !self.config.options.upload_packages {
            return Ok(StepOutcome::Skipped);
        }
        let clients = require_clients(&self.clients)?;
        for spec in &self.config.packages {
            let (bucket, key) = spec.upload_target()?;
            publish::publish_file(
                clients.object_store.as_ref(),
                Path::new(&spec.name),
                bucket,
                key,
            )?;
            log_status!(
                "deploy",
                "Uploaded package '{}' to '{}/{}'",
                spec.name,
                bucket,
                key
            );
        }
        Ok(StepOutcome::Succeeded)
    }

    fn create_stacks(&mut self) -> Result<StepOutcome> {
        if !self.config.options.create_stacks {
            return Ok(StepOutcome::Skipped);
        }
        let clients = require_clients(&self.clients)?;
        let provisioner = StackProvisioner::new(clients.provisioner.as_ref());
        for spec in &self.config.stacks {
            log_status!("deploy", "Creating stack '{}'", spec.name);
            let stack_id = provisioner.submit(spec)?;
            log_status!("deploy", "Stack '{}' submitted as '{}'", spec.name, stack_id);
            provisioner.await_create_complete(&spec.name, &spec.region)?;
            log_status!("deploy", "Stack '{}' created", spec.name);
        }
        Ok(StepOutcome::Succeeded)
    }

    fn collect_stack_outputs(&mut self) -> Result<StepOutcome> {
        if !self.config.options.collect_stack_outputs {
            return Ok(StepOutcome::Skipped);
        }
        let clients = require_clients(&self.clients)?;
        let provisioner = StackProvisioner::new(clients.provisioner.as_ref());
        for spec in &self.config.stacks {
            let outputs = provisioner.collect_outputs(&spec.name, &spec.region)?;
            log_status!(
                "deploy",
                "Collected {} output(s) from stack '{}'",
                outputs.len(),
                spec.name
            );
            self.state.record_outputs(&spec.name, outputs);
        }
        Ok(StepOutcome::Succeeded)
    }

    fn upload_static_artifacts(&mut self) -> Result<StepOutcome> {
        if !self.config.options.upload_static_artifacts {
            return Ok(StepOutcome::Skipped);
        }
        let clients = require_clients(&self.clients)?;
        for spec in &self.config.static_artifacts {
            let has_outputs = self
                .state
                .outputs_for(&spec.stack_name)
                .is_some_and(|outputs| !outputs.is_empty());
            if !has_outputs {
                log_status!(
                    "deploy",
                    "No outputs recorded for stack '{}', skipping '{}'",
                    spec.stack_name,
                    spec.static_path
                );
                continue;
            }

            let value = self
                .state
                .lookup_output(&spec.stack_name, &spec.output_key)
                .ok_or_else(|| {
                    Error::Config(format!(
                        "Stack '{}' has no output '{}'",
                        spec.stack_name, spec.output_key
                    ))
                })?;
            let bucket = state::bucket_name_from_output(value);
            log_status!(
                "deploy",
                "Uploading static artifacts from '{}' to bucket '{}'",
                spec.static_path,
                bucket
            );
            publish::publish_directory(
                clients.object_store.as_ref(),
                Path::new(&spec.static_path),
                bucket,
            )?;
        }
        Ok(StepOutcome::Succeeded)
    }
}

fn require_clients(clients: &Option<ProviderClients>) -> Result<&ProviderClients> {
    clients
        .as_ref()
        .ok_or_else(|| Error::Other("Provider clients not initialized".to_string()))
}
