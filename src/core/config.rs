//! Deployment configuration.
//!
//! Loaded once from a JSON file, tilde-expanded, and validated up front so
//! the pipeline never has to re-check field presence mid-run.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::error::{Error, Result};
use crate::utils::io;

/// Feature toggles for the pipeline steps. Every step defaults on except
/// static artifact upload, which is an opt-in post-deploy action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    pub run_unit_tests: bool,
    pub make_packages: bool,
    pub upload_packages: bool,
    pub create_stacks: bool,
    pub collect_stack_outputs: bool,
    pub upload_static_artifacts: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            run_unit_tests: true,
            make_packages: true,
            upload_packages: true,
            create_stacks: true,
            collect_stack_outputs: true,
            upload_static_artifacts: false,
        }
    }
}

/// One source package to archive and upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSpec {
    /// Archive file name, also used as the local artifact path.
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_dirs_to_exclude: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libs_to_include: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libs_to_exclude: Vec<String>,
    #[serde(default)]
    pub add_init_at_root: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_key: Option<String>,
}

impl PackageSpec {
    /// Bucket and key this package uploads to.
    pub fn upload_target(&self) -> Result<(&str, &str)> {
        match (self.src_bucket.as_deref(), self.src_key.as_deref()) {
            (Some(bucket), Some(key)) => Ok((bucket, key)),
            _ => Err(Error::Config(format!(
                "Package '{}' is missing srcBucket or srcKey",
                self.name
            ))),
        }
    }
}

/// One infrastructure stack to provision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackSpec {
    pub name: String,
    pub template_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_params_path: Option<String>,
    /// Inline parameter overrides, merged over the parameters file by key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    pub region: String,
}

/// A local directory republished into a bucket created by an earlier stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticArtifactSpec {
    pub static_path: String,
    /// Name of the stack whose output names the destination bucket.
    pub stack_name: String,
    /// Output key the bucket name is resolved from.
    pub output_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployConfig {
    #[serde(default)]
    pub options: Options,
    pub source_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lib_path: Option<String>,
    /// Provider credential profile, passed to clients at construction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// Override for the unit-test runner command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<PackageSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stacks: Vec<StackSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub static_artifacts: Vec<StaticArtifactSpec>,
}

/// Load a deployment configuration from a JSON file.
pub fn load(path: &Path) -> Result<DeployConfig> {
    let content = io::read_file(path, "read config")?;
    let mut config: DeployConfig = serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("parse config: {}: {}", path.display(), e)))?;
    expand_paths(&mut config);
    config.validate()?;
    Ok(config)
}

fn expand_paths(config: &mut DeployConfig) {
    expand_in_place(&mut config.source_path);
    if let Some(lib_path) = config.lib_path.as_mut() {
        expand_in_place(lib_path);
    }
    for stack in &mut config.stacks {
        expand_in_place(&mut stack.template_path);
        if let Some(params_path) = stack.template_params_path.as_mut() {
            expand_in_place(params_path);
        }
    }
    for artifact in &mut config.static_artifacts {
        expand_in_place(&mut artifact.static_path);
    }
}

fn expand_in_place(path: &mut String) {
    let expanded = shellexpand::tilde(path.as_str()).into_owned();
    *path = expanded;
}

impl DeployConfig {
    /// Validate the configuration once, up front.
    ///
    /// Requirements are checked against the enabled steps, so a disabled
    /// step never blocks a run over fields it would not read.
    pub fn validate(&self) -> Result<()> {
        if (self.options.run_unit_tests || self.options.make_packages)
            && self.source_path.trim().is_empty()
        {
            return Err(Error::Config("Missing sourcePath".to_string()));
        }

        let mut package_names = HashSet::new();
        for package in &self.packages {
            if package.name.trim().is_empty() {
                return Err(Error::Config("Package with empty name".to_string()));
            }
            if !package_names.insert(package.name.as_str()) {
                return Err(Error::Config(format!(
                    "Duplicate package name '{}'",
                    package.name
                )));
            }
            if self.options.upload_packages {
                package.upload_target()?;
            }
        }

        let mut stack_names = HashSet::new();
        for stack in &self.stacks {
            if stack.name.trim().is_empty()
                || stack.template_path.trim().is_empty()
                || stack.region.trim().is_empty()
            {
                return Err(Error::Config(format!(
                    "Stack '{}' is missing name, templatePath, or region",
                    stack.name
                )));
            }
            if !stack_names.insert(stack.name.as_str()) {
                return Err(Error::Config(format!(
                    "Duplicate stack name '{}'",
                    stack.name
                )));
            }
        }

        for artifact in &self.static_artifacts {
            if artifact.static_path.trim().is_empty()
                || artifact.stack_name.trim().is_empty()
                || artifact.output_key.trim().is_empty()
            {
                return Err(Error::Config(
                    "Static artifact is missing staticPath, stackName, or outputKey".to_string(),
                ));
            }
            if !stack_names.contains(artifact.stack_name.as_str()) {
                return Err(Error::Config(format!(
                    "Static artifact references unknown stack '{}'",
                    artifact.stack_name
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> &'static str {
        r#"{"sourcePath": "src"}"#
    }

    #[test]
    fn options_default_on_except_static_artifacts() {
        let config: DeployConfig = serde_json::from_str(minimal_json()).unwrap();
        assert!(config.options.run_unit_tests);
        assert!(config.options.make_packages);
        assert!(config.options.upload_packages);
        assert!(config.options.create_stacks);
        assert!(config.options.collect_stack_outputs);
        assert!(!config.options.upload_static_artifacts);
    }

    #[test]
    fn explicit_option_overrides_default() {
        let config: DeployConfig = serde_json::from_str(
            r#"{"sourcePath": "src", "options": {"runUnitTests": false}}"#,
        )
        .unwrap();
        assert!(!config.options.run_unit_tests);
        assert!(config.options.make_packages);
    }

    #[test]
    fn validate_rejects_duplicate_stack_names() {
        let config: DeployConfig = serde_json::from_str(
            r#"{
                "sourcePath": "src",
                "stacks": [
                    {"name": "app", "templatePath": "a.json", "region": "eu-west-1"},
                    {"name": "app", "templatePath": "b.json", "region": "eu-west-1"}
                ]
            }"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
        assert!(err.to_string().contains("Duplicate stack name"));
    }

    #[test]
    fn validate_rejects_static_artifact_with_unknown_stack() {
        let config: DeployConfig = serde_json::from_str(
            r#"{
                "sourcePath": "src",
                "stacks": [
                    {"name": "app", "templatePath": "a.json", "region": "eu-west-1"}
                ],
                "staticArtifacts": [
                    {"staticPath": "web", "stackName": "missing", "outputKey": "Bucket"}
                ]
            }"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unknown stack 'missing'"));
    }

    #[test]
    fn validate_requires_upload_target_when_uploads_enabled() {
        let config: DeployConfig = serde_json::from_str(
            r#"{"sourcePath": "src", "packages": [{"name": "app.zip"}]}"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("srcBucket or srcKey"));
    }

    #[test]
    fn validate_allows_missing_upload_target_when_uploads_disabled() {
        let config: DeployConfig = serde_json::from_str(
            r#"{
                "sourcePath": "src",
                "options": {"uploadPackages": false},
                "packages": [{"name": "app.zip"}]
            }"#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_requires_stack_region() {
        let config: DeployConfig = serde_json::from_str(
            r#"{
                "sourcePath": "src",
                "stacks": [{"name": "app", "templatePath": "a.json", "region": ""}]
            }"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}
