//! Run state shared across pipeline steps.
//!
//! Owned by the deployer for the duration of one run; never persisted.

use std::collections::HashMap;

use crate::provider::StackOutput;

#[derive(Debug, Default)]
pub struct RunState {
    stacks: HashMap<String, Vec<StackOutput>>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_outputs(&mut self, stack_name: &str, outputs: Vec<StackOutput>) {
        self.stacks.insert(stack_name.to_string(), outputs);
    }

    pub fn outputs_for(&self, stack_name: &str) -> Option<&[StackOutput]> {
        self.stacks.get(stack_name).map(|outputs| outputs.as_slice())
    }

    /// Exact-match lookup of one output value. The provider controls the
    /// source data, so if a key somehow repeats, the first match wins.
    pub fn lookup_output(&self, stack_name: &str, output_key: &str) -> Option<&str> {
        self.stacks
            .get(stack_name)?
            .iter()
            .find(|output| output.key == output_key)
            .map(|output| output.value.as_str())
    }
}

/// Resolve a bucket name from a stack output value.
///
/// Output values may be plain bucket names or colon-separated resource
/// identifiers; the name is the final segment either way.
pub fn bucket_name_from_output(value: &str) -> &str {
    value.rsplit(':').next().unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(key: &str, value: &str) -> StackOutput {
        StackOutput {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn lookup_returns_recorded_value() {
        let mut state = RunState::new();
        state.record_outputs("app", vec![output("Bucket", "assets-bucket")]);

        assert_eq!(state.lookup_output("app", "Bucket"), Some("assets-bucket"));
        assert_eq!(state.lookup_output("app", "Missing"), None);
        assert_eq!(state.lookup_output("other", "Bucket"), None);
    }

    #[test]
    fn first_match_wins_on_repeated_keys() {
        let mut state = RunState::new();
        state.record_outputs(
            "app",
            vec![output("Bucket", "first"), output("Bucket", "second")],
        );

        assert_eq!(state.lookup_output("app", "Bucket"), Some("first"));
    }

    #[test]
    fn recording_again_replaces_previous_outputs() {
        let mut state = RunState::new();
        state.record_outputs("app", vec![output("Bucket", "old")]);
        state.record_outputs("app", vec![output("Bucket", "new")]);

        assert_eq!(state.lookup_output("app", "Bucket"), Some("new"));
    }

    #[test]
    fn bucket_name_resolution_strips_identifier_prefixes() {
        assert_eq!(
            bucket_name_from_output("arn:aws:s3:::assets-bucket"),
            "assets-bucket"
        );
        assert_eq!(bucket_name_from_output("assets-bucket"), "assets-bucket");
    }
}
