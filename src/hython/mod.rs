//! Houdini transport
//!
//! Each request becomes a generated Python script run by `hython`; the reply
//! is recovered from marker-delimited blocks on stdout.

pub mod locator;
pub mod markers;
pub mod script;

pub use locator::resolve_interpreter;
pub use markers::{MarkerPair, MissingMarker};
pub use script::{py_literal, INVALID_VALUE_EXIT_CODE, MISSING_PARAMETER_EXIT_CODE};

use std::path::Path;

use tracing::warn;

use crate::bridge::{ParameterReading, Request, Response, Transport};
use crate::config::{BridgeConfig, Config, MissingParameterPolicy};
use crate::error::{BridgeError, Result};
use crate::executor::{CancelToken, ScriptRunner};

/// Marker-framed stdout transport over one-shot hython processes
#[derive(Debug, Clone)]
pub struct HythonTransport {
    runner: ScriptRunner,
    strict_output: bool,
    missing_parameter: MissingParameterPolicy,
}

impl HythonTransport {
    pub fn new(runner: ScriptRunner, bridge: &BridgeConfig) -> Self {
        Self {
            runner,
            strict_output: bridge.strict_output,
            missing_parameter: bridge.missing_parameter,
        }
    }

    /// Locate the interpreter and apply bridge settings from config.
    pub fn from_config(config: &Config) -> Result<Self> {
        let interpreter = resolve_interpreter(&config.paths)?;
        let runner = ScriptRunner::new(interpreter, config.bridge.timeout())
            .with_leading_args(config.bridge.interpreter_args.clone())
            .with_script_dir(config.bridge.script_dir());
        Ok(Self::new(runner, &config.bridge))
    }

    pub fn interpreter(&self) -> &Path {
        self.runner.interpreter()
    }

    pub fn runner(&self) -> &ScriptRunner {
        &self.runner
    }

    fn generate(&self, request: &Request) -> String {
        match request {
            Request::ListNodes { document } => script::list_nodes(document),
            Request::ListParameters { document, node } => script::list_parameters(document, node),
            Request::GetParameterValue {
                document,
                node,
                parameter,
            } => script::get_parameter_value(document, node, parameter),
            Request::SetParameterValue {
                document,
                node,
                parameter,
                value,
            } => script::set_parameter_value(
                document,
                node,
                parameter,
                value,
                self.missing_parameter,
            ),
        }
    }

    fn decode_list(&self, stdout: &str, pair: MarkerPair, operation: &'static str) -> Result<Vec<String>> {
        match markers::parse_list(stdout, pair) {
            Ok(items) => Ok(items),
            Err(missing) => self.degrade(missing, operation).map(|()| Vec::new()),
        }
    }

    fn decode_value(&self, stdout: &str, operation: &'static str) -> Result<ParameterReading> {
        match markers::parse_scalar(stdout, markers::PARM_VALUE) {
            Ok(value) => Ok(ParameterReading::Value(value)),
            Err(missing) => self
                .degrade(missing, operation)
                .map(|()| ParameterReading::Unavailable),
        }
    }

    /// Missing markers: an error in strict mode, otherwise a warning
    fn degrade(&self, missing: MissingMarker, operation: &'static str) -> Result<()> {
        if self.strict_output {
            return Err(BridgeError::MalformedOutput {
                operation,
                marker: missing.marker(),
            });
        }
        warn!(
            operation,
            marker = missing.marker(),
            "Interpreter output has no result block, using empty result"
        );
        Ok(())
    }
}

impl Transport for HythonTransport {
    fn call(&self, request: &Request, cancel: &CancelToken) -> Result<Response> {
        let operation = request.operation();
        let source = self.generate(request);
        let document = request.document().to_string_lossy();

        let output = self.runner.run(&source, &document, cancel)?;

        match request {
            Request::ListNodes { .. } => self
                .decode_list(&output.stdout, markers::NODE_LIST, operation)
                .map(Response::Nodes),
            Request::ListParameters { .. } => self
                .decode_list(&output.stdout, markers::PARAM_LIST, operation)
                .map(Response::Parameters),
            Request::GetParameterValue { .. } => self
                .decode_value(&output.stdout, operation)
                .map(Response::Value),
            Request::SetParameterValue { .. } => Ok(Response::Saved),
        }
    }
}
