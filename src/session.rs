//! Caller-held "Get Node" session state.
//!
//! The session never computes node or parameter data itself; it only records
//! what bridge replies said. Replies carry the document/node they were
//! requested for, and replies that no longer match the current selection are
//! dropped.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::bridge::ParameterReading;

/// What is missing before a set can be issued
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Please select a Houdini file.")]
    NoDocument,
    #[error("Please select a node.")]
    NoNode,
    #[error("Please select a parameter.")]
    NoParameter,
}

/// A fully specified set request built from the current selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterEdit {
    pub document: PathBuf,
    pub node: String,
    pub parameter: String,
    pub value: String,
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    document: Option<PathBuf>,
    nodes: Vec<String>,
    selected_node: Option<String>,
    parameter_names: Vec<String>,
    /// Node the parameter list was fetched for
    parameters_for: Option<String>,
    selected_parameter: Option<String>,
    last_value: Option<ParameterReading>,
    pending_value: String,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(&self) -> Option<&Path> {
        self.document.as_deref()
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn selected_node(&self) -> Option<&str> {
        self.selected_node.as_deref()
    }

    /// Parameters of the selected node; empty until fetched for that node
    pub fn parameter_names(&self) -> &[String] {
        if self.parameters_for.is_some() && self.parameters_for == self.selected_node {
            &self.parameter_names
        } else {
            &[]
        }
    }

    pub fn selected_parameter(&self) -> Option<&str> {
        self.selected_parameter.as_deref()
    }

    pub fn last_value(&self) -> Option<&ParameterReading> {
        self.last_value.as_ref()
    }

    pub fn pending_value(&self) -> &str {
        &self.pending_value
    }

    /// Switch documents. Everything derived from the old one is dropped.
    pub fn set_document(&mut self, document: impl Into<PathBuf>) {
        let document = document.into();
        if self.document.as_ref() == Some(&document) {
            return;
        }
        debug!(document = %document.display(), "Session document changed");
        *self = Self {
            document: Some(document),
            pending_value: std::mem::take(&mut self.pending_value),
            ..Self::default()
        };
    }

    /// Record a node listing and select its first entry.
    ///
    /// Returns the newly selected node, which needs its parameters fetched.
    pub fn apply_nodes(&mut self, document: &Path, nodes: Vec<String>) -> Option<&str> {
        if self.document.as_deref() != Some(document) {
            debug!(document = %document.display(), "Dropping node list for another document");
            return None;
        }
        self.nodes = nodes;
        let first = self.nodes.first().cloned();
        self.change_node(first);
        self.selected_node.as_deref()
    }

    /// Select a node from the current listing; returns false if it isn't listed.
    pub fn select_node(&mut self, node: &str) -> bool {
        if !self.nodes.iter().any(|n| n == node) {
            return false;
        }
        if self.selected_node.as_deref() != Some(node) {
            self.change_node(Some(node.to_string()));
        }
        true
    }

    fn change_node(&mut self, node: Option<String>) {
        self.selected_node = node;
        self.parameter_names.clear();
        self.parameters_for = None;
        self.selected_parameter = None;
        self.last_value = None;
    }

    /// Record a parameter listing. Lists for a document or node that is no
    /// longer selected are ignored. The first parameter becomes selected.
    pub fn apply_parameters(&mut self, document: &Path, node: &str, names: Vec<String>) -> bool {
        if self.document.as_deref() != Some(document) || self.selected_node.as_deref() != Some(node)
        {
            debug!(document = %document.display(), node, "Dropping stale parameter list");
            return false;
        }
        self.selected_parameter = names.first().cloned();
        self.parameter_names = names;
        self.parameters_for = Some(node.to_string());
        self.last_value = None;
        true
    }

    pub fn select_parameter(&mut self, name: &str) -> bool {
        if !self.parameter_names().iter().any(|p| p == name) {
            return false;
        }
        if self.selected_parameter.as_deref() != Some(name) {
            self.selected_parameter = Some(name.to_string());
            self.last_value = None;
        }
        true
    }

    /// Record a fetched value if it still matches the selection
    pub fn apply_value(
        &mut self,
        document: &Path,
        node: &str,
        parameter: &str,
        reading: ParameterReading,
    ) -> bool {
        if !self.is_current(document, node, parameter) {
            debug!(document = %document.display(), node, parameter, "Dropping stale value");
            return false;
        }
        self.last_value = Some(reading);
        true
    }

    pub fn set_pending_value(&mut self, value: impl Into<String>) {
        self.pending_value = value.into();
    }

    /// Build a set request from the current selection and pending text.
    pub fn edit(&self) -> Result<ParameterEdit, SelectionError> {
        let document = self.document.clone().ok_or(SelectionError::NoDocument)?;
        let node = self.selected_node.clone().ok_or(SelectionError::NoNode)?;
        let parameter = self
            .selected_parameter
            .clone()
            .filter(|_| self.parameters_for.as_deref() == Some(node.as_str()))
            .ok_or(SelectionError::NoParameter)?;
        Ok(ParameterEdit {
            document,
            node,
            parameter,
            value: self.pending_value.clone(),
        })
    }

    /// A saved edit becomes the displayed value when the selection is unchanged
    pub fn apply_saved(&mut self, edit: &ParameterEdit) -> bool {
        if !self.is_current(&edit.document, &edit.node, &edit.parameter) {
            return false;
        }
        self.last_value = Some(ParameterReading::Value(edit.value.clone()));
        true
    }

    fn is_current(&self, document: &Path, node: &str, parameter: &str) -> bool {
        self.document.as_deref() == Some(document)
            && self.selected_node.as_deref() == Some(node)
            && self.selected_parameter.as_deref() == Some(parameter)
    }
}
