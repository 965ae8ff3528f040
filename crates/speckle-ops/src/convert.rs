//! Host conversion collaborator.
//!
//! Host applications turn received nodes into native objects. The core only
//! walks the graph and asks the converter, node by node, whether it can
//! handle what it sees.

use std::collections::HashSet;
use std::fmt::Display;

use tracing::{debug, warn};

use speckle_types::{Base, NodeRef, Value};

/// Converts interchange nodes into host-native objects.
pub trait ToNativeConverter {
    type Native;
    type Error: Display;

    fn can_convert_to_native(&self, node: &Base) -> bool;

    fn convert_to_native(&self, node: &Base) -> Result<Self::Native, Self::Error>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversionFailure {
    pub speckle_type: String,
    pub application_id: Option<String>,
    pub message: String,
}

/// What [`convert_tree`] did with each node it reached.
#[derive(Debug)]
pub struct ConversionReport<N> {
    pub converted: Vec<N>,
    /// Types of nodes the converter declined and whose members were walked instead.
    pub skipped: Vec<String>,
    pub failed: Vec<ConversionFailure>,
}

impl<N> Default for ConversionReport<N> {
    fn default() -> Self {
        Self {
            converted: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<N> ConversionReport<N> {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Walk `root` depth-first and convert every node the converter accepts.
///
/// An accepted node is converted as a whole and its members are not
/// visited; the converter owns that subtree. Declined nodes are traversed.
/// Shared nodes are visited once. A failure is recorded and the walk goes on.
pub fn convert_tree<C: ToNativeConverter>(root: &NodeRef, converter: &C) -> ConversionReport<C::Native> {
    let mut report = ConversionReport::default();
    let mut visited = HashSet::new();
    visit_node(root, converter, &mut visited, &mut report);
    debug!(
        converted = report.converted.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "conversion finished"
    );
    report
}

fn visit_node<C: ToNativeConverter>(
    node: &NodeRef,
    converter: &C,
    visited: &mut HashSet<usize>,
    report: &mut ConversionReport<C::Native>,
) {
    if !visited.insert(node.addr()) {
        return;
    }
    let base = node.read();
    if converter.can_convert_to_native(&base) {
        match converter.convert_to_native(&base) {
            Ok(native) => report.converted.push(native),
            Err(e) => {
                warn!(speckle_type = base.speckle_type(), error = %e, "conversion failed");
                report.failed.push(ConversionFailure {
                    speckle_type: base.speckle_type().to_string(),
                    application_id: base.application_id().map(str::to_string),
                    message: e.to_string(),
                });
            }
        }
        return;
    }
    report.skipped.push(base.speckle_type().to_string());
    for (_, value) in base.dynamic_members() {
        visit_value(value, converter, visited, report);
    }
}

fn visit_value<C: ToNativeConverter>(
    value: &Value,
    converter: &C,
    visited: &mut HashSet<usize>,
    report: &mut ConversionReport<C::Native>,
) {
    match value {
        Value::Node(node) => visit_node(node, converter, visited, report),
        Value::List(items) => {
            for item in items {
                visit_value(item, converter, visited, report);
            }
        }
        Value::Map(map) => {
            for item in map.values() {
                visit_value(item, converter, visited, report);
            }
        }
        _ => {}
    }
}
