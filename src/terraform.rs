//! Terraform export
//!
//! Best-effort rendering of a resolved management group as an
//! `azurerm_management_group` block. Other node types are reported as
//! unsupported rather than failing.

use crate::resource::identity::ResourceKind;
use crate::resource::node::ResourceNode;
use anyhow::{Context, Result};
use regex::Regex;
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Export {
    Rendered(String),
    Unsupported { resource_type: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Written,
    /// Destination exists, nothing written
    AlreadyExists,
    Unsupported,
}

fn subscription_type_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)/subscriptions$")
            .unwrap_or_else(|e| panic!("Invalid subscription type pattern: {}", e))
    })
}

/// Escape a value for a double-quoted HCL string
fn hcl_string(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace("${", "$${");
    format!("\"{}\"", escaped)
}

/// Terraform block label for a resource name. Characters outside
/// `[A-Za-z0-9_-]` become `_`, and a label must not start with a digit or `-`.
fn terraform_label(name: &str) -> String {
    let mut label: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !label.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        label.insert(0, '_');
    }
    label
}

pub fn export(node: &ResourceNode) -> Export {
    if ResourceKind::from_type(&node.resource_type) != ResourceKind::ManagementGroup {
        return Export::Unsupported {
            resource_type: node.resource_type.clone(),
        };
    }

    let subscription_ids: Vec<&str> = node
        .children
        .iter()
        .filter(|c| subscription_type_pattern().is_match(&c.resource_type))
        .filter(|c| {
            c.declared_parent()
                .is_some_and(|p| p.eq_ignore_ascii_case(&node.id))
        })
        .map(|c| c.id.as_str())
        .collect();

    let mut out = String::new();
    let _ = writeln!(
        out,
        "resource \"azurerm_management_group\" \"{}\" {{",
        terraform_label(&node.name)
    );
    let _ = writeln!(out, "  display_name = {}", hcl_string(node.display_name()));
    if !node.parent.is_empty() {
        let _ = writeln!(
            out,
            "  parent_management_group_id = {}",
            hcl_string(&node.parent)
        );
    }
    if subscription_ids.is_empty() {
        let _ = writeln!(out, "  subscription_ids = []");
    } else {
        let _ = writeln!(out, "  subscription_ids = [");
        for id in subscription_ids {
            let _ = writeln!(out, "    {},", hcl_string(id));
        }
        let _ = writeln!(out, "  ]");
    }
    out.push_str("}\n");

    Export::Rendered(out)
}

/// Write the export of `node` to `path` unless something is already there
pub fn save_to_path(node: &ResourceNode, path: &Path) -> Result<SaveOutcome> {
    let Export::Rendered(text) = export(node) else {
        tracing::warn!("No Terraform export for {} ({})", node.id, node.resource_type);
        return Ok(SaveOutcome::Unsupported);
    };

    let file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            tracing::warn!("{} already exists, not overwriting", path.display());
            return Ok(SaveOutcome::AlreadyExists);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to create {}", path.display()));
        }
    };

    write_or_discard(file, path, &text)?;

    tracing::info!("Wrote Terraform for {} to {}", node.id, path.display());
    Ok(SaveOutcome::Written)
}

/// Write `text` into the freshly created `path`. On failure the partial file
/// is removed so a later save can create it again.
fn write_or_discard(mut file: impl Write, path: &Path, text: &str) -> Result<()> {
    let written = file.write_all(text.as_bytes()).and_then(|_| file.flush());
    if let Err(e) = written {
        drop(file);
        if let Err(remove_err) = std::fs::remove_file(path) {
            tracing::warn!("Could not remove partial {}: {}", path.display(), remove_err);
        }
        return Err(e).with_context(|| format!("Failed to write {}", path.display()));
    }
    Ok(())
}
