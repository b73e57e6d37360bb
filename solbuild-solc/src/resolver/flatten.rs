//! Flattening of a file and its transitive imports into a single source

use super::{Graph, Node};
use crate::{error::Result, utils};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};

/// Three or more consecutive line breaks, ignoring trailing whitespace
static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n(?:[ \t]*\n){2,}").unwrap());

impl Graph {
    /// Concatenates the file and everything it imports into a single source
    ///
    /// Imported files come before the files importing them, each one is introduced by a
    /// `// File: <source name>` line. Import directives, version pragmas and license identifiers
    /// are removed from every file. The output starts with the license of the target (or the last
    /// license found) and the first version pragma of the target.
    ///
    /// Fails with the first unresolved import of the closure.
    pub fn flatten(&self, target: usize) -> Result<String> {
        if let Some(failure) = self.edges().closure_failures(target).into_iter().next() {
            return Err(failure.to_error())
        }

        let mut order = Vec::new();
        self.flatten_order(target, &mut HashSet::new(), &mut order);

        let licenses: BTreeSet<&String> =
            order.iter().filter_map(|id| self.node(*id).license().as_ref()).map(|l| l.data()).collect();
        if licenses.len() > 1 {
            tracing::warn!(
                "conflicting licenses in the imports of {}: {:?}",
                self.node(target).path.display(),
                licenses
            );
        }

        let root = self.node(target);
        let license = root
            .license()
            .as_ref()
            .or_else(|| order.iter().rev().find_map(|id| self.node(*id).license().as_ref()));

        let mut flattened = String::new();
        if let Some(license) = license {
            flattened.push_str(&format!("// SPDX-License-Identifier: {}\n", license.data()));
        }
        if let Some(pragma) = root.version() {
            flattened.push_str(&format!("pragma solidity {};\n", pragma.data()));
        }
        for id in order {
            let node = self.node(id);
            let name = utils::slash_path(utils::source_name(&node.path, self.root()));
            flattened.push_str(&format!("\n// File: {name}\n"));
            flattened.push_str(&strip_directives(node));
            flattened.push('\n');
        }

        Ok(format!("{}\n", RE_BLANK_LINES.replace_all(&flattened, "\n\n").trim()))
    }

    /// Post-order over the imports, sorted by path
    fn flatten_order(&self, id: usize, visited: &mut HashSet<usize>, order: &mut Vec<usize>) {
        if !visited.insert(id) {
            return
        }
        let mut imports = self.imported_nodes(id).to_vec();
        imports.sort_by(|a, b| self.node(*a).path.cmp(&self.node(*b).path));
        for import in imports {
            self.flatten_order(import, visited, order);
        }
        order.push(id);
    }
}

/// Returns the content without imports, version pragmas and the license identifier
fn strip_directives(node: &Node) -> String {
    let mut ranges = node
        .imports()
        .iter()
        .map(|import| import.loc())
        .chain(node.data.pragmas.iter().map(|pragma| pragma.loc()))
        .chain(node.license().iter().map(|license| license.loc()))
        .collect::<Vec<_>>();
    ranges.sort_unstable();

    let content = node.content();
    let mut stripped = String::with_capacity(content.len());
    let mut pos = 0;
    for (start, end) in ranges {
        if start < pos {
            continue
        }
        stripped.push_str(&content[pos..start]);
        pos = end;
    }
    stripped.push_str(&content[pos..]);
    stripped
}
