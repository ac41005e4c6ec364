//! Foreign key dependency ordering for table creation and removal

use std::collections::HashMap;

use tracing::warn;

use crate::schema::types::{Table, TableKey};

/// Order tables so referenced (parent) tables come before the tables referencing them.
///
/// Ties keep the input order. On a cycle the input order is returned unchanged.
pub fn creation_order<'t>(tables: Vec<&'t Table>, default_schema: Option<&str>) -> Vec<&'t Table> {
    order(tables, default_schema, false)
}

/// Order tables so referencing (child) tables come before the tables they reference
pub fn removal_order<'t>(tables: Vec<&'t Table>, default_schema: Option<&str>) -> Vec<&'t Table> {
    order(tables, default_schema, true)
}

fn order<'t>(tables: Vec<&'t Table>, default_schema: Option<&str>, children_first: bool) -> Vec<&'t Table> {
    let positions: HashMap<TableKey, usize> = tables
        .iter()
        .enumerate()
        .map(|(i, table)| (table.key(), i))
        .collect();

    // edges[i] lists the nodes that must come after node i
    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); tables.len()];
    let mut in_degree = vec![0usize; tables.len()];
    for (child, table) in tables.iter().enumerate() {
        for parent_key in table.referenced_tables(default_schema) {
            if let Some(&parent) = positions.get(&parent_key) {
                let (before, after) = if children_first {
                    (child, parent)
                } else {
                    (parent, child)
                };
                if !edges[before].contains(&after) {
                    edges[before].push(after);
                    in_degree[after] += 1;
                }
            }
        }
    }

    // Kahn's algorithm, always releasing the earliest ready node
    let mut placed = vec![false; tables.len()];
    let mut ordered = Vec::with_capacity(tables.len());
    while ordered.len() < tables.len() {
        let next = (0..tables.len()).find(|&i| !placed[i] && in_degree[i] == 0);
        let Some(next) = next else {
            let cyclic: Vec<String> = (0..tables.len())
                .filter(|&i| !placed[i])
                .map(|i| tables[i].key().to_string())
                .collect();
            warn!(
                tables = %cyclic.join(", "),
                "Circular foreign key dependency detected; falling back to declaration order"
            );
            return tables;
        };
        placed[next] = true;
        ordered.push(next);
        for &after in &edges[next] {
            in_degree[after] -= 1;
        }
    }

    ordered.into_iter().map(|i| tables[i]).collect()
}
