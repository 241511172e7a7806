use std::collections::{BTreeSet, HashSet};

use tracing::{debug, info};

use crate::error::{GraphError, Result};
use crate::graph::{derive_index_name, IndexDef, IndexKind, ManagementTx};

/// Registers composite indexes in a management transaction.
#[derive(Clone, Copy, Debug, Default)]
pub struct IndexBuilder;

impl IndexBuilder {
    /// Validates every definition against the committed schema, then registers
    /// the ones not yet present. Returns the names of all requested indexes,
    /// including identical ones that already existed.
    ///
    /// # Errors
    ///
    /// [`GraphError::Schema`] before anything is registered when a label or key
    /// is not committed, a key repeats, the index is mixed, the name is not the
    /// derived one, or an index of that name exists with a different shape.
    pub fn build(&self, tx: &mut ManagementTx<'_>, defs: &[IndexDef]) -> Result<BTreeSet<String>> {
        let mut to_register = Vec::new();
        let mut names = BTreeSet::new();
        for def in defs {
            self.validate(tx, def)?;
            match tx.index(&def.name) {
                Some(existing) if existing.same_shape(def) => {
                    debug!(index = %def.name, "bootstrap.index.exists");
                }
                Some(existing) => {
                    return Err(GraphError::schema(format!(
                        "index {} already covers {}({}), not {}({})",
                        def.name,
                        existing.label,
                        existing.keys.join(", "),
                        def.label,
                        def.keys.join(", ")
                    )));
                }
                None if names.contains(&def.name) => {}
                None => to_register.push(def.clone()),
            }
            names.insert(def.name.clone());
        }
        let registered = to_register.len();
        for def in to_register {
            tx.build_index(def)?;
        }
        info!(requested = names.len(), registered, "bootstrap.index.built");
        Ok(names)
    }

    fn validate(&self, tx: &ManagementTx<'_>, def: &IndexDef) -> Result<()> {
        if def.kind == IndexKind::Mixed {
            return Err(GraphError::schema(format!(
                "index {} is mixed; only composite indexes are supported",
                def.name
            )));
        }
        if def.keys.is_empty() {
            return Err(GraphError::schema(format!("index {} has no keys", def.name)));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = def.keys.iter().find(|key| !seen.insert(key.as_str())) {
            return Err(GraphError::schema(format!(
                "index {} lists key {dup} more than once",
                def.name
            )));
        }
        let expected = derive_index_name(&def.label, &def.keys);
        if def.name != expected {
            return Err(GraphError::schema(format!(
                "index name {} does not match its definition, expected {expected}",
                def.name
            )));
        }
        let committed = tx.committed();
        if committed.vertex_label(&def.label).is_none() {
            return Err(GraphError::schema(format!(
                "index {} references undefined vertex label {}",
                def.name, def.label
            )));
        }
        if let Some(key) = def
            .keys
            .iter()
            .find(|key| committed.property_key(key).is_none())
        {
            return Err(GraphError::schema(format!(
                "index {} references undefined property key {key}",
                def.name
            )));
        }
        Ok(())
    }
}
