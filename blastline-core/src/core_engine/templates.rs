//! Template Store
//!
//! In-memory table of message templates keyed by id. Ids start at 1, only
//! grow, and are never handed out again after a delete.

use crate::core_engine::errors::{TemplateError, TemplateResult};
use crate::core_engine::render;
use crate::core_engine::types::Template;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

struct TemplateTable {
    next_id: u64,
    records: BTreeMap<u64, Template>,
}

pub struct TemplateStore {
    table: RwLock<TemplateTable>,
}

/// Parse a caller-supplied id. Non-numeric, zero and negative ids are rejected.
pub fn parse_template_id(raw: &str) -> TemplateResult<i64> {
    let id = raw.trim().parse::<i64>().map_err(|_| TemplateError::InvalidId(raw.to_string()))?;
    validate_id(id).map(|_| id)
}

fn validate_id(id: i64) -> TemplateResult<u64> {
    if id <= 0 {
        return Err(TemplateError::InvalidId(id.to_string()));
    }
    Ok(id as u64)
}

impl TemplateStore {
    pub fn new() -> Self {
        Self { table: RwLock::new(TemplateTable { next_id: 1, records: BTreeMap::new() }) }
    }

    pub fn create(&self, title: impl Into<String>, content: impl Into<String>) -> Template {
        let mut table = self.table.write();
        let id = table.next_id;
        table.next_id += 1;

        let template = Template { id, title: title.into(), content: content.into() };
        table.records.insert(id, template.clone());
        info!(id, title = %template.title, "Template created");
        template
    }

    /// All templates, ordered by id
    pub fn list(&self) -> Vec<Template> {
        self.table.read().records.values().cloned().collect()
    }

    pub fn get(&self, id: i64) -> TemplateResult<Template> {
        let id = validate_id(id)?;
        self.table.read().records.get(&id).cloned().ok_or(TemplateError::NotFound(id))
    }

    /// Replace title and content in place; the id is unchanged
    pub fn update(
        &self,
        id: i64,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> TemplateResult<Template> {
        let id = validate_id(id)?;
        let mut table = self.table.write();
        let record = table.records.get_mut(&id).ok_or(TemplateError::NotFound(id))?;
        record.title = title.into();
        record.content = content.into();
        debug!(id, "Template updated");
        Ok(record.clone())
    }

    pub fn delete(&self, id: i64) -> TemplateResult<()> {
        let id = validate_id(id)?;
        self.table.write().records.remove(&id).ok_or(TemplateError::NotFound(id))?;
        info!(id, "Template deleted");
        Ok(())
    }

    /// Render arbitrary content
    pub fn render(
        &self,
        content: &str,
        variables: &HashMap<String, String>,
    ) -> TemplateResult<String> {
        Ok(render::render(content, variables)?)
    }

    /// Look up a stored template and render its content
    pub fn render_template(
        &self,
        id: i64,
        variables: &HashMap<String, String>,
    ) -> TemplateResult<String> {
        let template = self.get(id)?;
        self.render(&template.content, variables)
    }

    pub fn len(&self) -> usize {
        self.table.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::new()
    }
}
