//! The template store: sole owner of every [`WorkflowTemplate`].
//!
//! Templates live in an arena keyed by id and kept in insertion order, which
//! is the "encounter order" the matcher relies on for ties. Every mutating
//! call runs under one mutex, applies the change to a copy, persists the copy
//! and only then swaps it in, so memory never runs ahead of disk.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::error::EngineError;
use crate::matcher::{TemplateMatch, TemplateMatcher};
use crate::persistence::DocumentStore;
use crate::workflow::{Case, WorkflowTemplate};

#[derive(Debug, Clone, Default)]
struct Arena {
    templates: Vec<WorkflowTemplate>,
    index: HashMap<String, usize>,
}

impl Arena {
    fn from_templates(templates: Vec<WorkflowTemplate>) -> Self {
        let index = templates
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();
        Self { templates, index }
    }

    fn get(&self, id: &str) -> Option<&WorkflowTemplate> {
        self.index.get(id).map(|&i| &self.templates[i])
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut WorkflowTemplate> {
        self.index.get(id).map(|&i| &mut self.templates[i])
    }

    fn upsert(&mut self, template: WorkflowTemplate) {
        match self.index.get(&template.id) {
            Some(&i) => self.templates[i] = template,
            None => {
                self.index.insert(template.id.clone(), self.templates.len());
                self.templates.push(template);
            }
        }
    }
}

pub struct TemplateStore {
    arena: Mutex<Arena>,
    persistence: Box<dyn DocumentStore<WorkflowTemplate>>,
}

impl TemplateStore {
    /// Load all templates from `persistence`.
    pub fn open(persistence: Box<dyn DocumentStore<WorkflowTemplate>>) -> Result<Self, EngineError> {
        let templates = persistence.load()?;
        tracing::info!(count = templates.len(), "Loaded workflow templates");
        Ok(Self {
            arena: Mutex::new(Arena::from_templates(templates)),
            persistence,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Arena>, EngineError> {
        self.arena
            .lock()
            .map_err(|_| EngineError::LockPoisoned("template store"))
    }

    // Apply `change` to a copy, persist it, then commit.
    fn commit<R>(
        &self,
        change: impl FnOnce(&mut Arena) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        let mut arena = self.lock()?;
        let mut next = arena.clone();
        let result = change(&mut next)?;
        if let Err(e) = self.persistence.save(&next.templates) {
            tracing::error!(error = %e, "Failed to persist workflow templates");
            return Err(e);
        }
        *arena = next;
        Ok(result)
    }

    /// Add `template`, replacing any stored template with the same id in
    /// place. Nothing changes in memory if the write fails.
    pub fn insert(&self, template: WorkflowTemplate) -> Result<(), EngineError> {
        let name = template.name.clone();
        self.commit(|arena| {
            arena.upsert(template);
            Ok(())
        })?;
        tracing::info!(template = %name, "Saved workflow template");
        Ok(())
    }

    /// Apply `f` to the template with `id` and persist the result.
    pub fn update(
        &self,
        id: &str,
        f: impl FnOnce(&mut WorkflowTemplate),
    ) -> Result<WorkflowTemplate, EngineError> {
        self.commit(|arena| {
            let template = arena
                .get_mut(id)
                .ok_or_else(|| EngineError::TemplateNotFound(id.to_string()))?;
            f(template);
            Ok(template.clone())
        })
    }

    /// Fold one replay outcome into the template's usage statistics.
    pub fn record_replay_outcome(
        &self,
        id: &str,
        succeeded: bool,
        now: DateTime<Utc>,
    ) -> Result<WorkflowTemplate, EngineError> {
        self.update(id, |template| template.record_outcome(succeeded, now))
    }

    /// Snapshot of the template with `id`; edits to it are not stored.
    pub fn get(&self, id: &str) -> Result<Option<WorkflowTemplate>, EngineError> {
        Ok(self.lock()?.get(id).cloned())
    }

    pub fn contains(&self, id: &str) -> Result<bool, EngineError> {
        Ok(self.lock()?.index.contains_key(id))
    }

    /// Snapshot of all templates in insertion order, the order ties are
    /// ranked in.
    pub fn list(&self) -> Result<Vec<WorkflowTemplate>, EngineError> {
        Ok(self.lock()?.templates.clone())
    }

    pub fn len(&self) -> Result<usize, EngineError> {
        Ok(self.lock()?.templates.len())
    }

    pub fn is_empty(&self) -> Result<bool, EngineError> {
        Ok(self.len()? == 0)
    }

    /// Templates that fit `case`, best first.
    pub fn find_matching(&self, case: &Case) -> Result<Vec<TemplateMatch>, EngineError> {
        let arena = self.lock()?;
        Ok(TemplateMatcher::rank(&arena.templates, case))
    }

    /// Mean success rate across templates; zero for an empty store.
    pub fn average_success_rate(&self) -> Result<f64, EngineError> {
        let arena = self.lock()?;
        if arena.templates.is_empty() {
            return Ok(0.0);
        }
        let sum: f64 = arena.templates.iter().map(|t| t.success_rate).sum();
        Ok(sum / arena.templates.len() as f64)
    }
}
