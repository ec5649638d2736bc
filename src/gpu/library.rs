//! Build-time registration of layouts and snippets

use std::sync::Arc;

use crate::error::{LayoutError, SnippetError};
use crate::gpu::layout::{FieldSpec, Layout, LayoutId, LayoutRegistry};
use crate::gpu::snippet::{SnippetGraph, SnippetId};

/// Layouts and snippets shared by every program the runtime builds
#[derive(Default)]
pub struct ShaderLibrary {
    pub layouts: LayoutRegistry,
    pub snippets: SnippetGraph,
}

impl ShaderLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a shared layout; its WGSL mirror becomes a snippet of the same name
    pub fn define_layout(&mut self, name: &str, fields: Vec<FieldSpec>) -> Result<LayoutId, LayoutError> {
        self.layouts.define(&mut self.snippets, name, fields)
    }

    pub fn layout(&self, id: LayoutId) -> Result<&Arc<Layout>, LayoutError> {
        self.layouts.get(id)
    }

    pub fn register_snippet(
        &mut self,
        name: &str,
        body: &str,
        requires: &[SnippetId],
    ) -> Result<SnippetId, SnippetError> {
        self.snippets.register(name, body, requires)
    }

    /// Look up snippets by name, in order
    pub fn snippets_named(&self, names: &[&str]) -> Result<Vec<SnippetId>, SnippetError> {
        names.iter().map(|name| self.snippets.lookup(name)).collect()
    }
}
