// Plugin hooks around the collect and resolve phases

pub mod endpoint_linker;
pub mod file_links;

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::Config;
use crate::index::db::SymbolStore;
use crate::indexer::LanguageModule;

/// Names accepted by [`create_plugin`]
pub const BUILTIN: &[&str] = &["file_links", "endpoint_linker"];

/// Pipeline hook points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    BeforeCollect,
    AfterCollect,
    AfterResolve,
}

/// What a hook gets to see. `stats` is shared by every plugin in the run.
pub struct PluginContext<'a> {
    pub config: &'a Config,
    pub root: &'a Path,
    pub store: &'a SymbolStore,
    pub modules: &'a [Box<dyn LanguageModule>],
    pub stats: &'a mut BTreeMap<String, usize>,
}

impl PluginContext<'_> {
    /// Add `n` to a shared counter
    pub fn bump(&mut self, key: &str, n: usize) {
        *self.stats.entry(key.to_string()).or_insert(0) += n;
    }
}

pub trait Plugin: Send {
    fn name(&self) -> &str;

    fn before_collect(&mut self, _ctx: &mut PluginContext<'_>) -> Result<()> {
        Ok(())
    }

    fn after_collect(&mut self, _ctx: &mut PluginContext<'_>) -> Result<()> {
        Ok(())
    }

    fn after_resolve(&mut self, _ctx: &mut PluginContext<'_>) -> Result<()> {
        Ok(())
    }
}

pub type HookFn = fn(&mut PluginContext<'_>) -> Result<()>;

/// Stateless plugin assembled from free functions.
#[derive(Debug, Clone, Copy)]
pub struct FnPlugin {
    pub name: &'static str,
    pub before_collect: Option<HookFn>,
    pub after_collect: Option<HookFn>,
    pub after_resolve: Option<HookFn>,
}

impl FnPlugin {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            before_collect: None,
            after_collect: None,
            after_resolve: None,
        }
    }
}

impl Plugin for FnPlugin {
    fn name(&self) -> &str {
        self.name
    }

    fn before_collect(&mut self, ctx: &mut PluginContext<'_>) -> Result<()> {
        self.before_collect.map_or(Ok(()), |hook| hook(ctx))
    }

    fn after_collect(&mut self, ctx: &mut PluginContext<'_>) -> Result<()> {
        self.after_collect.map_or(Ok(()), |hook| hook(ctx))
    }

    fn after_resolve(&mut self, ctx: &mut PluginContext<'_>) -> Result<()> {
        self.after_resolve.map_or(Ok(()), |hook| hook(ctx))
    }
}

pub fn dispatch(plugin: &mut dyn Plugin, hook: Hook, ctx: &mut PluginContext<'_>) -> Result<()> {
    match hook {
        Hook::BeforeCollect => plugin.before_collect(ctx),
        Hook::AfterCollect => plugin.after_collect(ctx),
        Hook::AfterResolve => plugin.after_resolve(ctx),
    }
}

/// Instantiate a built-in plugin by name
pub fn create_plugin(name: &str) -> Option<Box<dyn Plugin>> {
    match name {
        "file_links" => Some(Box::new(file_links::plugin())),
        "endpoint_linker" => Some(Box::new(endpoint_linker::EndpointLinker::new())),
        _ => None,
    }
}
