//! Attribute provider registry.
//!
//! Providers declare typed, costed attributes and a `process` procedure
//! that computes them. The registry owns every provider for the process
//! lifetime, resolves attribute names (qualified and unqualified), and
//! orders providers by their declared dependencies.

pub mod builtin;
pub mod provider;

pub use provider::{AttributeDef, Provider};

use crate::error::{AttributeError, PluginError};
use std::collections::HashMap;

/// Compact handle to one registered attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttrId {
    pub(crate) provider: u16,
    pub(crate) attr: u16,
}

/// Catalog of providers and their attributes.
pub struct Registry {
    providers: Vec<Box<dyn Provider>>,
    by_qualified: HashMap<String, AttrId>,
    by_name: HashMap<String, Vec<AttrId>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry {
            providers: Vec::new(),
            by_qualified: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// The standard registry: `file`, `ignore`, and `text` providers.
    pub fn with_builtins() -> Result<Registry, PluginError> {
        let mut registry = Registry::new();
        registry.register(Box::new(builtin::FileProvider))?;
        registry.register(Box::new(builtin::IgnoreProvider))?;
        registry.register(Box::new(builtin::TextProvider))?;
        registry.check_dependencies()?;
        Ok(registry)
    }

    /// Adds a provider, rejecting duplicate plugin names and duplicate
    /// fully-qualified attribute names.
    pub fn register(&mut self, provider: Box<dyn Provider>) -> Result<(), PluginError> {
        let name = provider.name();
        if self.providers.iter().any(|p| p.name() == name) {
            return Err(PluginError::DuplicatePlugin(name.to_string()));
        }
        let provider_idx = self.providers.len() as u16;
        for (attr_idx, def) in provider.attributes().iter().enumerate() {
            let qualified = format!("{}.{}", name, def.name);
            let id = AttrId {
                provider: provider_idx,
                attr: attr_idx as u16,
            };
            if self.by_qualified.insert(qualified, id).is_some() {
                return Err(PluginError::DuplicateAttribute {
                    plugin: name.to_string(),
                    attribute: def.name.to_string(),
                });
            }
            self.by_name.entry(def.name.to_string()).or_default().push(id);
        }
        self.providers.push(provider);
        Ok(())
    }

    /// Verifies that every declared dependency exists and that the
    /// `depends-on` relation is acyclic (Kahn's algorithm).
    pub fn check_dependencies(&self) -> Result<(), PluginError> {
        let index: HashMap<&str, usize> = self
            .providers
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name(), i))
            .collect();

        let mut indegree = vec![0usize; self.providers.len()];
        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); self.providers.len()];
        for (i, provider) in self.providers.iter().enumerate() {
            for dep in provider.depends_on() {
                let Some(&j) = index.get(dep) else {
                    return Err(PluginError::MissingDependency {
                        plugin: provider.name().to_string(),
                        dependency: dep.to_string(),
                    });
                };
                edges[j].push(i);
                indegree[i] += 1;
            }
        }

        let mut queue: Vec<usize> = indegree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(i, _)| i)
            .collect();
        let mut visited = 0;
        while let Some(node) = queue.pop() {
            visited += 1;
            for &next in &edges[node] {
                indegree[next] -= 1;
                if indegree[next] == 0 {
                    queue.push(next);
                }
            }
        }
        if visited != self.providers.len() {
            let stuck = indegree
                .iter()
                .position(|&d| d > 0)
                .map(|i| self.providers[i].name().to_string())
                .unwrap_or_default();
            return Err(PluginError::DependencyCycle(stuck));
        }
        Ok(())
    }

    /// Resolves an attribute name.
    ///
    /// Qualified `plugin.attr` names match exactly. Unqualified names
    /// resolve to the `file` provider when it declares them (its names
    /// are global and shadow others); otherwise the name must be unique
    /// across providers.
    pub fn resolve(&self, name: &str) -> Result<AttrId, AttributeError> {
        if let Some((plugin, _)) = name.split_once('.') {
            if let Some(&id) = self.by_qualified.get(name) {
                return Ok(id);
            }
            if !self.providers.iter().any(|p| p.name() == plugin) {
                return Err(AttributeError::UnknownPlugin(plugin.to_string()));
            }
            return Err(AttributeError::Unknown(name.to_string()));
        }

        if let Some(&id) = self.by_qualified.get(&format!("file.{name}")) {
            return Ok(id);
        }
        match self.by_name.get(name).map(Vec::as_slice) {
            None | Some([]) => Err(AttributeError::Unknown(name.to_string())),
            Some([id]) => Ok(*id),
            Some(ids) => Err(AttributeError::Ambiguous {
                name: name.to_string(),
                providers: ids
                    .iter()
                    .map(|id| self.providers[id.provider as usize].name())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    pub fn def(&self, id: AttrId) -> &AttributeDef {
        &self.providers[id.provider as usize].attributes()[id.attr as usize]
    }

    pub fn provider(&self, idx: u16) -> &dyn Provider {
        self.providers[idx as usize].as_ref()
    }

    pub fn qualified(&self, id: AttrId) -> String {
        format!(
            "{}.{}",
            self.providers[id.provider as usize].name(),
            self.def(id).name
        )
    }

    /// The id a provider's own `set` calls resolve against.
    pub fn attr_in_provider(&self, provider_idx: u16, name: &str) -> Option<AttrId> {
        self.providers[provider_idx as usize]
            .attributes()
            .iter()
            .position(|def| def.name == name)
            .map(|attr_idx| AttrId {
                provider: provider_idx,
                attr: attr_idx as u16,
            })
    }

    pub fn provider_attr_ids(&self, provider_idx: u16) -> Vec<AttrId> {
        (0..self.providers[provider_idx as usize].attributes().len())
            .map(|attr_idx| AttrId {
                provider: provider_idx,
                attr: attr_idx as u16,
            })
            .collect()
    }

    pub fn providers(&self) -> impl Iterator<Item = &dyn Provider> {
        self.providers.iter().map(|p| p.as_ref())
    }

    /// All attributes with their qualified names, sorted, for help and
    /// `--count` listings.
    pub fn iter_attributes(&self) -> Vec<(String, &AttributeDef)> {
        let mut out: Vec<(String, &AttributeDef)> = self
            .by_qualified
            .iter()
            .map(|(name, &id)| (name.clone(), self.def(id)))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}
