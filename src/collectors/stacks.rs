// Group containers into stacks by a naming heuristic

use crate::config::DockerConfig;
use crate::models::{ContainerSnapshot, DockerStack};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
pub struct StackRules {
    aliases: HashMap<String, String>,
    /// Longest prefix first.
    prefixes: Vec<(String, String)>,
    service_roles: Vec<String>,
}

impl Default for StackRules {
    fn default() -> Self {
        Self::from_config(&DockerConfig::default())
    }
}

impl StackRules {
    pub fn from_config(config: &DockerConfig) -> Self {
        let mut prefixes: Vec<(String, String)> = config
            .stack_prefixes
            .iter()
            .map(|(p, s)| (p.clone(), s.clone()))
            .collect();
        prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Self {
            aliases: config.stack_aliases.clone(),
            prefixes,
            service_roles: config.service_roles.clone(),
        }
    }

    fn is_service_role(&self, token: &str) -> bool {
        self.service_roles.iter().any(|r| r == token)
    }

    /// Stack key for a container name.
    ///
    /// Aliases and prefixes win outright. Otherwise the name is split on `-`: a trailing
    /// ordinal is dropped (and then a trailing service role, if one remains behind it),
    /// a trailing service role alone is dropped, and any other multi-token name is keyed
    /// by its first token. Names without `-` are their own key.
    pub fn group_key(&self, name: &str) -> String {
        if let Some(stack) = self.aliases.get(name) {
            return stack.clone();
        }
        if let Some((_, stack)) = self.prefixes.iter().find(|(p, _)| name.starts_with(p.as_str())) {
            return stack.clone();
        }

        let mut parts: Vec<&str> = name.split('-').collect();
        if parts.len() < 2 {
            return name.to_string();
        }
        let last = parts[parts.len() - 1];
        if last.parse::<u64>().is_ok() {
            parts.pop();
            if parts.len() > 1 && self.is_service_role(parts[parts.len() - 1]) {
                parts.pop();
            }
            parts.join("-")
        } else if self.is_service_role(last) {
            parts.pop();
            parts.join("-")
        } else {
            parts[0].to_string()
        }
    }
}

/// Stacks sorted by name, containers sorted by name within each stack.
pub fn group_into_stacks(containers: &[ContainerSnapshot], rules: &StackRules) -> Vec<DockerStack> {
    let mut groups: BTreeMap<String, Vec<ContainerSnapshot>> = BTreeMap::new();
    for c in containers {
        groups
            .entry(rules.group_key(&c.name))
            .or_default()
            .push(c.clone());
    }
    groups
        .into_iter()
        .map(|(name, mut containers)| {
            containers.sort_by(|a, b| a.name.cmp(&b.name));
            let running = containers.iter().filter(|c| c.is_running()).count();
            DockerStack {
                name,
                total_containers: containers.len() as u32,
                running_containers: running as u32,
                containers,
            }
        })
        .collect()
}
