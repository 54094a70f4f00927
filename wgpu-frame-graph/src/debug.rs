use crate::backend::Backend;
use crate::pass::PassEntry;
use crate::resource::{Access, ResourceRegistry, ResourceState, TextureHandle};
use bitflags::bitflags;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::fmt;
use web_time::Duration;

bitflags! {
    /// Diagnostics toggles. None of them change scheduling or barriers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DebugFlags: u32 {
        const DUMP_GRAPH = 1 << 0;
        const LOG_LIFETIMES = 1 << 1;
        const LOG_BARRIERS = 1 << 2;
        const PASS_TIMING = 1 << 3;
    }
}

impl DebugFlags {
    pub const ENV_VAR: &'static str = "FRAME_GRAPH_DEBUG";

    /// Process-wide defaults from `FRAME_GRAPH_DEBUG`, e.g. `dump,timing`.
    pub fn from_env() -> Self {
        std::env::var(Self::ENV_VAR)
            .map(|value| Self::parse(&value))
            .unwrap_or_default()
    }

    pub fn parse(value: &str) -> Self {
        let mut flags = Self::empty();
        for token in value.split(',').map(str::trim).filter(|token| !token.is_empty()) {
            match token.to_ascii_lowercase().as_str() {
                "dump" | "graph" => flags |= Self::DUMP_GRAPH,
                "lifetimes" => flags |= Self::LOG_LIFETIMES,
                "barriers" => flags |= Self::LOG_BARRIERS,
                "timing" => flags |= Self::PASS_TIMING,
                "all" => flags |= Self::all(),
                other => log::warn!("Ignoring unknown {} entry '{}'", Self::ENV_VAR, other),
            }
        }
        flags
    }
}

#[derive(Debug, Clone)]
pub struct PassStatistics {
    pub pass_name: String,
    pub pass_index: usize,
    pub execution_time: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDump {
    pub handle: TextureHandle,
    pub name: String,
    pub external: bool,
    pub required: bool,
    pub first_use: Option<usize>,
    pub last_use: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageDump {
    pub handle: TextureHandle,
    /// `None` when the handle does not resolve in this graph.
    pub resource: Option<String>,
    pub state: ResourceState,
    pub access: Access,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassDump {
    pub index: usize,
    pub name: String,
    pub culled: bool,
    pub keep_alive: bool,
    pub usages: Vec<UsageDump>,
}

/// Snapshot of a compiled graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphDump {
    pub resources: Vec<ResourceDump>,
    pub passes: Vec<PassDump>,
}

impl GraphDump {
    pub(crate) fn capture<'a, B: Backend>(
        resources: &ResourceRegistry<'a, B::Texture>,
        passes: &[PassEntry<'a, B>],
    ) -> Self {
        let resource_dumps = resources
            .iter()
            .map(|(handle, resource)| ResourceDump {
                handle,
                name: resource.name().to_string(),
                external: resource.is_external(),
                required: resource.is_required(),
                first_use: resource.first_use(),
                last_use: resource.last_use(),
            })
            .collect();

        let pass_dumps = passes
            .iter()
            .enumerate()
            .map(|(index, pass)| PassDump {
                index,
                name: pass.name.clone(),
                culled: pass.culled,
                keep_alive: pass.keep_alive,
                usages: pass
                    .usages
                    .iter()
                    .map(|usage| UsageDump {
                        handle: usage.handle,
                        resource: resources
                            .get(usage.handle)
                            .map(|resource| resource.name().to_string()),
                        state: usage.state,
                        access: usage.access,
                    })
                    .collect(),
            })
            .collect();

        Self {
            resources: resource_dumps,
            passes: pass_dumps,
        }
    }

    pub fn required_resources(&self) -> impl Iterator<Item = &ResourceDump> {
        self.resources.iter().filter(|resource| resource.required)
    }

    pub fn pass(&self, name: &str) -> Option<&PassDump> {
        self.passes.iter().find(|pass| pass.name == name)
    }

    /// Usages whose handle resolves to nothing: authoring errors that are
    /// skipped at execution.
    pub fn unresolved_usages(&self) -> impl Iterator<Item = (&PassDump, &UsageDump)> {
        self.passes.iter().flat_map(|pass| {
            pass.usages
                .iter()
                .filter(|usage| usage.resource.is_none())
                .map(move |usage| (pass, usage))
        })
    }

    /// Graphviz rendering of the pass/resource graph. Writes point from pass
    /// to texture, reads from texture to pass.
    pub fn to_dot(&self) -> String {
        let mut graph: DiGraph<DotNode<'_>, DotEdge> = DiGraph::new();

        let resource_nodes: HashMap<TextureHandle, NodeIndex> = self
            .resources
            .iter()
            .map(|resource| (resource.handle, graph.add_node(DotNode::Resource(resource))))
            .collect();

        for pass in &self.passes {
            let pass_node = graph.add_node(DotNode::Pass(pass));
            for usage in &pass.usages {
                let Some(&resource_node) = resource_nodes.get(&usage.handle) else {
                    continue;
                };
                let edge = DotEdge(usage.state);
                match usage.access {
                    Access::Write => graph.add_edge(pass_node, resource_node, edge),
                    Access::Read => graph.add_edge(resource_node, pass_node, edge),
                };
            }
        }

        let body = format!("{}", Dot::with_config(&graph, &[Config::GraphContentOnly]));
        format!("digraph frame_graph {{\n{body}}}\n")
    }
}

impl fmt::Display for GraphDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Resources:")?;
        for resource in self.required_resources() {
            writeln!(
                f,
                "  {:?} '{}' [{}] first use {}, last use {}",
                resource.handle,
                resource.name,
                if resource.external {
                    "external"
                } else {
                    "transient"
                },
                display_index(resource.first_use),
                display_index(resource.last_use),
            )?;
        }

        writeln!(f, "Passes:")?;
        for pass in &self.passes {
            writeln!(
                f,
                "  #{} '{}'{}{}",
                pass.index,
                pass.name,
                if pass.culled { " (culled)" } else { "" },
                if pass.keep_alive { " (keep alive)" } else { "" },
            )?;
            for usage in &pass.usages {
                writeln!(
                    f,
                    "    {:?} {} as {:?}",
                    usage.access,
                    usage.resource.as_deref().unwrap_or("<unresolved>"),
                    usage.state
                )?;
            }
        }
        Ok(())
    }
}

fn display_index(index: Option<usize>) -> String {
    index.map_or_else(|| "-".to_string(), |index| index.to_string())
}

enum DotNode<'d> {
    Pass(&'d PassDump),
    Resource(&'d ResourceDump),
}

impl fmt::Display for DotNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DotNode::Pass(pass) if pass.culled => write!(f, "{} (culled)", pass.name),
            DotNode::Pass(pass) => write!(f, "{}", pass.name),
            DotNode::Resource(resource) if resource.external => {
                write!(f, "[{}] external", resource.name)
            }
            DotNode::Resource(resource) => write!(f, "[{}]", resource.name),
        }
    }
}

struct DotEdge(ResourceState);

impl fmt::Display for DotEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flag_lists() {
        assert_eq!(
            DebugFlags::parse("dump, timing"),
            DebugFlags::DUMP_GRAPH | DebugFlags::PASS_TIMING
        );
        assert_eq!(DebugFlags::parse("ALL"), DebugFlags::all());
        assert_eq!(DebugFlags::parse("barriers,bogus"), DebugFlags::LOG_BARRIERS);
        assert!(DebugFlags::parse("").is_empty());
    }

    fn sample_dump() -> GraphDump {
        let hdr = TextureHandle::new(0);
        GraphDump {
            resources: vec![
                ResourceDump {
                    handle: hdr,
                    name: "hdr".to_string(),
                    external: false,
                    required: true,
                    first_use: Some(0),
                    last_use: Some(1),
                },
                ResourceDump {
                    handle: TextureHandle::new(1),
                    name: "debug_overlay".to_string(),
                    external: false,
                    required: false,
                    first_use: None,
                    last_use: None,
                },
            ],
            passes: vec![
                PassDump {
                    index: 0,
                    name: "scene".to_string(),
                    culled: false,
                    keep_alive: false,
                    usages: vec![UsageDump {
                        handle: hdr,
                        resource: Some("hdr".to_string()),
                        state: ResourceState::RenderTarget,
                        access: Access::Write,
                    }],
                },
                PassDump {
                    index: 1,
                    name: "tonemap".to_string(),
                    culled: false,
                    keep_alive: false,
                    usages: vec![
                        UsageDump {
                            handle: hdr,
                            resource: Some("hdr".to_string()),
                            state: ResourceState::ShaderResource,
                            access: Access::Read,
                        },
                        UsageDump {
                            handle: TextureHandle::INVALID,
                            resource: None,
                            state: ResourceState::RenderTarget,
                            access: Access::Write,
                        },
                    ],
                },
            ],
        }
    }

    #[test]
    fn text_dump_lists_required_resources_only() {
        let text = sample_dump().to_string();
        assert!(text.contains("'hdr' [transient] first use 0, last use 1"));
        assert!(!text.contains("debug_overlay"));
        assert!(text.contains("#1 'tonemap'"));
        assert!(text.contains("Write <unresolved> as RenderTarget"));
    }

    #[test]
    fn unresolved_usages_are_reported() {
        let dump = sample_dump();
        let unresolved: Vec<_> = dump.unresolved_usages().collect();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].0.name, "tonemap");
    }

    #[test]
    fn dot_output_contains_nodes_and_edges() {
        let dot = sample_dump().to_dot();
        assert!(dot.starts_with("digraph frame_graph {"));
        assert!(dot.contains("scene"));
        assert!(dot.contains("[hdr]"));
        assert!(dot.contains("RenderTarget"));
        assert!(dot.contains("ShaderResource"));
        assert!(dot.trim_end().ends_with('}'));
    }
}
