//! Render graph of a pipeline's stages

use crate::core::{Pipeline, SelectionState, StageKindRegistry, StageType};
use serde::Serialize;

/// How two nodes are connected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EdgeKind {
    /// One top-level entry runs after another
    Sequential,
    /// Member of the same parallel group as the group head
    Parallel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
}

/// One stage as the renderer draws it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderNode {
    pub id: String,
    pub name: String,
    pub kind: StageType,
    /// Icon name from the stage-kind registry
    pub icon: Option<String>,
    pub is_selected: bool,
    pub is_incomplete: bool,
    /// Head of the parallel group this node hangs off, if any
    pub parallel_parent: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageGraph {
    pub nodes: Vec<RenderNode>,
    pub edges: Vec<Edge>,
}

impl StageGraph {
    pub fn node(&self, id: &str) -> Option<&RenderNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Edges leaving a node
    pub fn edges_from<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |edge| edge.from == id)
    }
}

/// Build the render graph
///
/// Sequential edges join the heads of consecutive top-level entries; each
/// parallel member gets a parallel edge from its group head.
pub fn build_graph(pipeline: &Pipeline, selection: &SelectionState, registry: &StageKindRegistry) -> StageGraph {
    let selected = selection.selected_stage_id.as_deref();
    let mut graph = StageGraph::default();
    let mut previous_head: Option<String> = None;

    for node in &pipeline.stages {
        let members = node.stages();
        let Some(head) = members.first() else {
            continue;
        };

        for (position, stage) in members.iter().enumerate() {
            let parallel_parent = (position > 0).then(|| head.identifier.clone());
            if let Some(parent) = &parallel_parent {
                graph.edges.push(Edge {
                    from: parent.clone(),
                    to: stage.identifier.clone(),
                    kind: EdgeKind::Parallel,
                });
            }

            graph.nodes.push(RenderNode {
                id: stage.identifier.clone(),
                name: stage.name.clone(),
                kind: stage.stage_type(),
                icon: registry.get(stage.stage_type()).map(|meta| meta.icon.clone()),
                is_selected: selected == Some(stage.identifier.as_str()),
                is_incomplete: stage.is_incomplete(),
                parallel_parent,
            });
        }

        if let Some(previous) = previous_head.replace(head.identifier.clone()) {
            graph.edges.push(Edge {
                from: previous,
                to: head.identifier.clone(),
                kind: EdgeKind::Sequential,
            });
        }
    }

    graph
}
