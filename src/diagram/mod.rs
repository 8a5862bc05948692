//! Stage diagram: render graph and renderer intents

pub mod events;
pub mod graph;

pub use events::{handle_event, DiagramEvent};
pub use graph::{build_graph, Edge, EdgeKind, RenderNode, StageGraph};
