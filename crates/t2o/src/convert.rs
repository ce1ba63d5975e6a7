//! Model-level entry points.

use tracing::info;

use crate::config::ConvertOptions;
use crate::error::{ConvertError, Result};
use crate::graph::Graph;
use crate::source;
use crate::target;

/// Name given to graphs converted from an unnamed subgraph.
pub const DEFAULT_GRAPH_NAME: &str = "main";

/// Converts one subgraph with a fresh registry.
pub fn convert_subgraph(
    model: &source::Model,
    index: usize,
    options: &ConvertOptions,
) -> Result<target::Graph> {
    let subgraph = model
        .subgraphs
        .get(index)
        .ok_or(ConvertError::SubgraphCount {
            count: model.subgraphs.len(),
        })?;
    let name = subgraph.name.as_deref().unwrap_or(DEFAULT_GRAPH_NAME);
    info!(
        "Converting subgraph {} ({} tensors, {} operators)",
        name,
        subgraph.tensors.len(),
        subgraph.operators.len()
    );

    let mut graph = Graph::new(model, subgraph, options.strict_registry);
    graph.apply_explicit_layouts(&options.explicit_layouts)?;
    graph.parse()?;
    graph.transform()?;
    graph.convert(name)
}

/// Converts a single-subgraph source model into a target model.
pub fn convert_model(model: &source::Model, options: &ConvertOptions) -> Result<target::Model> {
    if model.subgraphs.len() != 1 {
        return Err(ConvertError::SubgraphCount {
            count: model.subgraphs.len(),
        });
    }
    let graph = convert_subgraph(model, 0, options)?;
    Ok(target::Model {
        ir_version: options.ir_version,
        opset_version: options.opset_version,
        producer_name: options.producer_name.clone(),
        producer_version: options.producer_version.clone(),
        graph,
    })
}
