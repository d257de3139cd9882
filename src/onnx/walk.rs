// walk.rs - Visit every tensor stored in a model
//
// Initializers, sparse initializers, tensor-valued node attributes and
// nested subgraphs, in the main graph, training graphs and functions.

use super::proto::{AttributeProto, GraphProto, ModelProto, SparseTensorProto, TensorProto};
use crate::error::Result;

/// Read-only visit of every tensor, in the same order as `for_each_tensor_mut`.
pub fn for_each_tensor<F>(model: &ModelProto, f: &mut F)
where
    F: FnMut(&TensorProto),
{
    let graphs = model
        .graph
        .iter()
        .chain(model.training_info.iter().flat_map(|i| i.initialization.iter().chain(i.algorithm.iter())));
    for graph in graphs {
        visit_graph(graph, f);
    }
    for function in &model.functions {
        for attr in function.node.iter().flat_map(|n| &n.attribute) {
            visit_attribute(attr, f);
        }
    }
}

fn visit_graph<F: FnMut(&TensorProto)>(graph: &GraphProto, f: &mut F) {
    graph.initializer.iter().for_each(&mut *f);
    for s in &graph.sparse_initializer {
        s.values.iter().chain(&s.indices).for_each(&mut *f);
    }
    for attr in graph.node.iter().flat_map(|n| &n.attribute) {
        visit_attribute(attr, f);
    }
}

fn visit_attribute<F: FnMut(&TensorProto)>(attr: &AttributeProto, f: &mut F) {
    attr.t.iter().chain(&attr.tensors).for_each(&mut *f);
    for s in attr.sparse_tensor.iter().chain(&attr.sparse_tensors) {
        s.values.iter().chain(&s.indices).for_each(&mut *f);
    }
    for g in attr.g.iter().chain(&attr.graphs) {
        visit_graph(g, f);
    }
}

pub fn for_each_tensor_mut<F>(model: &mut ModelProto, f: &mut F) -> Result<()>
where
    F: FnMut(&mut TensorProto) -> Result<()>,
{
    if let Some(graph) = model.graph.as_mut() {
        graph_tensors(graph, f)?;
    }
    for info in &mut model.training_info {
        if let Some(g) = info.initialization.as_mut() {
            graph_tensors(g, f)?;
        }
        if let Some(g) = info.algorithm.as_mut() {
            graph_tensors(g, f)?;
        }
    }
    for function in &mut model.functions {
        for node in &mut function.node {
            for attr in &mut node.attribute {
                attribute_tensors(attr, f)?;
            }
        }
    }
    Ok(())
}

pub fn graph_tensors<F>(graph: &mut GraphProto, f: &mut F) -> Result<()>
where
    F: FnMut(&mut TensorProto) -> Result<()>,
{
    for t in &mut graph.initializer {
        f(t)?;
    }
    for s in &mut graph.sparse_initializer {
        sparse_tensors(s, f)?;
    }
    for node in &mut graph.node {
        for attr in &mut node.attribute {
            attribute_tensors(attr, f)?;
        }
    }
    Ok(())
}

fn attribute_tensors<F>(attr: &mut AttributeProto, f: &mut F) -> Result<()>
where
    F: FnMut(&mut TensorProto) -> Result<()>,
{
    if let Some(t) = attr.t.as_mut() {
        f(t)?;
    }
    for t in &mut attr.tensors {
        f(t)?;
    }
    if let Some(s) = attr.sparse_tensor.as_mut() {
        sparse_tensors(s, f)?;
    }
    for s in &mut attr.sparse_tensors {
        sparse_tensors(s, f)?;
    }
    if let Some(g) = attr.g.as_mut() {
        graph_tensors(g, f)?;
    }
    for g in &mut attr.graphs {
        graph_tensors(g, f)?;
    }
    Ok(())
}

fn sparse_tensors<F>(s: &mut SparseTensorProto, f: &mut F) -> Result<()>
where
    F: FnMut(&mut TensorProto) -> Result<()>,
{
    if let Some(t) = s.values.as_mut() {
        f(t)?;
    }
    if let Some(t) = s.indices.as_mut() {
        f(t)?;
    }
    Ok(())
}
