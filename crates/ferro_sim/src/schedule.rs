//! Evaluation-order and component computation.
//!
//! The dependency graph has one edge per `(source block, block)` pair
//! reported by `source_blocks`. Clocked blocks report no sources, so a
//! well-formed design with registers in every feedback path is acyclic;
//! a cycle at this stage is a design bug and is reported as such.

use crate::error::SimError;
use ferro_ir::{BlockId, Design};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::unionfind::UnionFind;

/// The combinational evaluation order: every evaluable block, sources
/// first.
pub fn evaluation_order(design: &Design) -> Result<Vec<BlockId>, SimError> {
    let mut graph: DiGraph<BlockId, ()> = DiGraph::new();
    let mut nodes: Vec<NodeIndex> = Vec::with_capacity(design.blocks.len());
    for id in design.blocks.ids() {
        nodes.push(graph.add_node(id));
    }
    for (id, block) in design.blocks.iter() {
        for source in block.source_blocks() {
            graph.add_edge(
                nodes[source.as_raw() as usize],
                nodes[id.as_raw() as usize],
                (),
            );
        }
    }

    let sorted = petgraph::algo::toposort(&graph, None).map_err(|cycle| {
        let block = graph[cycle.node_id()];
        SimError::CombinationalLoop {
            block: design.blocks[block].name.clone(),
        }
    })?;

    Ok(sorted
        .into_iter()
        .map(|node| graph[node])
        .filter(|id| design.blocks[*id].can_evaluate())
        .collect())
}

/// Partitions the blocks into weakly connected components of the
/// dependency graph.
///
/// Returns one component index per block (indexed by raw block ID) and
/// the component count. A clocked block shares a component with its
/// consumers, so marking the component dirty after a step re-evaluates
/// exactly the affected cone.
pub fn components(design: &Design) -> (Vec<u32>, u32) {
    let n = design.blocks.len();
    let mut union_find: UnionFind<u32> = UnionFind::new(n);
    for (id, block) in design.blocks.iter() {
        for source in block.source_blocks() {
            union_find.union(source.as_raw(), id.as_raw());
        }
    }

    // Compact the representatives into consecutive component indices.
    let mut mapping = vec![u32::MAX; n];
    let mut count = 0;
    let mut result = vec![0u32; n];
    for (index, slot) in result.iter_mut().enumerate() {
        let representative = union_find.find(index as u32) as usize;
        if mapping[representative] == u32::MAX {
            mapping[representative] = count;
            count += 1;
        }
        *slot = mapping[representative];
    }
    (result, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferro_fixed::SignalType;
    use ferro_ir::Value;

    #[test]
    fn order_respects_dependencies() {
        let mut design = Design::new();
        let a = design.constant_f64(SignalType::ufix(8, 0), 1.0).unwrap();
        let b = design.constant_f64(SignalType::ufix(8, 0), 2.0).unwrap();
        let sum = design.plus(&[a, b]).unwrap();
        let twice = design.plus(&[sum, sum]).unwrap();

        let order = evaluation_order(&design).unwrap();
        let position = |id: BlockId| order.iter().position(|x| *x == id).unwrap();
        assert!(position(sum.pin().block) < position(twice.pin().block));
    }

    #[test]
    fn registers_break_cycles() {
        let mut design = Design::new();
        let forward = ferro_ir::ForwardNode::new(&mut design, SignalType::ufix(8, 0)).unwrap();
        let delayed = design.delay(forward.node());
        let one = design.constant_f64(SignalType::ufix(8, 0), 1.0).unwrap();
        let next = design.plus(&[delayed, one]).unwrap();
        let cast = design
            .floor_cast(SignalType::ufix(8, 0), next, ferro_ir::CastMode::WrapAround)
            .unwrap();
        forward.bind(&mut design, cast).unwrap();

        assert!(evaluation_order(&design).is_ok());
    }

    #[test]
    fn combinational_cycle_is_reported() {
        let mut design = Design::new();
        let forward = ferro_ir::ForwardNode::new(&mut design, SignalType::ufix(8, 0)).unwrap();
        let one = design.constant_f64(SignalType::ufix(8, 0), 1.0).unwrap();
        let next = design.plus(&[forward.node(), one]).unwrap();
        let cast = design
            .floor_cast(SignalType::ufix(8, 0), next, ferro_ir::CastMode::WrapAround)
            .unwrap();
        forward.bind(&mut design, cast).unwrap();
        design.simplify();

        assert!(matches!(
            evaluation_order(&design),
            Err(SimError::CombinationalLoop { .. })
        ));
    }

    #[test]
    fn components_group_connected_blocks() {
        let mut design = Design::new();
        let a = design.constant_f64(SignalType::ufix(8, 0), 1.0).unwrap();
        let b = design.constant_f64(SignalType::ufix(8, 0), 2.0).unwrap();
        let sum = design.plus(&[a, b]).unwrap();
        let lonely = design.constant(Value::Bool(true));
        design.probe(lonely);

        let (component_of, count) = components(&design);
        assert!(count >= 2);
        assert_eq!(
            component_of[a.pin().block.as_raw() as usize],
            component_of[sum.pin().block.as_raw() as usize]
        );
        assert_ne!(
            component_of[a.pin().block.as_raw() as usize],
            component_of[lonely.pin().block.as_raw() as usize]
        );
    }
}
