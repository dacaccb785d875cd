//! Structural well-formedness checking.
//!
//! The pipeline runs this after the full pass sequence; any error here is
//! fatal and the caller must not emit an artifact. The checks are the minimal
//! invariants the passes promise to preserve: every terminator targets a
//! block in the same function, phi nodes stay at block heads and reference
//! exactly their direct predecessors, and no operand dangles. Blocks made
//! unreachable by a rewrite are allowed (decoys are dead by design), so
//! reachability is only reported, never enforced.

use crate::module::{Callee, Function, Instruction, Module, Type, Value};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use petgraph::Direction;
use shroud_utils::errors::VerifyError;
use std::collections::HashSet;
use tracing::debug;

/// Checks every function in the module plus the constructor table.
pub fn verify_module(module: &Module) -> Result<(), VerifyError> {
    for func in &module.functions {
        if func.is_declaration {
            if !func.blocks.is_empty() {
                return Err(VerifyError::DeclarationWithBody {
                    function: func.name.clone(),
                });
            }
            continue;
        }
        if func.blocks.is_empty() {
            return Err(VerifyError::MissingEntry {
                function: func.name.clone(),
            });
        }
        verify_function(module, func)?;
    }

    for ctor in &module.constructors {
        let valid = module
            .functions
            .get(ctor.function.0)
            .is_some_and(|f| !f.is_declaration && f.ret == Type::Void);
        if !valid {
            return Err(VerifyError::BadConstructor {
                id: ctor.function.0,
            });
        }
    }
    Ok(())
}

/// Projects a function's control flow onto a petgraph graph. Node `i` is
/// block `i`; parallel edges are deduplicated so predecessor queries see each
/// edge once.
fn cfg_graph(func: &Function) -> DiGraph<(), ()> {
    let mut graph = DiGraph::new();
    for _ in &func.blocks {
        graph.add_node(());
    }
    let mut seen = HashSet::new();
    for (i, block) in func.blocks.iter().enumerate() {
        for succ in block.terminator.successors() {
            if succ.0 < func.blocks.len() && seen.insert((i, succ.0)) {
                graph.add_edge(NodeIndex::new(i), NodeIndex::new(succ.0), ());
            }
        }
    }
    graph
}

fn verify_function(module: &Module, func: &Function) -> Result<(), VerifyError> {
    let block_count = func.blocks.len();
    for (i, block) in func.blocks.iter().enumerate() {
        for target in block.terminator.successors() {
            if target.0 >= block_count {
                return Err(VerifyError::DanglingTarget {
                    function: func.name.clone(),
                    block: i,
                    target: target.0,
                });
            }
        }
    }

    let graph = cfg_graph(func);

    let defined: HashSet<_> = func
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .filter_map(Instruction::result)
        .collect();

    for (i, block) in func.blocks.iter().enumerate() {
        let preds: HashSet<usize> = graph
            .neighbors_directed(NodeIndex::new(i), Direction::Incoming)
            .map(NodeIndex::index)
            .collect();

        let mut seen_non_phi = false;
        for ins in &block.instructions {
            if let Instruction::Phi { incoming, .. } = ins {
                if seen_non_phi {
                    return Err(VerifyError::PhiNotLeading {
                        function: func.name.clone(),
                        block: i,
                    });
                }
                let incoming_blocks: HashSet<usize> =
                    incoming.iter().map(|(_, b)| b.0).collect();
                if let Some(extra) = incoming_blocks.difference(&preds).next() {
                    return Err(VerifyError::PhiNonPredecessor {
                        function: func.name.clone(),
                        block: i,
                        incoming: *extra,
                    });
                }
                if let Some(missing) = preds.difference(&incoming_blocks).next() {
                    return Err(VerifyError::PhiMissingPredecessor {
                        function: func.name.clone(),
                        block: i,
                        predecessor: *missing,
                    });
                }
            } else {
                seen_non_phi = true;
            }

            if let Instruction::Call { callee: Callee::Direct(fid), .. } = ins {
                if fid.0 >= module.functions.len() {
                    return Err(VerifyError::UnknownFunction {
                        function: func.name.clone(),
                        id: fid.0,
                    });
                }
            }

            let mut err = None;
            ins.for_each_value(&mut |v| {
                if err.is_none() {
                    err = check_value(module, func, &defined, v);
                }
            });
            if let Some(e) = err {
                return Err(e);
            }
        }

        let mut err = None;
        block.terminator.for_each_value(&mut |v| {
            if err.is_none() {
                err = check_value(module, func, &defined, v);
            }
        });
        if let Some(e) = err {
            return Err(e);
        }
    }

    let mut reachable = 0usize;
    let mut dfs = Dfs::new(&graph, NodeIndex::new(0));
    while dfs.next(&graph).is_some() {
        reachable += 1;
    }
    if reachable < block_count {
        debug!(
            function = %func.name,
            dead = block_count - reachable,
            "function carries unreachable blocks"
        );
    }

    Ok(())
}

fn check_value(
    module: &Module,
    func: &Function,
    defined: &HashSet<crate::module::ValueId>,
    value: &Value,
) -> Option<VerifyError> {
    match value {
        Value::Const(..) => None,
        Value::Instr(id) => (!defined.contains(id)).then(|| VerifyError::UndefinedValue {
            function: func.name.clone(),
            value: id.0,
        }),
        Value::Arg(i) => (*i >= func.params.len()).then(|| VerifyError::UndefinedArg {
            function: func.name.clone(),
            index: *i,
        }),
        Value::Global(name) => {
            (!module.globals.contains_key(name)).then(|| VerifyError::UnknownGlobal {
                function: func.name.clone(),
                global: name.clone(),
            })
        }
        Value::Function(fid) => {
            (fid.0 >= module.functions.len()).then(|| VerifyError::UnknownFunction {
                function: func.name.clone(),
                id: fid.0,
            })
        }
    }
}
