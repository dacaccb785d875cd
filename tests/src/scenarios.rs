//! End-to-end scenarios over small, hand-built programs.

use crate::support::{max_module, run, secret_module, sum3_module};
use shroud_ir::eval::Machine;
use shroud_ir::{BlockId, Instruction, Terminator};
use shroud_passes::pipeline::run_pipeline;
use shroud_passes::string_encryption::DECRYPT_FN;
use shroud_passes::ObfuscationOptions;

const SAMPLE_PAIRS: &[(i64, i64)] = &[
    (0, 0),
    (1, 2),
    (2, 1),
    (-7, 7),
    (i64::MIN, i64::MAX),
    (42, 42),
];

/// Bogus flow at probability 100: the branchy block is rebuilt behind the
/// opaque predicate yet still computes max(a, b).
#[test]
fn bogus_flow_preserves_max() {
    let options = ObfuscationOptions {
        bogus_flow: true,
        bogus_probability: 100,
        seed: 2024,
        ..Default::default()
    };
    let mut m = max_module();
    let stats = run_pipeline(&mut m, &options).unwrap();
    assert!(stats.bogus_blocks >= 1);
    assert_eq!(stats.bogus_blocks, stats.opaque_predicates);

    for &(a, b) in SAMPLE_PAIRS {
        assert_eq!(run(&m, "max", &[a, b]), a.max(b), "a={a} b={b}");
    }
}

/// String encryption: the plaintext vanishes from static data and exactly
/// one constructor restores it in place when executed first.
#[test]
fn encrypted_secret_is_gone_until_the_bootstrap_runs() {
    let options = ObfuscationOptions {
        encrypt_strings: true,
        seed: 5,
        ..Default::default()
    };
    let mut m = secret_module();
    let stats = run_pipeline(&mut m, &options).unwrap();
    assert_eq!(stats.encrypted_strings, 1);

    for (name, g) in &m.globals {
        assert!(
            !g.init.windows(6).any(|w| w == b"secret"),
            "plaintext leaked through global {name}"
        );
    }

    assert_eq!(m.constructors.len(), 1);
    assert_eq!(m.constructors[0].priority, 0);
    assert_eq!(m.function(m.constructors[0].function).name, DECRYPT_FN);

    let mut vm = Machine::new(&m);
    vm.run_constructors().unwrap();
    assert_eq!(vm.global_bytes("enc_secret").unwrap(), b"secret");
}

/// Flattening a linear chain: same results, but the chain's blocks now
/// route through the dispatcher instead of each other.
#[test]
fn flattened_chain_computes_the_same_sum() {
    let options = ObfuscationOptions {
        flatten: true,
        seed: 77,
        ..Default::default()
    };
    let mut m = sum3_module();
    let plain = sum3_module();
    let stats = run_pipeline(&mut m, &options).unwrap();
    assert_eq!(stats.flattened_functions, 1);

    for &(a, b) in SAMPLE_PAIRS {
        let want = run(&plain, "sum3", &[a, b, 11]);
        assert_eq!(run(&m, "sum3", &[a, b, 11]), want, "a={a} b={b}");
    }

    // sum_ab (block 1) used to branch straight to finish (block 2); now its
    // only successor is the dispatcher
    let f = m.function(m.function_id("sum3").unwrap());
    let succs = f.block(BlockId(1)).terminator.successors();
    assert!(!succs.contains(&BlockId(2)), "direct edge must be gone");
    assert_eq!(succs.len(), 1);
}

/// Structural invariants of a flattened function: one dispatcher, one switch
/// case per flattened block, entry feeding the dispatcher and nothing else.
#[test]
fn flattening_structure_is_canonical() {
    let options = ObfuscationOptions {
        flatten: true,
        seed: 3,
        ..Default::default()
    };
    let mut m = sum3_module();
    run_pipeline(&mut m, &options).unwrap();

    let f = m.function(m.function_id("sum3").unwrap());
    let dispatchers: Vec<BlockId> = (0..f.blocks.len())
        .map(BlockId)
        .filter(|b| matches!(f.block(*b).terminator, Terminator::Switch { .. }))
        .collect();
    assert_eq!(dispatchers.len(), 1, "exactly one dispatch block");
    let dispatch = dispatchers[0];

    assert_eq!(f.block(f.entry_id()).terminator, Terminator::Br(dispatch));

    let Terminator::Switch { cases, default, .. } = &f.block(dispatch).terminator else {
        unreachable!();
    };
    // two flattened blocks in a three-block chain
    assert_eq!(cases.len(), 2);
    assert_ne!(*default, dispatch);

    // every flattened block's non-return terminator loops back to dispatch
    for (key, target) in cases {
        assert_ne!(*key, 0);
        let block = f.block(*target);
        match &block.terminator {
            Terminator::Ret(_) => {}
            Terminator::Br(next) => {
                assert_eq!(*next, dispatch);
                assert!(matches!(
                    block.instructions.last(),
                    Some(Instruction::Store { .. })
                ));
            }
            other => panic!("unexpected terminator {other:?}"),
        }
    }
}
