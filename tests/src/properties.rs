//! Property-based checks for the arithmetic identities the passes rely on.

use proptest::prelude::*;
use shroud_analysis::ObfuscationStats;
use shroud_ir::eval::{Machine, RtValue};
use shroud_ir::{BinOp, CmpPred, FunctionBuilder, FunctionId, Global, IntTy, Module, Type, Value};
use shroud_passes::rng::Prng;
use shroud_passes::string_encryption::StringEncryption;
use shroud_passes::substitution::Substitution;
use shroud_passes::{PassContext, Transform};
use std::sync::OnceLock;

fn binop_module(op: BinOp) -> Module {
    let i64t = Type::Int(IntTy::I64);
    let mut b = FunctionBuilder::new("f", vec![i64t, i64t], i64t);
    let out = b.binop(op, IntTy::I64, Value::Arg(0), Value::Arg(1));
    b.ret(Some(out));
    let mut m = Module::new();
    m.add_function(b.finish());
    m
}

/// Applies substitution with increasing seeds until the 50% roll picks the
/// single candidate.
fn substituted(op: BinOp) -> Module {
    for seed in 1..=64 {
        let mut m = binop_module(op);
        let mut rng = Prng::from_seed(seed);
        let mut stats = ObfuscationStats::default();
        Substitution
            .apply(
                &mut m,
                &mut PassContext {
                    rng: &mut rng,
                    stats: &mut stats,
                },
            )
            .unwrap();
        if stats.substituted_instructions == 1 {
            return m;
        }
    }
    panic!("no seed in 1..=64 selected the candidate");
}

fn eval2(m: &Module, a: i64, b: i64) -> i64 {
    let mut vm = Machine::new(m);
    match vm
        .call(FunctionId(0), &[RtValue::Int(a), RtValue::Int(b)])
        .unwrap()
    {
        Some(RtValue::Int(v)) => v,
        other => panic!("expected an integer result, got {other:?}"),
    }
}

static SUB_ADD: OnceLock<Module> = OnceLock::new();
static SUB_SUB: OnceLock<Module> = OnceLock::new();
static SUB_XOR: OnceLock<Module> = OnceLock::new();
static PREDICATE: OnceLock<Module> = OnceLock::new();

/// `(x * (x + 1)) % 2 == 0` as an evaluable function of x.
fn predicate_module() -> Module {
    let i32t = Type::Int(IntTy::I32);
    let mut b = FunctionBuilder::new("parity", vec![i32t], Type::Int(IntTy::I1));
    let x1 = b.binop(BinOp::Add, IntTy::I32, Value::Arg(0), Value::Const(1, IntTy::I32));
    let prod = b.binop(BinOp::Mul, IntTy::I32, Value::Arg(0), x1);
    let rem = b.binop(BinOp::SRem, IntTy::I32, prod, Value::Const(2, IntTy::I32));
    let p = b.icmp(CmpPred::Eq, rem, Value::Const(0, IntTy::I32));
    b.ret(Some(p));
    let mut m = Module::new();
    m.add_function(b.finish());
    m
}

proptest! {
    #[test]
    fn substituted_add_matches_wrapping_add(a in any::<i64>(), b in any::<i64>()) {
        let m = SUB_ADD.get_or_init(|| substituted(BinOp::Add));
        prop_assert_eq!(eval2(m, a, b), a.wrapping_add(b));
    }

    #[test]
    fn substituted_sub_matches_wrapping_sub(a in any::<i64>(), b in any::<i64>()) {
        let m = SUB_SUB.get_or_init(|| substituted(BinOp::Sub));
        prop_assert_eq!(eval2(m, a, b), a.wrapping_sub(b));
    }

    #[test]
    fn substituted_xor_matches_xor(a in any::<i64>(), b in any::<i64>()) {
        let m = SUB_XOR.get_or_init(|| substituted(BinOp::Xor));
        prop_assert_eq!(eval2(m, a, b), a ^ b);
    }

    /// The opaque predicate is a tautology: one of two consecutive integers
    /// is always even, wraparound included.
    #[test]
    fn opaque_predicate_is_always_true(x in any::<i32>()) {
        let m = PREDICATE.get_or_init(predicate_module);
        let mut vm = Machine::new(m);
        let got = vm.call(FunctionId(0), &[RtValue::Int(i64::from(x))]).unwrap();
        prop_assert_eq!(got, Some(RtValue::Int(1)));
    }

    /// Encrypt-then-boot restores any byte string, and the ciphertext never
    /// equals the plaintext (a zero key would leave it unchanged).
    #[test]
    fn encrypted_strings_round_trip(
        bytes in proptest::collection::vec(any::<u8>(), 2..48),
        seed in 1u64..512,
    ) {
        let mut m = Module::new();
        m.add_global("s", Global::constant(bytes.clone()));
        let mut rng = Prng::from_seed(seed);
        let mut stats = ObfuscationStats::default();
        StringEncryption
            .apply(&mut m, &mut PassContext { rng: &mut rng, stats: &mut stats })
            .unwrap();
        prop_assert_eq!(stats.encrypted_strings, 1);
        prop_assert_ne!(&m.globals["enc_s"].init, &bytes);

        let mut vm = Machine::new(&m);
        vm.run_constructors().unwrap();
        prop_assert_eq!(vm.global_bytes("enc_s").unwrap(), bytes.as_slice());
    }
}
