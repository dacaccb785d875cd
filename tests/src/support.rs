//! Shared input modules for the integration tests.

use shroud_ir::eval::{Machine, RtValue};
use shroud_ir::{
    BinOp, Callee, CmpPred, FunctionBuilder, FunctionId, Global, IntTy, Module, Type, Value,
};

pub const BANNER: &[u8] = b"hello world";

/// max(a, b) through a store slot, with a then-block heavy enough to be a
/// bogus-flow candidate.
pub fn max_module() -> Module {
    let mut m = Module::new();
    let i64t = Type::Int(IntTy::I64);
    let mut b = FunctionBuilder::new("max", vec![i64t, i64t], i64t);
    let slot = b.alloca(i64t);
    b.store(i64t, Value::Arg(0), slot.clone());
    let cond = b.icmp(CmpPred::Sgt, Value::Arg(1), Value::Arg(0));
    let bigger = b.block("b_bigger");
    let done = b.block("done");
    b.cond_br(cond, bigger, done);

    b.switch_to(bigger);
    let diff = b.binop(BinOp::Sub, IntTy::I64, Value::Arg(1), Value::Arg(0));
    let best = b.binop(BinOp::Add, IntTy::I64, Value::Arg(0), diff);
    b.store(i64t, best, slot.clone());
    b.br(done);

    b.switch_to(done);
    let out = b.load(i64t, slot);
    b.ret(Some(out));
    m.add_function(b.finish());
    m
}

/// Three-block straight line: entry -> sum_ab -> finish, computing a + b + c.
pub fn sum3_module() -> Module {
    let mut m = Module::new();
    let i64t = Type::Int(IntTy::I64);
    let mut b = FunctionBuilder::new(
        "sum3",
        vec![i64t, i64t, i64t],
        i64t,
    );
    let slot = b.alloca(i64t);
    let sum_ab = b.block("sum_ab");
    let finish = b.block("finish");
    b.br(sum_ab);

    b.switch_to(sum_ab);
    let ab = b.binop(BinOp::Add, IntTy::I64, Value::Arg(0), Value::Arg(1));
    b.store(i64t, ab, slot.clone());
    b.br(finish);

    b.switch_to(finish);
    let ab = b.load(i64t, slot);
    let abc = b.binop(BinOp::Add, IntTy::I64, ab, Value::Arg(2));
    b.ret(Some(abc));
    m.add_function(b.finish());
    m
}

/// One string constant and nothing else.
pub fn secret_module() -> Module {
    let mut m = Module::new();
    m.add_global("secret", Global::constant(b"secret".to_vec()));
    m
}

/// A small program exercising every pass at once: a string constant read
/// through a counted loop, a branching helper, and a calling entry point.
///
/// `main(a, b)` returns `(max(a, b) ^ b) + byte_sum(banner)`.
pub fn demo_module() -> Module {
    let mut m = max_module();
    m.add_global("banner", Global::constant(BANNER.to_vec()));
    let max_id = m.function_id("max").unwrap();

    let i64t = Type::Int(IntTy::I64);
    let i32t = Type::Int(IntTy::I32);
    let i8t = Type::Int(IntTy::I8);

    let mut b = FunctionBuilder::new("sum_banner", vec![], i64t);
    let acc = b.alloca(i64t);
    let idx = b.alloca(i32t);
    b.store(i64t, Value::Const(0, IntTy::I64), acc.clone());
    b.store(i32t, Value::Const(0, IntTy::I32), idx.clone());
    let header = b.block("loop_header");
    let body = b.block("loop_body");
    let exit = b.block("loop_exit");
    b.br(header);

    b.switch_to(header);
    let i = b.load(i32t, idx.clone());
    let more = b.icmp(
        CmpPred::Slt,
        i.clone(),
        Value::Const(BANNER.len() as i64, IntTy::I32),
    );
    b.cond_br(more, body, exit);

    b.switch_to(body);
    let ptr = b.gep(Value::Global("banner".to_owned()), i.clone());
    let byte = b.load(i8t, ptr);
    let cur = b.load(i64t, acc.clone());
    let next = b.binop(BinOp::Add, IntTy::I64, cur, byte);
    b.store(i64t, next, acc.clone());
    let i2 = b.binop(BinOp::Add, IntTy::I32, i, Value::Const(1, IntTy::I32));
    b.store(i32t, i2, idx.clone());
    b.br(header);

    b.switch_to(exit);
    let total = b.load(i64t, acc);
    b.ret(Some(total));
    let sum_id = m.add_function(b.finish());

    let mut b = FunctionBuilder::new("main", vec![i64t, i64t], i64t);
    let biggest = b
        .call(
            Callee::Direct(max_id),
            vec![Value::Arg(0), Value::Arg(1)],
            i64t,
        )
        .unwrap();
    let mixed = b.binop(BinOp::Xor, IntTy::I64, biggest, Value::Arg(1));
    let checksum = b.call(Callee::Direct(sum_id), vec![], i64t).unwrap();
    let out = b.binop(BinOp::Add, IntTy::I64, mixed, checksum);
    b.ret(Some(out));
    m.add_function(b.finish());
    m
}

/// What `demo_module`'s `main` must return for any inputs.
pub fn demo_expected(a: i64, b: i64) -> i64 {
    let byte_sum: i64 = BANNER.iter().map(|&x| i64::from(x)).sum();
    (a.max(b) ^ b).wrapping_add(byte_sum)
}

/// Runs constructors, then calls `name` with integer arguments.
pub fn run(m: &Module, name: &str, args: &[i64]) -> i64 {
    let fid: FunctionId = m.function_id(name).unwrap();
    let args: Vec<RtValue> = args.iter().map(|&v| RtValue::Int(v)).collect();
    let mut vm = Machine::new(m);
    vm.run_constructors().unwrap();
    match vm.call(fid, &args).unwrap() {
        Some(RtValue::Int(v)) => v,
        other => panic!("expected an integer result, got {other:?}"),
    }
}
