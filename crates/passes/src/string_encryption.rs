//! String-literal encryption with a runtime decrypt bootstrap.
//!
//! Every immutable byte-string global of length two or more is XOR-encrypted
//! under a per-string nonzero key and replaced by a mutable ciphertext
//! global; all uses are redirected and the original is deleted. A single
//! synthesized `decrypt_strings` function, registered as a priority-0
//! constructor so it runs before any other static initializer, decrypts every
//! record in place at startup.

use crate::{PassContext, Transform};
use shroud_ir::{
    BinOp, CmpPred, Constructor, Function, FunctionBuilder, Global, IntTy, Module, Type, Value,
};
use shroud_utils::errors::TransformError;
use tracing::debug;

/// Name of the synthesized bootstrap decryptor. Later passes skip it by
/// prefix and by its `synthetic`/`optimize_disabled` flags.
pub const DECRYPT_FN: &str = "decrypt_strings";

/// Replacement key when the random draw lands on zero; a zero key would
/// leave the plaintext intact.
const FALLBACK_KEY: u8 = 0x42;

/// Minimum literal length worth encrypting.
const MIN_STRING_LEN: usize = 2;

#[derive(Debug)]
pub struct StringEncryption;

struct EncryptedString {
    original: String,
    replacement: String,
    key: u8,
    len: usize,
}

impl Transform for StringEncryption {
    fn name(&self) -> &'static str {
        "StringEncryption"
    }

    fn apply(
        &self,
        module: &mut Module,
        ctx: &mut PassContext<'_>,
    ) -> Result<bool, TransformError> {
        let candidates: Vec<String> = module
            .globals
            .iter()
            .filter(|(_, g)| g.constant && g.init.len() >= MIN_STRING_LEN)
            .map(|(name, _)| name.clone())
            .collect();

        let mut records = Vec::with_capacity(candidates.len());
        for name in candidates {
            let mut key = ctx.rng.byte();
            if key == 0 {
                key = FALLBACK_KEY;
            }
            let Some(global) = module.globals.get(&name) else {
                continue;
            };
            let len = global.init.len();
            let ciphertext: Vec<u8> = global.init.iter().map(|b| b ^ key).collect();
            // the obvious name may already be taken by a module global (or an
            // earlier record); overwriting it would orphan the decryptor
            let mut replacement = format!("enc_{name}");
            let mut suffix = 1usize;
            while module.globals.contains_key(&replacement) {
                replacement = format!("enc_{name}_{suffix}");
                suffix += 1;
            }
            module.add_global(replacement.clone(), Global::mutable(ciphertext));
            records.push(EncryptedString {
                original: name,
                replacement,
                key,
                len,
            });
            ctx.stats.encrypted_strings += 1;
        }

        if records.is_empty() {
            return Ok(false);
        }

        for rec in &records {
            module.replace_global_uses(&rec.original, &rec.replacement);
            module.globals.shift_remove(&rec.original);
        }

        let decryptor = build_decryptor(&records);
        let fid = module.add_function(decryptor);
        module.constructors.push(Constructor {
            function: fid,
            priority: 0,
        });

        debug!(strings = records.len(), "encrypted string constants");
        Ok(true)
    }
}

/// Synthesizes the bootstrap: one counted in-place XOR loop per record.
fn build_decryptor(records: &[EncryptedString]) -> Function {
    let mut b = FunctionBuilder::new(DECRYPT_FN, vec![], Type::Void);
    let i32t = Type::Int(IntTy::I32);
    let i8t = Type::Int(IntTy::I8);

    for rec in records {
        let header = b.block("loop_header");
        let body = b.block("loop_body");
        let exit = b.block("loop_exit");

        let counter = b.alloca(i32t);
        b.store(i32t, Value::Const(0, IntTy::I32), counter.clone());
        b.br(header);

        b.switch_to(header);
        let idx = b.load(i32t, counter.clone());
        let cond = b.icmp(
            CmpPred::Slt,
            idx.clone(),
            Value::Const(rec.len as i64, IntTy::I32),
        );
        b.cond_br(cond, body, exit);

        b.switch_to(body);
        let ptr = b.gep(Value::Global(rec.replacement.clone()), idx.clone());
        let byte = b.load(i8t, ptr.clone());
        let plain = b.binop(
            BinOp::Xor,
            IntTy::I8,
            byte,
            Value::Const(i64::from(rec.key), IntTy::I8),
        );
        b.store(i8t, plain, ptr);
        let next = b.binop(BinOp::Add, IntTy::I32, idx, Value::Const(1, IntTy::I32));
        b.store(i32t, next, counter);
        b.br(header);

        b.switch_to(exit);
    }
    b.ret(None);

    let mut func = b.finish();
    func.optimize_disabled = true;
    func.synthetic = true;
    func
}
