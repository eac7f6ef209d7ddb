use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::rc::Rc;
use tilir::op::TstCmp;
use tilir::options::{CompilationOptions, DebugFlags, PassSet};
use tilir::passes::{CompileError, compile};
use tilir::validate::ValidationErrorKind;
use tilir::{
    Context, ExecCond, Func, FuncRole, InstCf, InstGroupDef, IrForm, Op, PredReg, Ref, RegClass,
    Shader, ShaderStage, StageInfo,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn new_shader(stage: ShaderStage) -> Shader {
    Shader::new(Rc::new(Context::default()), stage)
}

fn groups(shader: &Shader, func: Func) -> Vec<InstGroupDef> {
    shader
        .func_at(func)
        .blocks()
        .flat_map(|block| block.at_groups())
        .map(|group| group.def().clone())
        .collect()
}

/// `o0 = 1.0 + 2.0`
fn simple_fragment() -> (Shader, Func) {
    let mut shader = new_shader(ShaderStage::Fragment);
    let func = shader.add_func(FuncRole::Entrypoint);
    let mut b = shader.builder(func);
    let sum = b.ssa();
    b.alu2(Op::Fadd, sum, Ref::imm_f32(1.0), Ref::imm_f32(2.0));
    b.mov(Ref::reg(RegClass::PixOut, 0), sum);
    (shader, func)
}

#[test]
fn simple_fragment_shader() {
    init_logging();
    let (mut shader, func) = simple_fragment();
    compile(&mut shader, &CompilationOptions::default()).unwrap();

    assert_eq!(shader.form(), IrForm::Bundled);
    let groups = groups(&shader, func);
    let total: usize = groups.iter().map(|g| g.size.total).sum();
    assert_eq!(shader.binary_size(), total);
    assert_eq!(shader.binary_size() % 8, 0);
    assert_eq!(shader.info.entry_offset, Some(0));
    assert_eq!(shader.info.temps, 1);
    assert_eq!(shader.info.stage, StageInfo::Fragment { varyings: Default::default(), pixout_regs: 1 });

    // Both immediates are hardware constants (`1.0` and `2.0`).
    let fadd = &groups[0];
    let srcs: Vec<_> = fadd.lower_srcs().iter().map(|r| r.as_reg()).collect();
    assert_eq!(srcs, [Some((RegClass::Const, 1)), Some((RegClass::Const, 4)), None]);
    assert_eq!(fadd.io.dsts[0].as_reg(), Some((RegClass::Temp, 0)));

    // Only the last group ends the program.
    let ends: Vec<bool> = groups.iter().map(|g| g.header.end).collect();
    assert_eq!(ends, [false, true]);
}

#[test]
fn invalid_ssa_is_rejected_without_binary() {
    init_logging();
    let mut shader = new_shader(ShaderStage::Fragment);
    let func = shader.add_func(FuncRole::Entrypoint);
    let mut b = shader.builder(func);
    let never_defined = b.ssa();
    b.mov(Ref::reg(RegClass::PixOut, 0), never_defined);

    let Err(CompileError::Validation(err)) = compile(&mut shader, &CompilationOptions::default()) else {
        panic!("expected a validation error");
    };
    assert_eq!(err.kind, ValidationErrorKind::UseBeforeDef);
    assert_eq!(err.reference, never_defined);
    assert_eq!(shader.binary_size(), 0);
    assert_eq!(shader.form(), IrForm::Scalar);
}

#[test]
fn if_on_other_predicates_is_rejected_without_binary() {
    init_logging();
    let mut shader = new_shader(ShaderStage::Fragment);
    let func = shader.add_func(FuncRole::Entrypoint);
    let mut b = shader.builder(func);
    let if_node = b.push_if(Ref::pred(PredReg::Pe));
    b.mov(Ref::reg(RegClass::PixOut, 0), Ref::imm_f32(1.0));
    b.exit_if(if_node);

    let Err(CompileError::Validation(err)) = compile(&mut shader, &CompilationOptions::default()) else {
        panic!("expected a validation error");
    };
    assert_eq!(err.kind, ValidationErrorKind::NonP0Condition);
    assert_eq!(shader.binary_size(), 0);
}

#[test]
fn preamble_comes_before_entrypoint() {
    init_logging();
    let mut shader = new_shader(ShaderStage::Vertex);
    let preamble = shader.add_func(FuncRole::Preamble);
    let entry = shader.add_func(FuncRole::Entrypoint);
    shader.builder(preamble).mov(Ref::reg(RegClass::Shared, 0), Ref::imm(0x1234));
    let mut b = shader.builder(entry);
    let pos = b.ssa();
    b.alu2(Op::Fmul, pos, Ref::reg(RegClass::VtxIn, 0), Ref::reg(RegClass::Shared, 0));
    b.uvsw(0, pos);

    compile(&mut shader, &CompilationOptions::default()).unwrap();

    let preamble_offset = shader.funcs[preamble].binary_offset;
    let entry_offset = shader.funcs[entry].binary_offset;
    assert_eq!(preamble_offset, Some(0));
    let preamble_size: usize = groups(&shader, preamble).iter().map(|g| g.size.total).sum();
    assert_eq!(entry_offset, Some(preamble_size));
    assert_eq!(shader.info.entry_offset, entry_offset);
    assert_eq!(preamble_size % 8, 0);
    assert!(shader.info.has_side_effects);

    // Group offsets are shader-wide.
    assert_eq!(groups(&shader, entry)[0].offset, preamble_size);
}

#[test]
fn structured_control_flow_compiles_to_branches() {
    init_logging();
    let mut shader = new_shader(ShaderStage::Fragment);
    let func = shader.add_func(FuncRole::Entrypoint);
    let mut b = shader.builder(func);

    let x = b.ssa();
    b.mov(x, Ref::imm(5));
    b.tst(TstCmp::Lt, x, Ref::imm_f32(1.0));
    let if_node = b.push_if(Ref::pred(PredReg::P0));
    let y = b.ssa();
    b.alu2(Op::Fadd, y, x, x);
    b.mov(Ref::reg(RegClass::PixOut, 0), y);
    b.enter_else(if_node);
    b.mov(Ref::reg(RegClass::PixOut, 0), x);
    b.exit_if(if_node);

    let loop_node = b.push_loop();
    let z = b.ssa();
    b.alu2(Op::Fmul, z, x, x);
    b.mov(Ref::reg(RegClass::PixOut, 1), z);
    b.tst(TstCmp::Ge, z, x);
    let exit = b.br(loop_node, ExecCond::P0True);
    b.exit_loop(loop_node);
    let after = b.block();
    b.func().insts[exit].cf = InstCf::Target(after);
    b.emitpix();

    compile(&mut shader, &CompilationOptions::default()).unwrap();
    assert_eq!(shader.binary_size() % 8, 0);
    assert_eq!(shader.info.stage, StageInfo::Fragment { varyings: Default::default(), pixout_regs: 2 });

    // Every branch lands on the start of a group.
    let groups = groups(&shader, func);
    let starts: BTreeSet<usize> = groups.iter().map(|g| g.offset).collect();
    let binary = shader.binary_data();
    let mut branches = 0;
    for g in &groups {
        let Some(inst) = g.insts[tilir::Phase::Ctrl as usize] else { continue };
        if shader.funcs[func].insts[inst].op != Op::Br {
            continue;
        }
        branches += 1;
        let at = g.offset + g.size.header;
        assert_eq!(binary[at], Op::Br.opcode());
        let rel = i32::from_le_bytes(binary[at + 2..at + 6].try_into().unwrap());
        let target = usize::try_from(g.offset as i64 + i64::from(rel)).unwrap();
        assert!(starts.contains(&target), "branch at {:#x} to {target:#x}", g.offset);
    }
    // Skipping "then", skipping "else", leaving the loop, and the back-edge.
    assert_eq!(branches, 4);
    assert!(groups.last().unwrap().header.end);
}

#[test]
fn dumps_dont_change_the_binary() {
    init_logging();
    let (mut plain, _) = simple_fragment();
    compile(&mut plain, &CompilationOptions::default()).unwrap();

    let (mut dumped, _) = simple_fragment();
    let options = CompilationOptions::from_names(None, Some("fs,input,pre,post,binary,regalloc,reindex,verbose"))
        .unwrap();
    assert!(options.debug.contains(DebugFlags::REINDEX));
    compile(&mut dumped, &options).unwrap();

    assert_eq!(plain.binary_data(), dumped.binary_data());
    assert_eq!(plain.info, dumped.info);
}

#[test]
fn skipping_dce_keeps_dead_code() {
    init_logging();
    let build = || {
        let (mut shader, func) = simple_fragment();
        let mut b = shader.builder(func);
        let dead = b.ssa();
        b.alu2(Op::Fmul, dead, Ref::reg(RegClass::Special, 0), Ref::imm_f32(0.5));
        shader
    };

    let mut optimized = build();
    compile(&mut optimized, &CompilationOptions::default()).unwrap();
    let mut unoptimized = build();
    let options = CompilationOptions::from_names(Some("dce"), None).unwrap();
    assert_eq!(options.skip, PassSet::DCE);
    compile(&mut unoptimized, &options).unwrap();

    assert!(unoptimized.binary_size() > optimized.binary_size());
    // The dead read of a system value is gone along with the instruction.
    assert!(optimized.info.sysvals.is_empty());
    assert_eq!(unoptimized.info.sysvals.iter().copied().collect::<Vec<_>>(), [0]);
}

#[test]
fn invalid_option_names_are_reported() {
    let err = CompilationOptions::from_names(Some("opt,nope"), None).unwrap_err();
    assert!(err.to_string().contains("`nope`"), "{err}");
    assert!(CompilationOptions::from_names(None, Some("fs,huh")).is_err());
}
