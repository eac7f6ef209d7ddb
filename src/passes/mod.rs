//! The pass pipeline, taking a [`Shader`] from scalar SSA form all the way to
//! an encoded binary.
//!
//! Passes always run in the same order (see [`PassId::ALL`]), each one
//! reporting whether it changed anything, and the whole shader is validated
//! before the first pass and after every pass that ran (see [`validate`]).

// NOTE(tilir) all the modules are declared here, but they're documented "inside"
// (i.e. using inner doc comments).
pub mod const_imm;
pub mod dce;
pub mod finalize;
pub mod group;
pub mod opt;
pub mod regalloc;
pub mod reindex;
pub mod schedule;

use crate::options::{CompilationOptions, DebugFlags, PassSet};
use crate::validate::{ValidationError, validate_shader};
use crate::{Shader, encode, print};
use thiserror::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PassId {
    ConstImm,
    Opt,
    Dce,
    Schedule,
    RegAlloc,
    Finalize,
    Group,
}

impl PassId {
    /// Every pass, in pipeline order.
    pub const ALL: [PassId; 7] = [
        PassId::ConstImm,
        PassId::Opt,
        PassId::Dce,
        PassId::Schedule,
        PassId::RegAlloc,
        PassId::Finalize,
        PassId::Group,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PassId::ConstImm => "const_imm",
            PassId::Opt => "opt",
            PassId::Dce => "dce",
            PassId::Schedule => "schedule",
            PassId::RegAlloc => "regalloc",
            PassId::Finalize => "finalize",
            PassId::Group => "group",
        }
    }

    pub fn flag(self) -> PassSet {
        match self {
            PassId::ConstImm => PassSet::CONST_IMM,
            PassId::Opt => PassSet::OPT,
            PassId::Dce => PassSet::DCE,
            PassId::Schedule => PassSet::SCHEDULE,
            PassId::RegAlloc => PassSet::REGALLOC,
            PassId::Finalize => PassSet::FINALIZE,
            PassId::Group => PassSet::GROUP,
        }
    }

    /// Run the pass over the whole shader, returning whether it changed it.
    pub fn run(self, shader: &mut Shader, options: &CompilationOptions) -> bool {
        match self {
            PassId::ConstImm => const_imm::const_imm(shader),
            PassId::Opt => opt::copy_prop(shader),
            PassId::Dce => dce::dce(shader),
            PassId::Schedule => schedule::schedule(shader),
            PassId::RegAlloc => regalloc::regalloc(shader, options),
            PassId::Finalize => finalize::finalize(shader),
            PassId::Group => group::group(shader),
        }
    }
}

impl std::fmt::Display for PassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("pass `{pass}` can't be skipped unless `{requires}` is also skipped")]
    InvalidSkip { pass: PassId, requires: PassId },

    #[error("shader isn't in bundled form (was the `group` pass skipped?)")]
    NotBundled,
}

fn check_skips(options: &CompilationOptions) -> Result<(), CompileError> {
    // Bundling can't cope with SSA values (or phis) being left over.
    if options.skips(PassSet::REGALLOC) && !options.skips(PassSet::GROUP) {
        return Err(CompileError::InvalidSkip { pass: PassId::RegAlloc, requires: PassId::Group });
    }
    Ok(())
}

fn dump(shader: &Shader, title: &str) {
    tracing::info!(target: "tilir::dump", "{title}:\n{}", print::shader_to_string(shader));
}

/// Run every (non-skipped) pass over `shader`, in order.
///
/// This leaves `shader` in bundled form (unless `group` is skipped), but
/// doesn't encode it, see [`compile`] for that.
pub fn run_pipeline(shader: &mut Shader, options: &CompilationOptions) -> Result<(), CompileError> {
    check_skips(options)?;

    if options.dumps(DebugFlags::INPUT, shader) {
        dump(shader, "input");
    }
    validate_shader(shader)?;

    for pass in PassId::ALL {
        if options.skips(pass.flag()) {
            tracing::info!(%pass, "skipping pass");
            continue;
        }

        if options.dumps(DebugFlags::PRE_PASS, shader) {
            dump(shader, &format!("before {pass}"));
        }

        let changed = {
            let _span = tracing::debug_span!("pass", %pass).entered();
            pass.run(shader, options)
        };
        tracing::debug!(%pass, changed, "ran pass");

        if changed && options.debug.contains(DebugFlags::REINDEX) {
            reindex::reindex(shader);
        }
        if let Err(err) = validate_shader(shader) {
            tracing::error!(%pass, %err, "pass broke SSA form");
            return Err(err.into());
        }

        if options.dumps(DebugFlags::POST_PASS, shader)
            && (changed || options.debug.contains(DebugFlags::VERBOSE))
        {
            dump(shader, &format!("after {pass}"));
        }
    }

    validate_shader(shader)?;
    Ok(())
}

/// Compile `shader` to its final binary (see [`Shader::binary_data`]).
///
/// On failure, `shader` is left without a binary.
pub fn compile(shader: &mut Shader, options: &CompilationOptions) -> Result<(), CompileError> {
    shader.set_binary(vec![]);
    if options.skips(PassSet::GROUP) {
        return Err(CompileError::NotBundled);
    }

    run_pipeline(shader, options)?;
    encode::encode_shader(shader)?;

    if options.dumps(DebugFlags::BINARY, shader) {
        tracing::info!(
            target: "tilir::dump",
            "binary ({} bytes):\n{}",
            shader.binary_size(),
            print::hexdump(shader.binary_data())
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Context, FuncRole, Ref, RegClass, ShaderStage};
    use std::rc::Rc;

    #[test]
    fn pass_names_round_trip_through_options() {
        for pass in PassId::ALL {
            assert_eq!(PassSet::from_names(pass.name()), Ok(pass.flag()));
        }
    }

    #[test]
    fn skipping_regalloc_alone_is_rejected() {
        let mut shader = Shader::new(Rc::new(Context::default()), ShaderStage::Fragment);
        let func = shader.add_func(FuncRole::Entrypoint);
        shader.builder(func).mov(Ref::reg(RegClass::PixOut, 0), Ref::imm(7));

        let options = CompilationOptions { skip: PassSet::REGALLOC, ..Default::default() };
        assert_eq!(
            compile(&mut shader, &options),
            Err(CompileError::InvalidSkip { pass: PassId::RegAlloc, requires: PassId::Group })
        );
        assert_eq!(shader.binary_size(), 0);

        let options = CompilationOptions { skip: PassSet::GROUP, ..Default::default() };
        assert_eq!(compile(&mut shader, &options), Err(CompileError::NotBundled));

        // Without encoding, stopping before bundling is fine.
        let options = CompilationOptions { skip: PassSet::REGALLOC | PassSet::GROUP, ..Default::default() };
        assert_eq!(run_pipeline(&mut shader, &options), Ok(()));
        assert_eq!(shader.form(), crate::IrForm::Scalar);
    }
}
