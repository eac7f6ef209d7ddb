//! Compilation options: which passes to skip, and what to dump.
//!
//! Options are plain values handed to [`passes::compile`](crate::passes::compile),
//! and never read from global state by the pipeline itself. They can be built
//! from comma-separated name lists (e.g. from the environment, see
//! [`CompilationOptions::from_env`]) or deserialized.

use crate::{Shader, ShaderStage};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable holding a comma-separated list of passes to skip.
pub const SKIP_PASSES_ENV: &str = "TILIR_SKIP_PASSES";

/// Environment variable holding a comma-separated list of debug flags.
pub const DEBUG_ENV: &str = "TILIR_DEBUG";

bitflags! {
    /// Set of pipeline passes (see [`PassId`](crate::passes::PassId)).
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct PassSet: u32 {
        const CONST_IMM = 1 << 0;
        const OPT = 1 << 1;
        const DCE = 1 << 2;
        const SCHEDULE = 1 << 3;
        const REGALLOC = 1 << 4;
        const FINALIZE = 1 << 5;
        const GROUP = 1 << 6;
    }
}

bitflags! {
    /// Diagnostic output switches (none of them affect the generated code).
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct DebugFlags: u32 {
        /// Dump vertex shaders.
        const VS = 1 << 0;
        /// Dump fragment shaders.
        const FS = 1 << 1;
        /// Dump compute shaders.
        const CS = 1 << 2;
        /// Also dump driver-internal shaders.
        const INTERNAL = 1 << 3;
        /// Dump the IR before every pass.
        const PRE_PASS = 1 << 4;
        /// Dump the IR after every pass that changed it.
        const POST_PASS = 1 << 5;
        /// Dump the IR as handed over by the frontend.
        const INPUT = 1 << 6;
        /// Hex-dump the final binary.
        const BINARY = 1 << 7;
        /// Log register allocation decisions.
        const REGALLOC = 1 << 8;
        /// Log every pass, even those that didn't change anything.
        const VERBOSE = 1 << 9;
        /// Re-index the IR after every pass that changed it.
        const REINDEX = 1 << 10;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum OptionsError {
    #[error("unknown pass `{0}` (expected one of: {list})", list = PASS_NAMES.iter().map(|(n, _)| *n).collect::<Vec<_>>().join(", "))]
    UnknownPass(String),
    #[error("unknown debug flag `{0}` (expected one of: {list})", list = DEBUG_NAMES.iter().map(|(n, _)| *n).collect::<Vec<_>>().join(", "))]
    UnknownDebugFlag(String),
}

const PASS_NAMES: &[(&str, PassSet)] = &[
    ("const_imm", PassSet::CONST_IMM),
    ("opt", PassSet::OPT),
    ("dce", PassSet::DCE),
    ("schedule", PassSet::SCHEDULE),
    ("regalloc", PassSet::REGALLOC),
    ("finalize", PassSet::FINALIZE),
    ("group", PassSet::GROUP),
];

const DEBUG_NAMES: &[(&str, DebugFlags)] = &[
    ("vs", DebugFlags::VS),
    ("fs", DebugFlags::FS),
    ("cs", DebugFlags::CS),
    ("internal", DebugFlags::INTERNAL),
    ("pre", DebugFlags::PRE_PASS),
    ("post", DebugFlags::POST_PASS),
    ("input", DebugFlags::INPUT),
    ("binary", DebugFlags::BINARY),
    ("regalloc", DebugFlags::REGALLOC),
    ("verbose", DebugFlags::VERBOSE),
    ("reindex", DebugFlags::REINDEX),
    ("all", DebugFlags::all()),
];

fn parse_names<T: Copy + Default + std::ops::BitOr<Output = T>>(
    names: &str,
    table: &[(&str, T)],
    unknown: impl Fn(String) -> OptionsError,
) -> Result<T, OptionsError> {
    let mut set = T::default();
    for name in names.split(',').map(str::trim).filter(|name| !name.is_empty()) {
        let &(_, flag) = table
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(name))
            .ok_or_else(|| unknown(name.to_string()))?;
        set = set | flag;
    }
    Ok(set)
}

impl PassSet {
    /// Parse a comma-separated list of pass names (e.g. `"opt,dce"`).
    pub fn from_names(names: &str) -> Result<Self, OptionsError> {
        parse_names(names, PASS_NAMES, OptionsError::UnknownPass)
    }
}

impl DebugFlags {
    /// Parse a comma-separated list of debug flag names (e.g. `"fs,post"`).
    pub fn from_names(names: &str) -> Result<Self, OptionsError> {
        parse_names(names, DEBUG_NAMES, OptionsError::UnknownDebugFlag)
    }

    /// Whether dumps were requested for `shader` at all.
    pub fn applies_to(self, shader: &Shader) -> bool {
        let stage = match shader.stage {
            ShaderStage::Vertex => DebugFlags::VS,
            ShaderStage::Fragment => DebugFlags::FS,
            ShaderStage::Compute => DebugFlags::CS,
        };
        self.contains(stage) && (!shader.internal || self.contains(DebugFlags::INTERNAL))
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilationOptions {
    pub skip: PassSet,
    pub debug: DebugFlags,
}

impl CompilationOptions {
    pub fn from_names(skip: Option<&str>, debug: Option<&str>) -> Result<Self, OptionsError> {
        Ok(Self {
            skip: skip.map(PassSet::from_names).transpose()?.unwrap_or_default(),
            debug: debug.map(DebugFlags::from_names).transpose()?.unwrap_or_default(),
        })
    }

    /// Read options from [`SKIP_PASSES_ENV`] and [`DEBUG_ENV`].
    ///
    /// Unknown names are reported and ignored, so that a typo in a debugging
    /// environment variable can't break compilation.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok();
        let (skip, debug) = (var(SKIP_PASSES_ENV), var(DEBUG_ENV));
        match Self::from_names(skip.as_deref(), debug.as_deref()) {
            Ok(options) => options,
            Err(err) => {
                tracing::warn!(%err, "ignoring invalid compilation options from the environment");
                Self::default()
            }
        }
    }

    pub fn skips(&self, pass: PassSet) -> bool {
        self.skip.contains(pass)
    }

    /// Whether `flag` is set, and dumps apply to `shader` at all.
    pub fn dumps(&self, flag: DebugFlags, shader: &Shader) -> bool {
        self.debug.contains(flag) && self.debug.applies_to(shader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Context;
    use std::rc::Rc;

    #[test]
    fn parse_name_lists() {
        assert_eq!(PassSet::from_names("opt, DCE,,"), Ok(PassSet::OPT | PassSet::DCE));
        assert_eq!(PassSet::from_names(""), Ok(PassSet::empty()));
        assert_eq!(DebugFlags::from_names("all"), Ok(DebugFlags::all()));

        let err = PassSet::from_names("opt,typo").unwrap_err();
        assert_eq!(err, OptionsError::UnknownPass("typo".into()));
        assert!(err.to_string().contains("const_imm, opt, dce"), "{err}");
    }

    #[test]
    fn dumps_respect_stage_and_internal_flags() {
        let options = CompilationOptions::from_names(None, Some("fs,post")).unwrap();
        let mut shader = Shader::new(Rc::new(Context::default()), ShaderStage::Fragment);
        assert!(options.dumps(DebugFlags::POST_PASS, &shader));
        assert!(!options.dumps(DebugFlags::PRE_PASS, &shader));

        shader.internal = true;
        assert!(!options.dumps(DebugFlags::POST_PASS, &shader));

        let vertex = Shader::new(Rc::new(Context::default()), ShaderStage::Vertex);
        assert!(!options.dumps(DebugFlags::POST_PASS, &vertex));
    }

    #[test]
    fn deserialize_from_json() {
        let options: CompilationOptions =
            serde_json::from_str(r#"{ "skip": "OPT | DCE", "debug": "BINARY" }"#).unwrap();
        assert_eq!(options.skip, PassSet::OPT | PassSet::DCE);
        assert_eq!(options.debug, DebugFlags::BINARY);

        let defaults: CompilationOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(defaults, CompilationOptions::default());
    }
}
