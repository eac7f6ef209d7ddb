//! Shader metadata handed to the driver alongside the binary.

use crate::ShaderStage;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Everything (other than the binary itself) the driver needs to run a shader.
///
/// Stage I/O maps are provided by the frontend, the rest is filled in while
/// compiling (usage flags by `finalize`, offsets by the encoder).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ShaderInfo {
    /// Byte offset of the entrypoint in the binary (the preamble, if any,
    /// comes first).
    pub entry_offset: Option<usize>,

    /// Temporary registers high-water mark, across all functions.
    pub temps: u32,

    /// `Special` registers (system values) read by the shader.
    pub sysvals: BTreeSet<u32>,

    pub uses_atomics: bool,
    pub uses_barriers: bool,
    pub has_side_effects: bool,

    pub stage: StageInfo,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum StageInfo {
    Vertex {
        /// Vertex attribute slot -> `VtxIn` register.
        inputs: BTreeMap<u32, u32>,
        /// Varying slot -> `VtxOut` register.
        outputs: BTreeMap<u32, u32>,
    },
    Fragment {
        /// Varying slot -> `Coeff` register (of its first coefficient).
        varyings: BTreeMap<u32, u32>,
        /// Number of `PixOut` registers written.
        pixout_regs: u32,
    },
    Compute {
        local_size: [u32; 3],
        shared_regs: u32,
    },
}

impl ShaderInfo {
    pub fn new(stage: ShaderStage) -> Self {
        let stage = match stage {
            ShaderStage::Vertex => {
                StageInfo::Vertex { inputs: BTreeMap::new(), outputs: BTreeMap::new() }
            }
            ShaderStage::Fragment => StageInfo::Fragment { varyings: BTreeMap::new(), pixout_regs: 0 },
            ShaderStage::Compute => StageInfo::Compute { local_size: [1, 1, 1], shared_regs: 0 },
        };
        Self {
            entry_offset: None,
            temps: 0,
            sysvals: BTreeSet::new(),
            uses_atomics: false,
            uses_barriers: false,
            has_side_effects: false,
            stage,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_carries_stage_kind() {
        let mut info = ShaderInfo::new(ShaderStage::Compute);
        info.temps = 3;
        let json: serde_json::Value = serde_json::from_str(&info.to_json().unwrap()).unwrap();
        assert_eq!(json["stage"]["kind"], "Compute");
        assert_eq!(json["stage"]["local_size"], serde_json::json!([1, 1, 1]));
        assert_eq!(json["temps"], 3);
        assert_eq!(json["entry_offset"], serde_json::Value::Null);
    }
}
