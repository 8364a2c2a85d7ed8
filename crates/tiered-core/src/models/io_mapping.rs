use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A single named input or output slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IoSlot {
    #[serde(default)]
    pub value: Value,
}

/// Per-step binding of named inputs and outputs to concrete values.
///
/// Templates read from `inputs`. API-call steps with an output mapping write
/// resolved values back into `outputs[name].value`, but only for slots that
/// already exist; the caller owns the mapping and observes those writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubroutineIoMapping {
    #[serde(default)]
    pub inputs: BTreeMap<String, IoSlot>,
    #[serde(default)]
    pub outputs: BTreeMap<String, IoSlot>,
}

impl SubroutineIoMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, name: impl Into<String>, value: Value) -> Self {
        self.inputs.insert(name.into(), IoSlot { value });
        self
    }

    /// Declare an (initially null) output slot.
    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.outputs.insert(name.into(), IoSlot::default());
        self
    }

    pub fn input_value(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name).map(|slot| &slot.value)
    }

    pub fn output_value(&self, name: &str) -> Option<&Value> {
        self.outputs.get(name).map(|slot| &slot.value)
    }

    /// Write into an existing output slot. Returns false when no slot is declared.
    pub fn write_output(&mut self, name: &str, value: Value) -> bool {
        match self.outputs.get_mut(name) {
            Some(slot) => {
                slot.value = value;
                true
            }
            None => false,
        }
    }
}
