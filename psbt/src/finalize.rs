// Modern, minimalistic & standard-compliant cold wallet library.
//
// SPDX-License-Identifier: Apache-2.0
//
// Written in 2020-2023 by
//     Dr Maxim Orlovsky <orlovsky@lnp-bp.org>
//
// Copyright (C) 2020-2023 LNP/BP Standards Association. All rights reserved.
// Copyright (C) 2020-2023 Dr Maxim Orlovsky. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use bc::{SigScript, Witness};

use crate::script::push_slice;
use crate::{Missing, Psbt};

#[derive(Copy, Clone, Eq, PartialEq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum FinalizeError {
    /// PSBT has no input #{0}.
    InputIndex(usize),

    /// input #{0} is not ready to be finalized: {1} is missing.
    NotReadyToFinalize(usize, Missing),
}

impl Psbt {
    /// Converts signatures and scripts of the input into its final scriptSig and witness.
    ///
    /// Signing data are removed from the input afterwards, while the UTXO data and the
    /// proprietary and unknown keys are kept. Calling the method for an already finalized
    /// input does nothing.
    pub fn finalize_input(&mut self, index: usize) -> Result<(), FinalizeError> {
        let input = self.inputs.get(index).ok_or(FinalizeError::InputIndex(index))?;
        if input.is_final() {
            return Ok(());
        }

        let assessment = self.assess(index).ok_or(FinalizeError::InputIndex(index))?;
        let Some(satisfaction) = assessment.satisfaction else {
            let missing = assessment.missing.first().copied().unwrap_or(Missing::PartialSigOrFinal);
            return Err(FinalizeError::NotReadyToFinalize(index, missing));
        };

        let mut script_sig = Vec::new();
        for item in &satisfaction.script_sig {
            push_slice(&mut script_sig, item);
        }

        let input = self.inputs.get_mut(index).ok_or(FinalizeError::InputIndex(index))?;
        input.clear_signing_material();
        if !script_sig.is_empty() {
            input.final_script_sig = Some(SigScript::from_unsafe(script_sig));
        }
        if !satisfaction.witness.is_empty() {
            input.final_witness = Some(Witness::from_consensus_stack(satisfaction.witness));
        }

        if let Some(class) = assessment.class {
            debug!("input #{index} finalized as {class}");
        }
        Ok(())
    }

    /// Finalizes all inputs in order, stopping at the first input which can't be finalized.
    /// Inputs finalized before the failure stay final.
    pub fn finalize_all(&mut self) -> Result<(), FinalizeError> {
        for index in 0..self.inputs.len() {
            self.finalize_input(index)?;
        }
        Ok(())
    }
}
