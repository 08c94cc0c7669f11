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

use amplify::Bytes4;
use bc::{
    Bip340Sig, CompressedPk, Outpoint, RedeemScript, Sats, ScriptPubkey, SeqNo, SighashType,
    TapScript, Tx, TxOut, Txid, Vout, WitnessScript, XOnlyPk,
};

use crate::taproot::parse_control_block;
use crate::{Input, InvalidControlBlock, KeyOrigin, Output, Psbt, PsbtVer};

#[derive(Clone, Eq, PartialEq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum UpdateError {
    /// PSBT has no input #{0}.
    InputIndex(usize),

    /// PSBT has no output #{0}.
    OutputIndex(usize),

    /// {0} is available only for PSBT v2.
    NotV2(&'static str),

    /// input #{0} is already finalized and can't take more signing data.
    InputFinalized(usize),

    /// no UTXO data were provided for input #{0}.
    NoUtxo(usize),

    /// input #{0} has an invalid control block: {1}
    InvalidControlBlock(usize, InvalidControlBlock),

    /// input #{0} has no taproot leaf script and control block to attach leaf signatures to.
    NoTapLeaf(usize),
}

impl Psbt {
    fn input_slot(&mut self, index: usize) -> Result<&mut Input, UpdateError> {
        self.inputs.get_mut(index).ok_or(UpdateError::InputIndex(index))
    }

    fn open_input(&mut self, index: usize) -> Result<&mut Input, UpdateError> {
        let input = self.input_slot(index)?;
        if input.is_final() {
            return Err(UpdateError::InputFinalized(index));
        }
        Ok(input)
    }

    fn output_slot(&mut self, index: usize) -> Result<&mut Output, UpdateError> {
        self.outputs.get_mut(index).ok_or(UpdateError::OutputIndex(index))
    }

    fn require_v2(&self, operation: &'static str) -> Result<(), UpdateError> {
        if self.version() != PsbtVer::V2 {
            return Err(UpdateError::NotV2(operation));
        }
        Ok(())
    }

    /// Attaches the output spent by the input and/or the whole transaction containing it.
    ///
    /// The full previous transaction lets signers of legacy inputs verify the spent amount
    /// instead of trusting the witness UTXO. At least one of the two must be given; a value
    /// given replaces the one stored before, while the other one is kept.
    pub fn set_utxo(
        &mut self,
        index: usize,
        witness_utxo: Option<TxOut>,
        non_witness_tx: Option<Tx>,
    ) -> Result<(), UpdateError> {
        if witness_utxo.is_none() && non_witness_tx.is_none() {
            return Err(UpdateError::NoUtxo(index));
        }
        let input = self.input_slot(index)?;
        if witness_utxo.is_some() {
            input.witness_utxo = witness_utxo;
        }
        if non_witness_tx.is_some() {
            input.non_witness_tx = non_witness_tx;
        }
        debug!("input #{index}: UTXO data updated");
        Ok(())
    }

    pub fn set_scripts(
        &mut self,
        index: usize,
        redeem_script: Option<RedeemScript>,
        witness_script: Option<WitnessScript>,
    ) -> Result<(), UpdateError> {
        let input = self.open_input(index)?;
        if redeem_script.is_some() {
            input.redeem_script = redeem_script;
        }
        if witness_script.is_some() {
            input.witness_script = witness_script;
        }
        Ok(())
    }

    /// Sets up the taproot script path spend for the input.
    ///
    /// The control block is validated before anything is changed. `extra_stack` replaces the
    /// explicit witness items previously provided for the input; when non-empty they are used
    /// in the final witness instead of the leaf-scoped signatures.
    pub fn set_taproot_script_path(
        &mut self,
        index: usize,
        leaf_script: TapScript,
        control_block: &[u8],
        annex: Option<Vec<u8>>,
        extra_stack: impl IntoIterator<Item = Vec<u8>>,
    ) -> Result<(), UpdateError> {
        let cb = parse_control_block(control_block)
            .map_err(|err| UpdateError::InvalidControlBlock(index, err))?;
        let input = self.open_input(index)?;
        input.tap_leaf_script = Some(leaf_script);
        input.tap_control_block = Some(cb);
        input.tap_annex = annex;
        input.witness_stack = extra_stack.into_iter().collect();
        debug!(
            "input #{index}: taproot script path set with {} merkle branch nodes",
            input.tap_control_block.as_ref().map(|cb| cb.merkle_branch.len()).unwrap_or_default()
        );
        Ok(())
    }

    pub fn add_derivation(
        &mut self,
        index: usize,
        pk: CompressedPk,
        master_fp: impl Into<Bytes4>,
        derivation: impl IntoIterator<Item = u32>,
    ) -> Result<(), UpdateError> {
        let input = self.open_input(index)?;
        input.bip32_derivation.insert(pk, KeyOrigin::new(master_fp, derivation));
        Ok(())
    }

    pub fn set_input_meta(
        &mut self,
        index: usize,
        prev_txid: Txid,
        prev_vout: Vout,
        sequence: SeqNo,
    ) -> Result<(), UpdateError> {
        self.require_v2("input meta")?;
        let input = self.input_slot(index)?;
        input.previous_outpoint = Some(Outpoint::new(prev_txid, prev_vout));
        input.sequence_number = Some(sequence);
        Ok(())
    }

    pub fn set_output_meta(
        &mut self,
        index: usize,
        amount: Sats,
        script: ScriptPubkey,
    ) -> Result<(), UpdateError> {
        self.require_v2("output meta")?;
        let output = self.output_slot(index)?;
        output.amount = Some(amount);
        output.script = Some(script);
        Ok(())
    }

    pub fn set_sighash_type(
        &mut self,
        index: usize,
        sighash_type: SighashType,
    ) -> Result<(), UpdateError> {
        self.open_input(index)?.sighash_type = Some(sighash_type);
        Ok(())
    }

    /// Sets explicit witness items satisfying a P2WSH (or P2SH-wrapped) witness script.
    ///
    /// These items are put into the final witness in place of signatures and are never
    /// verified, so a packet carrying them can be finalized without any signature.
    pub fn set_witness_stack(
        &mut self,
        index: usize,
        items: impl IntoIterator<Item = Vec<u8>>,
    ) -> Result<(), UpdateError> {
        self.open_input(index)?.witness_stack = items.into_iter().collect();
        Ok(())
    }

    /// Stores a script path signature computed by the caller for the leaf of the input.
    pub fn add_tap_script_sig(
        &mut self,
        index: usize,
        pk: XOnlyPk,
        sig: Bip340Sig,
    ) -> Result<(), UpdateError> {
        let input = self.open_input(index)?;
        let leaf_hash = input.tap_leaf_hash().ok_or(UpdateError::NoTapLeaf(index))?;
        input.tap_script_sig.insert((pk, leaf_hash), sig);
        debug!("input #{index}: script path signature for leaf {leaf_hash} added");
        Ok(())
    }

    pub fn set_output_scripts(
        &mut self,
        index: usize,
        redeem_script: Option<RedeemScript>,
        witness_script: Option<WitnessScript>,
    ) -> Result<(), UpdateError> {
        let output = self.output_slot(index)?;
        if redeem_script.is_some() {
            output.redeem_script = redeem_script;
        }
        if witness_script.is_some() {
            output.witness_script = witness_script;
        }
        Ok(())
    }

    pub fn add_output_derivation(
        &mut self,
        index: usize,
        pk: CompressedPk,
        master_fp: impl Into<Bytes4>,
        derivation: impl IntoIterator<Item = u32>,
    ) -> Result<(), UpdateError> {
        let output = self.output_slot(index)?;
        output.bip32_derivation.insert(pk, KeyOrigin::new(master_fp, derivation));
        Ok(())
    }
}
