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

use std::hash::Hash;

use bc::Txid;
use indexmap::IndexMap;

use crate::{Input, Output, Psbt, PsbtVer, TxTemplate};

/// Reason why two packets can't be combined.
#[derive(Clone, Eq, PartialEq, Debug, Display)]
#[display(doc_comments)]
pub enum TemplateMismatch {
    /// PSBT {0} can't be combined with PSBT {1}.
    Version(PsbtVer, PsbtVer),

    /// number of inputs differs ({0} vs {1}).
    InputCount(usize, usize),

    /// number of outputs differs ({0} vs {1}).
    OutputCount(usize, usize),

    /// packets wrap different transactions {0} and {1}.
    Txid(Txid, Txid),

    /// transaction version or fallback lock time differs.
    TxParams,

    /// input #{0} spends a different outpoint or has a different sequence number.
    Input(usize),

    /// output #{0} has a different amount or script.
    Output(usize),
}

#[derive(Clone, Eq, PartialEq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum CombineError {
    /// packets describe different transactions: {0}
    TemplateMismatch(TemplateMismatch),
}

fn merge_opt<T>(dst: &mut Option<T>, src: Option<T>) {
    if dst.is_none() {
        *dst = src;
    }
}

/// Adds entries which are not present yet; existing entries are kept.
fn merge_map<K: Hash + Eq, V>(dst: &mut IndexMap<K, V>, src: IndexMap<K, V>) -> usize {
    let mut added = 0usize;
    for (key, value) in src {
        if !dst.contains_key(&key) {
            dst.insert(key, value);
            added += 1;
        }
    }
    added
}

fn merge_unknown<K: Hash + Eq>(
    dst: &mut IndexMap<u8, IndexMap<K, Vec<u8>>>,
    src: IndexMap<u8, IndexMap<K, Vec<u8>>>,
) {
    for (key_type, submap) in src {
        merge_map(dst.entry(key_type).or_default(), submap);
    }
}

impl Psbt {
    /// Checks that `other` describes the same transaction as this packet.
    pub fn check_template(&self, other: &Psbt) -> Result<(), TemplateMismatch> {
        if self.version() != other.version() {
            return Err(TemplateMismatch::Version(self.version(), other.version()));
        }
        if self.inputs.len() != other.inputs.len() {
            return Err(TemplateMismatch::InputCount(self.inputs.len(), other.inputs.len()));
        }
        if self.outputs.len() != other.outputs.len() {
            return Err(TemplateMismatch::OutputCount(self.outputs.len(), other.outputs.len()));
        }
        match (&self.template, &other.template) {
            (TxTemplate::Wrapped(tx1), TxTemplate::Wrapped(tx2)) => {
                let (txid1, txid2) = (tx1.txid(), tx2.txid());
                if txid1 != txid2 {
                    return Err(TemplateMismatch::Txid(txid1, txid2));
                }
            }
            (TxTemplate::Explicit { .. }, TxTemplate::Explicit { .. }) => {
                if self.template != other.template {
                    return Err(TemplateMismatch::TxParams);
                }
                for (a, b) in self.inputs.iter().zip(&other.inputs) {
                    if a.previous_outpoint != b.previous_outpoint
                        || a.sequence_number != b.sequence_number
                    {
                        return Err(TemplateMismatch::Input(a.index));
                    }
                }
                for (a, b) in self.outputs.iter().zip(&other.outputs) {
                    if a.amount != b.amount || a.script != b.script {
                        return Err(TemplateMismatch::Output(a.index));
                    }
                }
            }
            _ => unreachable!("versions are checked to be equal"),
        }
        Ok(())
    }

    /// Merges signatures and metadata collected in `other` into this packet.
    ///
    /// Both packets must describe the same transaction; otherwise nothing is changed. Values
    /// already present in this packet win over the ones from `other`. Finalized inputs are
    /// left as they are.
    pub fn combine(&mut self, other: Psbt) -> Result<(), CombineError> {
        self.check_template(&other).map_err(CombineError::TemplateMismatch)?;

        let mut added = 0usize;
        for (input, theirs) in self.inputs.iter_mut().zip(other.inputs) {
            added += input.combine(theirs);
        }
        for (output, theirs) in self.outputs.iter_mut().zip(other.outputs) {
            output.combine(theirs);
        }
        merge_map(&mut self.proprietary, other.proprietary);
        merge_unknown(&mut self.unknown, other.unknown);

        debug!("combined PSBT with {added} new signatures");
        Ok(())
    }
}

impl Input {
    fn combine(&mut self, other: Input) -> usize {
        if self.is_final() {
            return 0;
        }

        merge_opt(&mut self.non_witness_tx, other.non_witness_tx);
        merge_opt(&mut self.witness_utxo, other.witness_utxo);
        merge_opt(&mut self.sighash_type, other.sighash_type);
        merge_opt(&mut self.redeem_script, other.redeem_script);
        merge_opt(&mut self.witness_script, other.witness_script);
        if self.tap_leaf_script.is_none() && self.tap_control_block.is_none() {
            self.tap_leaf_script = other.tap_leaf_script;
            self.tap_control_block = other.tap_control_block;
        }
        merge_opt(&mut self.tap_annex, other.tap_annex);
        if self.witness_stack.is_empty() {
            self.witness_stack = other.witness_stack;
        }

        let mut added = merge_map(&mut self.partial_sigs, other.partial_sigs);
        added += merge_map(&mut self.tap_script_sig, other.tap_script_sig);
        if self.tap_key_sig.is_none() && other.tap_key_sig.is_some() {
            self.tap_key_sig = other.tap_key_sig;
            added += 1;
        }
        merge_map(&mut self.bip32_derivation, other.bip32_derivation);
        merge_map(&mut self.proprietary, other.proprietary);
        merge_unknown(&mut self.unknown, other.unknown);

        added
    }
}

impl Output {
    fn combine(&mut self, other: Output) {
        merge_opt(&mut self.redeem_script, other.redeem_script);
        merge_opt(&mut self.witness_script, other.witness_script);
        merge_map(&mut self.bip32_derivation, other.bip32_derivation);
        merge_map(&mut self.proprietary, other.proprietary);
        merge_unknown(&mut self.unknown, other.unknown);
    }
}

#[cfg(test)]
mod test {
    use bc::{Outpoint, RedeemScript, Sats, ScriptPubkey, SigScript, TxVer, Vout};

    use super::*;

    fn psbt() -> Psbt {
        let mut psbt = Psbt::create_v2(TxVer::V2, None, 2, 1);
        for (index, input) in psbt.inputs.iter_mut().enumerate() {
            input.previous_outpoint =
                Some(Outpoint::new(Txid::from([1u8; 32]), Vout::from_u32(index as u32)));
        }
        psbt.outputs[0].amount = Some(Sats(100));
        psbt.outputs[0].script = Some(ScriptPubkey::from_unsafe(vec![0x51]));
        psbt
    }

    #[test]
    fn mismatch_aborts() {
        let mut a = psbt();
        let mut b = psbt();
        b.inputs[1].previous_outpoint = None;
        b.inputs[0].redeem_script = Some(RedeemScript::from_unsafe(vec![0x51]));
        let before = a.clone();
        assert_eq!(a.combine(b), Err(CombineError::TemplateMismatch(TemplateMismatch::Input(1))));
        assert_eq!(a, before);

        let b = Psbt::create_v2(TxVer::V2, None, 1, 1);
        assert_eq!(a.check_template(&b), Err(TemplateMismatch::InputCount(2, 1)));
    }

    #[test]
    fn self_combine_is_noop() {
        let mut a = psbt();
        a.inputs[0].redeem_script = Some(RedeemScript::from_unsafe(vec![0x51]));
        a.unknown.entry(0x42).or_default().insert(vec![1], vec![2]);
        let expected = a.clone();
        a.combine(expected.clone()).unwrap();
        assert_eq!(a, expected);
    }

    #[test]
    fn first_value_wins() {
        let mut a = psbt();
        let mut b = psbt();
        a.inputs[0].redeem_script = Some(RedeemScript::from_unsafe(vec![0x51]));
        b.inputs[0].redeem_script = Some(RedeemScript::from_unsafe(vec![0x52]));
        b.inputs[1].redeem_script = Some(RedeemScript::from_unsafe(vec![0x53]));
        a.combine(b).unwrap();
        assert_eq!(a.inputs[0].redeem_script, Some(RedeemScript::from_unsafe(vec![0x51])));
        assert_eq!(a.inputs[1].redeem_script, Some(RedeemScript::from_unsafe(vec![0x53])));
    }

    #[test]
    fn final_input_untouched() {
        let mut a = psbt();
        a.inputs[0].final_script_sig = Some(SigScript::from_unsafe(vec![0x51]));
        let mut b = psbt();
        b.inputs[0].redeem_script = Some(RedeemScript::from_unsafe(vec![0x51]));
        a.combine(b).unwrap();
        assert_eq!(a.inputs[0].redeem_script, None);
    }
}
