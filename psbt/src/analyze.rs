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

//! Readiness analysis of the packet inputs.
//!
//! The same per-class rules produce both the report and the final unlocking data, so an input
//! reported as ready is always finalizable.

use bc::{CompressedPk, ControlBlock, LeafScript, LeafVer, LegacySig, TapScript};

use crate::script::{
    count_sig_ops, pubkey_hash, script_hash, wscript_hash, xonly_pushes, Multisig, ScriptClass,
    SpendClass,
};
use crate::taproot::serialize_control_block;
use crate::{Input, Psbt};

/// Item which prevents an input from being finalized.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub enum Missing {
    /// Neither witness nor non-witness UTXO is present, or it doesn't match the spent outpoint.
    #[display("utxo")]
    Utxo,

    /// Legacy inputs require the full previous transaction.
    #[display("non_witness_utxo")]
    NonWitnessUtxo,

    /// None of the signatures is made by the key committed in the spent script.
    #[display("pubkey_match")]
    PubkeyMatch,

    #[display("partial_sig")]
    PartialSig,

    /// Number of multisig signatures still to be collected.
    #[display("partial_sig_needed:{0}")]
    PartialSigNeeded(usize),

    #[display("redeem_script")]
    RedeemScript,

    #[display("redeem_script_hash")]
    RedeemScriptHash,

    #[display("witness_script")]
    WitnessScript,

    #[display("witness_script_hash")]
    WitnessScriptHash,

    /// Only one of the leaf script and control block is present.
    #[display("tap_script_path_data")]
    TapScriptPathData,

    /// Leaf version is not the tapscript one.
    #[display("tap_leaf_version")]
    TapLeafVersion,

    #[display("tap_script_sig_needed:{0}")]
    TapScriptSigNeeded(usize),

    #[display("tap_key_sig")]
    TapKeySig,

    #[display("partial_sig_or_final")]
    PartialSigOrFinal,
}

/// Readiness report for a single input.
#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct InputAnalysis {
    pub index: usize,
    pub is_final: bool,
    /// Class of the spent output; `None` if the output is not known.
    pub class: Option<SpendClass>,
    pub missing: Vec<Missing>,
    /// Signatures present which are usable for the spend.
    pub signatures: usize,
    /// Signatures required by the spent script.
    pub signatures_required: usize,
    pub ready: bool,
}

#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct Analysis {
    pub inputs: Vec<InputAnalysis>,
    pub can_finalize: bool,
}

/// Unlocking data for an input which is ready to be finalized.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub(crate) struct Satisfaction {
    /// Items pushed by the final scriptSig.
    pub script_sig: Vec<Vec<u8>>,
    pub witness: Vec<Vec<u8>>,
}

#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub(crate) struct Assessment {
    pub class: Option<SpendClass>,
    pub missing: Vec<Missing>,
    pub signatures: usize,
    pub required: usize,
    pub satisfaction: Option<Satisfaction>,
}

impl Assessment {
    fn miss<T>(&mut self, item: Missing) -> Option<T> {
        self.missing.push(item);
        None
    }
}

/// Where a script with arbitrary spending conditions is placed.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum ScriptCtx {
    /// Witness script of P2WSH.
    Witness,
    /// Redeem script of a legacy P2SH.
    Redeem,
    /// Output script itself.
    Bare,
}

impl Input {
    /// Finds a signature by the key with the given hash, preferring keys with known
    /// derivation.
    fn key_hash_sig(&self, key_hash: &[u8]) -> Option<(&CompressedPk, &LegacySig)> {
        let mut matching = self.partial_sigs.iter().filter(|(pk, _)| pubkey_hash(pk) == key_hash);
        let first = matching.clone().next()?;
        Some(matching.find(|(pk, _)| self.bip32_derivation.contains_key(*pk)).unwrap_or(first))
    }

    fn satisfy_key_hash(
        &self,
        key_hash: Option<&[u8]>,
        a: &mut Assessment,
    ) -> Option<Vec<Vec<u8>>> {
        a.required = 1;
        a.signatures = self.partial_sigs.len();
        if self.partial_sigs.is_empty() {
            return a.miss(Missing::PartialSig);
        }
        let Some((pk, sig)) = key_hash.and_then(|hash| self.key_hash_sig(hash)) else {
            return a.miss(Missing::PubkeyMatch);
        };
        a.signatures = 1;
        Some(vec![sig.to_vec(), pk.serialize().to_vec()])
    }

    fn satisfy_script(
        &self,
        script: &[u8],
        ctx: ScriptCtx,
        a: &mut Assessment,
    ) -> Option<Vec<Vec<u8>>> {
        if let Some(multisig) = Multisig::parse(script) {
            // OP_CHECKMULTISIG takes signatures in the order of the keys in the script
            let sigs = multisig
                .keys
                .iter()
                .filter_map(|pk| self.partial_sigs.get(pk))
                .take(multisig.threshold)
                .map(|sig| sig.to_vec())
                .collect::<Vec<_>>();
            a.required = multisig.threshold;
            a.signatures = sigs.len();
            if sigs.len() < multisig.threshold {
                return a.miss(Missing::PartialSigNeeded(multisig.threshold - sigs.len()));
            }
            let mut stack = vec![vec![]];
            stack.extend(sigs);
            return Some(stack);
        }

        a.required = 1;
        a.signatures = self.partial_sigs.len();
        if ctx != ScriptCtx::Bare && !self.witness_stack.is_empty() {
            warn!(
                "input #{}: using {} explicit witness items without verification",
                self.index,
                self.witness_stack.len()
            );
            return Some(self.witness_stack.clone());
        }
        match ctx {
            ScriptCtx::Witness => {
                let Some(sig) = self.partial_sigs.values().next() else {
                    return a.miss(Missing::PartialSig);
                };
                Some(vec![sig.to_vec()])
            }
            ScriptCtx::Redeem | ScriptCtx::Bare => {
                if self.partial_sigs.is_empty() {
                    return a.miss(Missing::PartialSigOrFinal);
                }
                Some(self.partial_sigs.values().map(|sig| sig.to_vec()).collect())
            }
        }
    }

    fn satisfy_wsh(&self, commitment: Option<&[u8]>, a: &mut Assessment) -> Option<Vec<Vec<u8>>> {
        let Some(witness_script) = &self.witness_script else {
            return a.miss(Missing::WitnessScript);
        };
        let witness_script = witness_script.as_slice();
        if commitment != Some(&wscript_hash(witness_script)[..]) {
            return a.miss(Missing::WitnessScriptHash);
        }
        let mut witness = self.satisfy_script(witness_script, ScriptCtx::Witness, a)?;
        witness.push(witness_script.to_vec());
        Some(witness)
    }

    fn satisfy_tap_leaf(
        &self,
        script: &TapScript,
        cb: &ControlBlock,
        a: &mut Assessment,
    ) -> Option<Vec<Vec<u8>>> {
        if cb.leaf_version != LeafVer::TapScript {
            return a.miss(Missing::TapLeafVersion);
        }
        let leaf_hash =
            LeafScript::new(cb.leaf_version, script.as_script_bytes().clone()).tap_leaf_hash();
        let script = script.as_slice();
        let mut witness = if !self.witness_stack.is_empty() {
            warn!(
                "input #{}: using {} explicit script path witness items without verification",
                self.index,
                self.witness_stack.len()
            );
            self.witness_stack.clone()
        } else {
            // the last key in the script consumes the top stack element
            let sigs = xonly_pushes(script)
                .into_iter()
                .rev()
                .filter_map(|key| {
                    self.tap_script_sig.iter().find_map(|((pk, hash), sig)| {
                        (*hash == leaf_hash && pk.to_byte_array() == key).then(|| sig.to_vec())
                    })
                })
                .collect::<Vec<_>>();
            a.required = count_sig_ops(script);
            a.signatures = sigs.len();
            if sigs.len() < a.required {
                return a.miss(Missing::TapScriptSigNeeded(a.required - sigs.len()));
            }
            sigs
        };
        witness.push(script.to_vec());
        witness.push(serialize_control_block(cb));
        Some(witness)
    }

    fn satisfy_taproot(&self, a: &mut Assessment) -> Option<Vec<Vec<u8>>> {
        let mut witness = match (&self.tap_leaf_script, &self.tap_control_block) {
            (Some(script), Some(cb)) => self.satisfy_tap_leaf(script, cb, a)?,
            (None, None) => {
                a.required = 1;
                let Some(sig) = &self.tap_key_sig else {
                    return a.miss(Missing::TapKeySig);
                };
                a.signatures = 1;
                vec![sig.to_vec()]
            }
            _ => return a.miss(Missing::TapScriptPathData),
        };
        // annex always takes the last witness position
        witness.extend(self.tap_annex.clone());
        Some(witness)
    }
}

impl Psbt {
    /// Checks what the input lacks for finalization and, if nothing, constructs its final
    /// unlocking data.
    pub(crate) fn assess(&self, index: usize) -> Option<Assessment> {
        let input = self.inputs.get(index)?;
        let mut a = Assessment::default();

        if input.is_final() {
            a.class = self
                .resolve_prevout(index)
                .ok()
                .map(|prevout| SpendClass::with(prevout.script_pubkey.as_slice(), None));
            return Some(a);
        }

        let prevout = match self.resolve_prevout(index) {
            Ok(prevout) => prevout,
            Err(err) => {
                trace!("input #{index}: {err}");
                a.missing.push(Missing::Utxo);
                return Some(a);
            }
        };
        let spk = prevout.script_pubkey.as_slice();
        let redeem_script = input.redeem_script.as_ref().map(|script| script.as_slice());
        let class = SpendClass::with(spk, redeem_script);
        a.class = Some(class);

        let satisfaction = match (class, redeem_script) {
            (SpendClass::P2pkh, _) => {
                if input.non_witness_tx.is_none() {
                    a.missing.push(Missing::NonWitnessUtxo);
                }
                let commitment = ScriptClass::P2pkh.commitment(spk);
                input.satisfy_key_hash(commitment, &mut a).map(|script_sig| Satisfaction {
                    script_sig,
                    witness: vec![],
                })
            }
            (SpendClass::P2wpkh, _) => {
                let commitment = ScriptClass::P2wpkh.commitment(spk);
                input.satisfy_key_hash(commitment, &mut a).map(|witness| Satisfaction {
                    script_sig: vec![],
                    witness,
                })
            }
            (SpendClass::P2wsh, _) => {
                let commitment = ScriptClass::P2wsh.commitment(spk);
                input.satisfy_wsh(commitment, &mut a).map(|witness| Satisfaction {
                    script_sig: vec![],
                    witness,
                })
            }
            (SpendClass::P2tr, _) => input.satisfy_taproot(&mut a).map(|witness| Satisfaction {
                script_sig: vec![],
                witness,
            }),
            (SpendClass::Unknown, _) => {
                input.satisfy_script(spk, ScriptCtx::Bare, &mut a).map(|script_sig| {
                    Satisfaction {
                        script_sig,
                        witness: vec![],
                    }
                })
            }
            (SpendClass::P2shOpaque, _) | (SpendClass::P2sh(_), None) => {
                a.miss(Missing::RedeemScript)
            }
            (SpendClass::P2sh(inner), Some(redeem)) => {
                if ScriptClass::P2sh.commitment(spk) != Some(&script_hash(redeem)[..]) {
                    a.miss(Missing::RedeemScriptHash)
                } else {
                    Self::assess_nested(input, inner, redeem, &mut a)
                }
            }
        };

        if a.missing.is_empty() {
            a.satisfaction = satisfaction;
        }
        Some(a)
    }

    fn assess_nested(
        input: &Input,
        inner: ScriptClass,
        redeem: &[u8],
        a: &mut Assessment,
    ) -> Option<Satisfaction> {
        let redeem_push = redeem.to_vec();
        match inner {
            ScriptClass::P2pkh => {
                if input.non_witness_tx.is_none() {
                    a.missing.push(Missing::NonWitnessUtxo);
                }
                let mut script_sig = input.satisfy_key_hash(inner.commitment(redeem), a)?;
                script_sig.push(redeem_push);
                Some(Satisfaction {
                    script_sig,
                    witness: vec![],
                })
            }
            ScriptClass::P2wpkh => {
                let witness = input.satisfy_key_hash(inner.commitment(redeem), a)?;
                Some(Satisfaction {
                    script_sig: vec![redeem_push],
                    witness,
                })
            }
            ScriptClass::P2wsh => {
                let witness = input.satisfy_wsh(inner.commitment(redeem), a)?;
                Some(Satisfaction {
                    script_sig: vec![redeem_push],
                    witness,
                })
            }
            ScriptClass::P2sh | ScriptClass::P2tr | ScriptClass::Unknown => {
                let mut script_sig = input.satisfy_script(redeem, ScriptCtx::Redeem, a)?;
                script_sig.push(redeem_push);
                Some(Satisfaction {
                    script_sig,
                    witness: vec![],
                })
            }
        }
    }

    /// Reports readiness of a single input; `None` if there is no such input.
    pub fn analyze_input(&self, index: usize) -> Option<InputAnalysis> {
        let input = self.inputs.get(index)?;
        let a = self.assess(index)?;
        let ready = input.is_final() || a.satisfaction.is_some();
        Some(InputAnalysis {
            index,
            is_final: input.is_final(),
            class: a.class,
            missing: a.missing,
            signatures: a.signatures,
            signatures_required: a.required,
            ready,
        })
    }

    /// Reports readiness of all inputs. The packet is not modified.
    pub fn analyze(&self) -> Analysis {
        let inputs = (0..self.inputs.len())
            .filter_map(|index| self.analyze_input(index))
            .collect::<Vec<_>>();
        let can_finalize = inputs.iter().all(|input| input.ready);
        Analysis {
            inputs,
            can_finalize,
        }
    }

    #[inline]
    pub fn can_finalize(&self) -> bool { self.analyze().can_finalize }
}

#[cfg(test)]
mod test {
    use amplify::hex::FromHex;
    use bc::{
        RedeemScript, Sats, ScriptPubkey, SeqNo, SigScript, TxOut, TxVer, Txid, Vout,
        WitnessScript,
    };

    use super::*;
    use crate::taproot::parse_control_block;

    fn key_only_block(header: u8) -> ControlBlock {
        let mut data = vec![header];
        data.extend(
            Vec::<u8>::from_hex("79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798")
                .unwrap(),
        );
        parse_control_block(&data).unwrap()
    }

    fn psbt_spending(spk: Vec<u8>) -> Psbt {
        let mut psbt = Psbt::create_v2(TxVer::V2, None, 1, 1);
        psbt.set_input_meta(
            0,
            Txid::from([2u8; 32]),
            Vout::from_u32(1),
            SeqNo::from_consensus_u32(u32::MAX),
        )
        .unwrap();
        psbt.set_output_meta(0, Sats(900), ScriptPubkey::from_unsafe(vec![0x51])).unwrap();
        psbt.set_utxo(0, Some(TxOut::new(ScriptPubkey::from_unsafe(spk), Sats(1000))), None)
            .unwrap();
        psbt
    }

    #[test]
    fn missing_tokens() {
        assert_eq!(Missing::Utxo.to_string(), "utxo");
        assert_eq!(Missing::PartialSigNeeded(2).to_string(), "partial_sig_needed:2");
        assert_eq!(Missing::TapScriptSigNeeded(1).to_string(), "tap_script_sig_needed:1");
        assert_eq!(Missing::PartialSigOrFinal.to_string(), "partial_sig_or_final");
    }

    #[test]
    fn no_utxo() {
        let psbt = Psbt::create_v2(TxVer::V2, None, 1, 1);
        let report = psbt.analyze();
        assert!(!report.can_finalize);
        assert_eq!(report.inputs[0].missing, vec![Missing::Utxo]);
        assert_eq!(report.inputs[0].class, None);
    }

    #[test]
    fn p2wpkh_needs_sig() {
        let mut spk = vec![0x00, 0x14];
        spk.extend([9u8; 20]);
        let psbt = psbt_spending(spk);
        let report = psbt.analyze_input(0).unwrap();
        assert_eq!(report.class, Some(SpendClass::P2wpkh));
        assert_eq!(report.missing, vec![Missing::PartialSig]);
        assert_eq!(report.signatures_required, 1);
        assert!(!report.ready);
    }

    #[test]
    fn p2wsh_script_hash() {
        let mut spk = vec![0x00, 0x20];
        spk.extend([9u8; 32]);
        let mut psbt = psbt_spending(spk);
        assert_eq!(psbt.analyze_input(0).unwrap().missing, vec![Missing::WitnessScript]);

        psbt.inputs[0].witness_script = Some(WitnessScript::from_unsafe(vec![0x51]));
        assert_eq!(psbt.analyze_input(0).unwrap().missing, vec![Missing::WitnessScriptHash]);
    }

    #[test]
    fn p2wsh_witness_stack_override() {
        let witness_script = vec![0x75, 0x51];
        let mut spk = vec![0x00, 0x20];
        spk.extend(wscript_hash(&witness_script));
        let mut psbt = psbt_spending(spk);
        psbt.set_scripts(0, None, Some(WitnessScript::from_unsafe(witness_script.clone())))
            .unwrap();
        assert_eq!(psbt.analyze_input(0).unwrap().missing, vec![Missing::PartialSig]);

        psbt.set_witness_stack(0, [vec![0x01]]).unwrap();
        let a = psbt.assess(0).unwrap();
        assert!(a.missing.is_empty());
        assert_eq!(a.satisfaction.unwrap().witness, vec![vec![0x01], witness_script]);
    }

    #[test]
    fn p2sh_requires_redeem_script() {
        let redeem = vec![0x51];
        let mut spk = vec![0xa9, 0x14];
        spk.extend(script_hash(&redeem));
        spk.push(0x87);
        let mut psbt = psbt_spending(spk);
        let report = psbt.analyze_input(0).unwrap();
        assert_eq!(report.class, Some(SpendClass::P2shOpaque));
        assert_eq!(report.missing, vec![Missing::RedeemScript]);

        psbt.inputs[0].redeem_script = Some(RedeemScript::from_unsafe(vec![0x52]));
        assert_eq!(psbt.analyze_input(0).unwrap().missing, vec![Missing::RedeemScriptHash]);

        psbt.inputs[0].redeem_script = Some(RedeemScript::from_unsafe(redeem));
        let report = psbt.analyze_input(0).unwrap();
        assert_eq!(report.class, Some(SpendClass::P2sh(ScriptClass::Unknown)));
        assert_eq!(report.missing, vec![Missing::PartialSigOrFinal]);
    }

    #[test]
    fn taproot_paths() {
        let mut spk = vec![0x51, 0x20];
        spk.extend([5u8; 32]);
        let mut psbt = psbt_spending(spk);
        assert_eq!(psbt.analyze_input(0).unwrap().missing, vec![Missing::TapKeySig]);

        psbt.inputs[0].tap_leaf_script = Some(TapScript::from_unsafe(vec![0x51]));
        assert_eq!(psbt.analyze_input(0).unwrap().missing, vec![Missing::TapScriptPathData]);

        psbt.inputs[0].tap_control_block = Some(key_only_block(0xc2));
        assert_eq!(psbt.analyze_input(0).unwrap().missing, vec![Missing::TapLeafVersion]);

        psbt.inputs[0].tap_control_block = Some(key_only_block(0xc1));
        psbt.inputs[0].tap_annex = Some(vec![0x50, 0xaa]);
        let a = psbt.assess(0).unwrap();
        assert!(a.missing.is_empty());
        let witness = a.satisfaction.unwrap().witness;
        assert_eq!(witness.len(), 3);
        assert_eq!(witness[2], vec![0x50, 0xaa]);
    }

    #[test]
    fn final_input_is_ready() {
        let mut psbt = psbt_spending(vec![0x51]);
        psbt.inputs[0].final_script_sig = Some(SigScript::from_unsafe(vec![]));
        let report = psbt.analyze();
        assert!(report.can_finalize);
        assert!(report.inputs[0].is_final);
        assert_eq!(report.inputs[0].class, Some(SpendClass::Unknown));
        assert!(report.inputs[0].missing.is_empty());
    }

    #[test]
    fn analysis_is_stable() {
        let psbt = psbt_spending(vec![0x51]);
        assert_eq!(psbt.analyze(), psbt.analyze());
        assert_eq!(psbt.analyze().inputs[0].missing, vec![Missing::PartialSigOrFinal]);
    }
}
