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

use std::fmt::{self, Display, Formatter};

use amplify::Bytes4;
use bc::{
    Bip340Sig, CompressedPk, ControlBlock, LeafScript, LegacySig, LockTime, Outpoint, RedeemScript,
    Sats, ScriptPubkey, SeqNo, SigScript, SighashType, TapLeafHash, TapScript, Tx, TxIn, TxOut,
    TxVer, Txid, VarIntArray, Witness, WitnessScript, XOnlyPk,
};
use indexmap::IndexMap;

use crate::{KeyData, PropKey, ValueData};

#[derive(Copy, Clone, Eq, PartialEq, Debug, Display, Error)]
#[display("unsupported PSBT version {0}.")]
pub struct PsbtUnsupportedVer(pub u32);

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, Default)]
pub enum PsbtVer {
    /// Transaction-wrapping format of BIP-174.
    #[display("v0")]
    #[default]
    V0 = 0,

    /// Explicit-field format of BIP-370.
    #[display("v2")]
    V2 = 2,
}

impl PsbtVer {
    pub const fn to_standard_u32(&self) -> u32 { *self as u32 }

    pub fn try_from_standard_u32(v: u32) -> Result<Self, PsbtUnsupportedVer> {
        match v {
            0 => Ok(PsbtVer::V0),
            2 => Ok(PsbtVer::V2),
            wrong => Err(PsbtUnsupportedVer(wrong)),
        }
    }
}

/// Master key fingerprint and derivation path of a public key.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct KeyOrigin {
    pub master_fp: Bytes4,
    pub derivation: Vec<u32>,
}

impl KeyOrigin {
    pub const HARDENED_INDEX_BOUNDARY: u32 = 1 << 31;

    pub fn new(master_fp: impl Into<Bytes4>, derivation: impl IntoIterator<Item = u32>) -> Self {
        KeyOrigin {
            master_fp: master_fp.into(),
            derivation: derivation.into_iter().collect(),
        }
    }
}

impl Display for KeyOrigin {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in self.master_fp.to_byte_array() {
            write!(f, "{byte:02x}")?;
        }
        for index in &self.derivation {
            if *index >= Self::HARDENED_INDEX_BOUNDARY {
                write!(f, "/{}h", index - Self::HARDENED_INDEX_BOUNDARY)?;
            } else {
                write!(f, "/{index}")?;
            }
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct UnsignedTxIn {
    pub prev_output: Outpoint,
    pub sequence: SeqNo,
}

/// Transaction with all scriptSigs and witnesses removed.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct UnsignedTx {
    pub version: TxVer,
    pub inputs: Vec<UnsignedTxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: LockTime,
}

impl From<Tx> for UnsignedTx {
    fn from(tx: Tx) -> Self { UnsignedTx::with_sigs_removed(tx) }
}

impl UnsignedTx {
    pub fn with_sigs_removed(tx: Tx) -> Self {
        UnsignedTx {
            version: tx.version,
            inputs: tx
                .inputs
                .iter()
                .map(|txin| UnsignedTxIn {
                    prev_output: txin.prev_output,
                    sequence: txin.sequence,
                })
                .collect(),
            outputs: tx.outputs.iter().cloned().collect(),
            lock_time: tx.lock_time,
        }
    }

    /// Builds a transaction from the template applying the given scriptSig and witness for
    /// each of the inputs.
    pub(crate) fn to_tx_with(&self, mut unlock: impl FnMut(usize) -> (SigScript, Witness)) -> Tx {
        let inputs = self
            .inputs
            .iter()
            .enumerate()
            .map(|(index, txin)| {
                let (sig_script, witness) = unlock(index);
                TxIn {
                    prev_output: txin.prev_output,
                    sig_script,
                    sequence: txin.sequence,
                    witness,
                }
            })
            .collect::<Vec<_>>();
        Tx {
            version: self.version,
            inputs: VarIntArray::from_checked(inputs),
            outputs: VarIntArray::from_checked(self.outputs.clone()),
            lock_time: self.lock_time,
        }
    }

    pub fn to_tx(&self) -> Tx { self.to_tx_with(|_| (none!(), empty!())) }

    pub fn txid(&self) -> Txid { self.to_tx().txid() }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum IncompleteTemplate {
    /// input #{0} has no previous outpoint set.
    Input(usize),

    /// output #{0} has no amount or script set.
    Output(usize),
}

#[derive(Clone, Eq, PartialEq, Debug, Display)]
#[display(doc_comments)]
pub enum UtxoMismatch {
    /// non-witness transaction {1} doesn't match previous transaction id {0}.
    Txid(Txid, Txid),

    /// non-witness transaction {0} has no output #{1}.
    NoOutput(Txid, u32),
}

#[derive(Clone, Eq, PartialEq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum PrevoutError {
    /// input #{0} has neither witness nor non-witness UTXO.
    MissingUtxo(usize),

    /// input #{0}: {1}
    UtxoMismatch(usize, UtxoMismatch),

    #[from]
    #[display(inner)]
    Incomplete(IncompleteTemplate),
}

/// Source of the transaction template the packet is built around.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum TxTemplate {
    /// Version 0: the unsigned transaction is carried in the global map.
    Wrapped(UnsignedTx),

    /// Version 2: the transaction is described by explicit per-input and per-output fields.
    Explicit {
        tx_version: TxVer,
        fallback_locktime: Option<LockTime>,
    },
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Psbt {
    pub(crate) template: TxTemplate,
    pub(crate) inputs: Vec<Input>,
    pub(crate) outputs: Vec<Output>,

    /// Proprietary keys
    pub proprietary: IndexMap<PropKey, ValueData>,

    /// Unknown keys
    pub unknown: IndexMap<u8, IndexMap<KeyData, ValueData>>,
}

impl Psbt {
    pub fn from_unsigned_tx(tx: UnsignedTx) -> Self {
        let inputs = (0..tx.inputs.len()).map(Input::new).collect();
        let outputs = (0..tx.outputs.len()).map(Output::new).collect();
        Psbt {
            template: TxTemplate::Wrapped(tx),
            inputs,
            outputs,
            proprietary: none!(),
            unknown: none!(),
        }
    }

    pub fn from_tx(tx: Tx) -> Self { Self::from_unsigned_tx(UnsignedTx::with_sigs_removed(tx)) }

    /// Creates version 2 packet with the given number of inputs and outputs, whose transaction
    /// data are to be provided with [`Psbt::set_input_meta`] and [`Psbt::set_output_meta`].
    pub fn create_v2(
        tx_version: TxVer,
        fallback_locktime: Option<LockTime>,
        inputs: usize,
        outputs: usize,
    ) -> Self {
        Psbt {
            template: TxTemplate::Explicit {
                tx_version,
                fallback_locktime,
            },
            inputs: (0..inputs).map(Input::new).collect(),
            outputs: (0..outputs).map(Output::new).collect(),
            proprietary: none!(),
            unknown: none!(),
        }
    }

    pub fn version(&self) -> PsbtVer {
        match self.template {
            TxTemplate::Wrapped(_) => PsbtVer::V0,
            TxTemplate::Explicit { .. } => PsbtVer::V2,
        }
    }

    #[inline]
    pub fn template(&self) -> &TxTemplate { &self.template }

    pub fn tx_version(&self) -> TxVer {
        match &self.template {
            TxTemplate::Wrapped(tx) => tx.version,
            TxTemplate::Explicit { tx_version, .. } => *tx_version,
        }
    }

    pub fn lock_time(&self) -> LockTime {
        match &self.template {
            TxTemplate::Wrapped(tx) => tx.lock_time,
            TxTemplate::Explicit {
                fallback_locktime, ..
            } => fallback_locktime.unwrap_or(LockTime::ZERO),
        }
    }

    #[inline]
    pub fn inputs(&self) -> &[Input] { &self.inputs }

    #[inline]
    pub fn outputs(&self) -> &[Output] { &self.outputs }

    #[inline]
    pub fn input(&self, index: usize) -> Option<&Input> { self.inputs.get(index) }

    #[inline]
    pub fn output(&self, index: usize) -> Option<&Output> { self.outputs.get(index) }

    #[inline]
    pub fn input_mut(&mut self, index: usize) -> Option<&mut Input> { self.inputs.get_mut(index) }

    #[inline]
    pub fn output_mut(&mut self, index: usize) -> Option<&mut Output> {
        self.outputs.get_mut(index)
    }

    pub fn is_finalized(&self) -> bool { self.inputs.iter().all(Input::is_final) }

    /// Previous outpoint spent by the input, taken from the wrapped transaction for version 0
    /// and from the input map for version 2.
    pub fn input_outpoint(&self, index: usize) -> Option<Outpoint> {
        match &self.template {
            TxTemplate::Wrapped(tx) => tx.inputs.get(index).map(|txin| txin.prev_output),
            TxTemplate::Explicit { .. } => self.inputs.get(index)?.previous_outpoint,
        }
    }

    /// Input sequence number; for version 2 inputs without explicit sequence this is the
    /// final sequence `0xFFFFFFFF`.
    pub fn input_sequence(&self, index: usize) -> Option<SeqNo> {
        match &self.template {
            TxTemplate::Wrapped(tx) => tx.inputs.get(index).map(|txin| txin.sequence),
            TxTemplate::Explicit { .. } => Some(
                self.inputs
                    .get(index)?
                    .sequence_number
                    .unwrap_or(SeqNo::from_consensus_u32(u32::MAX)),
            ),
        }
    }

    pub fn output_txout(&self, index: usize) -> Option<TxOut> {
        match &self.template {
            TxTemplate::Wrapped(tx) => tx.outputs.get(index).cloned(),
            TxTemplate::Explicit { .. } => {
                let output = self.outputs.get(index)?;
                Some(TxOut::new(output.script.clone()?, output.amount?))
            }
        }
    }

    pub fn to_unsigned_tx(&self) -> Result<UnsignedTx, IncompleteTemplate> {
        if let TxTemplate::Wrapped(tx) = &self.template {
            return Ok(tx.clone());
        }
        let inputs = (0..self.inputs.len())
            .map(|index| {
                let prev_output =
                    self.input_outpoint(index).ok_or(IncompleteTemplate::Input(index))?;
                let sequence = self.input_sequence(index).ok_or(IncompleteTemplate::Input(index))?;
                Ok(UnsignedTxIn {
                    prev_output,
                    sequence,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let outputs = (0..self.outputs.len())
            .map(|index| self.output_txout(index).ok_or(IncompleteTemplate::Output(index)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(UnsignedTx {
            version: self.tx_version(),
            inputs,
            outputs,
            lock_time: self.lock_time(),
        })
    }

    pub fn txid(&self) -> Result<Txid, IncompleteTemplate> {
        self.to_unsigned_tx().map(|tx| tx.txid())
    }

    /// Resolves the output spent by the input.
    ///
    /// Witness UTXO is preferred; otherwise the output is taken from the non-witness
    /// transaction, which must match the previous outpoint of the input.
    pub fn resolve_prevout(&self, index: usize) -> Result<TxOut, PrevoutError> {
        let input = self.inputs.get(index).ok_or(PrevoutError::MissingUtxo(index))?;
        if let Some(txout) = &input.witness_utxo {
            return Ok(txout.clone());
        }
        let Some(prev_tx) = &input.non_witness_tx else {
            return Err(PrevoutError::MissingUtxo(index));
        };
        let outpoint = self.input_outpoint(index).ok_or(IncompleteTemplate::Input(index))?;
        let txid = prev_tx.txid();
        if txid != outpoint.txid {
            return Err(PrevoutError::UtxoMismatch(
                index,
                UtxoMismatch::Txid(outpoint.txid, txid),
            ));
        }
        let vout = outpoint.vout.into_u32();
        prev_tx
            .outputs
            .get(vout as usize)
            .cloned()
            .ok_or(PrevoutError::UtxoMismatch(index, UtxoMismatch::NoOutput(txid, vout)))
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Input {
    pub(crate) index: usize,

    /// Previous outpoint (version 2 only).
    pub previous_outpoint: Option<Outpoint>,

    /// Sequence number (version 2 only).
    pub sequence_number: Option<SeqNo>,

    /// The non-witness transaction this input spends from. Should only be [`Some`] for inputs
    /// which spend non-segwit outputs or if it is unknown whether an input spends a segwit
    /// output.
    pub non_witness_tx: Option<Tx>,

    /// The transaction output this input spends from. Should only be [`Some`] for inputs which
    /// spend segwit outputs, including P2SH embedded ones.
    pub witness_utxo: Option<TxOut>,

    /// A map from public keys to their corresponding signature as would be pushed to the stack
    /// from a scriptSig or witness for a non-taproot inputs.
    pub partial_sigs: IndexMap<CompressedPk, LegacySig>,

    /// The sighash type used by signers of this input.
    pub sighash_type: Option<SighashType>,

    pub redeem_script: Option<RedeemScript>,

    pub witness_script: Option<WitnessScript>,

    /// A map from public keys needed to sign this input to their corresponding master key
    /// fingerprints and derivation paths.
    pub bip32_derivation: IndexMap<CompressedPk, KeyOrigin>,

    pub final_script_sig: Option<SigScript>,

    pub final_witness: Option<Witness>,

    /// Taproot key-path signature.
    pub tap_key_sig: Option<Bip340Sig>,

    /// Leaf-scoped taproot signatures, keyed by x-only key and tapleaf hash.
    pub tap_script_sig: IndexMap<(XOnlyPk, TapLeafHash), Bip340Sig>,

    /// Tapscript of the leaf to be spent via the script path.
    pub tap_leaf_script: Option<TapScript>,

    /// Control block proving the leaf in [`Input::tap_leaf_script`].
    pub tap_control_block: Option<ControlBlock>,

    /// Taproot annex, including its `0x50` prefix.
    pub tap_annex: Option<Vec<u8>>,

    /// Explicit witness stack items to be used instead of signatures when finalizing a script
    /// spend. The content of these items is not verified by this library.
    pub witness_stack: Vec<Vec<u8>>,

    /// Proprietary keys
    pub proprietary: IndexMap<PropKey, ValueData>,

    /// Unknown keys
    pub unknown: IndexMap<u8, IndexMap<KeyData, ValueData>>,
}

impl Input {
    pub fn new(index: usize) -> Input {
        Input {
            index,
            previous_outpoint: None,
            sequence_number: None,
            non_witness_tx: None,
            witness_utxo: None,
            partial_sigs: none!(),
            sighash_type: None,
            redeem_script: None,
            witness_script: None,
            bip32_derivation: none!(),
            final_script_sig: None,
            final_witness: None,
            tap_key_sig: None,
            tap_script_sig: none!(),
            tap_leaf_script: None,
            tap_control_block: None,
            tap_annex: None,
            witness_stack: none!(),
            proprietary: none!(),
            unknown: none!(),
        }
    }

    #[inline]
    pub fn index(&self) -> usize { self.index }

    #[inline]
    pub fn has_utxo(&self) -> bool { self.witness_utxo.is_some() || self.non_witness_tx.is_some() }

    #[inline]
    pub fn is_final(&self) -> bool {
        self.final_script_sig.is_some() || self.final_witness.is_some()
    }

    pub fn has_signing_material(&self) -> bool {
        !self.partial_sigs.is_empty()
            || self.sighash_type.is_some()
            || self.redeem_script.is_some()
            || self.witness_script.is_some()
            || !self.bip32_derivation.is_empty()
            || self.tap_key_sig.is_some()
            || !self.tap_script_sig.is_empty()
            || self.tap_leaf_script.is_some()
            || self.tap_control_block.is_some()
            || self.tap_annex.is_some()
            || !self.witness_stack.is_empty()
    }

    /// Tapleaf hash of the script-path leaf, if both the script and control block are known.
    pub fn tap_leaf_hash(&self) -> Option<TapLeafHash> {
        let script = self.tap_leaf_script.as_ref()?;
        let cb = self.tap_control_block.as_ref()?;
        Some(LeafScript::new(cb.leaf_version, script.as_script_bytes().clone()).tap_leaf_hash())
    }

    pub(crate) fn clear_signing_material(&mut self) {
        self.partial_sigs.clear();
        self.sighash_type = None;
        self.redeem_script = None;
        self.witness_script = None;
        self.bip32_derivation.clear();
        self.tap_key_sig = None;
        self.tap_script_sig.clear();
        self.tap_leaf_script = None;
        self.tap_control_block = None;
        self.tap_annex = None;
        self.witness_stack.clear();
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Output {
    pub(crate) index: usize,

    /// The output's amount (version 2 only).
    pub amount: Option<Sats>,

    /// The script for this output, also known as the scriptPubKey (version 2 only).
    pub script: Option<ScriptPubkey>,

    pub redeem_script: Option<RedeemScript>,

    pub witness_script: Option<WitnessScript>,

    pub bip32_derivation: IndexMap<CompressedPk, KeyOrigin>,

    /// Proprietary keys
    pub proprietary: IndexMap<PropKey, ValueData>,

    /// Unknown keys
    pub unknown: IndexMap<u8, IndexMap<KeyData, ValueData>>,
}

impl Output {
    pub fn new(index: usize) -> Self {
        Output {
            index,
            amount: None,
            script: None,
            redeem_script: None,
            witness_script: None,
            bip32_derivation: none!(),
            proprietary: none!(),
            unknown: none!(),
        }
    }

    #[inline]
    pub fn index(&self) -> usize { self.index }
}
