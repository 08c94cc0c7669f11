// Modern, minimalistic & standard-compliant Bitcoin library.
//
// SPDX-License-Identifier: Apache-2.0
//
// Designed in 2019-2025 by Dr Maxim Orlovsky <orlovsky@lnp-bp.org>
// Written in 2024-2025 by Dr Maxim Orlovsky <orlovsky@lnp-bp.org>
//
// Copyright (C) 2019-2024 LNP/BP Standards Association, Switzerland.
// Copyright (C) 2024-2025 LNP/BP Labs, Institute for Distributed and Cognitive Systems (InDCS).
// Copyright (C) 2019-2025 Dr Maxim Orlovsky.
// All rights under the above copyrights are reserved.
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

use bc::secp256k1::{ecdsa, schnorr};
use bc::{
    Bip340Sig, CompressedPk, LegacySig, ScriptPubkey, Sighash, SighashType, Txid, XOnlyPk,
};

use crate::script::pubkey_hash;
use crate::{
    IncompleteTemplate, PrevoutError, Psbt, ScriptClass, SighashCache, SighashError, SpendClass,
    UtxoMismatch,
};

#[derive(Copy, Clone, Eq, PartialEq, Debug, Display, Error)]
#[display("the signature request was rejected by the signer.")]
pub struct Rejected;

/// Public key a signature is requested for.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display, From)]
pub enum SignerKey {
    /// Key for signing pre-taproot inputs.
    #[from]
    #[display(inner)]
    Ecdsa(CompressedPk),

    /// Output key of a taproot input, for signing its key path.
    #[from]
    #[display(inner)]
    Bip340(XOnlyPk),
}

/// Signature produced by a signing callback.
#[derive(Copy, Clone, Eq, PartialEq, Debug, From)]
pub enum SigData {
    #[from]
    Ecdsa(ecdsa::Signature),
    #[from]
    Bip340(schnorr::Signature),
}

/// Data given to a signing callback: the digest to sign together with its context.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct SignRequest {
    pub index: usize,
    pub key: SignerKey,
    pub class: SpendClass,
    pub sighash: Sighash,
    /// Sighash type the digest commits to; `None` means taproot `SIGHASH_DEFAULT`.
    pub sighash_type: Option<SighashType>,
}

#[derive(Clone, Eq, PartialEq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum SignError {
    /// the signature request was rejected by the signer.
    #[from(Rejected)]
    Rejected,

    /// PSBT has no input #{0}.
    InputIndex(usize),

    /// input #{0} is already finalized.
    InputFinalized(usize),

    /// input #{0} has neither witness nor non-witness UTXO.
    MissingUtxo(usize),

    /// input #{0}: {1}
    UtxoMismatch(usize, UtxoMismatch),

    #[from]
    #[display(inner)]
    Incomplete(IncompleteTemplate),

    /// input #{0} spends {1} output, which can't be signed.
    UnsupportedScriptType(usize, SpendClass),

    /// input #{0} spends P2SH output, but its redeem script is not known.
    NoRedeemScript(usize),

    /// input #{0} spends P2WSH output, but its witness script is not known.
    NoWitnessScript(usize),

    /// key {1} can't sign input #{0}, which spends {2} output.
    KeyMismatch(usize, SignerKey, SpendClass),

    /// signer returned a signature of a wrong type for input #{0}.
    SigMismatch(usize),

    /// transaction {txid} input {index} uses SIGHASH_SINGLE, but the total
    /// number of outputs is {outputs} and thus no signature can be produced.
    SighashOnlyMismatch {
        txid: Txid,
        index: usize,
        outputs: usize,
    },

    /// output spent by input #{0} is unknown, while taproot signatures commit to all spent
    /// outputs.
    MissingPrevout(usize),
}

impl From<PrevoutError> for SignError {
    fn from(err: PrevoutError) -> Self {
        match err {
            PrevoutError::MissingUtxo(index) => Self::MissingUtxo(index),
            PrevoutError::UtxoMismatch(index, mismatch) => Self::UtxoMismatch(index, mismatch),
            PrevoutError::Incomplete(err) => Self::Incomplete(err),
        }
    }
}

impl From<SighashError> for SignError {
    fn from(err: SighashError) -> Self {
        match err {
            SighashError::InvalidInputIndex { index, .. } => Self::InputIndex(index),
            SighashError::NoSingleOutputMatch {
                txid,
                index,
                outputs,
            } => Self::SighashOnlyMismatch {
                txid,
                index,
                outputs,
            },
            SighashError::MissingPrevout(index) => Self::MissingPrevout(index),
        }
    }
}

impl Psbt {
    /// Signs a single input with the given key.
    ///
    /// The digest is computed according to the class of the spent output: legacy algorithm for
    /// P2PKH (bare or P2SH-wrapped) and for P2SH with a non-standard redeem script, BIP-143 for
    /// P2WPKH and P2WSH (bare or P2SH-wrapped) and BIP-341 key path for P2TR. `sign_fn`
    /// receives the digest and must return a signature of the matching algorithm, which is then
    /// stored in the input together with the sighash type. The packet is not changed if any
    /// step fails.
    ///
    /// If `sighash_type` is `None`, the type stored in the input is used; when there is none,
    /// it is `SIGHASH_ALL` for ECDSA and `SIGHASH_DEFAULT` for taproot.
    pub fn sign(
        &mut self,
        index: usize,
        key: impl Into<SignerKey>,
        sighash_type: Option<SighashType>,
        sign_fn: impl FnOnce(&SignRequest) -> Result<SigData, Rejected>,
    ) -> Result<(), SignError> {
        let key = key.into();
        let request = self.sign_request(index, key, sighash_type)?;
        trace!("input #{index}: signing {} digest {}", request.class, request.sighash);

        let sig = sign_fn(&request)?;

        let input = self.inputs.get_mut(index).ok_or(SignError::InputIndex(index))?;
        match (key, sig) {
            (SignerKey::Ecdsa(pk), SigData::Ecdsa(sig)) => {
                let sighash_type = request.sighash_type.unwrap_or_default();
                input.partial_sigs.insert(pk, LegacySig { sig, sighash_type });
                input.sighash_type = Some(sighash_type);
            }
            (SignerKey::Bip340(_), SigData::Bip340(sig)) => {
                input.tap_key_sig = Some(Bip340Sig {
                    sig,
                    sighash_type: request.sighash_type,
                });
                if request.sighash_type.is_some() {
                    input.sighash_type = request.sighash_type;
                }
            }
            _ => return Err(SignError::SigMismatch(index)),
        }
        debug!("input #{index}: {} signature by {key} added", request.class);
        Ok(())
    }

    /// Computes the digest which must be signed by `key` to spend the input, without changing
    /// the packet.
    pub fn sign_request(
        &self,
        index: usize,
        key: SignerKey,
        sighash_type: Option<SighashType>,
    ) -> Result<SignRequest, SignError> {
        let input = self.inputs.get(index).ok_or(SignError::InputIndex(index))?;
        if input.is_final() {
            return Err(SignError::InputFinalized(index));
        }
        let prevout = self.resolve_prevout(index)?;
        let spk = prevout.script_pubkey.as_slice();
        let redeem_script = input.redeem_script.as_ref().map(|script| script.as_slice());
        let class = SpendClass::with(spk, redeem_script);
        let sighash_type = sighash_type.or(input.sighash_type);

        let ecdsa_pk = |class| match key {
            SignerKey::Ecdsa(pk) => Ok(pk),
            SignerKey::Bip340(_) => Err(SignError::KeyMismatch(index, key, class)),
        };
        // redeem script takes the place of the output script for P2SH-wrapped inputs
        let inner_script = match (class.is_nested(), redeem_script) {
            (true, Some(redeem_script)) => redeem_script,
            _ => spk,
        };

        let tx = self.to_unsigned_tx()?;
        let sighash = match class {
            SpendClass::P2shOpaque => return Err(SignError::NoRedeemScript(index)),
            SpendClass::P2pkh | SpendClass::P2sh(ScriptClass::P2pkh) => {
                let pk = ecdsa_pk(class)?;
                if ScriptClass::P2pkh.commitment(inner_script) != Some(&pubkey_hash(&pk)[..]) {
                    return Err(SignError::KeyMismatch(index, key, class));
                }
                let mut cache = SighashCache::new(tx, vec![]);
                cache.legacy_sighash(index, inner_script, sighash_type.unwrap_or_default())?
            }
            SpendClass::P2sh(ScriptClass::Unknown) => {
                ecdsa_pk(class)?;
                let mut cache = SighashCache::new(tx, vec![]);
                cache.legacy_sighash(index, inner_script, sighash_type.unwrap_or_default())?
            }
            SpendClass::P2wpkh | SpendClass::P2sh(ScriptClass::P2wpkh) => {
                let pk = ecdsa_pk(class)?;
                let key_hash = pubkey_hash(&pk);
                if ScriptClass::P2wpkh.commitment(inner_script) != Some(&key_hash[..]) {
                    return Err(SignError::KeyMismatch(index, key, class));
                }
                let script_code = ScriptPubkey::p2pkh(key_hash);
                let mut cache = SighashCache::new(tx, vec![]);
                cache.segwit_sighash(
                    index,
                    script_code.as_slice(),
                    prevout.value,
                    sighash_type.unwrap_or_default(),
                )?
            }
            SpendClass::P2wsh | SpendClass::P2sh(ScriptClass::P2wsh) => {
                ecdsa_pk(class)?;
                let script_code =
                    input.witness_script.as_ref().ok_or(SignError::NoWitnessScript(index))?;
                let mut cache = SighashCache::new(tx, vec![]);
                cache.segwit_sighash(
                    index,
                    script_code.as_slice(),
                    prevout.value,
                    sighash_type.unwrap_or_default(),
                )?
            }
            SpendClass::P2tr => {
                let SignerKey::Bip340(output_key) = key else {
                    return Err(SignError::KeyMismatch(index, key, class));
                };
                if ScriptClass::P2tr.commitment(spk) != Some(&output_key.to_byte_array()[..]) {
                    return Err(SignError::KeyMismatch(index, key, class));
                }
                let prevouts =
                    (0..self.inputs.len()).map(|no| self.resolve_prevout(no).ok()).collect();
                let mut cache = SighashCache::new(tx, prevouts);
                cache.tap_sighash_key(index, sighash_type, input.tap_annex.as_deref())?
            }
            SpendClass::Unknown | SpendClass::P2sh(_) => {
                return Err(SignError::UnsupportedScriptType(index, class));
            }
        };

        let sighash_type = match class {
            SpendClass::P2tr => sighash_type,
            _ => Some(sighash_type.unwrap_or_default()),
        };
        Ok(SignRequest {
            index,
            key,
            class,
            sighash,
            sighash_type,
        })
    }
}
